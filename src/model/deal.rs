//! The deal order aggregate.

use super::{
    AccountId, AddressId, BlockNumber, Expiring, LoanTerms, OfferId, TransferId,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle states of a deal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DealState {
    /// Inside the ledger only, before acceptance/registration is applied.
    Created,
    /// Agreed by both parties, awaiting funding.
    New,
    /// Funding transfer verified and applied.
    Funded,
    /// Borrower locked the deal; repayment expected.
    Locked,
    /// Repayment transfer verified.
    Repaid,
    /// Closed by the borrower after repayment. Final state.
    Closed,
    /// Forgiven by the lender. Final state.
    Exempted,
}

impl DealState {
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Closed | Self::Exempted)
    }
}

impl fmt::Display for DealState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "Created",
            Self::New => "New",
            Self::Funded => "Funded",
            Self::Locked => "Locked",
            Self::Repaid => "Repaid",
            Self::Closed => "Closed",
            Self::Exempted => "Exempted",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealOrder {
    /// `None` on the direct-registration path
    pub offer_id: Option<OfferId>,
    pub lender_address_id: AddressId,
    pub borrower_address_id: AddressId,
    pub terms: LoanTerms,
    pub expiration_block: BlockNumber,
    pub block: BlockNumber,
    pub state: DealState,
    pub funding_transfer_id: Option<TransferId>,
    pub repayment_transfer_id: Option<TransferId>,
    pub lender: AccountId,
    pub borrower: AccountId,
}

impl Expiring for DealOrder {
    fn expiration_block(&self) -> BlockNumber {
        self.expiration_block
    }
}
