//! Claims that value moved on the secondary chain for a deal.

use super::{AccountId, AddressId, Blockchain, BlockNumber, CurrencyId, DealOrderId};
use ethers::types::{H256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    Evm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EvmTransferKind {
    Erc20,
    Ethless,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferKind {
    pub platform: Platform,
    pub kind: EvmTransferKind,
}

impl TransferKind {
    pub const ETHLESS: TransferKind = TransferKind {
        platform: Platform::Evm,
        kind: EvmTransferKind::Ethless,
    };
}

/// Which leg of the loan a transfer claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferDirection {
    /// Lender to borrower
    Funding,
    /// Borrower to lender
    Repayment,
}

/// Why the off-chain worker refused a claim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureReason {
    TxNotFound,
    TxReverted,
    AmountMismatch,
    AddressMismatch,
    DealReferenceMismatch,
    CurrencyMismatch,
    InsufficientConfirmations,
    Timeout,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Write-once verification status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationStatus {
    Pending,
    Verified,
    Failed(FailureReason),
}

impl VerificationStatus {
    pub fn is_final(&self) -> bool {
        !matches!(self, VerificationStatus::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub kind: TransferKind,
    pub blockchain: Blockchain,
    pub direction: TransferDirection,
    pub from: AddressId,
    pub to: AddressId,
    pub deal_id: DealOrderId,
    pub currency: CurrencyId,
    pub amount: U256,
    pub tx_hash: H256,
    pub block: BlockNumber,
    pub account_id: AccountId,
    pub status: VerificationStatus,
    /// Set once the transfer has been applied to its deal
    pub processed: bool,
}

impl Transfer {
    pub fn is_verified(&self) -> bool {
        self.status == VerificationStatus::Verified
    }
}
