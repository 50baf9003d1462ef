//! Deal order transition table.
//!
//! Valid transitions:
//! - Created → New (AcceptOffer | Register)
//! - New → Funded (Fund)
//! - Funded → Locked (Lock)
//! - Funded → Exempted (Exempt)
//! - Locked → Repaid (Repay)
//! - Locked → Exempted (Exempt)
//! - Repaid → Closed (Close)
//!
//! The same table backs the devnet ledger's dispatch and the lifecycle
//! manager's pre-submission checks.

use crate::error::{LoanError, LoanResult};
use crate::model::{DealOrder, DealOrderId, DealState, Transfer, TransferDirection, TransferId};

/// Events that move a deal between states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DealAction {
    /// Borrower accepted a lender's offer
    AcceptOffer,
    /// Lender registered the deal with the borrower's signature
    Register,
    /// Verified funding transfer applied
    Fund,
    /// Borrower locked the deal
    Lock,
    /// Verified repayment transfer applied
    Repay,
    /// Borrower closed the repaid deal
    Close,
    /// Lender forgave the debt
    Exempt,
}

impl DealAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AcceptOffer => "accept_offer",
            Self::Register => "register",
            Self::Fund => "fund",
            Self::Lock => "lock",
            Self::Repay => "repay",
            Self::Close => "close",
            Self::Exempt => "exempt",
        }
    }
}

pub struct DealStateMachine;

impl DealStateMachine {
    /// Target state of `action` from `from`, if legal
    pub fn next(from: DealState, action: DealAction) -> Option<DealState> {
        use DealAction::*;
        use DealState::*;

        match (from, action) {
            (Created, AcceptOffer) | (Created, Register) => Some(New),
            (New, Fund) => Some(Funded),
            (Funded, Lock) => Some(Locked),
            (Locked, Repay) => Some(Repaid),
            (Funded, Exempt) | (Locked, Exempt) => Some(Exempted),
            (Repaid, Close) => Some(Closed),
            _ => None,
        }
    }

    pub fn transition(from: DealState, action: DealAction) -> LoanResult<DealState> {
        Self::next(from, action).ok_or_else(|| LoanError::invalid_transition(from, action.name()))
    }

    pub fn is_valid(from: DealState, action: DealAction) -> bool {
        Self::next(from, action).is_some()
    }

    /// Actions legal from `state`
    pub fn allowed_actions(state: DealState) -> Vec<DealAction> {
        use DealAction::*;
        [AcceptOffer, Register, Fund, Lock, Repay, Close, Exempt]
            .into_iter()
            .filter(|a| Self::is_valid(state, *a))
            .collect()
    }
}

fn mismatch(transfer_id: &TransferId, deal_id: &DealOrderId, reason: &str) -> LoanError {
    LoanError::TransferMismatch {
        transfer_id: transfer_id.to_string(),
        deal_id: deal_id.to_string(),
        reason: reason.to_string(),
    }
}

/// Preconditions of applying `transfer` as the funding of `deal`
pub fn check_funding(
    deal_id: &DealOrderId,
    deal: &DealOrder,
    transfer_id: &TransferId,
    transfer: &Transfer,
) -> LoanResult<()> {
    DealStateMachine::transition(deal.state, DealAction::Fund)?;

    if deal.funding_transfer_id.is_some() {
        return Err(LoanError::invalid_transition(deal.state, "fund"));
    }
    if !transfer.is_verified() {
        return Err(LoanError::TransferNotVerified {
            transfer_id: transfer_id.to_string(),
        });
    }
    if transfer.processed {
        return Err(LoanError::TransferAlreadyUsed {
            transfer_id: transfer_id.to_string(),
        });
    }
    if transfer.deal_id != *deal_id {
        return Err(mismatch(transfer_id, deal_id, "transfer references another deal"));
    }
    if transfer.direction != TransferDirection::Funding {
        return Err(mismatch(transfer_id, deal_id, "not a funding transfer"));
    }
    if transfer.from != deal.lender_address_id || transfer.to != deal.borrower_address_id {
        return Err(mismatch(transfer_id, deal_id, "addresses differ from the deal's"));
    }
    if transfer.amount != deal.terms.amount {
        return Err(mismatch(transfer_id, deal_id, "amount differs from the loan amount"));
    }
    if transfer.currency != deal.terms.currency {
        return Err(mismatch(transfer_id, deal_id, "currency differs from the loan currency"));
    }
    Ok(())
}

/// Whether a freshly verified repayment moves `deal` to `Repaid`
pub fn repayment_applies(deal: &DealOrder, transfer: &Transfer) -> bool {
    transfer.direction == TransferDirection::Repayment
        && DealStateMachine::is_valid(deal.state, DealAction::Repay)
        && deal.repayment_transfer_id.is_none()
        && transfer.amount >= deal.terms.outstanding()
}

/// Preconditions of closing `deal` with the repayment `transfer`
pub fn check_closing(
    deal_id: &DealOrderId,
    deal: &DealOrder,
    transfer_id: &TransferId,
    transfer: &Transfer,
) -> LoanResult<()> {
    DealStateMachine::transition(deal.state, DealAction::Close)?;

    if !transfer.is_verified() {
        return Err(LoanError::TransferNotVerified {
            transfer_id: transfer_id.to_string(),
        });
    }
    if transfer.deal_id != *deal_id || transfer.direction != TransferDirection::Repayment {
        return Err(mismatch(transfer_id, deal_id, "not a repayment of this deal"));
    }
    if deal.repayment_transfer_id != Some(*transfer_id) {
        return Err(mismatch(transfer_id, deal_id, "not the recorded repayment"));
    }
    if transfer.amount < deal.terms.outstanding() {
        return Err(mismatch(transfer_id, deal_id, "repayment below the outstanding amount"));
    }
    Ok(())
}
