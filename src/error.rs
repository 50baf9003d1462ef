//! Error types for the loan relay

use crate::model::DealState;
use thiserror::Error;

/// Main error type for loan orchestration
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoanError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid loan terms: {0}")]
    InvalidTerms(String),

    #[error("Loan terms of ask {ask} and bid {bid} do not match")]
    TermsMismatch { ask: String, bid: String },

    #[error("{what} expired at block {expiration} (current block {current})")]
    Expired {
        what: String,
        expiration: u64,
        current: u64,
    },

    #[error("Correlation id {0} was already submitted")]
    DuplicateCorrelationId(String),

    #[error("Invalid state transition from {from} via {action}")]
    InvalidStateTransition { from: DealState, action: String },

    #[error("Transfer {transfer_id} is not verified")]
    TransferNotVerified { transfer_id: String },

    #[error("Transfer {transfer_id} does not match deal {deal_id}: {reason}")]
    TransferMismatch {
        transfer_id: String,
        deal_id: String,
        reason: String,
    },

    #[error("Transfer {transfer_id} was already used")]
    TransferAlreadyUsed { transfer_id: String },

    #[error("Verification channel closed before transfer {transfer_id} reached a final status")]
    VerificationChannelClosed { transfer_id: String },

    #[error("Transaction {tx_hash} has {confirmations} / {required} confirmations")]
    InsufficientConfirmations {
        tx_hash: String,
        confirmations: u64,
        required: u64,
    },

    #[error("Chain connection error for {chain}: {message}")]
    ChainConnection { chain: String, message: String },

    #[error("Nonce error for account {account}: {message}")]
    Nonce { account: String, message: String },

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Account {account} is not authorized to {action}")]
    Unauthorized { account: String, action: String },

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} {id} already exists")]
    AlreadyExists { kind: &'static str, id: String },

    #[error("Submission rejected: {0}")]
    Rejected(String),

    #[error("Ledger session is closed")]
    SessionClosed,

    #[error("Timeout waiting for {operation}")]
    Timeout { operation: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LoanError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LoanError::ChainConnection { .. }
                | LoanError::Timeout { .. }
                | LoanError::InsufficientConfirmations { .. }
                | LoanError::VerificationChannelClosed { .. }
                | LoanError::Nonce { .. }
        )
    }

    /// Local validation errors that never reach the chain
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            LoanError::InvalidTerms(_)
                | LoanError::TermsMismatch { .. }
                | LoanError::Expired { .. }
                | LoanError::DuplicateCorrelationId(_)
        )
    }

    pub(crate) fn not_found(kind: &'static str, id: impl ToString) -> Self {
        LoanError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub(crate) fn invalid_transition(from: DealState, action: &str) -> Self {
        LoanError::InvalidStateTransition {
            from,
            action: action.to_string(),
        }
    }
}

/// Result type for loan operations
pub type LoanResult<T> = Result<T, LoanError>;
