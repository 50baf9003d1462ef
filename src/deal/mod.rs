//! Deal order lifecycle
//!
//! A deal enters `New` through an accepted offer or a direct registration
//! carrying the borrower's signature, then moves through funding, locking
//! and repayment until it is closed or exempted.

mod manager;
pub mod state;

pub use manager::{DealLifecycle, DirectRegistration};
pub use state::{DealAction, DealStateMachine};
