//! Transfer registration and verification tracking
//!
//! This module provides:
//! - Depth-gated registration of funding and repayment claims
//! - Handles that resolve to the worker's verification outcome

mod coordinator;
mod handle;

pub use coordinator::{RegisteredTransfer, TransferCoordinator};
pub use handle::{VerificationHandle, VerificationResult};
