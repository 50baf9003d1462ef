//! Signing primitives
//!
//! - ed25519 keys for primary-chain accounts
//! - Canonical loan-parameter encoding and borrower consent signatures
//! - EVM address ownership proofs (secp256k1 via ethers)

mod keys;
mod loan_params;
mod ownership;

pub use keys::{verify, AccountKey, AccountSignature};
pub use loan_params::{encode_loan_params, sign_loan_params, verify_loan_params};
pub use ownership::{ownership_message, prove_ownership, verify_ownership};
