//! Loan Relay - cross-chain collateralized loan orchestration
//!
//! Drives a loan from matched intents to closure across a primary
//! settlement chain, which holds orders, deals and transfer attestations,
//! and a secondary EVM chain where the funds actually move.

pub mod chain;
pub mod config;
pub mod coordination;
pub mod crypto;
pub mod deal;
pub mod devnet;
pub mod error;
pub mod ledger;
pub mod matching;
pub mod metrics;
pub mod model;
pub mod verification;

pub use coordination::{CycleOutcome, CycleReport, LoanOrchestrator, Party};
pub use error::{LoanError, LoanResult};
