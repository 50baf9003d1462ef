//! Loan orchestration across both chains
//!
//! The orchestrator:
//! 1. Registers both parties' secondary-chain addresses
//! 2. Matches an ask with a bid, or registers a deal directly
//! 3. Moves funds on the secondary chain and waits for confirmation depth
//! 4. Claims each transfer on the primary chain and awaits verification
//! 5. Advances the deal only on a verified outcome

pub mod engine;

pub use engine::{CycleOutcome, CycleReport, LoanOrchestrator, Party};
