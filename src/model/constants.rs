//! Protocol-level constants.

use super::BlockNumber;

/// Smallest fee charged for closing a deal: 0.01 of an 18-decimal unit.
pub const MIN_CLOSE_FEE: u128 = 10_000_000_000_000_000;

/// Secondary-chain blocks required past inclusion before a claim is accepted.
pub const DEFAULT_CONFIRMATION_DEPTH: u64 = 12;

/// Primary-chain blocks the off-chain worker has to settle a transfer claim.
pub const VERIFICATION_WINDOW: BlockNumber = 60;
