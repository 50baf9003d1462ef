//! Confirmation depth gating for secondary-chain transactions
//!
//! A transfer claim may only reference a transaction buried at least `K`
//! blocks deep. The gate polls the tip and only trusts an observation once a
//! following poll has not regressed below it, so a transiently inconsistent
//! RPC answer cannot release a waiter early.

use super::{TipSource, TxInclusion};
use crate::error::{LoanError, LoanResult};
use crate::model::constants::DEFAULT_CONFIRMATION_DEPTH;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Blocks until the secondary chain is deep enough past an inclusion point
pub struct ConfirmationGate {
    /// Tip source
    source: Arc<dyn TipSource>,
    /// Required confirmation blocks
    required_depth: u64,
    /// Delay between tip polls
    poll_interval: Duration,
    /// Highest tip seen on two polls in a row without regressing
    confirmed_tip: AtomicU64,
}

impl ConfirmationGate {
    pub fn new(source: Arc<dyn TipSource>, required_depth: u64, poll_interval: Duration) -> Self {
        Self {
            source,
            required_depth,
            poll_interval,
            confirmed_tip: AtomicU64::new(0),
        }
    }

    pub fn required_depth(&self) -> u64 {
        self.required_depth
    }

    /// Resolve once `tip >= included_at_block + required_depth`.
    ///
    /// No upper timeout; callers own cancellation (dropping the future).
    pub async fn await_depth(&self, included_at_block: u64, required_depth: u64) -> LoanResult<()> {
        let target = included_at_block.saturating_add(required_depth);
        let started = Instant::now();
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut previous: Option<u64> = None;

        loop {
            ticker.tick().await;

            let observed = match self.source.tip().await {
                Ok(tip) => tip,
                Err(e) if e.is_retryable() => {
                    warn!("Tip poll failed while waiting for block {}: {}", target, e);
                    previous = None;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let confirmed = match previous {
                Some(prev) if observed >= prev => Some(prev),
                Some(prev) => {
                    warn!(
                        "Secondary tip regressed from {} to {}, restarting observation",
                        prev, observed
                    );
                    None
                }
                None => None,
            };
            previous = Some(observed);

            if let Some(tip) = confirmed {
                self.confirmed_tip.fetch_max(tip, Ordering::Relaxed);
                if tip >= target {
                    let waited = started.elapsed();
                    info!(
                        "Block {} reached depth {} (tip {}, waited {:?})",
                        included_at_block, required_depth, tip, waited
                    );
                    crate::metrics::record_depth_wait(waited.as_secs_f64());
                    return Ok(());
                }
            }

            debug!(
                "Waiting for tip {} (observed {}, inclusion {})",
                target, observed, included_at_block
            );
        }
    }

    /// Wait until `inclusion` is `required_depth` deep
    pub async fn await_confirmed(&self, inclusion: &TxInclusion) -> LoanResult<()> {
        self.await_depth(inclusion.block, self.required_depth).await
    }

    /// Highest tip this gate has confirmed so far
    pub fn confirmed_tip(&self) -> u64 {
        self.confirmed_tip.load(Ordering::Relaxed)
    }

    /// Depth check with no waiting: `Ok(confirmations)` when deep enough.
    ///
    /// Two back-to-back polls are taken and the lower one counts, unless an
    /// earlier wait already confirmed a higher tip.
    pub async fn check_depth(&self, inclusion: &TxInclusion) -> LoanResult<u64> {
        let first = self.source.tip().await?;
        let second = self.source.tip().await?;
        if second < first {
            warn!("Secondary tip regressed from {} to {} during depth check", first, second);
        } else {
            self.confirmed_tip.fetch_max(first, Ordering::Relaxed);
        }
        let tip = first.min(second).max(self.confirmed_tip());
        let confirmations = tip.saturating_sub(inclusion.block);

        if confirmations < self.required_depth {
            return Err(LoanError::InsufficientConfirmations {
                tx_hash: format!("{:?}", inclusion.tx_hash),
                confirmations,
                required: self.required_depth,
            });
        }
        Ok(confirmations)
    }
}

/// Get recommended confirmation blocks for a secondary chain
pub fn recommended_confirmations(chain_id: u64) -> u64 {
    match chain_id {
        // Ethereum mainnet
        1 => DEFAULT_CONFIRMATION_DEPTH,
        // Ethereum testnets
        11155111 | 5 | 4 => DEFAULT_CONFIRMATION_DEPTH,
        // Polygon mainnet
        137 => 128,
        // Hardhat / anvil
        31337 => DEFAULT_CONFIRMATION_DEPTH,
        // Default conservative
        _ => 64,
    }
}
