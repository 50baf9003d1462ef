use crate::error::{LoanError, LoanResult};
use crate::ledger::{LedgerEvent, LedgerSession};
use crate::model::{FailureReason, Transfer, TransferId, VerificationStatus};

use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Final outcome of a transfer claim
#[derive(Debug, Clone, PartialEq)]
pub enum VerificationResult {
    Verified(Transfer),
    Failed {
        transfer_id: TransferId,
        reason: FailureReason,
    },
}

impl VerificationResult {
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified(_))
    }
}

/// Waits for the outcome of one registered transfer.
///
/// The handle holds only the transfer id. Each `wait` subscribes afresh,
/// so a handle can be re-attached after the event channel dropped. The first
/// final outcome observed is kept and returned to every later caller.
#[derive(Clone)]
pub struct VerificationHandle {
    transfer_id: TransferId,
    session: Arc<LedgerSession>,
    outcome: Arc<OnceCell<VerificationResult>>,
}

impl VerificationHandle {
    pub fn new(transfer_id: TransferId, session: Arc<LedgerSession>) -> Self {
        Self {
            transfer_id,
            session,
            outcome: Arc::new(OnceCell::new()),
        }
    }

    pub fn transfer_id(&self) -> TransferId {
        self.transfer_id
    }

    /// Resolve with the transfer's final status.
    ///
    /// Fails with `VerificationChannelClosed` if the event feed drops first.
    pub async fn wait(&self) -> LoanResult<VerificationResult> {
        let result = self
            .outcome
            .get_or_try_init(|| wait_for_outcome(&self.session, self.transfer_id))
            .await?;
        Ok(result.clone())
    }
}

fn channel_closed(transfer_id: TransferId) -> LoanError {
    LoanError::VerificationChannelClosed {
        transfer_id: transfer_id.to_string(),
    }
}

/// Outcome already on chain, if any
async fn current_outcome(
    session: &LedgerSession,
    transfer_id: TransferId,
) -> LoanResult<Option<VerificationResult>> {
    let transfer = session
        .client()?
        .transfer(&transfer_id)
        .await?
        .ok_or_else(|| LoanError::not_found("transfer", transfer_id))?;

    Ok(match transfer.status {
        VerificationStatus::Pending => None,
        VerificationStatus::Verified => Some(VerificationResult::Verified(transfer)),
        VerificationStatus::Failed(reason) => Some(VerificationResult::Failed {
            transfer_id,
            reason,
        }),
    })
}

async fn wait_for_outcome(
    session: &LedgerSession,
    transfer_id: TransferId,
) -> LoanResult<VerificationResult> {
    // Subscribe before reading state so no outcome falls between the two
    let mut events = session.subscribe().map_err(|e| match e {
        LoanError::SessionClosed => e,
        _ => channel_closed(transfer_id),
    })?;

    if let Some(result) = current_outcome(session, transfer_id).await? {
        return Ok(record(result));
    }

    loop {
        match events.recv().await {
            Ok(LedgerEvent::TransferVerified { transfer_id: id }) if id == transfer_id => {
                if let Some(result) = current_outcome(session, transfer_id).await? {
                    return Ok(record(result));
                }
            }
            Ok(LedgerEvent::TransferFailed {
                transfer_id: id,
                reason,
            }) if id == transfer_id => {
                return Ok(record(VerificationResult::Failed {
                    transfer_id,
                    reason,
                }));
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!(
                    "Missed {} events while waiting for {}, re-reading status",
                    skipped, transfer_id
                );
                if let Some(result) = current_outcome(session, transfer_id).await? {
                    return Ok(record(result));
                }
            }
            Err(RecvError::Closed) => return Err(channel_closed(transfer_id)),
        }
    }
}

fn record(result: VerificationResult) -> VerificationResult {
    let outcome = match &result {
        VerificationResult::Verified(_) => "verified",
        VerificationResult::Failed { .. } => "failed",
    };
    debug!("Verification outcome: {}", outcome);
    crate::metrics::record_verification(outcome);
    result
}
