//! Off-chain verification worker
//!
//! Watches for `TransferRegistered`, checks the claimed transaction against
//! the secondary chain once it is deep enough, and records the outcome as an
//! authority account. Outcomes travel back to waiters as ledger events.
//!
//! After every (re)subscription and after the feed lags, the worker also
//! scans the ledger's pending transfers so skipped registrations are still
//! checked.

use super::evm::DevEvm;
use crate::chain::TipSource;
use crate::crypto::AccountKey;
use crate::error::{LoanError, LoanResult};
use crate::ledger::{Call, LedgerEvent, LedgerSession};
use crate::model::{FailureReason, Transfer, TransferId};

use dashmap::DashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub struct DevVerifier {
    session: Arc<LedgerSession>,
    evm: DevEvm,
    authority: AccountKey,
    required_depth: u64,
    poll_interval: Duration,
    /// Transfers with a check running
    in_flight: DashSet<TransferId>,
}

impl DevVerifier {
    pub fn new(
        session: Arc<LedgerSession>,
        evm: DevEvm,
        authority: AccountKey,
        required_depth: u64,
        poll_interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            session,
            evm,
            authority,
            required_depth,
            poll_interval,
            in_flight: DashSet::new(),
        })
    }

    /// Check `transfer` in the background unless a check is already running
    fn dispatch(self: &Arc<Self>, transfer_id: TransferId, transfer: Transfer) {
        if !self.in_flight.insert(transfer_id) {
            return;
        }
        let worker = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = worker.process(transfer_id, transfer).await {
                error!("Verification of {} aborted: {}", transfer_id, e);
            }
            worker.in_flight.remove(&transfer_id);
        });
    }

    /// Dispatch every transfer the ledger still holds as pending
    async fn catch_up(self: &Arc<Self>) {
        let pending = match self.session.client() {
            Ok(client) => client.pending_transfers().await,
            Err(e) => Err(e),
        };
        match pending {
            Ok(pending) => {
                if !pending.is_empty() {
                    debug!("Catching up on {} pending transfers", pending.len());
                }
                for (transfer_id, transfer) in pending {
                    self.dispatch(transfer_id, transfer);
                }
            }
            Err(e) => warn!("Cannot list pending transfers: {}", e),
        }
    }

    /// Run until the session closes
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        // Subscribed before returning so no registration is missed
        let mut initial = self.session.subscribe().ok();

        tokio::spawn(async move {
            info!("Verification worker started as {}", self.authority.account_id());
            while self.session.is_open() {
                let subscription = match initial.take() {
                    Some(events) => Ok(events),
                    None => self.session.subscribe(),
                };
                let mut events = match subscription {
                    Ok(events) => events,
                    Err(LoanError::SessionClosed) => break,
                    Err(e) => {
                        warn!("Worker cannot subscribe: {}", e);
                        tokio::time::sleep(self.poll_interval).await;
                        continue;
                    }
                };
                self.catch_up().await;

                loop {
                    match events.recv().await {
                        Ok(LedgerEvent::TransferRegistered {
                            transfer_id,
                            transfer,
                        }) => self.dispatch(transfer_id, transfer),
                        Ok(_) => {}
                        Err(RecvError::Lagged(n)) => {
                            warn!("Worker lagged, {} events skipped", n);
                            self.catch_up().await;
                        }
                        Err(RecvError::Closed) => {
                            warn!("Worker event feed closed, resubscribing");
                            break;
                        }
                    }
                }
            }
            info!("Verification worker stopped");
        })
    }

    async fn process(&self, transfer_id: TransferId, transfer: Transfer) -> LoanResult<()> {
        let call = match self.check(&transfer).await? {
            Ok(()) => Call::VerifyTransfer { transfer_id },
            Err(reason) => {
                warn!("Transfer {} rejected: {}", transfer_id, reason);
                Call::FailTransfer {
                    transfer_id,
                    reason,
                }
            }
        };

        match self.session.submit(&self.authority, call).await {
            Ok(_) => Ok(()),
            // The ledger timed the claim out first
            Err(LoanError::AlreadyExists { .. }) => {
                debug!("Outcome for {} already recorded", transfer_id);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Outer error: the check could not run. Inner error: the claim is false.
    async fn check(&self, transfer: &Transfer) -> LoanResult<Result<(), FailureReason>> {
        let Some(tx) = self.evm.tx(&transfer.tx_hash)? else {
            return Ok(Err(FailureReason::TxNotFound));
        };
        if !tx.success {
            return Ok(Err(FailureReason::TxReverted));
        }

        let target = tx.block.saturating_add(self.required_depth);
        while self.evm.tip().await? < target {
            tokio::time::sleep(self.poll_interval).await;
        }

        let client = self.session.client()?;
        let currency = client
            .currency(&transfer.currency)
            .await?
            .ok_or_else(|| LoanError::not_found("currency", transfer.currency))?;
        if currency.contract() != tx.token {
            return Ok(Err(FailureReason::CurrencyMismatch));
        }

        let from = client
            .address(&transfer.from)
            .await?
            .ok_or_else(|| LoanError::not_found("address", transfer.from))?;
        let to = client
            .address(&transfer.to)
            .await?
            .ok_or_else(|| LoanError::not_found("address", transfer.to))?;
        if from.value != tx.from || to.value != tx.to {
            return Ok(Err(FailureReason::AddressMismatch));
        }

        if tx.deal_reference != transfer.deal_id.reference() {
            return Ok(Err(FailureReason::DealReferenceMismatch));
        }
        if tx.amount != transfer.amount {
            return Ok(Err(FailureReason::AmountMismatch));
        }
        Ok(Ok(()))
    }
}
