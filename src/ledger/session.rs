//! Explicitly owned handle to the primary chain.
//!
//! One session wraps one `LedgerClient` connection. Every submission goes
//! through the session's `NonceManager`, so calls from the same account are
//! serialised while different accounts proceed in parallel.

use super::{Call, LedgerClient, LedgerEvent, NonceManager, NonceMode, Receipt, SignedCall};
use crate::crypto::AccountKey;
use crate::error::{LoanError, LoanResult};
use crate::model::BlockNumber;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

pub struct LedgerSession {
    client: Arc<dyn LedgerClient>,
    nonces: NonceManager,
    open: AtomicBool,
}

impl LedgerSession {
    /// Open a session over an established client connection
    pub fn open(client: Arc<dyn LedgerClient>) -> Arc<Self> {
        info!("Ledger session opened");
        Arc::new(Self {
            client,
            nonces: NonceManager::new(),
            open: AtomicBool::new(true),
        })
    }

    /// Close the session; later calls fail with `SessionClosed`
    pub fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            info!(
                "Ledger session closed ({} accounts tracked)",
                self.nonces.tracked_accounts()
            );
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Underlying client, if the session is still open
    pub fn client(&self) -> LoanResult<&dyn LedgerClient> {
        if !self.is_open() {
            return Err(LoanError::SessionClosed);
        }
        Ok(self.client.as_ref())
    }

    pub fn nonces(&self) -> &NonceManager {
        &self.nonces
    }

    /// Sign and submit `call` with the next available nonce
    pub async fn submit(&self, key: &AccountKey, call: Call) -> LoanResult<Receipt> {
        self.submit_with(key, call, NonceMode::Auto).await
    }

    /// Sign and submit `call`, waiting for inclusion
    pub async fn submit_with(
        &self,
        key: &AccountKey,
        call: Call,
        mode: NonceMode,
    ) -> LoanResult<Receipt> {
        let client = self.client()?;
        let name = call.name();

        let mut guard = self.nonces.reserve(key.account_id(), client).await?;
        let nonce = guard.resolve(mode);
        let signed = SignedCall::sign(key, nonce, call)?;

        debug!("Submitting {} from {} (nonce {})", name, key.account_id(), nonce);

        match client.submit(signed).await {
            Ok(receipt) => {
                guard.confirm(nonce);
                crate::metrics::record_submission(name, true);
                debug!(
                    "{} included at block {} (fee {})",
                    name, receipt.block, receipt.fee
                );
                Ok(receipt)
            }
            Err(e) => {
                crate::metrics::record_submission(name, false);
                if let LoanError::Nonce { .. } = e {
                    warn!("Nonce rejected for {}, syncing with chain", name);
                    guard.resync(client).await?;
                }
                Err(e)
            }
        }
    }

    pub async fn block_height(&self) -> LoanResult<BlockNumber> {
        self.client()?.block_height().await
    }

    pub fn subscribe(&self) -> LoanResult<broadcast::Receiver<LedgerEvent>> {
        self.client()?.subscribe()
    }
}

impl Drop for LedgerSession {
    fn drop(&mut self) {
        self.close();
    }
}
