//! Nonce management for primary-chain submissions
//!
//! Handles:
//! - Local nonce tracking per signing account
//! - Serialising submissions from the same account
//! - Resync with the chain after a nonce rejection

use super::LedgerClient;
use crate::error::{LoanError, LoanResult};
use crate::model::AccountId;

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

/// How the nonce of a submission is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NonceMode {
    /// Next nonce the account has not used yet
    #[default]
    Auto,
    /// Caller-supplied nonce
    Explicit(u64),
}

/// Per-account nonce state
#[derive(Debug)]
struct AccountNonceState {
    /// Next nonce to use
    current: u64,
    /// Last nonce the chain accepted
    confirmed: Option<u64>,
}

/// Exclusive right to submit for one account until dropped
pub struct NonceGuard {
    account: AccountId,
    state: OwnedMutexGuard<AccountNonceState>,
}

impl NonceGuard {
    /// Nonce to sign the next call with
    pub fn resolve(&self, mode: NonceMode) -> u64 {
        match mode {
            NonceMode::Auto => self.state.current,
            NonceMode::Explicit(nonce) => nonce,
        }
    }

    /// The chain accepted `nonce`
    pub fn confirm(&mut self, nonce: u64) {
        if nonce >= self.state.current {
            self.state.current = nonce + 1;
        }
        if self.state.confirmed.map_or(true, |c| nonce > c) {
            self.state.confirmed = Some(nonce);
        }
        debug!("Confirmed nonce {} for account {}", nonce, self.account);
    }

    /// Re-read the account nonce from the chain
    pub async fn resync(&mut self, client: &dyn LedgerClient) -> LoanResult<()> {
        let on_chain = client.account_nonce(&self.account).await?;

        if on_chain != self.state.current {
            warn!(
                "Nonce drift for account {}: local {}, chain {}",
                self.account, self.state.current, on_chain
            );
        }

        self.state.current = on_chain;
        self.state.confirmed = on_chain.checked_sub(1);
        Ok(())
    }
}

/// Coordinates nonces for every account submitting through one session
#[derive(Default)]
pub struct NonceManager {
    accounts: DashMap<AccountId, Arc<Mutex<AccountNonceState>>>,
}

impl NonceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock `account` for one submission, initialising from the chain on first use
    pub async fn reserve(
        &self,
        account: AccountId,
        client: &dyn LedgerClient,
    ) -> LoanResult<NonceGuard> {
        let slot = match self.accounts.get(&account) {
            Some(entry) => entry.value().clone(),
            None => {
                let on_chain = client.account_nonce(&account).await.map_err(|e| {
                    LoanError::Nonce {
                        account: account.to_string(),
                        message: e.to_string(),
                    }
                })?;
                debug!("Initialized nonce for account {}: {}", account, on_chain);
                self.accounts
                    .entry(account)
                    .or_insert_with(|| {
                        Arc::new(Mutex::new(AccountNonceState {
                            current: on_chain,
                            confirmed: on_chain.checked_sub(1),
                        }))
                    })
                    .clone()
            }
        };

        Ok(NonceGuard {
            account,
            state: slot.lock_owned().await,
        })
    }

    /// Next nonce that `Auto` would use, if the account is known
    pub async fn peek(&self, account: &AccountId) -> Option<u64> {
        let slot = self.accounts.get(account)?.value().clone();
        let state = slot.lock().await;
        Some(state.current)
    }

    /// Number of accounts with tracked nonces
    pub fn tracked_accounts(&self) -> usize {
        self.accounts.len()
    }
}
