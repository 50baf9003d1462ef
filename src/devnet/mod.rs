//! Local development network
//!
//! Bundles an in-memory primary chain, a simulated EVM chain, block
//! producers for both and the off-chain verification worker.

pub mod evm;
pub mod ledger;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use evm::{DevEvm, EvmTx};
pub use ledger::MemoryLedger;
pub use worker::DevVerifier;

use crate::chain::{TipSource, ValueTransferClient};
use crate::config::DevnetConfig;
use crate::crypto::AccountKey;
use crate::error::LoanResult;
use crate::ledger::{Call, LedgerSession};
use crate::model::{keccak256, Blockchain, Currency, CurrencyId};

use ethers::types::{Address, U256};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// Development seed of the sudo account
pub const SUDO_SEED: &str = "//Alice";
/// Development seed of the verification authority
pub const AUTHORITY_SEED: &str = "//Validator";

pub struct Devnet {
    pub ledger: Arc<MemoryLedger>,
    pub evm: DevEvm,
    pub session: Arc<LedgerSession>,
    pub sudo: AccountKey,
    pub currency: Currency,
    tasks: Vec<JoinHandle<()>>,
}

impl Devnet {
    /// Start both chains and the worker, and register the devnet token
    pub async fn start(config: &DevnetConfig, confirmation_depth: u64) -> LoanResult<Self> {
        let sudo = AccountKey::from_seed(SUDO_SEED);
        let authority = AccountKey::from_seed(AUTHORITY_SEED);

        let ledger = Arc::new(
            MemoryLedger::new(sudo.account_id(), config.fees)
                .with_authority(authority.account_id()),
        );
        let token = Address::from_slice(&keccak256(&[b"loan-relay devnet token"]).as_bytes()[12..]);
        let evm = DevEvm::new(Blockchain::Hardhat, token);
        let session = LedgerSession::open(ledger.clone());

        let currency = Currency::erc20(Blockchain::Hardhat, token);
        session
            .submit(
                &sudo,
                Call::RegisterCurrency {
                    currency: currency.clone(),
                },
            )
            .await?;

        let evm_block_time = Duration::from_millis(config.block_time_ms.max(1));
        let mut tasks = vec![evm.spawn_miner(evm_block_time)];
        if config.ledger_block_time_ms > 0 {
            tasks.push(
                ledger.spawn_block_production(Duration::from_millis(config.ledger_block_time_ms)),
            );
        }
        tasks.push(
            DevVerifier::new(
                session.clone(),
                evm.clone(),
                authority,
                confirmation_depth,
                evm_block_time,
            )
            .spawn(),
        );

        info!(
            "Devnet started: token {:?}, depth {}, block time {}ms",
            token, confirmation_depth, config.block_time_ms
        );

        Ok(Self {
            ledger,
            evm,
            session,
            sudo,
            currency,
            tasks,
        })
    }

    pub fn currency_id(&self) -> CurrencyId {
        self.currency.id()
    }

    pub fn value_transfer(&self) -> Arc<dyn ValueTransferClient> {
        Arc::new(self.evm.clone())
    }

    pub fn tip_source(&self) -> Arc<dyn TipSource> {
        Arc::new(self.evm.clone())
    }

    /// Faucet for the devnet token
    pub async fn fund_wallet(&self, address: Address, amount: U256) -> LoanResult<()> {
        self.evm.mint(address, amount).await
    }

    pub fn shutdown(self) {
        self.session.close();
        info!("Devnet stopped");
    }
}

impl Drop for Devnet {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
