//! Chain module - secondary value-transfer chain access
//!
//! This module provides:
//! - The `TipSource` and `ValueTransferClient` seams
//! - The confirmation depth gate guarding transfer claims against reorgs
//! - An ethers-backed tip source with multi-RPC failover

pub mod finality;
pub mod provider;

pub use finality::{recommended_confirmations, ConfirmationGate};
pub use provider::EvmProvider;

use crate::error::LoanResult;
use crate::model::Blockchain;

use async_trait::async_trait;
use ethers::signers::LocalWallet;
use ethers::types::{Address, H256, U256};
use std::time::Duration;

/// Anything that can report the secondary chain's current block
#[async_trait]
pub trait TipSource: Send + Sync {
    async fn tip(&self) -> LoanResult<u64>;
}

/// Where a secondary-chain transaction landed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxInclusion {
    pub tx_hash: H256,
    pub block: u64,
}

/// Result of moving funds on the secondary chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferReceipt {
    pub token: Address,
    pub tx_hash: H256,
    pub block: u64,
}

impl TransferReceipt {
    pub fn inclusion(&self) -> TxInclusion {
        TxInclusion {
            tx_hash: self.tx_hash,
            block: self.block,
        }
    }
}

/// Moves value on the secondary chain on behalf of a loan party
#[async_trait]
pub trait ValueTransferClient: TipSource {
    fn blockchain(&self) -> Blockchain;

    /// Token contract transfers are made in
    fn token(&self) -> Address;

    /// Transfer `amount` tagged with `deal_reference`, resolving at inclusion
    async fn transfer(
        &self,
        from: &LocalWallet,
        to: Address,
        deal_reference: H256,
        amount: U256,
    ) -> LoanResult<TransferReceipt>;

    /// Test-currency faucet
    async fn mint(&self, to: Address, amount: U256) -> LoanResult<()>;

    /// Resolve once the tip reaches `target`
    async fn await_tip(&self, target: u64, poll_interval: Duration) -> LoanResult<()> {
        loop {
            if self.tip().await? >= target {
                return Ok(());
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}
