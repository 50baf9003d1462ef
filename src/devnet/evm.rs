//! Simulated secondary chain with a single ERC-20 style token

use crate::chain::{TipSource, TransferReceipt, ValueTransferClient};
use crate::error::{LoanError, LoanResult};
use crate::model::{keccak256, Blockchain};

use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, H256, U256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// A token transfer as the chain recorded it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvmTx {
    pub token: Address,
    pub from: Address,
    pub to: Address,
    pub amount: U256,
    pub deal_reference: H256,
    pub block: u64,
    pub success: bool,
}

#[derive(Default)]
struct EvmState {
    height: u64,
    sequence: u64,
    balances: HashMap<Address, U256>,
    txs: HashMap<H256, EvmTx>,
}

struct Inner {
    blockchain: Blockchain,
    token: Address,
    state: Mutex<EvmState>,
}

/// Cheap to clone; all clones observe the same chain
#[derive(Clone)]
pub struct DevEvm {
    inner: Arc<Inner>,
}

impl DevEvm {
    pub fn new(blockchain: Blockchain, token: Address) -> Self {
        Self {
            inner: Arc::new(Inner {
                blockchain,
                token,
                state: Mutex::new(EvmState::default()),
            }),
        }
    }

    fn state(&self) -> LoanResult<MutexGuard<'_, EvmState>> {
        self.inner.state.lock().map_err(|_| LoanError::ChainConnection {
            chain: self.inner.blockchain.as_str().to_string(),
            message: "state lock poisoned".into(),
        })
    }

    /// Mine `count` empty blocks
    pub fn mine(&self, count: u64) -> LoanResult<u64> {
        let mut state = self.state()?;
        state.height += count;
        Ok(state.height)
    }

    /// Mine a block every `interval` until the handle is aborted
    pub fn spawn_miner(&self, interval: Duration) -> JoinHandle<()> {
        let evm = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if evm.mine(1).is_err() {
                    break;
                }
            }
        })
    }

    pub fn tx(&self, hash: &H256) -> LoanResult<Option<EvmTx>> {
        Ok(self.state()?.txs.get(hash).cloned())
    }

    pub fn balance(&self, address: &Address) -> LoanResult<U256> {
        Ok(self
            .state()?
            .balances
            .get(address)
            .copied()
            .unwrap_or_default())
    }
}

#[async_trait]
impl TipSource for DevEvm {
    async fn tip(&self) -> LoanResult<u64> {
        Ok(self.state()?.height)
    }
}

#[async_trait]
impl ValueTransferClient for DevEvm {
    fn blockchain(&self) -> Blockchain {
        self.inner.blockchain.clone()
    }

    fn token(&self) -> Address {
        self.inner.token
    }

    async fn transfer(
        &self,
        from: &LocalWallet,
        to: Address,
        deal_reference: H256,
        amount: U256,
    ) -> LoanResult<TransferReceipt> {
        let sender = from.address();
        let mut state = self.state()?;

        let balance = state.balances.get(&sender).copied().unwrap_or_default();
        if balance < amount {
            return Err(LoanError::Rejected(format!(
                "{:?} holds {} tokens, cannot send {}",
                sender, balance, amount
            )));
        }

        state.sequence += 1;
        state.height += 1;
        let block = state.height;
        let mut amount_bytes = [0u8; 32];
        amount.to_big_endian(&mut amount_bytes);
        let tx_hash = keccak256(&[
            sender.as_bytes(),
            to.as_bytes(),
            &amount_bytes,
            deal_reference.as_bytes(),
            &state.sequence.to_le_bytes(),
        ]);

        state.balances.insert(sender, balance - amount);
        *state.balances.entry(to).or_default() += amount;
        state.txs.insert(
            tx_hash,
            EvmTx {
                token: self.inner.token,
                from: sender,
                to,
                amount,
                deal_reference,
                block,
                success: true,
            },
        );

        debug!(
            "Transfer {:?}: {} from {:?} to {:?} at block {}",
            tx_hash, amount, sender, to, block
        );
        Ok(TransferReceipt {
            token: self.inner.token,
            tx_hash,
            block,
        })
    }

    async fn mint(&self, to: Address, amount: U256) -> LoanResult<()> {
        let mut state = self.state()?;
        *state.balances.entry(to).or_default() += amount;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_transfer_moves_balance_and_records_reference() {
        let evm = DevEvm::new(Blockchain::Hardhat, Address::repeat_byte(0x70));
        let alice = LocalWallet::new(&mut rand::thread_rng());
        let bob = Address::repeat_byte(0xb0);
        evm.mint(alice.address(), U256::from(1_000u64)).await.unwrap();

        let reference = H256::repeat_byte(0xdd);
        let receipt = evm
            .transfer(&alice, bob, reference, U256::from(400u64))
            .await
            .unwrap();

        assert_eq!(evm.balance(&alice.address()).unwrap(), U256::from(600u64));
        assert_eq!(evm.balance(&bob).unwrap(), U256::from(400u64));
        let tx = evm.tx(&receipt.tx_hash).unwrap().unwrap();
        assert_eq!(tx.deal_reference, reference);
        assert_eq!(tx.block, evm.tip().await.unwrap());
    }

    #[tokio::test]
    async fn test_insufficient_balance_is_rejected() {
        let evm = DevEvm::new(Blockchain::Hardhat, Address::repeat_byte(0x70));
        let alice = LocalWallet::new(&mut rand::thread_rng());
        let result = evm
            .transfer(&alice, Address::zero(), H256::zero(), U256::one())
            .await;
        assert!(matches!(result, Err(LoanError::Rejected(_))));
        assert_eq!(evm.tip().await.unwrap(), 0);
    }
}
