use super::handle::{VerificationHandle, VerificationResult};
use crate::chain::{ConfirmationGate, TxInclusion};
use crate::crypto::AccountKey;
use crate::error::LoanResult;
use crate::ledger::{Call, LedgerEvent, LedgerSession};
use crate::model::{DealOrderId, Transfer, TransferId, TransferKind};

use ethers::types::U256;
use std::sync::Arc;
use tracing::info;

/// A claim the chain accepted and queued for verification
#[derive(Clone)]
pub struct RegisteredTransfer {
    pub transfer: Transfer,
    pub transfer_id: TransferId,
    handle: VerificationHandle,
}

impl RegisteredTransfer {
    /// Handle sharing one outcome with every other handle from this registration
    pub fn verification(&self) -> VerificationHandle {
        self.handle.clone()
    }
}

/// Registers secondary-chain transfers as claims against deals.
///
/// A claim is only submitted once its transaction is buried deep enough;
/// a shallower transaction is refused with `InsufficientConfirmations`
/// without reaching the chain.
pub struct TransferCoordinator {
    session: Arc<LedgerSession>,
    gate: Arc<ConfirmationGate>,
}

impl TransferCoordinator {
    pub fn new(session: Arc<LedgerSession>, gate: Arc<ConfirmationGate>) -> Self {
        Self { session, gate }
    }

    pub fn gate(&self) -> &ConfirmationGate {
        &self.gate
    }

    /// Claim that the lender funded `deal_id` with the transaction at `inclusion`
    pub async fn register_funding_transfer(
        &self,
        kind: TransferKind,
        deal_id: DealOrderId,
        inclusion: &TxInclusion,
        lender: &AccountKey,
    ) -> LoanResult<RegisteredTransfer> {
        let call = Call::RegisterFundingTransfer {
            kind,
            deal_id,
            tx_hash: inclusion.tx_hash,
        };
        self.register(call, inclusion, lender).await
    }

    /// Claim that the borrower repaid `amount` on `deal_id`
    pub async fn register_repayment_transfer(
        &self,
        kind: TransferKind,
        amount: U256,
        deal_id: DealOrderId,
        inclusion: &TxInclusion,
        borrower: &AccountKey,
    ) -> LoanResult<RegisteredTransfer> {
        let call = Call::RegisterRepaymentTransfer {
            kind,
            amount,
            deal_id,
            tx_hash: inclusion.tx_hash,
        };
        self.register(call, inclusion, borrower).await
    }

    async fn register(
        &self,
        call: Call,
        inclusion: &TxInclusion,
        signer: &AccountKey,
    ) -> LoanResult<RegisteredTransfer> {
        let confirmations = self.gate.check_depth(inclusion).await?;

        let receipt = self.session.submit(signer, call).await?;
        let (transfer_id, transfer) = receipt.find("transfer", |e| match e {
            LedgerEvent::TransferRegistered {
                transfer_id,
                transfer,
            } => Some((*transfer_id, transfer.clone())),
            _ => None,
        })?;

        info!(
            "Registered {:?} transfer {} for deal {} ({} confirmations)",
            transfer.direction, transfer_id, transfer.deal_id, confirmations
        );
        Ok(RegisteredTransfer {
            handle: self.verification(transfer_id),
            transfer,
            transfer_id,
        })
    }

    /// Fresh handle for a transfer registered earlier
    pub fn verification(&self, transfer_id: TransferId) -> VerificationHandle {
        VerificationHandle::new(transfer_id, self.session.clone())
    }

    pub async fn await_verification(&self, transfer_id: TransferId) -> LoanResult<VerificationResult> {
        self.verification(transfer_id).wait().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::TipSource;
    use crate::crypto::sign_loan_params;
    use crate::deal::{DealLifecycle, DirectRegistration};
    use crate::devnet::testing::TestChain;
    use crate::error::LoanError;
    use crate::model::{CorrelationId, FailureReason};
    use async_trait::async_trait;
    use ethers::types::H256;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    struct FixedTip(AtomicU64);

    #[async_trait]
    impl TipSource for FixedTip {
        async fn tip(&self) -> LoanResult<u64> {
            Ok(self.0.load(Ordering::SeqCst))
        }
    }

    async fn setup(tip: u64) -> (TestChain, TransferCoordinator, DealOrderId) {
        let chain = TestChain::new().await;
        let gate = ConfirmationGate::new(
            Arc::new(FixedTip(AtomicU64::new(tip))),
            12,
            Duration::from_millis(10),
        );
        let coordinator = TransferCoordinator::new(chain.session.clone(), Arc::new(gate));

        let (ask_guid, bid_guid) = (CorrelationId::new(), CorrelationId::new());
        let terms = chain.terms();
        let borrower_signature =
            sign_loan_params(&chain.borrower.key, 1_000, &ask_guid, &bid_guid, &terms);
        let deal = DealLifecycle::new(chain.session.clone())
            .register_deal_order(
                DirectRegistration {
                    lender_address_id: chain.lender.address_id,
                    borrower_address_id: chain.borrower.address_id,
                    terms,
                    expiration_block: 1_000,
                    ask_guid,
                    bid_guid,
                    borrower: chain.borrower.key.account_id(),
                    borrower_signature,
                },
                &chain.lender.key,
            )
            .await
            .unwrap();
        (chain, coordinator, deal.id)
    }

    fn inclusion(block: u64) -> TxInclusion {
        TxInclusion {
            tx_hash: H256::random(),
            block,
        }
    }

    #[tokio::test]
    async fn test_shallow_transfer_is_refused() {
        let (chain, coordinator, deal_id) = setup(105).await;
        let result = coordinator
            .register_funding_transfer(
                TransferKind::ETHLESS,
                deal_id,
                &inclusion(100),
                &chain.lender.key,
            )
            .await;
        assert!(matches!(
            result,
            Err(LoanError::InsufficientConfirmations {
                confirmations: 5,
                required: 12,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_outcome_reaches_waiter() {
        let (chain, coordinator, deal_id) = setup(200).await;
        let registered = coordinator
            .register_funding_transfer(
                TransferKind::ETHLESS,
                deal_id,
                &inclusion(100),
                &chain.lender.key,
            )
            .await
            .unwrap();

        let waiter = {
            let handle = registered.verification();
            tokio::spawn(async move { handle.wait().await })
        };
        tokio::task::yield_now().await;
        chain
            .session
            .submit(
                &chain.authority,
                Call::FailTransfer {
                    transfer_id: registered.transfer_id,
                    reason: FailureReason::DealReferenceMismatch,
                },
            )
            .await
            .unwrap();

        let result = waiter.await.unwrap().unwrap();
        assert_eq!(
            result,
            VerificationResult::Failed {
                transfer_id: registered.transfer_id,
                reason: FailureReason::DealReferenceMismatch,
            }
        );
        // Outcomes are kept once observed
        assert_eq!(registered.verification().wait().await.unwrap(), result);
    }

    #[tokio::test]
    async fn test_concurrent_waiters_share_outcome() {
        let (chain, coordinator, deal_id) = setup(200).await;
        let registered = coordinator
            .register_funding_transfer(
                TransferKind::ETHLESS,
                deal_id,
                &inclusion(100),
                &chain.lender.key,
            )
            .await
            .unwrap();

        let waiters: Vec<_> = (0..2)
            .map(|_| {
                let handle = registered.verification();
                tokio::spawn(async move { handle.wait().await })
            })
            .collect();
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        assert!(waiters.iter().all(|w| !w.is_finished()));

        chain
            .session
            .submit(
                &chain.authority,
                Call::VerifyTransfer {
                    transfer_id: registered.transfer_id,
                },
            )
            .await
            .unwrap();

        let mut results = Vec::new();
        for waiter in waiters {
            results.push(waiter.await.unwrap().unwrap());
        }
        assert!(results[0].is_verified());
        assert_eq!(results[0], results[1]);

        // Served from the shared outcome without touching the feed
        chain.ledger.disconnect();
        assert_eq!(registered.verification().wait().await.unwrap(), results[0]);
    }

    #[tokio::test]
    async fn test_closed_channel_then_reattach() {
        let (chain, coordinator, deal_id) = setup(200).await;
        let registered = coordinator
            .register_funding_transfer(
                TransferKind::ETHLESS,
                deal_id,
                &inclusion(100),
                &chain.lender.key,
            )
            .await
            .unwrap();

        let waiter = {
            let handle = registered.verification();
            tokio::spawn(async move { handle.wait().await })
        };
        tokio::task::yield_now().await;
        chain.ledger.disconnect();
        assert!(matches!(
            waiter.await.unwrap(),
            Err(LoanError::VerificationChannelClosed { .. })
        ));

        chain.ledger.reconnect();
        chain
            .session
            .submit(
                &chain.authority,
                Call::VerifyTransfer {
                    transfer_id: registered.transfer_id,
                },
            )
            .await
            .unwrap();

        let result = coordinator
            .await_verification(registered.transfer_id)
            .await
            .unwrap();
        assert!(result.is_verified());
    }
}
