//! Deal lifecycle manager

use super::state::{check_closing, check_funding, DealAction, DealStateMachine};
use crate::crypto::{verify_loan_params, AccountKey, AccountSignature};
use crate::error::{LoanError, LoanResult};
use crate::ledger::{Call, Committed, LedgerEvent, LedgerSession, Receipt};
use crate::model::{
    AccountId, AddressId, BlockNumber, CorrelationId, DealOrder, DealOrderId, DealState, Expiring,
    LoanTerms, OfferId, Transfer, TransferId,
};

use std::sync::Arc;
use tracing::{debug, info};

/// Everything a lender submits on the direct-registration path
#[derive(Debug, Clone)]
pub struct DirectRegistration {
    pub lender_address_id: AddressId,
    pub borrower_address_id: AddressId,
    pub terms: LoanTerms,
    pub expiration_block: BlockNumber,
    pub ask_guid: CorrelationId,
    pub bid_guid: CorrelationId,
    pub borrower: AccountId,
    pub borrower_signature: AccountSignature,
}

/// Drives deals through their states.
///
/// Every transition is checked against the current on-chain state before it
/// is submitted, so illegal requests fail without spending a fee.
pub struct DealLifecycle {
    session: Arc<LedgerSession>,
}

fn deal_event(receipt: &Receipt, what: &str) -> LoanResult<(DealOrderId, DealOrder)> {
    receipt.find(what, |e| match e {
        LedgerEvent::DealOrderAdded { deal_id, deal }
        | LedgerEvent::DealOrderRegistered { deal_id, deal }
        | LedgerEvent::DealOrderFunded { deal_id, deal }
        | LedgerEvent::DealOrderLocked { deal_id, deal }
        | LedgerEvent::DealOrderClosed { deal_id, deal }
        | LedgerEvent::LoanExempted { deal_id, deal } => Some((*deal_id, deal.clone())),
        _ => None,
    })
}

impl DealLifecycle {
    pub fn new(session: Arc<LedgerSession>) -> Self {
        Self { session }
    }

    pub async fn deal(&self, deal_id: &DealOrderId) -> LoanResult<DealOrder> {
        self.session
            .client()?
            .deal_order(deal_id)
            .await?
            .ok_or_else(|| LoanError::not_found("deal order", deal_id))
    }

    pub async fn deal_state(&self, deal_id: &DealOrderId) -> LoanResult<DealState> {
        Ok(self.deal(deal_id).await?.state)
    }

    async fn transfer(&self, transfer_id: &TransferId) -> LoanResult<Transfer> {
        self.session
            .client()?
            .transfer(transfer_id)
            .await?
            .ok_or_else(|| LoanError::not_found("transfer", transfer_id))
    }

    /// Deal the chain reports for `action`, after checking it is legal
    async fn expect(&self, deal_id: &DealOrderId, action: DealAction) -> LoanResult<DealOrder> {
        let deal = self.deal(deal_id).await?;
        DealStateMachine::transition(deal.state, action)?;
        Ok(deal)
    }

    async fn submit(
        &self,
        key: &AccountKey,
        call: Call,
        what: &str,
    ) -> LoanResult<Committed<DealOrderId, DealOrder>> {
        let receipt = self.session.submit(key, call).await?;
        let (deal_id, deal) = deal_event(&receipt, what)?;
        info!("Deal {} is {} (block {})", deal_id, deal.state, receipt.block);
        Ok(Committed::from_receipt(&receipt, deal_id, deal))
    }

    /// Matched path: the borrower accepts a lender's offer
    pub async fn accept_offer(
        &self,
        offer_id: OfferId,
        expiration_block: BlockNumber,
        borrower: &AccountKey,
    ) -> LoanResult<Committed<DealOrderId, DealOrder>> {
        let client = self.session.client()?;
        let (offer, height) =
            futures::try_join!(client.offer(&offer_id), client.block_height())?;
        let offer = offer.ok_or_else(|| LoanError::not_found("offer", offer_id))?;

        if offer.is_expired_at(height) {
            return Err(LoanError::Expired {
                what: format!("offer {}", offer_id),
                expiration: offer.expiration_block,
                current: height,
            });
        }

        let call = Call::AddDealOrder {
            offer_id,
            expiration_block,
        };
        self.submit(borrower, call, "deal order").await
    }

    /// Direct path: the lender registers a deal the borrower signed for
    pub async fn register_deal_order(
        &self,
        registration: DirectRegistration,
        lender: &AccountKey,
    ) -> LoanResult<Committed<DealOrderId, DealOrder>> {
        registration.terms.validate()?;
        verify_loan_params(
            &registration.borrower,
            &registration.borrower_signature,
            registration.expiration_block,
            &registration.ask_guid,
            &registration.bid_guid,
            &registration.terms,
        )?;

        let call = Call::RegisterDealOrder {
            lender_address_id: registration.lender_address_id,
            borrower_address_id: registration.borrower_address_id,
            terms: registration.terms,
            expiration_block: registration.expiration_block,
            ask_guid: registration.ask_guid,
            bid_guid: registration.bid_guid,
            borrower_key: registration.borrower,
            borrower_signature: registration.borrower_signature,
        };
        self.submit(lender, call, "deal order").await
    }

    /// New → Funded with a verified funding transfer
    pub async fn fund_deal_order(
        &self,
        deal_id: DealOrderId,
        transfer_id: TransferId,
        lender: &AccountKey,
    ) -> LoanResult<Committed<DealOrderId, DealOrder>> {
        let client = self.session.client()?;
        let (deal, transfer, height) = futures::try_join!(
            self.deal(&deal_id),
            self.transfer(&transfer_id),
            client.block_height()
        )?;
        if deal.is_expired_at(height) {
            return Err(LoanError::Expired {
                what: format!("deal {}", deal_id),
                expiration: deal.expiration_block,
                current: height,
            });
        }
        check_funding(&deal_id, &deal, &transfer_id, &transfer)?;

        debug!("Funding deal {} with transfer {}", deal_id, transfer_id);
        let call = Call::FundDealOrder {
            deal_id,
            transfer_id,
        };
        self.submit(lender, call, "funded deal").await
    }

    /// Funded → Locked
    pub async fn lock_deal_order(
        &self,
        deal_id: DealOrderId,
        borrower: &AccountKey,
    ) -> LoanResult<Committed<DealOrderId, DealOrder>> {
        self.expect(&deal_id, DealAction::Lock).await?;
        self.submit(borrower, Call::LockDealOrder { deal_id }, "locked deal")
            .await
    }

    /// Repaid → Closed. The receipt carries the closing fee.
    pub async fn close_deal_order(
        &self,
        deal_id: DealOrderId,
        transfer_id: TransferId,
        borrower: &AccountKey,
    ) -> LoanResult<Committed<DealOrderId, DealOrder>> {
        let deal = self.expect(&deal_id, DealAction::Close).await?;
        let transfer = self.transfer(&transfer_id).await?;
        check_closing(&deal_id, &deal, &transfer_id, &transfer)?;

        let call = Call::CloseDealOrder {
            deal_id,
            transfer_id,
        };
        self.submit(borrower, call, "closed deal").await
    }

    /// Funded or Locked → Exempted; the lender forgives the debt
    pub async fn exempt_loan(
        &self,
        deal_id: DealOrderId,
        lender: &AccountKey,
    ) -> LoanResult<Committed<DealOrderId, DealOrder>> {
        self.expect(&deal_id, DealAction::Exempt).await?;
        self.submit(lender, Call::ExemptLoan { deal_id }, "exempted deal")
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::sign_loan_params;
    use crate::devnet::testing::TestChain;
    use crate::ledger::LedgerClient;
    use crate::model::constants::MIN_CLOSE_FEE;
    use crate::model::TransferKind;
    use ethers::types::H256;

    fn registration(chain: &TestChain, expiration_block: BlockNumber) -> DirectRegistration {
        let (ask_guid, bid_guid) = (CorrelationId::new(), CorrelationId::new());
        let terms = chain.terms();
        let borrower_signature = sign_loan_params(
            &chain.borrower.key,
            expiration_block,
            &ask_guid,
            &bid_guid,
            &terms,
        );
        DirectRegistration {
            lender_address_id: chain.lender.address_id,
            borrower_address_id: chain.borrower.address_id,
            terms,
            expiration_block,
            ask_guid,
            bid_guid,
            borrower: chain.borrower.key.account_id(),
            borrower_signature,
        }
    }

    async fn new_deal(chain: &TestChain, lifecycle: &DealLifecycle) -> DealOrderId {
        let deal = lifecycle
            .register_deal_order(registration(chain, 1_000), &chain.lender.key)
            .await
            .unwrap();
        assert_eq!(deal.item.state, DealState::New);
        assert!(deal.item.offer_id.is_none());
        deal.id
    }

    #[tokio::test]
    async fn test_forged_consent_is_rejected_locally() {
        let chain = TestChain::new().await;
        let lifecycle = DealLifecycle::new(chain.session.clone());
        let mut params = registration(&chain, 1_000);
        params.expiration_block = 1_001;

        let height = chain.ledger.block_height().await.unwrap();
        let result = lifecycle
            .register_deal_order(params, &chain.lender.key)
            .await;
        assert!(matches!(result, Err(LoanError::InvalidSignature(_))));
        assert_eq!(chain.ledger.block_height().await.unwrap(), height);
    }

    #[tokio::test]
    async fn test_fund_requires_verified_transfer() {
        let chain = TestChain::new().await;
        let lifecycle = DealLifecycle::new(chain.session.clone());
        let deal_id = new_deal(&chain, &lifecycle).await;

        let receipt = chain
            .session
            .submit(
                &chain.lender.key,
                Call::RegisterFundingTransfer {
                    kind: TransferKind::ETHLESS,
                    deal_id,
                    tx_hash: H256::random(),
                },
            )
            .await
            .unwrap();
        let pending = crate::devnet::testing::registered_transfer(&receipt.events);
        let result = lifecycle
            .fund_deal_order(deal_id, pending, &chain.lender.key)
            .await;
        assert!(matches!(result, Err(LoanError::TransferNotVerified { .. })));

        let failed = chain.settled_funding(deal_id, false).await;
        let result = lifecycle
            .fund_deal_order(deal_id, failed, &chain.lender.key)
            .await;
        assert!(matches!(result, Err(LoanError::TransferNotVerified { .. })));
        assert_eq!(lifecycle.deal_state(&deal_id).await.unwrap(), DealState::New);

        let verified = chain.settled_funding(deal_id, true).await;
        let funded = lifecycle
            .fund_deal_order(deal_id, verified, &chain.lender.key)
            .await
            .unwrap();
        assert_eq!(funded.item.state, DealState::Funded);
        assert_eq!(funded.item.funding_transfer_id, Some(verified));
    }

    #[tokio::test]
    async fn test_expired_deal_cannot_be_funded() {
        let chain = TestChain::new().await;
        let lifecycle = DealLifecycle::new(chain.session.clone());
        let expiration = chain.ledger.block_height().await.unwrap() + 3;
        let deal_id = lifecycle
            .register_deal_order(registration(&chain, expiration), &chain.lender.key)
            .await
            .unwrap()
            .id;
        let transfer = chain.settled_funding(deal_id, true).await;
        chain.ledger.advance_blocks(20).await;

        let result = lifecycle
            .fund_deal_order(deal_id, transfer, &chain.lender.key)
            .await;
        assert!(matches!(result, Err(LoanError::Expired { expiration: e, .. }) if e == expiration));

        // The ledger refuses the same calls when the local check is skipped
        let result = chain
            .session
            .submit(
                &chain.lender.key,
                Call::FundDealOrder {
                    deal_id,
                    transfer_id: transfer,
                },
            )
            .await;
        assert!(matches!(result, Err(LoanError::Expired { .. })));
        let result = chain
            .session
            .submit(
                &chain.lender.key,
                Call::RegisterFundingTransfer {
                    kind: TransferKind::ETHLESS,
                    deal_id,
                    tx_hash: H256::random(),
                },
            )
            .await;
        assert!(matches!(result, Err(LoanError::Expired { .. })));
        assert_eq!(lifecycle.deal_state(&deal_id).await.unwrap(), DealState::New);
    }

    #[tokio::test]
    async fn test_close_is_illegal_before_repayment() {
        let chain = TestChain::new().await;
        let lifecycle = DealLifecycle::new(chain.session.clone());
        let deal_id = new_deal(&chain, &lifecycle).await;
        let transfer = chain.settled_funding(deal_id, true).await;

        let result = lifecycle
            .close_deal_order(deal_id, transfer, &chain.borrower.key)
            .await;
        assert!(matches!(
            result,
            Err(LoanError::InvalidStateTransition { from: DealState::New, .. })
        ));

        lifecycle
            .fund_deal_order(deal_id, transfer, &chain.lender.key)
            .await
            .unwrap();
        let result = lifecycle
            .close_deal_order(deal_id, transfer, &chain.borrower.key)
            .await;
        assert!(matches!(
            result,
            Err(LoanError::InvalidStateTransition { from: DealState::Funded, .. })
        ));
    }

    #[tokio::test]
    async fn test_exempt_is_final() {
        let chain = TestChain::new().await;
        let lifecycle = DealLifecycle::new(chain.session.clone());
        let deal_id = new_deal(&chain, &lifecycle).await;
        let transfer = chain.settled_funding(deal_id, true).await;
        lifecycle
            .fund_deal_order(deal_id, transfer, &chain.lender.key)
            .await
            .unwrap();

        let exempted = lifecycle
            .exempt_loan(deal_id, &chain.lender.key)
            .await
            .unwrap();
        assert_eq!(exempted.item.state, DealState::Exempted);

        let result = lifecycle.exempt_loan(deal_id, &chain.lender.key).await;
        assert!(matches!(
            result,
            Err(LoanError::InvalidStateTransition { from: DealState::Exempted, .. })
        ));
        let result = lifecycle.lock_deal_order(deal_id, &chain.borrower.key).await;
        assert!(matches!(result, Err(LoanError::InvalidStateTransition { .. })));
    }

    #[tokio::test]
    async fn test_repayment_close_charges_floor_fee() {
        let chain = TestChain::new().await;
        let lifecycle = DealLifecycle::new(chain.session.clone());
        let deal_id = new_deal(&chain, &lifecycle).await;
        let funding = chain.settled_funding(deal_id, true).await;
        lifecycle
            .fund_deal_order(deal_id, funding, &chain.lender.key)
            .await
            .unwrap();
        lifecycle
            .lock_deal_order(deal_id, &chain.borrower.key)
            .await
            .unwrap();

        let receipt = chain
            .session
            .submit(
                &chain.borrower.key,
                Call::RegisterRepaymentTransfer {
                    kind: TransferKind::ETHLESS,
                    amount: chain.terms().amount,
                    deal_id,
                    tx_hash: H256::random(),
                },
            )
            .await
            .unwrap();
        let repayment = crate::devnet::testing::registered_transfer(&receipt.events);
        chain
            .session
            .submit(&chain.authority, Call::VerifyTransfer { transfer_id: repayment })
            .await
            .unwrap();
        assert_eq!(lifecycle.deal_state(&deal_id).await.unwrap(), DealState::Repaid);

        let closed = lifecycle
            .close_deal_order(deal_id, repayment, &chain.borrower.key)
            .await
            .unwrap();
        assert_eq!(closed.item.state, DealState::Closed);
        assert!(closed.fee >= MIN_CLOSE_FEE);
        assert!(chain.ledger.transfer(&repayment).await.unwrap().unwrap().processed);
    }
}
