use crate::crypto::AccountKey;
use crate::error::{LoanError, LoanResult};
use crate::ledger::{Call, Committed, LedgerEvent, LedgerSession, Receipt};
use crate::model::{
    AddressId, AskOrder, AskOrderId, BidOrder, BidOrderId, BlockNumber, CorrelationId, Expiring,
    LoanTerms, Offer, OfferId,
};

use dashmap::DashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Submits orders and offers after the checks a client can make locally.
///
/// Asks and bids are independent and may be submitted concurrently. An offer
/// needs both orders to be on chain first.
pub struct OrderMatcher {
    session: Arc<LedgerSession>,
    /// Correlation ids this matcher has submitted
    submitted: DashSet<CorrelationId>,
}

fn expired(what: String, expiration: BlockNumber, current: BlockNumber) -> LoanError {
    LoanError::Expired {
        what,
        expiration,
        current,
    }
}

impl OrderMatcher {
    pub fn new(session: Arc<LedgerSession>) -> Self {
        Self {
            session,
            submitted: DashSet::new(),
        }
    }

    async fn check_order(&self, terms: &LoanTerms, expiration_block: BlockNumber) -> LoanResult<()> {
        terms.validate()?;
        let height = self.session.block_height().await?;
        if expiration_block <= height {
            return Err(LoanError::InvalidTerms(format!(
                "expiration block {} is not after current block {}",
                expiration_block, height
            )));
        }
        Ok(())
    }

    fn claim(&self, guid: CorrelationId) -> LoanResult<()> {
        if !self.submitted.insert(guid) {
            return Err(LoanError::DuplicateCorrelationId(guid.to_string()));
        }
        Ok(())
    }

    /// Submit under a claimed id; the claim is released if the chain never saw it
    async fn submit_claimed(
        &self,
        guid: CorrelationId,
        key: &AccountKey,
        call: Call,
    ) -> LoanResult<Receipt> {
        match self.session.submit(key, call).await {
            Ok(receipt) => Ok(receipt),
            Err(e) => {
                if !matches!(e, LoanError::DuplicateCorrelationId(_)) {
                    self.submitted.remove(&guid);
                }
                Err(e)
            }
        }
    }

    pub async fn submit_ask(
        &self,
        lender_address_id: AddressId,
        terms: LoanTerms,
        expiration_block: BlockNumber,
        guid: CorrelationId,
        lender: &AccountKey,
    ) -> LoanResult<Committed<AskOrderId, AskOrder>> {
        self.check_order(&terms, expiration_block).await?;
        self.claim(guid)?;

        let call = Call::AddAskOrder {
            address_id: lender_address_id,
            terms,
            expiration_block,
            guid,
        };
        let receipt = self.submit_claimed(guid, lender, call).await?;
        let (ask_id, ask) = receipt.find("ask order", |e| match e {
            LedgerEvent::AskOrderAdded { ask_id, ask } => Some((*ask_id, ask.clone())),
            _ => None,
        })?;

        info!("Ask order {} added at block {}", ask_id, receipt.block);
        Ok(Committed::from_receipt(&receipt, ask_id, ask))
    }

    pub async fn submit_bid(
        &self,
        borrower_address_id: AddressId,
        terms: LoanTerms,
        expiration_block: BlockNumber,
        guid: CorrelationId,
        borrower: &AccountKey,
    ) -> LoanResult<Committed<BidOrderId, BidOrder>> {
        self.check_order(&terms, expiration_block).await?;
        self.claim(guid)?;

        let call = Call::AddBidOrder {
            address_id: borrower_address_id,
            terms,
            expiration_block,
            guid,
        };
        let receipt = self.submit_claimed(guid, borrower, call).await?;
        let (bid_id, bid) = receipt.find("bid order", |e| match e {
            LedgerEvent::BidOrderAdded { bid_id, bid } => Some((*bid_id, bid.clone())),
            _ => None,
        })?;

        info!("Bid order {} added at block {}", bid_id, receipt.block);
        Ok(Committed::from_receipt(&receipt, bid_id, bid))
    }

    /// Pair an ask with a bid carrying identical terms
    pub async fn make_offer(
        &self,
        ask_id: AskOrderId,
        bid_id: BidOrderId,
        expiration_block: BlockNumber,
        lender: &AccountKey,
    ) -> LoanResult<Committed<OfferId, Offer>> {
        let client = self.session.client()?;
        let (ask, bid, height) = futures::try_join!(
            client.ask_order(&ask_id),
            client.bid_order(&bid_id),
            client.block_height(),
        )?;
        let ask = ask.ok_or_else(|| LoanError::not_found("ask order", ask_id))?;
        let bid = bid.ok_or_else(|| LoanError::not_found("bid order", bid_id))?;

        if ask.is_expired_at(height) {
            return Err(expired(format!("ask order {}", ask_id), ask.expiration_block, height));
        }
        if bid.is_expired_at(height) {
            return Err(expired(format!("bid order {}", bid_id), bid.expiration_block, height));
        }
        if expiration_block <= height {
            return Err(expired("offer".to_string(), expiration_block, height));
        }
        if ask.terms != bid.terms {
            debug!("Terms differ: ask {:?}, bid {:?}", ask.terms, bid.terms);
            return Err(LoanError::TermsMismatch {
                ask: ask_id.to_string(),
                bid: bid_id.to_string(),
            });
        }

        let receipt = self
            .session
            .submit(
                lender,
                Call::AddOffer {
                    ask_id,
                    bid_id,
                    expiration_block,
                },
            )
            .await?;
        let (offer_id, offer) = receipt.find("offer", |e| match e {
            LedgerEvent::OfferAdded { offer_id, offer } => Some((*offer_id, offer.clone())),
            _ => None,
        })?;

        info!("Offer {} pairs ask {} with bid {}", offer_id, ask_id, bid_id);
        Ok(Committed::from_receipt(&receipt, offer_id, offer))
    }
}
