//! In-memory primary chain
//!
//! `MemoryLedger` is authoritative in the way a real settlement chain is:
//! - Signature and nonce checks on every submission
//! - Ownership and role checks per call
//! - The deal transition table from `deal::state`
//! - Write-once transfer verification with a block deadline
//! - Fees charged per the `FeeSchedule`
//!
//! Every accepted call is included in its own block.

use crate::crypto::{verify_loan_params, verify_ownership};
use crate::deal::state::{check_closing, check_funding, repayment_applies, DealAction, DealStateMachine};
use crate::error::{LoanError, LoanResult};
use crate::ledger::{Call, FeeSchedule, LedgerClient, LedgerEvent, Receipt, SignedCall};
use crate::model::constants::VERIFICATION_WINDOW;
use crate::model::{
    AccountId, AddressId, AskOrder, AskOrderId, BidOrder, BidOrderId, BlockNumber, CorrelationId,
    Currency, CurrencyId, DealOrder, DealOrderId, DealState, FailureReason, LoanTerms,
    Offer, OfferId, RegisteredAddress, Transfer, TransferDirection, TransferId, TransferKind,
    VerificationStatus,
};

use async_trait::async_trait;
use ethers::types::{H256, U256};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 1024;

/// Chain-wide roles
struct Roles {
    sudo: AccountId,
    authorities: HashSet<AccountId>,
    verification_window: BlockNumber,
}

#[derive(Default)]
struct LedgerState {
    height: BlockNumber,
    nonces: HashMap<AccountId, u64>,
    fees_paid: HashMap<AccountId, u128>,
    addresses: HashMap<AddressId, RegisteredAddress>,
    currencies: HashMap<CurrencyId, Currency>,
    guids: HashSet<CorrelationId>,
    asks: HashMap<AskOrderId, AskOrder>,
    bids: HashMap<BidOrderId, BidOrder>,
    offers: HashMap<OfferId, Offer>,
    deals: HashMap<DealOrderId, DealOrder>,
    transfers: HashMap<TransferId, Transfer>,
    /// Pending verifications and the block they time out at
    deadlines: HashMap<TransferId, BlockNumber>,
}

fn unauthorized(account: &AccountId, action: &str) -> LoanError {
    LoanError::Unauthorized {
        account: account.to_string(),
        action: action.to_string(),
    }
}

fn require(signer: &AccountId, expected: &AccountId, action: &str) -> LoanResult<()> {
    if signer != expected {
        return Err(unauthorized(signer, action));
    }
    Ok(())
}

fn not_expired(what: impl ToString, expiration: BlockNumber, height: BlockNumber) -> LoanResult<()> {
    if expiration <= height {
        return Err(LoanError::Expired {
            what: what.to_string(),
            expiration,
            current: height,
        });
    }
    Ok(())
}

impl LedgerState {
    fn owned_address(&self, id: &AddressId, owner: &AccountId) -> LoanResult<&RegisteredAddress> {
        let address = self
            .addresses
            .get(id)
            .ok_or_else(|| LoanError::not_found("address", id))?;
        if address.owner != *owner {
            return Err(unauthorized(owner, "use this address"));
        }
        Ok(address)
    }

    fn deal(&self, id: &DealOrderId) -> LoanResult<&DealOrder> {
        self.deals
            .get(id)
            .ok_or_else(|| LoanError::not_found("deal order", id))
    }

    fn transfer(&self, id: &TransferId) -> LoanResult<&Transfer> {
        self.transfers
            .get(id)
            .ok_or_else(|| LoanError::not_found("transfer", id))
    }

    fn check_new_order(
        &self,
        signer: &AccountId,
        address_id: &AddressId,
        terms: &LoanTerms,
        expiration_block: BlockNumber,
        guid: &CorrelationId,
    ) -> LoanResult<()> {
        terms.validate()?;
        not_expired("order", expiration_block, self.height)?;
        self.owned_address(address_id, signer)?;
        if !self.currencies.contains_key(&terms.currency) {
            return Err(LoanError::not_found("currency", terms.currency));
        }
        if self.guids.contains(guid) {
            return Err(LoanError::DuplicateCorrelationId(guid.to_string()));
        }
        Ok(())
    }

    fn set_deal_state(&mut self, id: &DealOrderId, action: DealAction) -> LoanResult<DealOrder> {
        let deal = self
            .deals
            .get_mut(id)
            .ok_or_else(|| LoanError::not_found("deal order", id))?;
        deal.state = DealStateMachine::transition(deal.state, action)?;
        crate::metrics::record_deal_transition(deal.state);
        Ok(deal.clone())
    }

    fn apply(
        &mut self,
        roles: &Roles,
        block: BlockNumber,
        signer: &AccountId,
        call: Call,
    ) -> LoanResult<Vec<LedgerEvent>> {
        match call {
            Call::RegisterAddress {
                blockchain,
                address,
                ownership_proof,
            } => {
                verify_ownership(address, signer, &ownership_proof)?;
                let address_id = AddressId::new(&blockchain, &address);
                if self.addresses.contains_key(&address_id) {
                    return Err(LoanError::AlreadyExists {
                        kind: "address",
                        id: address_id.to_string(),
                    });
                }
                let registered = RegisteredAddress {
                    blockchain,
                    value: address,
                    owner: *signer,
                };
                self.addresses.insert(address_id, registered.clone());
                Ok(vec![LedgerEvent::AddressRegistered {
                    address_id,
                    address: registered,
                }])
            }

            Call::RegisterCurrency { currency } => {
                require(signer, &roles.sudo, "register currencies")?;
                let currency_id = currency.id();
                if self.currencies.contains_key(&currency_id) {
                    return Err(LoanError::AlreadyExists {
                        kind: "currency",
                        id: currency_id.to_string(),
                    });
                }
                self.currencies.insert(currency_id, currency.clone());
                Ok(vec![LedgerEvent::CurrencyRegistered {
                    currency_id,
                    currency,
                }])
            }

            Call::AddAskOrder {
                address_id,
                terms,
                expiration_block,
                guid,
            } => {
                self.check_new_order(signer, &address_id, &terms, expiration_block, &guid)?;
                let ask_id = AskOrderId::new(expiration_block, &guid);
                let ask = AskOrder {
                    lender_address_id: address_id,
                    terms,
                    expiration_block,
                    block,
                    lender: *signer,
                };
                self.guids.insert(guid);
                self.asks.insert(ask_id, ask.clone());
                Ok(vec![LedgerEvent::AskOrderAdded { ask_id, ask }])
            }

            Call::AddBidOrder {
                address_id,
                terms,
                expiration_block,
                guid,
            } => {
                self.check_new_order(signer, &address_id, &terms, expiration_block, &guid)?;
                let bid_id = BidOrderId::new(expiration_block, &guid);
                let bid = BidOrder {
                    borrower_address_id: address_id,
                    terms,
                    expiration_block,
                    block,
                    borrower: *signer,
                };
                self.guids.insert(guid);
                self.bids.insert(bid_id, bid.clone());
                Ok(vec![LedgerEvent::BidOrderAdded { bid_id, bid }])
            }

            Call::AddOffer {
                ask_id,
                bid_id,
                expiration_block,
            } => {
                let ask = self
                    .asks
                    .get(&ask_id)
                    .ok_or_else(|| LoanError::not_found("ask order", ask_id))?;
                let bid = self
                    .bids
                    .get(&bid_id)
                    .ok_or_else(|| LoanError::not_found("bid order", bid_id))?;
                require(signer, &ask.lender, "offer on this ask order")?;
                not_expired(format!("ask order {}", ask_id), ask.expiration_block, self.height)?;
                not_expired(format!("bid order {}", bid_id), bid.expiration_block, self.height)?;
                not_expired("offer", expiration_block, self.height)?;
                if ask.terms != bid.terms {
                    return Err(LoanError::TermsMismatch {
                        ask: ask_id.to_string(),
                        bid: bid_id.to_string(),
                    });
                }

                let offer_id = OfferId::new(expiration_block, &ask_id, &bid_id);
                if self.offers.contains_key(&offer_id) {
                    return Err(LoanError::AlreadyExists {
                        kind: "offer",
                        id: offer_id.to_string(),
                    });
                }
                let offer = Offer {
                    ask_id,
                    bid_id,
                    expiration_block,
                    block,
                    lender: *signer,
                };
                self.offers.insert(offer_id, offer.clone());
                Ok(vec![LedgerEvent::OfferAdded { offer_id, offer }])
            }

            Call::AddDealOrder {
                offer_id,
                expiration_block,
            } => {
                let offer = self
                    .offers
                    .get(&offer_id)
                    .ok_or_else(|| LoanError::not_found("offer", offer_id))?;
                not_expired(format!("offer {}", offer_id), offer.expiration_block, self.height)?;
                not_expired("deal order", expiration_block, self.height)?;
                let ask = self
                    .asks
                    .get(&offer.ask_id)
                    .ok_or_else(|| LoanError::not_found("ask order", offer.ask_id))?;
                let bid = self
                    .bids
                    .get(&offer.bid_id)
                    .ok_or_else(|| LoanError::not_found("bid order", offer.bid_id))?;
                require(signer, &bid.borrower, "accept this offer")?;

                let deal_id = DealOrderId::from_offer(expiration_block, &offer_id);
                if self.deals.contains_key(&deal_id) {
                    return Err(LoanError::AlreadyExists {
                        kind: "deal order",
                        id: deal_id.to_string(),
                    });
                }
                let deal = DealOrder {
                    offer_id: Some(offer_id),
                    lender_address_id: ask.lender_address_id,
                    borrower_address_id: bid.borrower_address_id,
                    terms: bid.terms.clone(),
                    expiration_block,
                    block,
                    state: DealState::Created,
                    funding_transfer_id: None,
                    repayment_transfer_id: None,
                    lender: offer.lender,
                    borrower: *signer,
                };
                self.deals.insert(deal_id, deal);
                let deal = self.set_deal_state(&deal_id, DealAction::AcceptOffer)?;
                Ok(vec![LedgerEvent::DealOrderAdded { deal_id, deal }])
            }

            Call::RegisterDealOrder {
                lender_address_id,
                borrower_address_id,
                terms,
                expiration_block,
                ask_guid,
                bid_guid,
                borrower_key,
                borrower_signature,
            } => {
                terms.validate()?;
                verify_loan_params(
                    &borrower_key,
                    &borrower_signature,
                    expiration_block,
                    &ask_guid,
                    &bid_guid,
                    &terms,
                )?;
                not_expired("deal order", expiration_block, self.height)?;
                self.owned_address(&lender_address_id, signer)?;
                self.owned_address(&borrower_address_id, &borrower_key)?;
                if !self.currencies.contains_key(&terms.currency) {
                    return Err(LoanError::not_found("currency", terms.currency));
                }
                for guid in [&ask_guid, &bid_guid] {
                    if self.guids.contains(guid) {
                        return Err(LoanError::DuplicateCorrelationId(guid.to_string()));
                    }
                }
                if ask_guid == bid_guid {
                    return Err(LoanError::DuplicateCorrelationId(bid_guid.to_string()));
                }

                let deal_id = DealOrderId::from_guids(expiration_block, &ask_guid, &bid_guid);
                let deal = DealOrder {
                    offer_id: None,
                    lender_address_id,
                    borrower_address_id,
                    terms,
                    expiration_block,
                    block,
                    state: DealState::Created,
                    funding_transfer_id: None,
                    repayment_transfer_id: None,
                    lender: *signer,
                    borrower: borrower_key,
                };
                self.guids.insert(ask_guid);
                self.guids.insert(bid_guid);
                self.deals.insert(deal_id, deal);
                let deal = self.set_deal_state(&deal_id, DealAction::Register)?;
                Ok(vec![LedgerEvent::DealOrderRegistered { deal_id, deal }])
            }

            Call::RegisterFundingTransfer {
                kind,
                deal_id,
                tx_hash,
            } => {
                let deal = self.deal(&deal_id)?;
                require(signer, &deal.lender, "register funding for this deal")?;
                if !DealStateMachine::is_valid(deal.state, DealAction::Fund) {
                    return Err(LoanError::invalid_transition(
                        deal.state,
                        "register_funding_transfer",
                    ));
                }
                not_expired(format!("deal {}", deal_id), deal.expiration_block, self.height)?;
                let amount = deal.terms.amount;
                let transfer = self.new_transfer(
                    roles,
                    block,
                    signer,
                    kind,
                    TransferDirection::Funding,
                    deal_id,
                    amount,
                    tx_hash,
                )?;
                Ok(vec![transfer])
            }

            Call::RegisterRepaymentTransfer {
                kind,
                amount,
                deal_id,
                tx_hash,
            } => {
                if amount.is_zero() {
                    return Err(LoanError::InvalidTerms("repayment amount must be positive".into()));
                }
                let deal = self.deal(&deal_id)?;
                require(signer, &deal.borrower, "register repayment for this deal")?;
                if !DealStateMachine::is_valid(deal.state, DealAction::Repay) {
                    return Err(LoanError::invalid_transition(
                        deal.state,
                        "register_repayment_transfer",
                    ));
                }
                let transfer = self.new_transfer(
                    roles,
                    block,
                    signer,
                    kind,
                    TransferDirection::Repayment,
                    deal_id,
                    amount,
                    tx_hash,
                )?;
                Ok(vec![transfer])
            }

            Call::FundDealOrder {
                deal_id,
                transfer_id,
            } => {
                let deal = self.deal(&deal_id)?;
                require(signer, &deal.lender, "fund this deal")?;
                not_expired(format!("deal {}", deal_id), deal.expiration_block, self.height)?;
                check_funding(&deal_id, deal, &transfer_id, self.transfer(&transfer_id)?)?;

                if let Some(transfer) = self.transfers.get_mut(&transfer_id) {
                    transfer.processed = true;
                }
                if let Some(deal) = self.deals.get_mut(&deal_id) {
                    deal.funding_transfer_id = Some(transfer_id);
                }
                let deal = self.set_deal_state(&deal_id, DealAction::Fund)?;
                Ok(vec![
                    LedgerEvent::DealOrderFunded { deal_id, deal },
                    LedgerEvent::TransferProcessed { transfer_id },
                ])
            }

            Call::LockDealOrder { deal_id } => {
                let deal = self.deal(&deal_id)?;
                require(signer, &deal.borrower, "lock this deal")?;
                DealStateMachine::transition(deal.state, DealAction::Lock)?;
                let deal = self.set_deal_state(&deal_id, DealAction::Lock)?;
                Ok(vec![LedgerEvent::DealOrderLocked { deal_id, deal }])
            }

            Call::CloseDealOrder {
                deal_id,
                transfer_id,
            } => {
                let deal = self.deal(&deal_id)?;
                require(signer, &deal.borrower, "close this deal")?;
                check_closing(&deal_id, deal, &transfer_id, self.transfer(&transfer_id)?)?;

                if let Some(transfer) = self.transfers.get_mut(&transfer_id) {
                    transfer.processed = true;
                }
                let deal = self.set_deal_state(&deal_id, DealAction::Close)?;
                Ok(vec![
                    LedgerEvent::DealOrderClosed { deal_id, deal },
                    LedgerEvent::TransferProcessed { transfer_id },
                ])
            }

            Call::ExemptLoan { deal_id } => {
                let deal = self.deal(&deal_id)?;
                require(signer, &deal.lender, "exempt this loan")?;
                DealStateMachine::transition(deal.state, DealAction::Exempt)?;
                let deal = self.set_deal_state(&deal_id, DealAction::Exempt)?;
                Ok(vec![LedgerEvent::LoanExempted { deal_id, deal }])
            }

            Call::VerifyTransfer { transfer_id } => {
                if !roles.authorities.contains(signer) {
                    return Err(unauthorized(signer, "verify transfers"));
                }
                self.record_outcome(&transfer_id, VerificationStatus::Verified)?;

                let mut events = vec![LedgerEvent::TransferVerified { transfer_id }];
                if let Some(repaid) = self.apply_repayment(&transfer_id)? {
                    events.push(repaid);
                }
                Ok(events)
            }

            Call::FailTransfer {
                transfer_id,
                reason,
            } => {
                if !roles.authorities.contains(signer) {
                    return Err(unauthorized(signer, "fail transfers"));
                }
                self.record_outcome(&transfer_id, VerificationStatus::Failed(reason.clone()))?;
                Ok(vec![LedgerEvent::TransferFailed {
                    transfer_id,
                    reason,
                }])
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn new_transfer(
        &mut self,
        roles: &Roles,
        block: BlockNumber,
        signer: &AccountId,
        kind: TransferKind,
        direction: TransferDirection,
        deal_id: DealOrderId,
        amount: U256,
        tx_hash: H256,
    ) -> LoanResult<LedgerEvent> {
        let deal = self.deal(&deal_id)?;
        let currency = self
            .currencies
            .get(&deal.terms.currency)
            .ok_or_else(|| LoanError::not_found("currency", deal.terms.currency))?;

        let transfer_id = TransferId::new(&currency.blockchain, &tx_hash);
        if self.transfers.contains_key(&transfer_id) {
            return Err(LoanError::TransferAlreadyUsed {
                transfer_id: transfer_id.to_string(),
            });
        }

        let (from, to) = match direction {
            TransferDirection::Funding => (deal.lender_address_id, deal.borrower_address_id),
            TransferDirection::Repayment => (deal.borrower_address_id, deal.lender_address_id),
        };
        let transfer = Transfer {
            kind,
            blockchain: currency.blockchain.clone(),
            direction,
            from,
            to,
            deal_id,
            currency: deal.terms.currency,
            amount,
            tx_hash,
            block,
            account_id: *signer,
            status: VerificationStatus::Pending,
            processed: false,
        };

        self.transfers.insert(transfer_id, transfer.clone());
        self.deadlines
            .insert(transfer_id, block + roles.verification_window);
        Ok(LedgerEvent::TransferRegistered {
            transfer_id,
            transfer,
        })
    }

    fn record_outcome(&mut self, id: &TransferId, status: VerificationStatus) -> LoanResult<()> {
        let transfer = self
            .transfers
            .get_mut(id)
            .ok_or_else(|| LoanError::not_found("transfer", id))?;
        if transfer.status.is_final() {
            return Err(LoanError::AlreadyExists {
                kind: "verification outcome",
                id: id.to_string(),
            });
        }
        transfer.status = status;
        self.deadlines.remove(id);
        Ok(())
    }

    /// Locked → Repaid once a sufficient repayment is verified
    fn apply_repayment(&mut self, transfer_id: &TransferId) -> LoanResult<Option<LedgerEvent>> {
        let transfer = self.transfer(transfer_id)?;
        let deal_id = transfer.deal_id;
        let applies = match self.deals.get(&deal_id) {
            Some(deal) => repayment_applies(deal, transfer),
            None => false,
        };
        if !applies {
            return Ok(None);
        }

        if let Some(deal) = self.deals.get_mut(&deal_id) {
            deal.repayment_transfer_id = Some(*transfer_id);
        }
        self.set_deal_state(&deal_id, DealAction::Repay)?;
        Ok(Some(LedgerEvent::DealOrderRepaid {
            deal_id,
            transfer_id: *transfer_id,
        }))
    }

    /// Fail every pending verification whose deadline has passed
    fn expire_verifications(&mut self) -> Vec<LedgerEvent> {
        let height = self.height;
        let expired: Vec<TransferId> = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= height)
            .map(|(id, _)| *id)
            .collect();

        let mut events = Vec::with_capacity(expired.len());
        for transfer_id in expired {
            if self
                .record_outcome(&transfer_id, VerificationStatus::Failed(FailureReason::Timeout))
                .is_ok()
            {
                warn!("Verification of transfer {} timed out", transfer_id);
                events.push(LedgerEvent::TransferFailed {
                    transfer_id,
                    reason: FailureReason::Timeout,
                });
            }
        }
        events
    }
}

/// Authoritative in-memory settlement chain
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
    events: RwLock<Option<broadcast::Sender<LedgerEvent>>>,
    roles: Roles,
    fees: FeeSchedule,
}

impl MemoryLedger {
    pub fn new(sudo: AccountId, fees: FeeSchedule) -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Mutex::new(LedgerState::default()),
            events: RwLock::new(Some(tx)),
            roles: Roles {
                sudo,
                authorities: HashSet::new(),
                verification_window: VERIFICATION_WINDOW,
            },
            fees,
        }
    }

    /// Allow `account` to record verification outcomes
    pub fn with_authority(mut self, account: AccountId) -> Self {
        self.roles.authorities.insert(account);
        self
    }

    /// Blocks a registered transfer may stay pending before it times out
    pub fn with_verification_window(mut self, blocks: BlockNumber) -> Self {
        self.roles.verification_window = blocks;
        self
    }

    /// Produce `count` empty blocks
    pub async fn advance_blocks(&self, count: u64) {
        let mut state = self.state.lock().await;
        let mut events = Vec::new();
        for _ in 0..count {
            state.height += 1;
            events.extend(state.expire_verifications());
        }
        drop(state);
        self.publish(&events);
    }

    /// Produce an empty block every `interval` until the handle is aborted
    pub fn spawn_block_production(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let ledger = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                ledger.advance_blocks(1).await;
            }
        })
    }

    /// Drop the event feed; open subscriptions observe `Closed`
    pub fn disconnect(&self) {
        if let Ok(mut events) = self.events.write() {
            if events.take().is_some() {
                warn!("Ledger event feed disconnected");
            }
        }
    }

    /// Restore the event feed after `disconnect`
    pub fn reconnect(&self) {
        if let Ok(mut events) = self.events.write() {
            if events.is_none() {
                let (tx, _) = broadcast::channel(EVENT_CAPACITY);
                *events = Some(tx);
                info!("Ledger event feed reconnected");
            }
        }
    }

    /// Total fees charged to `account`
    pub async fn fees_paid(&self, account: &AccountId) -> u128 {
        let state = self.state.lock().await;
        state.fees_paid.get(account).copied().unwrap_or(0)
    }

    fn publish(&self, events: &[LedgerEvent]) {
        let Ok(guard) = self.events.read() else {
            return;
        };
        if let Some(tx) = guard.as_ref() {
            for event in events {
                // No receivers is not an error for the chain
                let _ = tx.send(event.clone());
            }
        }
    }
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    async fn block_height(&self) -> LoanResult<BlockNumber> {
        Ok(self.state.lock().await.height)
    }

    async fn account_nonce(&self, account: &AccountId) -> LoanResult<u64> {
        let state = self.state.lock().await;
        Ok(state.nonces.get(account).copied().unwrap_or(0))
    }

    async fn submit(&self, call: SignedCall) -> LoanResult<Receipt> {
        call.verify()?;
        let fee = self.fees.fee_for(&call)?;

        let mut state = self.state.lock().await;
        let expected = state.nonces.get(&call.signer).copied().unwrap_or(0);
        if call.nonce != expected {
            return Err(LoanError::Nonce {
                account: call.signer.to_string(),
                message: format!("expected nonce {}, got {}", expected, call.nonce),
            });
        }

        let block = state.height + 1;
        let name = call.call.name();
        let events = state.apply(&self.roles, block, &call.signer, call.call)?;

        state.height = block;
        *state.nonces.entry(call.signer).or_insert(0) += 1;
        *state.fees_paid.entry(call.signer).or_insert(0) += fee;
        let expired = state.expire_verifications();
        drop(state);

        debug!("Block {}: {} from {} (fee {})", block, name, call.signer, fee);
        self.publish(&events);
        self.publish(&expired);

        Ok(Receipt { block, fee, events })
    }

    fn subscribe(&self) -> LoanResult<broadcast::Receiver<LedgerEvent>> {
        let guard = self
            .events
            .read()
            .map_err(|_| LoanError::Internal("event feed lock poisoned".into()))?;
        guard
            .as_ref()
            .map(|tx| tx.subscribe())
            .ok_or_else(|| LoanError::ChainConnection {
                chain: "primary".into(),
                message: "event feed disconnected".into(),
            })
    }

    async fn address(&self, id: &AddressId) -> LoanResult<Option<RegisteredAddress>> {
        Ok(self.state.lock().await.addresses.get(id).cloned())
    }

    async fn currency(&self, id: &CurrencyId) -> LoanResult<Option<Currency>> {
        Ok(self.state.lock().await.currencies.get(id).cloned())
    }

    async fn ask_order(&self, id: &AskOrderId) -> LoanResult<Option<AskOrder>> {
        Ok(self.state.lock().await.asks.get(id).cloned())
    }

    async fn bid_order(&self, id: &BidOrderId) -> LoanResult<Option<BidOrder>> {
        Ok(self.state.lock().await.bids.get(id).cloned())
    }

    async fn offer(&self, id: &OfferId) -> LoanResult<Option<Offer>> {
        Ok(self.state.lock().await.offers.get(id).cloned())
    }

    async fn deal_order(&self, id: &DealOrderId) -> LoanResult<Option<DealOrder>> {
        Ok(self.state.lock().await.deals.get(id).cloned())
    }

    async fn transfer(&self, id: &TransferId) -> LoanResult<Option<Transfer>> {
        Ok(self.state.lock().await.transfers.get(id).cloned())
    }

    async fn pending_transfers(&self) -> LoanResult<Vec<(TransferId, Transfer)>> {
        let state = self.state.lock().await;
        Ok(state
            .deadlines
            .keys()
            .filter_map(|id| state.transfers.get(id).map(|t| (*id, t.clone())))
            .collect())
    }
}
