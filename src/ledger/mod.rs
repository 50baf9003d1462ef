//! Primary-chain ledger access
//!
//! This module provides:
//! - The `LedgerClient` seam to the settlement chain
//! - Signed calls, receipts and the events the chain broadcasts
//! - An explicitly owned `LedgerSession` with per-account nonce coordination
//! - The fee schedule applied to submissions

pub mod fees;
pub mod nonce;
pub mod session;

pub use fees::FeeSchedule;
pub use nonce::{NonceManager, NonceMode};
pub use session::LedgerSession;

use crate::crypto::{verify, AccountKey, AccountSignature};
use crate::error::{LoanError, LoanResult};
use crate::model::{
    keccak256, AccountId, AddressId, AskOrder, AskOrderId, BidOrder, BidOrderId, Blockchain,
    BlockNumber, CorrelationId, Currency, CurrencyId, DealOrder, DealOrderId, FailureReason,
    LoanTerms, Offer, OfferId, RegisteredAddress, Transfer, TransferId, TransferKind,
};

use async_trait::async_trait;
use ethers::types::{Address, Signature, H256, U256};
use serde::Serialize;
use tokio::sync::broadcast;

/// Calls accepted by the primary chain
#[derive(Debug, Clone, Serialize)]
pub enum Call {
    RegisterAddress {
        blockchain: Blockchain,
        address: Address,
        ownership_proof: Signature,
    },
    RegisterCurrency {
        currency: Currency,
    },
    AddAskOrder {
        address_id: AddressId,
        terms: LoanTerms,
        expiration_block: BlockNumber,
        guid: CorrelationId,
    },
    AddBidOrder {
        address_id: AddressId,
        terms: LoanTerms,
        expiration_block: BlockNumber,
        guid: CorrelationId,
    },
    AddOffer {
        ask_id: AskOrderId,
        bid_id: BidOrderId,
        expiration_block: BlockNumber,
    },
    AddDealOrder {
        offer_id: OfferId,
        expiration_block: BlockNumber,
    },
    RegisterDealOrder {
        lender_address_id: AddressId,
        borrower_address_id: AddressId,
        terms: LoanTerms,
        expiration_block: BlockNumber,
        ask_guid: CorrelationId,
        bid_guid: CorrelationId,
        borrower_key: AccountId,
        borrower_signature: AccountSignature,
    },
    RegisterFundingTransfer {
        kind: TransferKind,
        deal_id: DealOrderId,
        tx_hash: H256,
    },
    RegisterRepaymentTransfer {
        kind: TransferKind,
        amount: U256,
        deal_id: DealOrderId,
        tx_hash: H256,
    },
    FundDealOrder {
        deal_id: DealOrderId,
        transfer_id: TransferId,
    },
    LockDealOrder {
        deal_id: DealOrderId,
    },
    CloseDealOrder {
        deal_id: DealOrderId,
        transfer_id: TransferId,
    },
    ExemptLoan {
        deal_id: DealOrderId,
    },
    /// Off-chain worker attestation (authority accounts only)
    VerifyTransfer {
        transfer_id: TransferId,
    },
    /// Off-chain worker rejection (authority accounts only)
    FailTransfer {
        transfer_id: TransferId,
        reason: FailureReason,
    },
}

impl Call {
    /// Call name for logs and metrics
    pub fn name(&self) -> &'static str {
        match self {
            Call::RegisterAddress { .. } => "register_address",
            Call::RegisterCurrency { .. } => "register_currency",
            Call::AddAskOrder { .. } => "add_ask_order",
            Call::AddBidOrder { .. } => "add_bid_order",
            Call::AddOffer { .. } => "add_offer",
            Call::AddDealOrder { .. } => "add_deal_order",
            Call::RegisterDealOrder { .. } => "register_deal_order",
            Call::RegisterFundingTransfer { .. } => "register_funding_transfer",
            Call::RegisterRepaymentTransfer { .. } => "register_repayment_transfer",
            Call::FundDealOrder { .. } => "fund_deal_order",
            Call::LockDealOrder { .. } => "lock_deal_order",
            Call::CloseDealOrder { .. } => "close_deal_order",
            Call::ExemptLoan { .. } => "exempt_loan",
            Call::VerifyTransfer { .. } => "verify_transfer",
            Call::FailTransfer { .. } => "fail_transfer",
        }
    }

    fn encode(&self) -> LoanResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| LoanError::Internal(e.to_string()))
    }
}

/// A call signed by its submitting account under a specific nonce
#[derive(Debug, Clone)]
pub struct SignedCall {
    pub signer: AccountId,
    pub nonce: u64,
    pub call: Call,
    pub signature: AccountSignature,
}

impl SignedCall {
    /// `keccak256(nonce LE || json(call))`
    fn payload(nonce: u64, call: &Call) -> LoanResult<H256> {
        Ok(keccak256(&[&nonce.to_le_bytes(), &call.encode()?]))
    }

    pub fn sign(key: &AccountKey, nonce: u64, call: Call) -> LoanResult<Self> {
        let payload = Self::payload(nonce, &call)?;
        Ok(Self {
            signer: key.account_id(),
            nonce,
            signature: key.sign(payload.as_bytes()),
            call,
        })
    }

    pub fn verify(&self) -> LoanResult<()> {
        let payload = Self::payload(self.nonce, &self.call)?;
        verify(&self.signer, payload.as_bytes(), &self.signature)
    }

    /// Size used by the fee schedule
    pub fn encoded_len(&self) -> LoanResult<usize> {
        Ok(8 + 32 + 64 + self.call.encode()?.len())
    }
}

/// Outcome of an included submission
#[derive(Debug, Clone)]
pub struct Receipt {
    pub block: BlockNumber,
    pub fee: u128,
    pub events: Vec<LedgerEvent>,
}

impl Receipt {
    /// First event matching `f`, or `Internal` if the chain did not emit one.
    pub fn find<T>(&self, what: &str, f: impl Fn(&LedgerEvent) -> Option<T>) -> LoanResult<T> {
        self.events
            .iter()
            .find_map(f)
            .ok_or_else(|| LoanError::Internal(format!("receipt has no {} event", what)))
    }
}

/// An entity the chain created, with where and at what cost
#[derive(Debug, Clone)]
pub struct Committed<I, T> {
    pub id: I,
    pub item: T,
    pub block: BlockNumber,
    pub fee: u128,
}

impl<I, T> Committed<I, T> {
    pub fn from_receipt(receipt: &Receipt, id: I, item: T) -> Self {
        Self {
            id,
            item,
            block: receipt.block,
            fee: receipt.fee,
        }
    }
}

/// Events broadcast by the primary chain
#[derive(Debug, Clone, Serialize)]
pub enum LedgerEvent {
    AddressRegistered {
        address_id: AddressId,
        address: RegisteredAddress,
    },
    CurrencyRegistered {
        currency_id: CurrencyId,
        currency: Currency,
    },
    AskOrderAdded {
        ask_id: AskOrderId,
        ask: AskOrder,
    },
    BidOrderAdded {
        bid_id: BidOrderId,
        bid: BidOrder,
    },
    OfferAdded {
        offer_id: OfferId,
        offer: Offer,
    },
    DealOrderAdded {
        deal_id: DealOrderId,
        deal: DealOrder,
    },
    DealOrderRegistered {
        deal_id: DealOrderId,
        deal: DealOrder,
    },
    TransferRegistered {
        transfer_id: TransferId,
        transfer: Transfer,
    },
    TransferVerified {
        transfer_id: TransferId,
    },
    TransferFailed {
        transfer_id: TransferId,
        reason: FailureReason,
    },
    DealOrderFunded {
        deal_id: DealOrderId,
        deal: DealOrder,
    },
    TransferProcessed {
        transfer_id: TransferId,
    },
    DealOrderLocked {
        deal_id: DealOrderId,
        deal: DealOrder,
    },
    DealOrderRepaid {
        deal_id: DealOrderId,
        transfer_id: TransferId,
    },
    DealOrderClosed {
        deal_id: DealOrderId,
        deal: DealOrder,
    },
    LoanExempted {
        deal_id: DealOrderId,
        deal: DealOrder,
    },
}

impl LedgerEvent {
    /// Get event name for metrics
    pub fn name(&self) -> &'static str {
        match self {
            LedgerEvent::AddressRegistered { .. } => "address_registered",
            LedgerEvent::CurrencyRegistered { .. } => "currency_registered",
            LedgerEvent::AskOrderAdded { .. } => "ask_order_added",
            LedgerEvent::BidOrderAdded { .. } => "bid_order_added",
            LedgerEvent::OfferAdded { .. } => "offer_added",
            LedgerEvent::DealOrderAdded { .. } => "deal_order_added",
            LedgerEvent::DealOrderRegistered { .. } => "deal_order_registered",
            LedgerEvent::TransferRegistered { .. } => "transfer_registered",
            LedgerEvent::TransferVerified { .. } => "transfer_verified",
            LedgerEvent::TransferFailed { .. } => "transfer_failed",
            LedgerEvent::DealOrderFunded { .. } => "deal_order_funded",
            LedgerEvent::TransferProcessed { .. } => "transfer_processed",
            LedgerEvent::DealOrderLocked { .. } => "deal_order_locked",
            LedgerEvent::DealOrderRepaid { .. } => "deal_order_repaid",
            LedgerEvent::DealOrderClosed { .. } => "deal_order_closed",
            LedgerEvent::LoanExempted { .. } => "loan_exempted",
        }
    }
}

/// Connection to the primary settlement chain.
///
/// `submit` resolves once the call is included and final. Rejections surface
/// as the matching `LoanError` variant.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn block_height(&self) -> LoanResult<BlockNumber>;

    /// Next nonce the chain will accept from `account`
    async fn account_nonce(&self, account: &AccountId) -> LoanResult<u64>;

    async fn submit(&self, call: SignedCall) -> LoanResult<Receipt>;

    /// Live event feed. The receiver reports `Closed` when the connection drops.
    fn subscribe(&self) -> LoanResult<broadcast::Receiver<LedgerEvent>>;

    async fn address(&self, id: &AddressId) -> LoanResult<Option<RegisteredAddress>>;

    async fn currency(&self, id: &CurrencyId) -> LoanResult<Option<Currency>>;

    async fn ask_order(&self, id: &AskOrderId) -> LoanResult<Option<AskOrder>>;

    async fn bid_order(&self, id: &BidOrderId) -> LoanResult<Option<BidOrder>>;

    async fn offer(&self, id: &OfferId) -> LoanResult<Option<Offer>>;

    async fn deal_order(&self, id: &DealOrderId) -> LoanResult<Option<DealOrder>>;

    async fn transfer(&self, id: &TransferId) -> LoanResult<Option<Transfer>>;

    /// Registered transfers still awaiting a verification outcome
    async fn pending_transfers(&self) -> LoanResult<Vec<(TransferId, Transfer)>>;
}
