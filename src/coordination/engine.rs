//! End-to-end loan cycles

use crate::chain::{ConfirmationGate, TxInclusion, ValueTransferClient};
use crate::config::OrchestratorConfig;
use crate::crypto::{prove_ownership, sign_loan_params, AccountKey};
use crate::deal::{DealLifecycle, DirectRegistration};
use crate::error::{LoanError, LoanResult};
use crate::ledger::{Call, LedgerEvent, LedgerSession};
use crate::matching::OrderMatcher;
use crate::model::{
    AccountId, AddressId, BlockNumber, CorrelationId, DealOrder, DealOrderId, DealState,
    FailureReason, LoanTerms, TransferId, TransferKind,
};
use crate::verification::{
    RegisteredTransfer, TransferCoordinator, VerificationHandle, VerificationResult,
};

use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, U256};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

/// A loan participant: primary-chain key plus secondary-chain wallet
#[derive(Debug, Clone)]
pub struct Party {
    pub key: AccountKey,
    pub wallet: LocalWallet,
}

impl Party {
    pub fn new(key: AccountKey, wallet: LocalWallet) -> Self {
        Self { key, wallet }
    }

    pub fn account_id(&self) -> AccountId {
        self.key.account_id()
    }

    pub fn evm_address(&self) -> Address {
        self.wallet.address()
    }
}

/// How a cycle ended
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Closed,
    Exempted,
    /// The verifier refused the funding claim; the deal stays `New`
    FundingRejected(FailureReason),
    /// The verifier refused the repayment claim; the deal stays `Locked`
    RepaymentRejected(FailureReason),
}

#[derive(Debug, Clone)]
pub struct CycleReport {
    pub deal_id: DealOrderId,
    pub state: DealState,
    pub outcome: CycleOutcome,
    pub funding_transfer: Option<TransferId>,
    pub repayment_transfer: Option<TransferId>,
    pub close_fee: Option<u128>,
}

/// One secondary-chain leg of a loan, after verification
enum Leg {
    Settled(TransferId),
    Rejected(FailureReason),
}

pub struct LoanOrchestrator {
    session: Arc<LedgerSession>,
    value_transfer: Arc<dyn ValueTransferClient>,
    matcher: OrderMatcher,
    deals: DealLifecycle,
    transfers: TransferCoordinator,
    expiration_blocks: BlockNumber,
    verification_timeout: Duration,
    reattach_attempts: u32,
    reattach_delay: Duration,
}

impl LoanOrchestrator {
    pub fn new(
        session: Arc<LedgerSession>,
        value_transfer: Arc<dyn ValueTransferClient>,
        gate: Arc<ConfirmationGate>,
        config: &OrchestratorConfig,
    ) -> Self {
        Self {
            matcher: OrderMatcher::new(session.clone()),
            deals: DealLifecycle::new(session.clone()),
            transfers: TransferCoordinator::new(session.clone(), gate),
            session,
            value_transfer,
            expiration_blocks: config.expiration_blocks,
            verification_timeout: config.verification_timeout(),
            reattach_attempts: config.reattach_attempts,
            reattach_delay: Duration::from_millis(config.tip_poll_interval_ms),
        }
    }

    pub fn matcher(&self) -> &OrderMatcher {
        &self.matcher
    }

    pub fn deals(&self) -> &DealLifecycle {
        &self.deals
    }

    pub fn transfers(&self) -> &TransferCoordinator {
        &self.transfers
    }

    /// Register `party`'s wallet, reusing an earlier registration by the same account
    pub async fn register_address(&self, party: &Party) -> LoanResult<AddressId> {
        let blockchain = self.value_transfer.blockchain();
        let address = party.evm_address();
        let proof = prove_ownership(&party.wallet, &party.account_id())?;

        let call = Call::RegisterAddress {
            blockchain: blockchain.clone(),
            address,
            ownership_proof: proof,
        };
        match self.session.submit(&party.key, call).await {
            Ok(receipt) => {
                let address_id = receipt.find("address", |e| match e {
                    LedgerEvent::AddressRegistered { address_id, .. } => Some(*address_id),
                    _ => None,
                })?;
                info!("Registered {:?} as {}", address, address_id);
                Ok(address_id)
            }
            Err(LoanError::AlreadyExists { .. }) => {
                let address_id = AddressId::new(&blockchain, &address);
                let existing = self
                    .session
                    .client()?
                    .address(&address_id)
                    .await?
                    .ok_or_else(|| LoanError::not_found("address", address_id))?;
                if existing.owner != party.account_id() {
                    return Err(LoanError::Unauthorized {
                        account: party.account_id().to_string(),
                        action: format!("reuse address {:?}", address),
                    });
                }
                info!("Reusing registered address {}", address_id);
                Ok(address_id)
            }
            Err(e) => Err(e),
        }
    }

    /// Register both parties; either failure fails the setup
    pub async fn setup(&self, lender: &Party, borrower: &Party) -> LoanResult<(AddressId, AddressId)> {
        futures::try_join!(self.register_address(lender), self.register_address(borrower))
    }

    async fn expiration(&self) -> LoanResult<BlockNumber> {
        Ok(self.session.block_height().await? + self.expiration_blocks)
    }

    /// Move `amount` tagged with the deal reference and wait out the depth gate
    async fn send_value(
        &self,
        from: &Party,
        to: &Party,
        deal_id: &DealOrderId,
        amount: U256,
    ) -> LoanResult<TxInclusion> {
        let receipt = self
            .value_transfer
            .transfer(&from.wallet, to.evm_address(), deal_id.reference(), amount)
            .await?;
        info!(
            "Sent {} to {:?} in {:?} (block {})",
            amount,
            to.evm_address(),
            receipt.tx_hash,
            receipt.block
        );

        let inclusion = receipt.inclusion();
        self.transfers.gate().await_confirmed(&inclusion).await?;
        Ok(inclusion)
    }

    /// Wait for the verifier, re-attaching by transfer id if the feed drops
    async fn settle(&self, registered: &RegisteredTransfer) -> LoanResult<VerificationResult> {
        let transfer_id = registered.transfer_id;
        let mut handle: VerificationHandle = registered.verification();
        let mut attempts = 0;

        loop {
            match timeout(self.verification_timeout, handle.wait()).await {
                Err(_) => {
                    return Err(LoanError::Timeout {
                        operation: format!("verification of {}", transfer_id),
                    })
                }
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(LoanError::VerificationChannelClosed { .. }))
                    if attempts < self.reattach_attempts =>
                {
                    attempts += 1;
                    warn!(
                        "Lost verification feed for {}, re-attaching ({}/{})",
                        transfer_id, attempts, self.reattach_attempts
                    );
                    tokio::time::sleep(self.reattach_delay).await;
                    handle = self.transfers.verification(transfer_id);
                }
                Ok(Err(e)) => return Err(e),
            }
        }
    }

    /// Lender funds the deal on the secondary chain and applies the claim
    async fn fund(
        &self,
        deal_id: DealOrderId,
        deal: &DealOrder,
        lender: &Party,
        borrower: &Party,
    ) -> LoanResult<Leg> {
        let inclusion = self
            .send_value(lender, borrower, &deal_id, deal.terms.amount)
            .await?;
        let registered = self
            .transfers
            .register_funding_transfer(TransferKind::ETHLESS, deal_id, &inclusion, &lender.key)
            .await?;

        match self.settle(&registered).await? {
            VerificationResult::Verified(_) => {
                self.deals
                    .fund_deal_order(deal_id, registered.transfer_id, &lender.key)
                    .await?;
                Ok(Leg::Settled(registered.transfer_id))
            }
            VerificationResult::Failed { reason, .. } => {
                warn!("Funding of deal {} rejected: {}", deal_id, reason);
                Ok(Leg::Rejected(reason))
            }
        }
    }

    /// Borrower repays the outstanding amount; the ledger moves the deal to `Repaid`
    async fn repay(
        &self,
        deal_id: DealOrderId,
        deal: &DealOrder,
        lender: &Party,
        borrower: &Party,
    ) -> LoanResult<Leg> {
        let amount = deal.terms.outstanding();
        let inclusion = self.send_value(borrower, lender, &deal_id, amount).await?;
        let registered = self
            .transfers
            .register_repayment_transfer(
                TransferKind::ETHLESS,
                amount,
                deal_id,
                &inclusion,
                &borrower.key,
            )
            .await?;

        match self.settle(&registered).await? {
            VerificationResult::Verified(_) => Ok(Leg::Settled(registered.transfer_id)),
            VerificationResult::Failed { reason, .. } => {
                warn!("Repayment of deal {} rejected: {}", deal_id, reason);
                Ok(Leg::Rejected(reason))
            }
        }
    }

    async fn report(
        &self,
        deal_id: DealOrderId,
        outcome: CycleOutcome,
        funding_transfer: Option<TransferId>,
        repayment_transfer: Option<TransferId>,
        close_fee: Option<u128>,
    ) -> LoanResult<CycleReport> {
        Ok(CycleReport {
            deal_id,
            state: self.deals.deal_state(&deal_id).await?,
            outcome,
            funding_transfer,
            repayment_transfer,
            close_fee,
        })
    }

    /// Ask, bid, offer, accept, fund, lock, repay, close
    pub async fn run_full_cycle(
        &self,
        lender: &Party,
        borrower: &Party,
        terms: LoanTerms,
    ) -> LoanResult<CycleReport> {
        let (lender_address, borrower_address) = self.setup(lender, borrower).await?;
        let expiration = self.expiration().await?;

        let (ask, bid) = futures::try_join!(
            self.matcher.submit_ask(
                lender_address,
                terms.clone(),
                expiration,
                CorrelationId::new(),
                &lender.key,
            ),
            self.matcher.submit_bid(
                borrower_address,
                terms,
                expiration,
                CorrelationId::new(),
                &borrower.key,
            ),
        )?;
        let offer = self
            .matcher
            .make_offer(ask.id, bid.id, expiration, &lender.key)
            .await?;
        let deal = self
            .deals
            .accept_offer(offer.id, expiration, &borrower.key)
            .await?;
        let deal_id = deal.id;

        let funding = match self.fund(deal_id, &deal.item, lender, borrower).await? {
            Leg::Settled(id) => id,
            Leg::Rejected(reason) => {
                return self
                    .report(deal_id, CycleOutcome::FundingRejected(reason), None, None, None)
                    .await
            }
        };

        self.deals.lock_deal_order(deal_id, &borrower.key).await?;

        let repayment = match self.repay(deal_id, &deal.item, lender, borrower).await? {
            Leg::Settled(id) => id,
            Leg::Rejected(reason) => {
                return self
                    .report(
                        deal_id,
                        CycleOutcome::RepaymentRejected(reason),
                        Some(funding),
                        None,
                        None,
                    )
                    .await
            }
        };

        let closed = self
            .deals
            .close_deal_order(deal_id, repayment, &borrower.key)
            .await?;
        info!("Deal {} closed, fee {}", deal_id, closed.fee);

        self.report(
            deal_id,
            CycleOutcome::Closed,
            Some(funding),
            Some(repayment),
            Some(closed.fee),
        )
        .await
    }

    /// Direct registration with the borrower's signature, fund, then exempt
    pub async fn run_register_and_exempt(
        &self,
        lender: &Party,
        borrower: &Party,
        terms: LoanTerms,
    ) -> LoanResult<CycleReport> {
        let (lender_address, borrower_address) = self.setup(lender, borrower).await?;
        let expiration = self.expiration().await?;
        let (ask_guid, bid_guid) = (CorrelationId::new(), CorrelationId::new());

        let borrower_signature =
            sign_loan_params(&borrower.key, expiration, &ask_guid, &bid_guid, &terms);
        let deal = self
            .deals
            .register_deal_order(
                DirectRegistration {
                    lender_address_id: lender_address,
                    borrower_address_id: borrower_address,
                    terms,
                    expiration_block: expiration,
                    ask_guid,
                    bid_guid,
                    borrower: borrower.account_id(),
                    borrower_signature,
                },
                &lender.key,
            )
            .await?;
        let deal_id = deal.id;

        let funding = match self.fund(deal_id, &deal.item, lender, borrower).await? {
            Leg::Settled(id) => id,
            Leg::Rejected(reason) => {
                return self
                    .report(deal_id, CycleOutcome::FundingRejected(reason), None, None, None)
                    .await
            }
        };

        self.deals.exempt_loan(deal_id, &lender.key).await?;
        info!("Deal {} exempted by lender", deal_id);

        self.report(deal_id, CycleOutcome::Exempted, Some(funding), None, None)
            .await
    }
}
