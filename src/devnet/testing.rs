//! Fixtures for unit tests against a bare `MemoryLedger`

use super::MemoryLedger;
use crate::crypto::{prove_ownership, AccountKey};
use crate::ledger::{Call, FeeSchedule, LedgerEvent, LedgerSession};
use crate::model::fixtures::loan_terms;
use crate::model::{AddressId, Blockchain, Currency, DealOrderId, LoanTerms, TransferId, TransferKind};

use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, H256};
use std::sync::Arc;

pub(crate) struct TestParty {
    pub key: AccountKey,
    pub wallet: LocalWallet,
    pub address_id: AddressId,
}

pub(crate) struct TestChain {
    pub ledger: Arc<MemoryLedger>,
    pub session: Arc<LedgerSession>,
    pub authority: AccountKey,
    pub currency: Currency,
    pub lender: TestParty,
    pub borrower: TestParty,
}

impl TestChain {
    pub async fn new() -> Self {
        let sudo = AccountKey::generate();
        let authority = AccountKey::generate();
        let ledger = Arc::new(
            MemoryLedger::new(sudo.account_id(), FeeSchedule::default())
                .with_authority(authority.account_id()),
        );
        let session = LedgerSession::open(ledger.clone());

        let currency = Currency::erc20(Blockchain::Hardhat, Address::repeat_byte(0x70));
        session
            .submit(
                &sudo,
                Call::RegisterCurrency {
                    currency: currency.clone(),
                },
            )
            .await
            .unwrap();

        let lender = register_party(&session).await;
        let borrower = register_party(&session).await;

        Self {
            ledger,
            session,
            authority,
            currency,
            lender,
            borrower,
        }
    }

    pub fn terms(&self) -> LoanTerms {
        LoanTerms {
            currency: self.currency.id(),
            ..loan_terms()
        }
    }

    /// Register a funding claim for `deal_id` and record `verified` as its outcome
    pub async fn settled_funding(&self, deal_id: DealOrderId, verified: bool) -> TransferId {
        let receipt = self
            .session
            .submit(
                &self.lender.key,
                Call::RegisterFundingTransfer {
                    kind: TransferKind::ETHLESS,
                    deal_id,
                    tx_hash: H256::random(),
                },
            )
            .await
            .unwrap();
        let transfer_id = registered_transfer(&receipt.events);

        let outcome = if verified {
            Call::VerifyTransfer { transfer_id }
        } else {
            Call::FailTransfer {
                transfer_id,
                reason: crate::model::FailureReason::AmountMismatch,
            }
        };
        self.session.submit(&self.authority, outcome).await.unwrap();
        transfer_id
    }
}

pub(crate) fn registered_transfer(events: &[LedgerEvent]) -> TransferId {
    events
        .iter()
        .find_map(|e| match e {
            LedgerEvent::TransferRegistered { transfer_id, .. } => Some(*transfer_id),
            _ => None,
        })
        .unwrap()
}

pub(crate) async fn register_party(session: &LedgerSession) -> TestParty {
    let key = AccountKey::generate();
    let wallet = LocalWallet::new(&mut rand::thread_rng());
    let proof = prove_ownership(&wallet, &key.account_id()).unwrap();
    let receipt = session
        .submit(
            &key,
            Call::RegisterAddress {
                blockchain: Blockchain::Hardhat,
                address: wallet.address(),
                ownership_proof: proof,
            },
        )
        .await
        .unwrap();
    let address_id = receipt
        .find("address", |e| match e {
            LedgerEvent::AddressRegistered { address_id, .. } => Some(*address_id),
            _ => None,
        })
        .unwrap();

    TestParty {
        key,
        wallet,
        address_id,
    }
}
