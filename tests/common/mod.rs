#![allow(dead_code)]

use ethers::signers::LocalWallet;
use ethers::types::U256;
use std::sync::Arc;

use loan_relay::chain::ConfirmationGate;
use loan_relay::config::Settings;
use loan_relay::crypto::AccountKey;
use loan_relay::devnet::Devnet;
use loan_relay::model::{Duration, InterestRate, InterestType, LoanTerms};
use loan_relay::{LoanOrchestrator, Party};

pub const SUPPLY: u64 = 1_000;

fn config(block_time_ms: u64) -> String {
    format!(
        r#"
[orchestrator]
confirmation_depth = 3
tip_poll_interval_ms = 5
verification_timeout_secs = 30
expiration_blocks = 1000

[secondary]
chain_id = 31337
name = "hardhat"

[devnet]
block_time_ms = {}
ledger_block_time_ms = 0

[metrics]
enabled = false
port = 9090
"#,
        block_time_ms
    )
}

pub struct Harness {
    pub settings: Settings,
    pub devnet: Devnet,
    pub gate: Arc<ConfirmationGate>,
    pub orchestrator: LoanOrchestrator,
    pub lender: Party,
    pub borrower: Party,
}

impl Harness {
    pub async fn start() -> Self {
        Self::with_block_time(5).await
    }

    pub async fn with_block_time(block_time_ms: u64) -> Self {
        let settings = Settings::from_toml_str(&config(block_time_ms)).unwrap();
        let depth = settings.confirmation_depth();
        let devnet = Devnet::start(&settings.devnet, depth).await.unwrap();
        let gate = Arc::new(ConfirmationGate::new(
            devnet.tip_source(),
            depth,
            settings.tip_poll_interval(),
        ));
        let orchestrator = LoanOrchestrator::new(
            devnet.session.clone(),
            devnet.value_transfer(),
            gate.clone(),
            &settings.orchestrator,
        );

        let lender = Party::new(
            AccountKey::generate(),
            LocalWallet::new(&mut rand::thread_rng()),
        );
        let borrower = Party::new(
            AccountKey::generate(),
            LocalWallet::new(&mut rand::thread_rng()),
        );
        for party in [&lender, &borrower] {
            devnet
                .fund_wallet(party.evm_address(), U256::from(SUPPLY))
                .await
                .unwrap();
        }

        Self {
            settings,
            devnet,
            gate,
            orchestrator,
            lender,
            borrower,
        }
    }

    /// 100 units, 10 bps per minute simple interest, 6000 second term
    pub fn terms(&self) -> LoanTerms {
        LoanTerms {
            amount: U256::from(100u64),
            interest_rate: InterestRate {
                rate_per_period: 10,
                decimals: 4,
                period: Duration::from_secs(60),
                interest_type: InterestType::Simple,
            },
            term_length: Duration::from_secs(6_000),
            currency: self.devnet.currency_id(),
        }
    }
}
