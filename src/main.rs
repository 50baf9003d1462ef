//! Loan Relay demo - runs both loan cycles against a local devnet
//!
//! With `secondary.rpc_urls` configured, the configured EVM endpoints are
//! health-checked first; the cycles themselves always run on the devnet.

use anyhow::{Context, Result};
use ethers::signers::LocalWallet;
use ethers::types::U256;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

use loan_relay::chain::{ConfirmationGate, EvmProvider};
use loan_relay::config::Settings;
use loan_relay::crypto::AccountKey;
use loan_relay::devnet::{Devnet, SUDO_SEED};
use loan_relay::metrics::MetricsServer;
use loan_relay::model::{Duration, InterestRate, InterestType, LoanTerms};
use loan_relay::{LoanOrchestrator, Party};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    info!("Starting Loan Relay v{}", env!("CARGO_PKG_VERSION"));

    let settings = Settings::load()?;
    let depth = settings.confirmation_depth();
    info!(
        "Secondary chain {} ({}), confirmation depth {}",
        settings.secondary.name, settings.secondary.chain_id, depth
    );

    let metrics_handle = if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    if !settings.secondary.rpc_urls.is_empty() {
        let provider = EvmProvider::new(&settings.secondary)?;
        match provider.health_check().await {
            Some(tip) => info!("{} reachable at block {}", settings.secondary.name, tip),
            None => warn!("{} health check failed", settings.secondary.name),
        }
    }

    let devnet = Devnet::start(&settings.devnet, depth)
        .await
        .context("Failed to start devnet")?;
    let gate = Arc::new(ConfirmationGate::new(
        devnet.tip_source(),
        depth,
        settings.tip_poll_interval(),
    ));
    let orchestrator = LoanOrchestrator::new(
        devnet.session.clone(),
        devnet.value_transfer(),
        gate,
        &settings.orchestrator,
    );

    let lender = Party::new(
        AccountKey::from_seed(SUDO_SEED),
        LocalWallet::new(&mut rand::thread_rng()),
    );
    let borrower = Party::new(
        AccountKey::from_seed("//Bob"),
        LocalWallet::new(&mut rand::thread_rng()),
    );
    let supply = U256::from(1_000_000u64);
    devnet.fund_wallet(lender.evm_address(), supply).await?;
    devnet.fund_wallet(borrower.evm_address(), supply).await?;

    let terms = LoanTerms {
        amount: U256::from(100u64),
        interest_rate: InterestRate {
            rate_per_period: 10,
            decimals: 4,
            period: Duration::from_secs(60),
            interest_type: InterestType::Simple,
        },
        term_length: Duration::from_secs(6_000),
        currency: devnet.currency_id(),
    };

    let report = orchestrator
        .run_full_cycle(&lender, &borrower, terms.clone())
        .await
        .context("Full loan cycle failed")?;
    info!(
        "Full cycle: deal {} ended {} ({:?}), close fee {:?}",
        report.deal_id, report.state, report.outcome, report.close_fee
    );

    let report = orchestrator
        .run_register_and_exempt(&lender, &borrower, terms)
        .await
        .context("Register and exempt cycle failed")?;
    info!(
        "Register and exempt: deal {} ended {} ({:?})",
        report.deal_id, report.state, report.outcome
    );

    if let Some(handle) = metrics_handle {
        info!("Serving metrics until shutdown");
        shutdown_signal().await;
        handle.abort();
    }

    devnet.shutdown();
    info!("Loan Relay stopped");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,loan_relay=debug,hyper=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
