//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Primary-chain submissions
//! - Deal lifecycle transitions
//! - Transfer verification outcomes
//! - Confirmation depth waits

use crate::error::{LoanError, LoanResult};
use crate::model::DealState;

use axum::{routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};
use std::net::SocketAddr;
use tracing::info;

lazy_static! {
    pub static ref SUBMISSIONS: CounterVec = register_counter_vec!(
        "loan_relay_submissions_total",
        "Primary-chain submissions by call and result",
        &["call", "result"]
    ).unwrap();

    pub static ref DEAL_TRANSITIONS: CounterVec = register_counter_vec!(
        "loan_relay_deal_transitions_total",
        "Deal orders entering each lifecycle state",
        &["state"]
    ).unwrap();

    pub static ref VERIFICATIONS: CounterVec = register_counter_vec!(
        "loan_relay_verifications_total",
        "Transfer verification outcomes",
        &["outcome"]
    ).unwrap();

    pub static ref DEPTH_WAIT: HistogramVec = register_histogram_vec!(
        "loan_relay_confirmation_wait_seconds",
        "Time spent waiting for secondary-chain confirmation depth",
        &[],
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
    ).unwrap();
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> LoanResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| LoanError::Config(format!("cannot bind {}: {}", addr, e)))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| LoanError::Internal(e.to_string()))?;

        Ok(())
    }
}

async fn metrics_handler() -> String {
    render().unwrap_or_else(|e| format!("# metrics unavailable: {}\n", e))
}

/// Text exposition of every registered metric
pub fn render() -> LoanResult<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| LoanError::Internal(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| LoanError::Internal(e.to_string()))
}

// Helper functions to record metrics

pub fn record_submission(call: &str, ok: bool) {
    SUBMISSIONS
        .with_label_values(&[call, if ok { "ok" } else { "rejected" }])
        .inc();
}

pub fn record_deal_transition(state: DealState) {
    DEAL_TRANSITIONS
        .with_label_values(&[&state.to_string()])
        .inc();
}

pub fn record_verification(outcome: &str) {
    VERIFICATIONS.with_label_values(&[outcome]).inc();
}

pub fn record_depth_wait(secs: f64) {
    DEPTH_WAIT.with_label_values(&[]).observe(secs);
}
