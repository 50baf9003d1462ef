//! Tip source for a live EVM chain, rotating across configured RPC endpoints

use super::TipSource;
use crate::config::SecondaryChainConfig;
use crate::error::{LoanError, LoanResult};

use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, error, warn};

pub struct EvmProvider {
    name: String,
    chain_id: u64,
    endpoints: Vec<Provider<Http>>,
    /// Index of the endpoint tried first
    active: AtomicUsize,
}

impl EvmProvider {
    /// Build one HTTP provider per parseable RPC URL; no request is made here
    pub fn new(config: &SecondaryChainConfig) -> LoanResult<Self> {
        let endpoints: Vec<_> = config
            .rpc_urls
            .iter()
            .filter_map(|url| match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    debug!("RPC endpoint for {}: {}", config.name, url);
                    Some(provider.interval(Duration::from_millis(100)))
                }
                Err(e) => {
                    warn!("Skipping RPC endpoint {}: {}", url, e);
                    None
                }
            })
            .collect();

        if endpoints.is_empty() {
            return Err(LoanError::ChainConnection {
                chain: config.name.clone(),
                message: "No valid RPC providers".to_string(),
            });
        }

        Ok(Self {
            name: config.name.clone(),
            chain_id: config.chain_id,
            endpoints,
            active: AtomicUsize::new(0),
        })
    }

    fn rotate(&self) -> usize {
        let next = (self.active.load(Ordering::Relaxed) + 1) % self.endpoints.len();
        self.active.store(next, Ordering::Relaxed);
        warn!("Chain {} failover to RPC endpoint {}", self.chain_id, next);
        next
    }

    /// Current tip, or `None` when every endpoint failed
    pub async fn health_check(&self) -> Option<u64> {
        match self.tip().await {
            Ok(tip) => Some(tip),
            Err(e) => {
                error!("Health check failed for {}: {}", self.name, e);
                None
            }
        }
    }
}

#[async_trait]
impl TipSource for EvmProvider {
    /// Tries each endpoint once, starting from the active one
    async fn tip(&self) -> LoanResult<u64> {
        let mut idx = self.active.load(Ordering::Relaxed) % self.endpoints.len();
        for _ in 0..self.endpoints.len() {
            match self.endpoints[idx].get_block_number().await {
                Ok(block) => return Ok(block.as_u64()),
                Err(e) => {
                    warn!("Tip query on {} failed: {}", self.name, e);
                    idx = self.rotate();
                }
            }
        }

        Err(LoanError::ChainConnection {
            chain: self.name.clone(),
            message: "All providers failed".to_string(),
        })
    }
}
