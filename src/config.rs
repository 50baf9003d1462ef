//! Configuration management for the loan relay
//!
//! Loads configuration from TOML files with environment variable substitution.

use crate::chain::recommended_confirmations;
use crate::ledger::FeeSchedule;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub orchestrator: OrchestratorConfig,
    pub secondary: SecondaryChainConfig,
    #[serde(default)]
    pub devnet: DevnetConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorConfig {
    /// Falls back to `recommended_confirmations(secondary.chain_id)`
    pub confirmation_depth: Option<u64>,
    pub tip_poll_interval_ms: u64,
    /// Upper bound the orchestrator puts on a single verification wait
    pub verification_timeout_secs: u64,
    /// Loan expiration, in primary-chain blocks past the current height
    pub expiration_blocks: u64,
    /// Times a verification wait is re-attached after the event feed drops
    #[serde(default = "default_reattach_attempts")]
    pub reattach_attempts: u32,
}

fn default_reattach_attempts() -> u32 {
    3
}

impl OrchestratorConfig {
    pub fn verification_timeout(&self) -> Duration {
        Duration::from_secs(self.verification_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecondaryChainConfig {
    pub chain_id: u64,
    pub name: String,
    #[serde(default)]
    pub rpc_urls: Vec<String>,
    pub confirmation_depth: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DevnetConfig {
    /// Secondary-chain block interval
    pub block_time_ms: u64,
    /// Primary-chain block interval
    pub ledger_block_time_ms: u64,
    #[serde(default)]
    pub fees: FeeSchedule,
}

impl Default for DevnetConfig {
    fn default() -> Self {
        Self {
            block_time_ms: 50,
            ledger_block_time_ms: 100,
            fees: FeeSchedule::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Settings {
    /// Load settings from the file named by `LOAN_RELAY_CONFIG`
    pub fn load() -> Result<Self> {
        let config_path = env::var("LOAN_RELAY_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::load_from(&config_path)
    }

    /// Load settings from a specific file
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::from_toml_str(&config_str)
    }

    /// Parse settings from TOML text, substituting `${VAR}` references
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config_str = substitute_env_vars(input)?;

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.confirmation_depth() == 0 {
            anyhow::bail!("confirmation_depth must be at least 1");
        }
        if self.orchestrator.tip_poll_interval_ms == 0 {
            anyhow::bail!("tip_poll_interval_ms must be positive");
        }
        if self.orchestrator.expiration_blocks == 0 {
            anyhow::bail!("expiration_blocks must be positive");
        }
        if self.orchestrator.verification_timeout_secs == 0 {
            anyhow::bail!("verification_timeout_secs must be positive");
        }
        if self.secondary.rpc_urls.is_empty() {
            tracing::warn!(
                "Chain {} has no RPC URLs configured - devnet only",
                self.secondary.name
            );
        }

        Ok(())
    }

    /// Confirmation depth required before a transfer may be claimed
    pub fn confirmation_depth(&self) -> u64 {
        self.orchestrator
            .confirmation_depth
            .or(self.secondary.confirmation_depth)
            .unwrap_or_else(|| recommended_confirmations(self.secondary.chain_id))
    }

    pub fn tip_poll_interval(&self) -> Duration {
        Duration::from_millis(self.orchestrator.tip_poll_interval_ms)
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> Result<String> {
    let mut result = input.to_string();
    let re = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")?;

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[orchestrator]
tip_poll_interval_ms = 250
verification_timeout_secs = 600
expiration_blocks = 100000

[secondary]
chain_id = 31337
name = "hardhat"
rpc_urls = ["http://${LOAN_RELAY_TEST_HOST}:8545"]

[metrics]
enabled = false
port = 9090
"#;

    #[test]
    fn test_env_var_substitution() {
        env::set_var("TEST_VAR", "test_value");
        let input = "url = \"https://api.example.com/${TEST_VAR}/endpoint\"";
        let result = substitute_env_vars(input).unwrap();
        assert_eq!(result, "url = \"https://api.example.com/test_value/endpoint\"");
    }

    #[test]
    fn test_load_from_file() {
        env::set_var("LOAN_RELAY_TEST_HOST", "localhost");
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let settings = Settings::load_from(file.path()).unwrap();
        assert_eq!(settings.secondary.rpc_urls, vec!["http://localhost:8545"]);
        assert_eq!(settings.confirmation_depth(), 12);
        assert_eq!(settings.devnet.block_time_ms, 50);
        assert_eq!(settings.tip_poll_interval(), Duration::from_millis(250));
        assert_eq!(settings.orchestrator.verification_timeout(), Duration::from_secs(600));
        assert_eq!(settings.orchestrator.reattach_attempts, 3);
    }

    #[test]
    fn test_explicit_depth_wins() {
        let input = SAMPLE.replace(
            "[orchestrator]\n",
            "[orchestrator]\nconfirmation_depth = 3\n",
        );
        let settings = Settings::from_toml_str(&input).unwrap();
        assert_eq!(settings.confirmation_depth(), 3);
    }

    #[test]
    fn test_zero_verification_timeout_rejected() {
        let input = SAMPLE.replace(
            "verification_timeout_secs = 600",
            "verification_timeout_secs = 0",
        );
        let err = Settings::from_toml_str(&input).unwrap_err();
        assert!(err.to_string().contains("verification_timeout_secs"));
    }

    #[test]
    fn test_zero_depth_rejected() {
        let input = SAMPLE.replace(
            "[orchestrator]\n",
            "[orchestrator]\nconfirmation_depth = 0\n",
        );
        assert!(Settings::from_toml_str(&input).is_err());
    }
}
