//! Cypher node configuration, loaded from TOML.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use launch_types::rpc::DEFAULT_RPC_ENDPOINT;
use launch_types::{parse_address, Address};
use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};
use thiserror::Error;

use crate::scoring::{ScoringConfig, ScoringConfigError, StaticWalletAges};

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Failed to write config file {path}: {message}")]
    Write { path: PathBuf, message: String },

    #[error("Invalid scoring configuration: {0}")]
    Scoring(#[from] ScoringConfigError),

    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

/// Cypher node configuration.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlerConfig {
    /// Ledger JSON-RPC endpoint
    pub rpc_endpoint: String,

    /// Node secret key file (JSON byte array)
    pub keypair_path: PathBuf,

    /// Launch authority the node signs as
    #[serde_as(as = "Hex")]
    pub authority: Address,

    /// Polling interval for `watch`, in seconds
    pub poll_interval_secs: u64,

    /// Retries for a commit that failed in transport or timed out
    pub max_commit_retries: u32,

    /// Stale-budget conflicts tolerated per batch before giving up
    pub max_conflict_retries: u32,

    /// Linear backoff step between commit retries, in milliseconds
    pub retry_backoff_ms: u64,

    /// Deadline for each ledger call, in milliseconds
    pub commit_timeout_ms: u64,

    /// Wallet age assumed for bidders not listed in `wallet_ages`
    pub default_wallet_age_days: u64,

    pub scoring: ScoringConfig,

    /// Wallet age in days, keyed by hex bidder address
    pub wallet_ages: BTreeMap<String, u64>,
}

impl Default for SettlerConfig {
    fn default() -> Self {
        Self {
            rpc_endpoint: DEFAULT_RPC_ENDPOINT.to_string(),
            keypair_path: PathBuf::from("cypher-node-keypair.json"),
            authority: [0u8; 32],
            poll_interval_secs: 10,
            max_commit_retries: 3,
            max_conflict_retries: 8,
            retry_backoff_ms: 500,
            commit_timeout_ms: 10_000,
            default_wallet_age_days: 0,
            scoring: ScoringConfig::default(),
            wallet_ages: BTreeMap::new(),
        }
    }
}

impl SettlerConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration file without validating it, for callers that
    /// layer overrides on top before validation.
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: SettlerConfig = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Write {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rpc_endpoint.is_empty() {
            return Err(ConfigError::InvalidParameter {
                name: "rpc_endpoint",
                reason: "must not be empty".into(),
            });
        }
        if self.authority == [0u8; 32] {
            return Err(ConfigError::InvalidParameter {
                name: "authority",
                reason: "must be set to the launch authority".into(),
            });
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "poll_interval_secs",
                reason: "must be greater than 0".into(),
            });
        }
        if self.commit_timeout_ms == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "commit_timeout_ms",
                reason: "must be greater than 0".into(),
            });
        }
        if self.max_conflict_retries == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "max_conflict_retries",
                reason: "must be greater than 0".into(),
            });
        }

        self.scoring.validate()?;
        self.wallet_age_source()?;

        Ok(())
    }

    /// Wallet ages from the `wallet_ages` table.
    pub fn wallet_age_source(&self) -> Result<StaticWalletAges, ConfigError> {
        let mut ages = StaticWalletAges::default().with_default(self.default_wallet_age_days);
        for (bidder, days) in &self.wallet_ages {
            let address = parse_address(bidder).map_err(|e| ConfigError::InvalidParameter {
                name: "wallet_ages",
                reason: format!("{}: {}", bidder, e),
            })?;
            ages.insert(address, *days);
        }
        Ok(ages)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn commit_timeout(&self) -> Duration {
        Duration::from_millis(self.commit_timeout_ms)
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(attempt as u64))
    }
}
