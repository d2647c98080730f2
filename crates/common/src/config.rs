//! Server configuration.
//!
//! Loaded from a JSON file; every key is optional and falls back to its
//! default.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{BitcoinNetwork, WalletError};

/// Blockchain indexer backing the `Chain` capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SpvProvider {
    #[default]
    Blockstream,
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the wallet database.
    #[serde(default = "default_datadir")]
    pub datadir: String,

    #[serde(default)]
    pub chainnet: BitcoinNetwork,

    /// HTTP listen address.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default)]
    pub spv_provider: SpvProvider,

    /// Interval between Syncer passes (milliseconds).
    #[serde(default = "default_sync_interval_ms")]
    pub wallet_sync_interval_ms: u64,

    /// Timeout applied to every chain request (milliseconds).
    #[serde(default = "default_chain_timeout_ms")]
    pub chain_timeout_ms: u64,
}

fn default_datadir() -> String {
    "./wallet".to_string()
}

fn default_endpoint() -> String {
    "0.0.0.0:9099".to_string()
}

fn default_sync_interval_ms() -> u64 {
    30_000
}

fn default_chain_timeout_ms() -> u64 {
    10_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            datadir: default_datadir(),
            chainnet: BitcoinNetwork::default(),
            endpoint: default_endpoint(),
            spv_provider: SpvProvider::default(),
            wallet_sync_interval_ms: default_sync_interval_ms(),
            chain_timeout_ms: default_chain_timeout_ms(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, WalletError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            WalletError::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_json(&contents)?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse and validate configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, WalletError> {
        let config: Config = serde_json::from_str(json)
            .map_err(|e| WalletError::Configuration(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), WalletError> {
        if self.wallet_sync_interval_ms == 0 {
            return Err(WalletError::Configuration(
                "wallet_sync_interval_ms must be positive".to_string(),
            ));
        }
        if self.chain_timeout_ms == 0 {
            return Err(WalletError::Configuration(
                "chain_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.wallet_sync_interval_ms)
    }

    pub fn chain_timeout(&self) -> Duration {
        Duration::from_millis(self.chain_timeout_ms)
    }

    /// Path of the wallet database inside the data directory.
    pub fn wallet_db_path(&self) -> std::path::PathBuf {
        Path::new(&self.datadir).join("wallets.db")
    }
}
