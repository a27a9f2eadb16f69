//! Node-side settings for the stake tool, read from a TOML file.

use std::fs;
use std::path::Path;

use delegation_ledger::{Epoch, LockPolicy, LOCK_PERIOD_IN_EPOCHS};
use serde::{Deserialize, Serialize};

pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct StakeConfig {
    /// Free-form network label, echoed in logs.
    pub network: String,
    /// Epochs an undelegation waits before release; the boundary is strict.
    pub lock_period_epochs: Epoch,
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for StakeConfig {
    fn default() -> Self {
        Self {
            network: "mainnet".into(),
            lock_period_epochs: LOCK_PERIOD_IN_EPOCHS,
            log_level: DEFAULT_LOG_LEVEL.into(),
        }
    }
}

impl StakeConfig {
    /// Read `path`, or fall back to defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let display = path.display().to_string();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: display,
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.log_level.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "log_level",
                reason: "must not be empty".into(),
            });
        }
        if self.network.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "network",
                reason: "must not be empty".into(),
            });
        }
        Ok(())
    }

    pub fn lock_policy(&self) -> LockPolicy {
        LockPolicy::new(self.lock_period_epochs)
    }
}
