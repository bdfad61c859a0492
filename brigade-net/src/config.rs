//! Configuration loading for the Brigade client.
//!
//! All fields are required unless explicitly marked optional. No defaults.

use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub ws_base_url: String,
    pub api_key: Option<String>,
    pub request_timeout_ms: u64,
    /// Entries nobody watches for this long are dropped from the cache.
    pub idle_evict_ms: u64,
    pub reconnect: ReconnectConfig,
}

/// Feed channels retry at a fixed interval, without backoff, until the
/// session ends.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconnectConfig {
    pub interval_ms: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl ClientConfig {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "api_base_url",
                reason: "must not be empty".to_string(),
            });
        }
        if self.ws_base_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "ws_base_url",
                reason: "must not be empty".to_string(),
            });
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.idle_evict_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "idle_evict_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.reconnect.interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "reconnect.interval_ms",
                reason: "must be > 0".to_string(),
            });
        }
        Ok(())
    }
}
