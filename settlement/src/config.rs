//! Configuration for the settlement orchestrator

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Settlement configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for the underlying ledger
    pub ledger_data_dir: PathBuf,

    /// Provider call deadline in milliseconds; a reservation whose provider
    /// call exceeds this is failed and refunded
    pub provider_timeout_ms: u64,

    /// Exchange trade payment deadline in minutes
    pub trade_ttl_minutes: i64,

    /// Per-user request rate limiting
    pub ratelimit: RateLimitConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ledger_data_dir: PathBuf::from("./data/ledger"),
            provider_timeout_ms: 30_000,
            trade_ttl_minutes: 30,
            ratelimit: RateLimitConfig::default(),
        }
    }
}

/// Rate limit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum settlement requests per user per window
    pub max_requests_per_window: u32,

    /// Sliding window duration in seconds
    pub window_seconds: i64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests_per_window: 10,
            window_seconds: 60,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("SETTLEMENT_LEDGER_DATA_DIR") {
            config.ledger_data_dir = PathBuf::from(data_dir);
        }

        if let Ok(timeout) = std::env::var("SETTLEMENT_PROVIDER_TIMEOUT_MS") {
            config.provider_timeout_ms = timeout
                .parse()
                .map_err(|e| crate::Error::Config(format!("Invalid timeout: {}", e)))?;
        }

        Ok(config)
    }
}
