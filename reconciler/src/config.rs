//! Configuration for the webhook reconciler

use crate::signature::SignatureScheme;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Reconciler configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// One profile per sending provider, keyed by provider name
    pub providers: HashMap<String, ProviderProfile>,
}

/// How to authenticate one provider's deliveries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderProfile {
    /// Signature recipe
    pub scheme: SignatureScheme,

    /// Shared secret. When absent, deliveries are accepted unsigned,
    /// only for providers that whitelist source IPs instead.
    pub secret: Option<String>,
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Register a provider profile
    pub fn with_provider(mut self, name: impl Into<String>, profile: ProviderProfile) -> Self {
        self.providers.insert(name.into(), profile);
        self
    }
}
