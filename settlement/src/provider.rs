//! Provider adapter interface
//!
//! One adapter per upstream provider (bills aggregator, betting gateway,
//! gift-card desk). Adapters translate our [`ProviderRequest`] into the
//! provider's API and normalize the response; they never touch the ledger.

use crate::types::{ProviderOutcome, ProviderRequest, ProviderStatus};
use async_trait::async_trait;
use thiserror::Error;

/// Result type for provider calls
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Errors surfaced by provider adapters
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Provider processed the request and said no. Terminal for this
    /// reference; safe to refund.
    #[error("Declined: {reason}")]
    Declined {
        /// Provider's rejection reason
        reason: String,
        /// Raw provider payload
        raw: serde_json::Value,
    },

    /// Provider could not be reached or answered with a server fault.
    /// The request may or may not have been processed upstream.
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// Adapter-side timeout
    #[error("Timed out")]
    Timeout,
}

/// Provider adapter trait
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Execute a purchase against the provider
    async fn execute(&self, request: &ProviderRequest) -> ProviderResult<ProviderOutcome>;

    /// Re-query the status of an earlier request by its reference
    async fn check_status(&self, reference: &str) -> ProviderResult<ProviderStatus>;

    /// Get adapter name
    fn name(&self) -> &str;
}
