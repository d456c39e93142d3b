//! Error types for settlement

use thiserror::Error;
use uuid::Uuid;

/// Result type for settlement operations
pub type Result<T> = std::result::Result<T, Error>;

/// Settlement errors
#[derive(Error, Debug)]
pub enum Error {
    /// Ledger error
    #[error("Ledger error: {0}")]
    Ledger(#[from] ledger_core::Error),

    /// No adapter registered for the requested provider
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// Provider rejected the request; the reservation has been refunded
    #[error("Provider declined transaction {transaction_id}: {reason}")]
    ProviderDeclined {
        /// The transaction that was reserved and refunded
        transaction_id: Uuid,
        /// Provider's rejection reason
        reason: String,
    },

    /// Provider unreachable or timed out; the reservation has been refunded
    #[error("Provider unavailable for transaction {transaction_id}: {reason}")]
    ProviderUnavailable {
        /// The transaction that was reserved and refunded
        transaction_id: Uuid,
        /// What went wrong
        reason: String,
    },

    /// Client-supplied price disagrees with the catalog price
    #[error("Amount mismatch: catalog price {expected_minor}, got {got_minor}")]
    AmountMismatch {
        /// Catalog price, minor units
        expected_minor: i64,
        /// Client-supplied amount, minor units
        got_minor: i64,
    },

    /// Per-user request rate exceeded
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// Command failed validation
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}
