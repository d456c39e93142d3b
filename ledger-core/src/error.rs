//! Error types for the ledger

use thiserror::Error;
use uuid::Uuid;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Wallet not found
    #[error("Wallet not found: {0}")]
    WalletNotFound(String),

    /// Transaction not found
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    /// Exchange trade not found
    #[error("Trade not found: {0}")]
    TradeNotFound(String),

    /// Balance check failed before any external call
    #[error("Insufficient funds: available {available_minor}, required {required_minor}")]
    InsufficientFunds {
        /// Current wallet balance, minor units
        available_minor: i64,
        /// Amount the operation needed, minor units
        required_minor: i64,
    },

    /// Wallet cannot cover the provider's actual charge on a variable-cost
    /// settlement; the original reservation is still refunded
    #[error(
        "Insufficient funds for provider charge: available {available_minor}, \
         additional {required_minor} required"
    )]
    InsufficientFundsForProviderCharge {
        /// Current wallet balance, minor units
        available_minor: i64,
        /// Additional minor units the actual charge needed
        required_minor: i64,
    },

    /// A transaction already exists under this `(provider, provider_ref)`.
    ///
    /// This is a control-flow signal, not a fault: callers read back the
    /// existing transaction and return it.
    #[error("Duplicate reference {reference} for provider {provider}")]
    DuplicateReference {
        /// Provider name
        provider: String,
        /// Idempotency reference
        reference: String,
        /// The transaction that won the insert
        existing: Uuid,
    },

    /// A webhook event already exists under this `(provider, reference)`:
    /// the at-least-once delivery dedup boundary
    #[error("Duplicate webhook delivery {reference} from provider {provider}")]
    DuplicateDelivery {
        /// Provider name
        provider: String,
        /// Delivery reference
        reference: String,
        /// The event that won the insert
        existing: Uuid,
    },

    /// Amount failed validation (non-positive amount, negative fee)
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Illegal state-machine transition
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
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
