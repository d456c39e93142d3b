//! Error types for the webhook reconciler

use thiserror::Error;

/// Result type for reconciler operations
pub type Result<T> = std::result::Result<T, Error>;

/// Reconciler errors
#[derive(Error, Debug)]
pub enum Error {
    /// Ledger error
    #[error("Ledger error: {0}")]
    Ledger(#[from] ledger_core::Error),

    /// No profile configured for the sending provider
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// Provider requires a signature and none was sent
    #[error("Missing signature header for provider {0}")]
    MissingSignature(String),

    /// Signature present but does not verify; the payload is dropped
    /// before any business logic runs
    #[error("Invalid signature for provider {0}")]
    InvalidSignature(String),

    /// Body is not valid JSON or lacks the fields the decoder needs
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

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
