//! Webhook Reconciler
//!
//! Turns at-least-once, out-of-order provider webhooks into exactly-once
//! ledger effects: funding credits, settlement finalization, refunds.
//!
//! # Pipeline
//!
//! 1. **Authenticate**: constant-time signature verification per provider
//! 2. **Record**: persist the delivery; `(provider, reference)` dedup
//! 3. **Apply**: credit, finalize, or ignore, atomically with the event's
//!    status update

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod config;
pub mod decoder;
pub mod error;
pub mod metrics;
pub mod reconciler;
pub mod signature;
pub mod types;

// Re-exports
pub use config::{Config, ProviderProfile};
pub use decoder::StandardDecoder;
pub use error::{Error, Result};
pub use reconciler::Reconciler;
pub use signature::SignatureScheme;
pub use types::{Ack, DecodedWebhook, WebhookDecoder, WebhookKind};
