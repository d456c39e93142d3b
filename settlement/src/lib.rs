//! Settlement Orchestrator
//!
//! Drives purchases (airtime, data, cable TV, electricity, betting,
//! gift cards) from wallet reservation through provider fulfilment to a
//! terminal ledger state, plus the manual currency-exchange desk.
//!
//! # Flow
//!
//! 1. **Reserve**: atomic balance check + debit + pending transaction
//! 2. **Execute**: provider adapter call under a deadline
//! 3. **Finalize**: settle on success; refund the reservation exactly once
//!    on decline, timeout, or unreachable provider
//!
//! Idempotency-key retries replay the original transaction; the wallet is
//! debited and the provider called at most once per key.

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod config;
pub mod error;
pub mod exchange;
pub mod metrics;
pub mod orchestrator;
pub mod provider;
pub mod ratelimit;
pub mod types;

// Re-exports
pub use config::Config;
pub use error::{Error, Result};
pub use exchange::ExchangeEngine;
pub use orchestrator::Orchestrator;
pub use provider::{ProviderAdapter, ProviderError, ProviderResult};
pub use types::{
    ProviderOutcome, ProviderRequest, ProviderStatus, SettleCommand, SettlementReceipt,
};
