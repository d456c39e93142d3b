//! PadiPay Ledger Core
//!
//! Wallet balances and a double-checked transaction log backing a mobile
//! money app.
//!
//! # Architecture
//!
//! - **Single Writer**: One logical writer task eliminates race conditions
//! - **Atomic Batches**: Wallet and transaction rows commit in one RocksDB
//!   `WriteBatch`, never separately
//! - **Idempotency**: Every money movement carries a `(provider, reference)`
//!   key that wins at most once
//! - **Minor Units**: All amounts are `i64` minor units (kobo, cents); no
//!   floats anywhere near money
//!
//! # Invariants
//!
//! - A failed debit is refunded exactly once
//! - Insufficient funds are rejected before any external side effect
//! - Balance never reflects a transaction the log does not contain

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod actor;
pub mod config;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod storage;
pub mod types;

// Re-exports
pub use config::Config;
pub use error::{Error, Result};
pub use ledger::Ledger;
pub use storage::Storage;
pub use types::{
    Currency, ExchangeTrade, Provider, SettleOutcome, TradeStatus, Transaction, TxCategory,
    TxDirection, TxDraft, TxStatus, UserId, Wallet, WebhookEvent, WebhookStatus,
};
