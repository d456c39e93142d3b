//! Core types for the settlement orchestrator

use ledger_core::{Currency, Provider, Transaction, TxCategory, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A request to settle a purchase against a provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettleCommand {
    /// Paying user
    pub user_id: UserId,

    /// Product category (airtime, data, betting, ...)
    pub category: TxCategory,

    /// Provider that fulfils the purchase
    pub provider: Provider,

    /// Purchase amount, minor units
    pub amount_minor: i64,

    /// Service fee, minor units
    pub fee_minor: i64,

    /// Client-supplied idempotency key. Retries with the same key replay the
    /// original transaction instead of debiting again. Generated server-side
    /// when absent.
    pub idempotency_key: Option<String>,

    /// Catalog price for fixed-price products. When present it must match
    /// `amount_minor`; the settlement is rejected otherwise.
    pub catalog_price_minor: Option<i64>,

    /// Provider-specific parameters (phone number, meter number, smartcard,
    /// betting account id). Passed through opaquely.
    pub params: serde_json::Value,
}

/// Result of a completed settlement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementReceipt {
    /// The settled (or replayed) transaction
    pub transaction: Transaction,

    /// Wallet balance after settlement, minor units
    pub balance_minor: i64,

    /// True when an idempotency-key retry replayed an earlier transaction
    /// without touching the wallet
    pub replayed: bool,
}

/// Request handed to a provider adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// Our transaction ID
    pub transaction_id: Uuid,

    /// Idempotency reference forwarded to the provider
    pub reference: String,

    /// Product category
    pub category: TxCategory,

    /// Amount, minor units
    pub amount_minor: i64,

    /// Currency
    pub currency: Currency,

    /// Provider-specific parameters
    pub params: serde_json::Value,
}

/// Successful provider response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderOutcome {
    /// Provider's own transaction identifier
    pub provider_tx_id: Option<String>,

    /// Actual amount charged when it differs from the request
    /// (variable-cost products like betting top-ups)
    pub actual_amount_minor: Option<i64>,

    /// Actual fee charged alongside `actual_amount_minor`
    pub actual_fee_minor: Option<i64>,

    /// Raw provider payload, kept for audit
    pub raw: serde_json::Value,
}

/// Status reported by a provider on a manual re-query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProviderStatus {
    /// Provider has not settled the request yet
    Pending,

    /// Provider settled successfully
    Settled {
        /// Provider's own transaction identifier
        provider_tx_id: Option<String>,
    },

    /// Provider failed the request
    Failed {
        /// Failure reason
        reason: String,
    },
}
