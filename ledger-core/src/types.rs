//! Core types for the wallet ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Exact arithmetic (integer minor units for money, never floating point)
//! - One wallet per user, append-mostly transaction log

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// User identifier (opaque, issued by the auth layer)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Create new user ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// External provider name (payment gateway, bill aggregator, bank API)
///
/// Combined with a reference string this forms the idempotency key for
/// transactions and the dedup key for webhook deliveries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Provider(String);

impl Provider {
    /// Create new provider name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// ISO 4217 currency code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Currency {
    /// Nigerian Naira (minor unit: kobo)
    NGN,
    /// US Dollar
    USD,
    /// British Pound
    GBP,
    /// Euro
    EUR,
    /// Ghanaian Cedi
    GHS,
}

impl Currency {
    /// ISO 4217 code
    pub fn code(&self) -> &'static str {
        match self {
            Currency::NGN => "NGN",
            Currency::USD => "USD",
            Currency::GBP => "GBP",
            Currency::EUR => "EUR",
            Currency::GHS => "GHS",
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NGN" => Some(Currency::NGN),
            "USD" => Some(Currency::USD),
            "GBP" => Some(Currency::GBP),
            "EUR" => Some(Currency::EUR),
            "GHS" => Some(Currency::GHS),
            _ => None,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Per-user wallet
///
/// Balance is integer minor units (kobo, cents). The balance only changes
/// inside an atomic unit that also writes or updates a [`Transaction`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    /// Owning user
    pub user_id: UserId,

    /// Balance in minor units; never negative between transaction boundaries
    pub balance_minor: i64,

    /// Wallet currency
    pub currency: Currency,

    /// Linked external virtual-account numbers (used to match funding webhooks)
    pub virtual_accounts: Vec<String>,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Create an empty wallet for a user
    pub fn new(user_id: UserId, currency: Currency) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            balance_minor: 0,
            currency,
            virtual_accounts: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Direction of a ledger-affecting event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxDirection {
    /// Funds leave the wallet
    Debit,
    /// Funds enter the wallet
    Credit,
    /// Exchange-related movement
    Exchange,
}

/// Transaction category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum TxCategory {
    /// Airtime top-up
    Airtime,
    /// Mobile data bundle
    Data,
    /// Cable TV subscription
    CableTv,
    /// Electricity token
    Electricity,
    /// Betting account funding (variable provider-side charge)
    Betting,
    /// Gift card purchase
    Giftcard,
    /// Bank withdrawal / peer transfer
    Withdrawal,
    /// Wallet funding from an external payment
    WalletFunding,
    /// Currency-exchange payout
    Exchange,
}

/// Transaction status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    /// Reserved, provider outcome not yet known
    Pending,
    /// Settled successfully (terminal)
    Success,
    /// Failed; debits have been compensated (terminal)
    Failed,
    /// Cancelled before any money moved (terminal)
    Cancelled,
}

impl TxStatus {
    /// Check if status is terminal
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TxStatus::Pending)
    }

    /// Map a provider's status vocabulary onto the internal terminal set.
    ///
    /// Returns `None` for vocabulary that maps to neither terminal state
    /// (e.g. a provider-side "processing" ping).
    pub fn from_provider_vocab(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "success" | "successful" | "completed" | "delivered" | "paid" => {
                Some(TxStatus::Success)
            }
            "failed" | "failure" | "declined" | "reversed" | "error" | "abandoned" => {
                Some(TxStatus::Failed)
            }
            _ => None,
        }
    }
}

/// One ledger-affecting event: a debit (bill payment, withdrawal, exchange
/// movement) or a credit (wallet funding).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique transaction ID (UUIDv7 for time-ordering)
    pub id: Uuid,

    /// Owning user
    pub user_id: UserId,

    /// Debit or credit
    pub direction: TxDirection,

    /// Category
    pub category: TxCategory,

    /// Amount in minor units
    pub amount_minor: i64,

    /// Fee in minor units
    pub fee_minor: i64,

    /// Total charged/credited in minor units (amount + fee)
    pub total_minor: i64,

    /// Currency
    pub currency: Currency,

    /// External provider
    pub provider: Provider,

    /// Provider reference: the idempotency key, unique per provider
    pub provider_ref: String,

    /// Provider's own transaction identifier, once known
    pub provider_tx_id: Option<String>,

    /// Status
    pub status: TxStatus,

    /// Opaque audit blob (raw provider responses); never consulted for
    /// ledger decisions
    pub meta: serde_json::Value,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Build a transaction from a draft with the given initial status
    pub fn from_draft(draft: TxDraft, status: TxStatus) -> Self {
        let now = Utc::now();
        let total_minor = draft.total_minor();
        Self {
            id: Uuid::now_v7(),
            user_id: draft.user_id,
            direction: draft.direction,
            category: draft.category,
            amount_minor: draft.amount_minor,
            fee_minor: draft.fee_minor,
            total_minor,
            currency: draft.currency,
            provider: draft.provider,
            provider_ref: draft.provider_ref,
            provider_tx_id: None,
            status,
            meta: draft.meta,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Draft for a new transaction, supplied by the orchestrator or reconciler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxDraft {
    /// Owning user
    pub user_id: UserId,

    /// Debit or credit
    pub direction: TxDirection,

    /// Category
    pub category: TxCategory,

    /// Amount in minor units
    pub amount_minor: i64,

    /// Fee in minor units
    pub fee_minor: i64,

    /// Currency
    pub currency: Currency,

    /// External provider
    pub provider: Provider,

    /// Provider reference (idempotency key)
    pub provider_ref: String,

    /// Initial audit blob
    pub meta: serde_json::Value,
}

impl TxDraft {
    /// Total minor units this draft moves (amount + fee)
    pub fn total_minor(&self) -> i64 {
        self.amount_minor.saturating_add(self.fee_minor)
    }
}

/// Terminal outcome applied to a pending transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SettleOutcome {
    /// Provider settled the operation
    Success {
        /// Provider's own transaction identifier
        provider_tx_id: Option<String>,
    },
    /// Provider declined or was unreachable; pending debits are compensated
    Failure {
        /// Human-readable reason recorded into the audit blob
        reason: String,
    },
}

/// Processing status of an inbound webhook delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WebhookStatus {
    /// Persisted, business logic not yet run
    Received,
    /// Fully processed
    Processed,
    /// Outside the funds-affecting event set
    Ignored,
    /// Could not be linked to a user or transaction; kept for manual
    /// reconciliation
    Unmatched,
    /// Processing finished with a failure outcome
    Failed,
}

/// Inbound provider notification, persisted before any business logic
///
/// `(provider, reference)` is unique: the at-least-once-delivery dedup
/// boundary, independent of the transaction idempotency key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    /// Unique event ID
    pub id: Uuid,

    /// Sending provider
    pub provider: Provider,

    /// Provider's delivery reference
    pub reference: String,

    /// Provider's event type string
    pub event_type: String,

    /// Processing status
    pub status: WebhookStatus,

    /// Raw payload, persisted verbatim so funds are never silently dropped
    pub payload: serde_json::Value,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Timestamp of terminal processing, if reached
    pub processed_at: Option<DateTime<Utc>>,
}

impl WebhookEvent {
    /// Create a freshly received event
    pub fn received(
        provider: Provider,
        reference: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            provider,
            reference: reference.into(),
            event_type: event_type.into(),
            status: WebhookStatus::Received,
            payload,
            created_at: Utc::now(),
            processed_at: None,
        }
    }
}

/// Status of a manual currency-exchange trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeStatus {
    /// Created, awaiting the user's external payment
    PendingPayment,
    /// User reports payment sent; awaiting admin confirmation
    PaidAwaitingConfirmation,
    /// Admin confirmed receipt of the user's payment
    PaymentReceived,
    /// Payout credited to the user's wallet (terminal)
    ExchangeCompleted,
    /// Payment window elapsed (terminal, from PendingPayment only)
    Expired,
    /// Cancelled by the user (terminal, from PendingPayment only)
    Cancelled,
}

impl TradeStatus {
    /// Check if status is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TradeStatus::ExchangeCompleted | TradeStatus::Expired | TradeStatus::Cancelled
        )
    }
}

/// Manual fiat-exchange order
///
/// Time-boxed: any read-path access must lazily transition an overdue
/// `PendingPayment` trade to `Expired` before acting on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeTrade {
    /// Unique trade ID
    pub id: Uuid,

    /// Owning user
    pub user_id: UserId,

    /// Currency the user sells (pays externally)
    pub sell_currency: Currency,

    /// Currency the user receives into their wallet
    pub buy_currency: Currency,

    /// Amount sold, minor units
    pub sell_amount_minor: i64,

    /// Amount bought, minor units
    pub buy_amount_minor: i64,

    /// Fixed quote rate (buy per sell)
    pub rate: Decimal,

    /// Status
    pub status: TradeStatus,

    /// Payment deadline
    pub expires_at: DateTime<Utc>,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl ExchangeTrade {
    /// Whether the payment window has elapsed
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == TradeStatus::PendingPayment && now > self.expires_at
    }
}
