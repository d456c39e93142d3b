//! Main ledger orchestration layer
//!
//! This module ties together storage and actor components into a high-level
//! API for wallet and transaction processing. All mutations funnel through
//! the single-writer actor; reads go straight to storage.
//!
//! # Example
//!
//! ```no_run
//! use ledger_core::{Config, Ledger};
//!
//! #[tokio::main]
//! async fn main() -> ledger_core::Result<()> {
//!     let config = Config::default();
//!     let ledger = Ledger::open(config)?;
//!
//!     // let tx = ledger.reserve_and_debit(draft).await?;
//!
//!     Ok(())
//! }
//! ```

use crate::{
    actor::{spawn_ledger_actor, LedgerHandle},
    metrics::Metrics,
    types::{
        Currency, ExchangeTrade, Provider, SettleOutcome, TradeStatus, Transaction, TxDraft,
        UserId, Wallet, WebhookEvent, WebhookStatus,
    },
    Config, Error, Result, Storage,
};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Main ledger interface
#[derive(Clone)]
pub struct Ledger {
    /// Actor handle for mutations
    handle: LedgerHandle,

    /// Direct storage access (for reads)
    storage: Arc<Storage>,

    /// Currency assigned to lazily created wallets
    default_currency: Currency,

    /// Metrics collector
    metrics: Metrics,
}

impl Ledger {
    /// Open ledger with configuration
    pub fn open(config: Config) -> Result<Self> {
        let storage = Arc::new(Storage::open(&config)?);
        let handle = spawn_ledger_actor(storage.clone(), config.mailbox_capacity);
        let metrics = Metrics::new().map_err(|e| Error::Other(e.to_string()))?;

        Ok(Self {
            handle,
            storage,
            default_currency: config.default_currency,
            metrics,
        })
    }

    /// Currency assigned to wallets created on first access
    pub fn default_currency(&self) -> Currency {
        self.default_currency
    }

    /// Access the metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    // Wallet API

    /// Get or lazily create the user's wallet
    pub async fn get_or_create_wallet(&self, user_id: UserId) -> Result<Wallet> {
        self.handle
            .get_or_create_wallet(user_id, self.default_currency)
            .await
    }

    /// Read a wallet without creating it
    pub fn get_wallet(&self, user_id: &UserId) -> Result<Option<Wallet>> {
        self.storage.get_wallet(user_id)
    }

    /// Attach a provider-issued virtual-account number to a wallet, so
    /// inbound transfers can be resolved back to the user
    pub async fn link_virtual_account(&self, user_id: UserId, account: String) -> Result<Wallet> {
        self.handle
            .link_virtual_account(user_id, self.default_currency, account)
            .await
    }

    /// Resolve a virtual-account number to its owning user
    pub fn find_user_by_virtual_account(&self, account: &str) -> Result<Option<UserId>> {
        self.storage.find_user_by_virtual_account(account)
    }

    // Transaction API

    /// Reserve funds: balance check, debit, and pending transaction in one
    /// atomic step. The draft's `(provider, provider_ref)` is the idempotency
    /// key; a retry surfaces [`Error::DuplicateReference`] carrying the
    /// transaction that won.
    pub async fn reserve_and_debit(&self, draft: TxDraft) -> Result<Transaction> {
        self.validate_draft(&draft)?;
        let started = Instant::now();
        let result = self.handle.reserve_and_debit(draft).await;
        self.metrics
            .record_mutation_duration(started.elapsed().as_secs_f64());
        match &result {
            Ok(_) => self.metrics.record_debit(),
            Err(Error::InsufficientFunds { .. }) => self.metrics.record_insufficient_funds(),
            Err(Error::DuplicateReference { .. }) => self.metrics.record_duplicate_reference(),
            Err(_) => {}
        }
        result
    }

    /// Credit a wallet with an already-settled transaction (funding,
    /// exchange payout)
    pub async fn credit_wallet(&self, draft: TxDraft) -> Result<Transaction> {
        self.validate_draft(&draft)?;
        let started = Instant::now();
        let result = self.handle.credit_wallet(draft).await;
        self.metrics
            .record_mutation_duration(started.elapsed().as_secs_f64());
        if result.is_ok() {
            self.metrics.record_credit();
        }
        result
    }

    /// Move a transaction to a terminal status. A failed debit is refunded in
    /// the same atomic step; the returned flag reports whether this call
    /// applied that refund. Finalizing an already-terminal transaction is a
    /// no-op.
    pub async fn finalize(
        &self,
        tx_id: Uuid,
        outcome: SettleOutcome,
    ) -> Result<(Transaction, bool)> {
        let result = self.handle.finalize(tx_id, outcome).await;
        if let Ok((_, true)) = &result {
            self.metrics.record_refund();
        }
        result
    }

    /// Reconcile a pending debit with the amount the provider actually
    /// charged (variable-cost settlement)
    pub async fn apply_actual_charge(
        &self,
        tx_id: Uuid,
        actual_amount_minor: i64,
        actual_fee_minor: i64,
    ) -> Result<Transaction> {
        if actual_amount_minor <= 0 {
            return Err(Error::InvalidAmount(
                "Actual amount must be positive".to_string(),
            ));
        }
        if actual_fee_minor < 0 {
            return Err(Error::InvalidAmount(
                "Actual fee cannot be negative".to_string(),
            ));
        }
        self.handle
            .apply_actual_charge(tx_id, actual_amount_minor, actual_fee_minor)
            .await
    }

    /// Get transaction by ID
    pub fn get_transaction(&self, tx_id: Uuid) -> Result<Transaction> {
        self.storage.get_transaction(tx_id)
    }

    /// Idempotency lookup by `(provider, provider_ref)`
    pub fn find_tx_by_reference(
        &self,
        provider: &Provider,
        reference: &str,
    ) -> Result<Option<Transaction>> {
        self.storage.find_tx_by_reference(provider, reference)
    }

    /// List a user's transactions in creation order
    pub fn list_user_transactions(&self, user_id: &UserId) -> Result<Vec<Transaction>> {
        self.storage.list_user_transactions(user_id)
    }

    // Webhook event API

    /// Record an inbound webhook delivery. `(provider, reference)` dedup:
    /// a replay surfaces [`Error::DuplicateDelivery`].
    pub async fn record_webhook_event(&self, event: WebhookEvent) -> Result<WebhookEvent> {
        self.handle.record_webhook_event(event).await
    }

    /// Update a webhook event's processing status
    pub async fn mark_webhook_event(
        &self,
        event_id: Uuid,
        status: WebhookStatus,
    ) -> Result<WebhookEvent> {
        self.handle.mark_webhook_event(event_id, status).await
    }

    /// Get webhook event by ID
    pub fn get_webhook_event(&self, event_id: Uuid) -> Result<WebhookEvent> {
        self.storage.get_webhook_event(event_id)
    }

    /// Credit a funding webhook and mark the event atomically
    pub async fn credit_and_mark(
        &self,
        event_id: Uuid,
        draft: TxDraft,
    ) -> Result<(Transaction, WebhookEvent)> {
        self.validate_draft(&draft)?;
        let result = self.handle.credit_and_mark(event_id, draft).await;
        if result.is_ok() {
            self.metrics.record_credit();
        }
        result
    }

    /// Finalize a transaction from a status webhook and mark the event
    /// atomically. Returns the transaction, the event, and whether a refund
    /// was applied.
    pub async fn finalize_and_mark(
        &self,
        event_id: Uuid,
        tx_id: Uuid,
        outcome: SettleOutcome,
    ) -> Result<(Transaction, WebhookEvent, bool)> {
        let result = self.handle.finalize_and_mark(event_id, tx_id, outcome).await;
        if let Ok((_, _, true)) = &result {
            self.metrics.record_refund();
        }
        result
    }

    // Exchange trade API

    /// Insert a new exchange trade
    pub async fn put_trade(&self, trade: ExchangeTrade) -> Result<()> {
        if trade.sell_amount_minor <= 0 || trade.buy_amount_minor <= 0 {
            return Err(Error::InvalidAmount(
                "Trade amounts must be positive".to_string(),
            ));
        }
        self.handle.put_trade(trade).await
    }

    /// Get a trade, applying lazy expiry first so callers never observe a
    /// stale `PendingPayment` past its deadline
    pub async fn get_trade(&self, trade_id: Uuid) -> Result<ExchangeTrade> {
        self.handle.expire_trade_if_overdue(trade_id).await
    }

    /// Check-and-set trade transition
    pub async fn transition_trade(
        &self,
        trade_id: Uuid,
        from: TradeStatus,
        to: TradeStatus,
    ) -> Result<ExchangeTrade> {
        self.handle.transition_trade(trade_id, from, to).await
    }

    /// Cancel a still-unpaid trade owned by `user_id`
    pub async fn cancel_trade(&self, trade_id: Uuid, user_id: UserId) -> Result<ExchangeTrade> {
        self.handle.cancel_trade(trade_id, user_id).await
    }

    /// Shutdown ledger
    pub async fn shutdown(self) -> Result<()> {
        self.handle.shutdown().await
    }

    /// Validate draft invariants
    fn validate_draft(&self, draft: &TxDraft) -> Result<()> {
        if draft.amount_minor <= 0 {
            return Err(Error::InvalidAmount("Amount must be positive".to_string()));
        }
        if draft.fee_minor < 0 {
            return Err(Error::InvalidAmount("Fee cannot be negative".to_string()));
        }
        if draft.provider_ref.is_empty() {
            return Err(Error::InvalidAmount(
                "Provider reference cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}
