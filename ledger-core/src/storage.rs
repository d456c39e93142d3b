//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `wallets` - One balance row per user (key: user_id)
//! - `transactions` - Append-mostly transaction log (key: tx_id)
//! - `webhook_events` - Inbound provider notifications (key: event_id)
//! - `trades` - Manual exchange orders (key: trade_id)
//! - `indices` - Secondary indices for idempotency and lookups
//!
//! Every balance mutation is committed in one `WriteBatch` together with the
//! transaction row it belongs to, so partial application (debit without a
//! transaction row, or vice versa) is never observable. Callers serialize
//! mutations through the single-writer actor in [`crate::actor`], which makes
//! the read-check-write sequences here atomic.

use crate::{
    error::{Error, Result},
    types::{
        Currency, ExchangeTrade, Provider, SettleOutcome, TradeStatus, Transaction, TxDirection,
        TxDraft, TxStatus, UserId, Wallet, WebhookEvent, WebhookStatus,
    },
    Config,
};
use chrono::Utc;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
use std::sync::Arc;
use uuid::Uuid;

/// Column family names
const CF_WALLETS: &str = "wallets";
const CF_TRANSACTIONS: &str = "transactions";
const CF_WEBHOOK_EVENTS: &str = "webhook_events";
const CF_TRADES: &str = "trades";
const CF_INDICES: &str = "indices";

/// Index key prefixes within `indices`
const IDX_TX_REF: &[u8] = b"txref|";
const IDX_WEBHOOK_REF: &[u8] = b"whref|";
const IDX_USER_TX: &[u8] = b"usertx|";
const IDX_VIRTUAL_ACCOUNT: &[u8] = b"vacct|";

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);
        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_WALLETS, Self::cf_options_hot()),
            ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Self::cf_options_log()),
            ColumnFamilyDescriptor::new(CF_WEBHOOK_EVENTS, Self::cf_options_log()),
            ColumnFamilyDescriptor::new(CF_TRADES, Self::cf_options_hot()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_indices()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = ?path, "Opened ledger RocksDB");

        Ok(Self { db: Arc::new(db) })
    }

    fn cf_options_hot() -> Options {
        let mut opts = Options::default();
        // Frequently read rows, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_log() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_indices() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Index key helpers

    // The provider segment is length-prefixed: provider names may contain
    // any byte, so a plain delimiter could make two (provider, reference)
    // pairs share a key.
    fn idx_ref(prefix: &[u8], provider: &Provider, reference: &str) -> Vec<u8> {
        let name = provider.as_str().as_bytes();
        let mut key = prefix.to_vec();
        key.extend_from_slice(&(name.len() as u32).to_be_bytes());
        key.extend_from_slice(name);
        key.extend_from_slice(reference.as_bytes());
        key
    }

    fn idx_tx_ref(provider: &Provider, reference: &str) -> Vec<u8> {
        Self::idx_ref(IDX_TX_REF, provider, reference)
    }

    fn idx_webhook_ref(provider: &Provider, reference: &str) -> Vec<u8> {
        Self::idx_ref(IDX_WEBHOOK_REF, provider, reference)
    }

    fn idx_user_tx_prefix(user_id: &UserId) -> Vec<u8> {
        let mut key = IDX_USER_TX.to_vec();
        key.extend_from_slice(user_id.as_str().as_bytes());
        key.push(b'|');
        key
    }

    fn idx_user_tx(user_id: &UserId, created_nanos: i64, tx_id: Uuid) -> Vec<u8> {
        let mut key = Self::idx_user_tx_prefix(user_id);
        key.extend_from_slice(&created_nanos.to_be_bytes());
        key.extend_from_slice(tx_id.as_bytes());
        key
    }

    fn idx_virtual_account(account: &str) -> Vec<u8> {
        let mut key = IDX_VIRTUAL_ACCOUNT.to_vec();
        key.extend_from_slice(account.as_bytes());
        key
    }

    // Staging helpers: serialize a row into an in-flight WriteBatch

    fn stage_wallet(&self, batch: &mut WriteBatch, wallet: &Wallet) -> Result<()> {
        let cf = self.cf_handle(CF_WALLETS)?;
        batch.put_cf(cf, wallet.user_id.as_str().as_bytes(), bincode::serialize(wallet)?);
        Ok(())
    }

    fn stage_transaction(&self, batch: &mut WriteBatch, tx: &Transaction, new: bool) -> Result<()> {
        let cf_tx = self.cf_handle(CF_TRANSACTIONS)?;
        batch.put_cf(cf_tx, tx.id.as_bytes(), bincode::serialize(tx)?);

        if new {
            let cf_idx = self.cf_handle(CF_INDICES)?;
            let ref_key = Self::idx_tx_ref(&tx.provider, &tx.provider_ref);
            batch.put_cf(cf_idx, &ref_key, tx.id.as_bytes());

            let created_nanos = tx.created_at.timestamp_nanos_opt().unwrap_or(0);
            let user_key = Self::idx_user_tx(&tx.user_id, created_nanos, tx.id);
            batch.put_cf(cf_idx, &user_key, b"");
        }
        Ok(())
    }

    fn stage_webhook_event(
        &self,
        batch: &mut WriteBatch,
        event: &WebhookEvent,
        new: bool,
    ) -> Result<()> {
        let cf_ev = self.cf_handle(CF_WEBHOOK_EVENTS)?;
        batch.put_cf(cf_ev, event.id.as_bytes(), bincode::serialize(event)?);

        if new {
            let cf_idx = self.cf_handle(CF_INDICES)?;
            let ref_key = Self::idx_webhook_ref(&event.provider, &event.reference);
            batch.put_cf(cf_idx, &ref_key, event.id.as_bytes());
        }
        Ok(())
    }

    // Wallet operations

    /// Get wallet by user, if it exists
    pub fn get_wallet(&self, user_id: &UserId) -> Result<Option<Wallet>> {
        let cf = self.cf_handle(CF_WALLETS)?;
        match self.db.get_cf(cf, user_id.as_str().as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Get existing wallet or create one with zero balance.
    ///
    /// Side-effect-free on repeated calls after creation.
    pub fn get_or_create_wallet(&self, user_id: &UserId, currency: Currency) -> Result<Wallet> {
        if let Some(wallet) = self.get_wallet(user_id)? {
            return Ok(wallet);
        }

        let wallet = Wallet::new(user_id.clone(), currency);
        let mut batch = WriteBatch::default();
        self.stage_wallet(&mut batch, &wallet)?;
        self.db.write(batch)?;

        tracing::info!(user_id = %user_id, currency = %currency, "Wallet created");
        Ok(wallet)
    }

    /// Link an external virtual-account number to a user's wallet
    pub fn link_virtual_account(
        &self,
        user_id: &UserId,
        currency: Currency,
        account: &str,
    ) -> Result<Wallet> {
        let mut wallet = self.get_or_create_wallet(user_id, currency)?;
        if !wallet.virtual_accounts.iter().any(|a| a == account) {
            wallet.virtual_accounts.push(account.to_string());
            wallet.updated_at = Utc::now();
        }

        let mut batch = WriteBatch::default();
        self.stage_wallet(&mut batch, &wallet)?;
        let cf_idx = self.cf_handle(CF_INDICES)?;
        batch.put_cf(
            cf_idx,
            Self::idx_virtual_account(account),
            user_id.as_str().as_bytes(),
        );
        self.db.write(batch)?;

        Ok(wallet)
    }

    /// Resolve a virtual-account number to its owning user
    pub fn find_user_by_virtual_account(&self, account: &str) -> Result<Option<UserId>> {
        let cf = self.cf_handle(CF_INDICES)?;
        match self.db.get_cf(cf, Self::idx_virtual_account(account))? {
            Some(value) => {
                let s = String::from_utf8(value)
                    .map_err(|e| Error::Storage(format!("Corrupt index value: {}", e)))?;
                Ok(Some(UserId::new(s)))
            }
            None => Ok(None),
        }
    }

    // Transaction operations

    /// Get transaction by ID
    pub fn get_transaction(&self, tx_id: Uuid) -> Result<Transaction> {
        let cf = self.cf_handle(CF_TRANSACTIONS)?;
        let value = self
            .db
            .get_cf(cf, tx_id.as_bytes())?
            .ok_or_else(|| Error::TransactionNotFound(tx_id.to_string()))?;
        Ok(bincode::deserialize(&value)?)
    }

    /// Idempotency guard: look up a prior transaction by its reference
    pub fn find_tx_by_reference(
        &self,
        provider: &Provider,
        reference: &str,
    ) -> Result<Option<Transaction>> {
        let cf = self.cf_handle(CF_INDICES)?;
        match self.db.get_cf(cf, Self::idx_tx_ref(provider, reference))? {
            Some(value) => {
                let id_bytes: [u8; 16] = value
                    .as_slice()
                    .try_into()
                    .map_err(|_| Error::Storage("Corrupt reference index".to_string()))?;
                Ok(Some(self.get_transaction(Uuid::from_bytes(id_bytes))?))
            }
            None => Ok(None),
        }
    }

    /// List a user's transactions in creation order (via index)
    pub fn list_user_transactions(&self, user_id: &UserId) -> Result<Vec<Transaction>> {
        let cf = self.cf_handle(CF_INDICES)?;
        let prefix = Self::idx_user_tx_prefix(user_id);

        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&prefix, rocksdb::Direction::Forward));
        let mut transactions = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            // Key layout: prefix || created_nanos (8) || tx_id (16)
            if key.len() >= prefix.len() + 24 {
                let id = Uuid::from_slice(&key[key.len() - 16..])
                    .map_err(|e| Error::Storage(format!("Corrupt index key: {}", e)))?;
                transactions.push(self.get_transaction(id)?);
            }
        }
        Ok(transactions)
    }

    /// Atomically verify balance, debit the wallet, and insert a `pending`
    /// transaction carrying the idempotency reference.
    ///
    /// Fails with [`Error::InsufficientFunds`] before anything is written;
    /// fails with [`Error::DuplicateReference`] if the reference already won
    /// a prior insert.
    pub fn reserve_and_debit(&self, draft: TxDraft) -> Result<Transaction> {
        if let Some(existing) = self.find_tx_by_reference(&draft.provider, &draft.provider_ref)? {
            return Err(Error::DuplicateReference {
                provider: draft.provider.as_str().to_string(),
                reference: draft.provider_ref,
                existing: existing.id,
            });
        }

        let mut wallet = self.get_or_create_wallet(&draft.user_id, draft.currency)?;
        let total = draft.total_minor();
        if wallet.balance_minor < total {
            return Err(Error::InsufficientFunds {
                available_minor: wallet.balance_minor,
                required_minor: total,
            });
        }

        wallet.balance_minor -= total;
        wallet.updated_at = Utc::now();
        let tx = Transaction::from_draft(draft, TxStatus::Pending);

        let mut batch = WriteBatch::default();
        self.stage_wallet(&mut batch, &wallet)?;
        self.stage_transaction(&mut batch, &tx, true)?;
        self.db.write(batch)?;

        tracing::info!(
            tx_id = %tx.id,
            user_id = %tx.user_id,
            total_minor = tx.total_minor,
            provider_ref = %tx.provider_ref,
            "Funds reserved"
        );
        Ok(tx)
    }

    /// Atomically increment the wallet balance and insert a settled credit
    /// transaction (wallet funding, exchange payout).
    pub fn credit_wallet(&self, draft: TxDraft) -> Result<Transaction> {
        let mut batch = WriteBatch::default();
        let tx = self.apply_credit(&mut batch, draft)?;
        self.db.write(batch)?;

        tracing::info!(
            tx_id = %tx.id,
            user_id = %tx.user_id,
            total_minor = tx.total_minor,
            "Wallet credited"
        );
        Ok(tx)
    }

    fn apply_credit(&self, batch: &mut WriteBatch, draft: TxDraft) -> Result<Transaction> {
        if let Some(existing) = self.find_tx_by_reference(&draft.provider, &draft.provider_ref)? {
            return Err(Error::DuplicateReference {
                provider: draft.provider.as_str().to_string(),
                reference: draft.provider_ref,
                existing: existing.id,
            });
        }

        let mut wallet = self.get_or_create_wallet(&draft.user_id, draft.currency)?;
        let total = draft.total_minor();
        wallet.balance_minor = wallet
            .balance_minor
            .checked_add(total)
            .ok_or_else(|| Error::InvalidAmount("Balance overflow".to_string()))?;
        wallet.updated_at = Utc::now();

        let tx = Transaction::from_draft(draft, TxStatus::Success);

        self.stage_wallet(batch, &wallet)?;
        self.stage_transaction(batch, &tx, true)?;
        Ok(tx)
    }

    /// Atomically move a transaction to a terminal status; on failure of a
    /// debit that is still pending, refund the full reserved amount in the
    /// same batch.
    ///
    /// Returns the transaction and whether a compensating credit was applied
    /// by this call. Calling again on a terminal transaction is a no-op, which
    /// is what makes the refund exactly-once when the orchestrator's failure
    /// path races a webhook failure.
    pub fn finalize(&self, tx_id: Uuid, outcome: SettleOutcome) -> Result<(Transaction, bool)> {
        let mut batch = WriteBatch::default();
        let (tx, refunded) = self.apply_finalize(&mut batch, tx_id, outcome)?;
        if refunded || !batch.is_empty() {
            self.db.write(batch)?;
        }
        Ok((tx, refunded))
    }

    fn apply_finalize(
        &self,
        batch: &mut WriteBatch,
        tx_id: Uuid,
        outcome: SettleOutcome,
    ) -> Result<(Transaction, bool)> {
        let mut tx = self.get_transaction(tx_id)?;

        // Check-and-set: a terminal transaction is authoritative
        if tx.status.is_terminal() {
            return Ok((tx, false));
        }

        let mut refunded = false;
        match outcome {
            SettleOutcome::Success { provider_tx_id } => {
                tx.status = TxStatus::Success;
                if provider_tx_id.is_some() {
                    tx.provider_tx_id = provider_tx_id;
                }
            }
            SettleOutcome::Failure { reason } => {
                tx.status = TxStatus::Failed;
                if let serde_json::Value::Object(ref mut map) = tx.meta {
                    map.insert(
                        "failure_reason".to_string(),
                        serde_json::Value::String(reason.clone()),
                    );
                }

                if tx.direction == TxDirection::Debit {
                    let mut wallet = self
                        .get_wallet(&tx.user_id)?
                        .ok_or_else(|| Error::WalletNotFound(tx.user_id.to_string()))?;
                    wallet.balance_minor = wallet
                        .balance_minor
                        .checked_add(tx.total_minor)
                        .ok_or_else(|| Error::InvalidAmount("Balance overflow".to_string()))?;
                    wallet.updated_at = Utc::now();
                    self.stage_wallet(batch, &wallet)?;
                    refunded = true;

                    tracing::warn!(
                        tx_id = %tx.id,
                        user_id = %tx.user_id,
                        total_minor = tx.total_minor,
                        reason = %reason,
                        "Debit failed, compensating refund applied"
                    );
                }
            }
        }

        tx.updated_at = Utc::now();
        self.stage_transaction(batch, &tx, false)?;
        Ok((tx, refunded))
    }

    /// Variable-cost settlement: reconcile a pending debit with the amount
    /// the provider actually charged.
    ///
    /// Verifies the wallet covers the delta above the original reservation,
    /// debits it, and rewrites the transaction's amount/fee/total fields, all
    /// in one atomic unit. A cheaper-than-reserved charge returns the
    /// difference to the wallet.
    pub fn apply_actual_charge(
        &self,
        tx_id: Uuid,
        actual_amount_minor: i64,
        actual_fee_minor: i64,
    ) -> Result<Transaction> {
        let mut tx = self.get_transaction(tx_id)?;

        if tx.status != TxStatus::Pending || tx.direction != TxDirection::Debit {
            return Err(Error::InvalidTransition(format!(
                "Actual charge only applies to pending debits, transaction {} is {:?}",
                tx.id, tx.status
            )));
        }

        let actual_total = actual_amount_minor.saturating_add(actual_fee_minor);
        let delta = actual_total - tx.total_minor;

        let mut wallet = self
            .get_wallet(&tx.user_id)?
            .ok_or_else(|| Error::WalletNotFound(tx.user_id.to_string()))?;

        if delta > 0 && wallet.balance_minor < delta {
            return Err(Error::InsufficientFundsForProviderCharge {
                available_minor: wallet.balance_minor,
                required_minor: delta,
            });
        }

        wallet.balance_minor = wallet
            .balance_minor
            .checked_sub(delta)
            .ok_or_else(|| Error::InvalidAmount("Balance overflow".to_string()))?;
        wallet.updated_at = Utc::now();

        tx.amount_minor = actual_amount_minor;
        tx.fee_minor = actual_fee_minor;
        tx.total_minor = actual_total;
        tx.updated_at = Utc::now();

        let mut batch = WriteBatch::default();
        self.stage_wallet(&mut batch, &wallet)?;
        self.stage_transaction(&mut batch, &tx, false)?;
        self.db.write(batch)?;

        tracing::info!(
            tx_id = %tx.id,
            delta_minor = delta,
            actual_total_minor = actual_total,
            "Actual provider charge applied"
        );
        Ok(tx)
    }

    // Webhook event operations

    /// Persist an inbound webhook delivery before any business logic runs.
    ///
    /// Fails with [`Error::DuplicateDelivery`] if `(provider, reference)` was
    /// already recorded: the at-least-once dedup boundary.
    pub fn record_webhook_event(&self, event: WebhookEvent) -> Result<WebhookEvent> {
        let cf_idx = self.cf_handle(CF_INDICES)?;
        let ref_key = Self::idx_webhook_ref(&event.provider, &event.reference);
        if let Some(value) = self.db.get_cf(cf_idx, &ref_key)? {
            let id_bytes: [u8; 16] = value
                .as_slice()
                .try_into()
                .map_err(|_| Error::Storage("Corrupt webhook index".to_string()))?;
            return Err(Error::DuplicateDelivery {
                provider: event.provider.as_str().to_string(),
                reference: event.reference,
                existing: Uuid::from_bytes(id_bytes),
            });
        }

        let mut batch = WriteBatch::default();
        self.stage_webhook_event(&mut batch, &event, true)?;
        self.db.write(batch)?;

        tracing::debug!(
            event_id = %event.id,
            provider = %event.provider,
            reference = %event.reference,
            "Webhook event recorded"
        );
        Ok(event)
    }

    /// Get webhook event by ID
    pub fn get_webhook_event(&self, event_id: Uuid) -> Result<WebhookEvent> {
        let cf = self.cf_handle(CF_WEBHOOK_EVENTS)?;
        let value = self
            .db
            .get_cf(cf, event_id.as_bytes())?
            .ok_or_else(|| Error::Other(format!("Webhook event not found: {}", event_id)))?;
        Ok(bincode::deserialize(&value)?)
    }

    /// Update a webhook event's processing status
    pub fn mark_webhook_event(
        &self,
        event_id: Uuid,
        status: WebhookStatus,
    ) -> Result<WebhookEvent> {
        let mut event = self.get_webhook_event(event_id)?;
        event.status = status;
        event.processed_at = Some(Utc::now());

        let mut batch = WriteBatch::default();
        self.stage_webhook_event(&mut batch, &event, false)?;
        self.db.write(batch)?;
        Ok(event)
    }

    /// Credit a wallet for a funding webhook and mark the event in the same
    /// atomic unit, so a crash cannot leave the ledger and the event status
    /// disagreeing.
    pub fn credit_and_mark(
        &self,
        event_id: Uuid,
        draft: TxDraft,
    ) -> Result<(Transaction, WebhookEvent)> {
        let mut event = self.get_webhook_event(event_id)?;
        let mut batch = WriteBatch::default();

        let tx = self.apply_credit(&mut batch, draft)?;

        event.status = WebhookStatus::Processed;
        event.processed_at = Some(Utc::now());
        self.stage_webhook_event(&mut batch, &event, false)?;

        self.db.write(batch)?;

        tracing::info!(
            event_id = %event.id,
            tx_id = %tx.id,
            total_minor = tx.total_minor,
            "Funding webhook credited"
        );
        Ok((tx, event))
    }

    /// Finalize a transaction from a status-update webhook and mark the event
    /// in the same atomic unit. The event is marked `Processed` on a success
    /// outcome and `Failed` when the terminal outcome was itself a failure.
    pub fn finalize_and_mark(
        &self,
        event_id: Uuid,
        tx_id: Uuid,
        outcome: SettleOutcome,
    ) -> Result<(Transaction, WebhookEvent, bool)> {
        let mut event = self.get_webhook_event(event_id)?;
        let mut batch = WriteBatch::default();

        let failed = matches!(outcome, SettleOutcome::Failure { .. });
        let (tx, refunded) = self.apply_finalize(&mut batch, tx_id, outcome)?;

        event.status = if failed {
            WebhookStatus::Failed
        } else {
            WebhookStatus::Processed
        };
        event.processed_at = Some(Utc::now());
        self.stage_webhook_event(&mut batch, &event, false)?;

        self.db.write(batch)?;
        Ok((tx, event, refunded))
    }

    // Exchange trade operations

    /// Insert a new trade
    pub fn put_trade(&self, trade: &ExchangeTrade) -> Result<()> {
        let cf = self.cf_handle(CF_TRADES)?;
        self.db
            .put_cf(cf, trade.id.as_bytes(), bincode::serialize(trade)?)?;
        Ok(())
    }

    /// Get trade by ID
    pub fn get_trade(&self, trade_id: Uuid) -> Result<ExchangeTrade> {
        let cf = self.cf_handle(CF_TRADES)?;
        let value = self
            .db
            .get_cf(cf, trade_id.as_bytes())?
            .ok_or_else(|| Error::TradeNotFound(trade_id.to_string()))?;
        Ok(bincode::deserialize(&value)?)
    }

    /// Lazily transition an overdue `PendingPayment` trade to `Expired`.
    ///
    /// Returns the (possibly updated) trade; must be run before any read-path
    /// decision on a trade.
    pub fn expire_trade_if_overdue(&self, trade_id: Uuid) -> Result<ExchangeTrade> {
        let mut trade = self.get_trade(trade_id)?;
        if trade.is_overdue(Utc::now()) {
            trade.status = TradeStatus::Expired;
            trade.updated_at = Utc::now();
            self.put_trade(&trade)?;
            tracing::info!(trade_id = %trade.id, "Trade expired");
        }
        Ok(trade)
    }

    /// Check-and-set trade status transition
    pub fn transition_trade(
        &self,
        trade_id: Uuid,
        from: TradeStatus,
        to: TradeStatus,
    ) -> Result<ExchangeTrade> {
        let mut trade = self.expire_trade_if_overdue(trade_id)?;
        if trade.status != from {
            return Err(Error::InvalidTransition(format!(
                "Trade {} is {:?}, expected {:?}",
                trade_id, trade.status, from
            )));
        }
        trade.status = to;
        trade.updated_at = Utc::now();
        self.put_trade(&trade)?;

        tracing::info!(trade_id = %trade.id, from = ?from, to = ?to, "Trade transitioned");
        Ok(trade)
    }

    /// Cancel a trade: deletes the record, allowed only from
    /// `PendingPayment` (before any money has moved).
    pub fn cancel_trade(&self, trade_id: Uuid, user_id: &UserId) -> Result<ExchangeTrade> {
        let trade = self.expire_trade_if_overdue(trade_id)?;
        if &trade.user_id != user_id {
            return Err(Error::TradeNotFound(trade_id.to_string()));
        }
        if trade.status != TradeStatus::PendingPayment {
            return Err(Error::InvalidTransition(format!(
                "Trade {} is {:?}, only PendingPayment trades can be cancelled",
                trade_id, trade.status
            )));
        }

        let cf = self.cf_handle(CF_TRADES)?;
        self.db.delete_cf(cf, trade_id.as_bytes())?;

        tracing::info!(trade_id = %trade.id, user_id = %user_id, "Trade cancelled");
        Ok(trade)
    }

    /// Close database (graceful shutdown)
    pub fn close(self) -> Result<()> {
        drop(self.db);
        tracing::info!("Ledger RocksDB closed gracefully");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TxCategory;
    use tempfile::TempDir;

    fn test_storage() -> (Storage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (Storage::open(&config).unwrap(), temp_dir)
    }

    fn debit_draft(user: &str, amount: i64, reference: &str) -> TxDraft {
        TxDraft {
            user_id: UserId::new(user),
            direction: TxDirection::Debit,
            category: TxCategory::Airtime,
            amount_minor: amount,
            fee_minor: 0,
            currency: Currency::NGN,
            provider: Provider::new("bills-agg"),
            provider_ref: reference.to_string(),
            meta: serde_json::json!({}),
        }
    }

    fn credit_draft(user: &str, amount: i64, reference: &str) -> TxDraft {
        TxDraft {
            user_id: UserId::new(user),
            direction: TxDirection::Credit,
            category: TxCategory::WalletFunding,
            amount_minor: amount,
            fee_minor: 0,
            currency: Currency::NGN,
            provider: Provider::new("paygate"),
            provider_ref: reference.to_string(),
            meta: serde_json::json!({}),
        }
    }

    #[test]
    fn test_get_or_create_wallet_idempotent() {
        let (storage, _temp) = test_storage();
        let user = UserId::new("u1");

        let w1 = storage.get_or_create_wallet(&user, Currency::NGN).unwrap();
        assert_eq!(w1.balance_minor, 0);

        let w2 = storage.get_or_create_wallet(&user, Currency::NGN).unwrap();
        assert_eq!(w2.created_at, w1.created_at);
    }

    #[test]
    fn test_reserve_and_debit_insufficient() {
        let (storage, _temp) = test_storage();

        let result = storage.reserve_and_debit(debit_draft("u1", 5000, "r1"));
        assert!(matches!(result, Err(Error::InsufficientFunds { .. })));

        // Nothing was written
        assert!(storage
            .find_tx_by_reference(&Provider::new("bills-agg"), "r1")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_reserve_then_finalize_success() {
        let (storage, _temp) = test_storage();
        storage.credit_wallet(credit_draft("u1", 10_000, "fund-1")).unwrap();

        let tx = storage.reserve_and_debit(debit_draft("u1", 5000, "r1")).unwrap();
        assert_eq!(tx.status, TxStatus::Pending);
        assert_eq!(
            storage.get_wallet(&UserId::new("u1")).unwrap().unwrap().balance_minor,
            5000
        );

        let (tx, refunded) = storage
            .finalize(
                tx.id,
                SettleOutcome::Success {
                    provider_tx_id: Some("prov-99".to_string()),
                },
            )
            .unwrap();
        assert!(!refunded);
        assert_eq!(tx.status, TxStatus::Success);
        assert_eq!(tx.provider_tx_id.as_deref(), Some("prov-99"));
        assert_eq!(
            storage.get_wallet(&UserId::new("u1")).unwrap().unwrap().balance_minor,
            5000
        );
    }

    #[test]
    fn test_finalize_failure_refunds_once() {
        let (storage, _temp) = test_storage();
        storage.credit_wallet(credit_draft("u1", 10_000, "fund-1")).unwrap();
        let tx = storage.reserve_and_debit(debit_draft("u1", 5000, "r1")).unwrap();

        let (tx, refunded) = storage
            .finalize(
                tx.id,
                SettleOutcome::Failure {
                    reason: "provider timeout".to_string(),
                },
            )
            .unwrap();
        assert!(refunded);
        assert_eq!(tx.status, TxStatus::Failed);
        assert_eq!(
            storage.get_wallet(&UserId::new("u1")).unwrap().unwrap().balance_minor,
            10_000
        );

        // Second failure (e.g. late webhook) must not refund again
        let (tx, refunded) = storage
            .finalize(
                tx.id,
                SettleOutcome::Failure {
                    reason: "webhook says failed".to_string(),
                },
            )
            .unwrap();
        assert!(!refunded);
        assert_eq!(tx.status, TxStatus::Failed);
        assert_eq!(
            storage.get_wallet(&UserId::new("u1")).unwrap().unwrap().balance_minor,
            10_000
        );
    }

    #[test]
    fn test_duplicate_reference_rejected() {
        let (storage, _temp) = test_storage();
        storage.credit_wallet(credit_draft("u1", 20_000, "fund-1")).unwrap();

        let tx = storage.reserve_and_debit(debit_draft("u1", 5000, "r1")).unwrap();
        let result = storage.reserve_and_debit(debit_draft("u1", 5000, "r1"));

        match result {
            Err(Error::DuplicateReference { existing, .. }) => assert_eq!(existing, tx.id),
            other => panic!("expected DuplicateReference, got {:?}", other),
        }
        // Only one debit went through
        assert_eq!(
            storage.get_wallet(&UserId::new("u1")).unwrap().unwrap().balance_minor,
            15_000
        );
    }

    #[test]
    fn test_apply_actual_charge_delta() {
        let (storage, _temp) = test_storage();
        storage.credit_wallet(credit_draft("u1", 1000, "fund-1")).unwrap();

        let tx = storage.reserve_and_debit(debit_draft("u1", 500, "r1")).unwrap();
        // Provider charged 520 in total (500 + 20 fee)
        let tx = storage.apply_actual_charge(tx.id, 500, 20).unwrap();
        assert_eq!(tx.total_minor, 520);
        assert_eq!(
            storage.get_wallet(&UserId::new("u1")).unwrap().unwrap().balance_minor,
            480
        );
    }

    #[test]
    fn test_apply_actual_charge_insufficient() {
        let (storage, _temp) = test_storage();
        storage.credit_wallet(credit_draft("u1", 510, "fund-1")).unwrap();

        let tx = storage.reserve_and_debit(debit_draft("u1", 500, "r1")).unwrap();
        // Only 10 left in the wallet, provider wants 20 more
        let result = storage.apply_actual_charge(tx.id, 500, 20);
        assert!(matches!(
            result,
            Err(Error::InsufficientFundsForProviderCharge { .. })
        ));

        // Reservation untouched; the orchestrator finalizes and refunds
        let (tx, refunded) = storage
            .finalize(
                tx.id,
                SettleOutcome::Failure {
                    reason: "insufficient for actual charge".to_string(),
                },
            )
            .unwrap();
        assert!(refunded);
        assert_eq!(tx.total_minor, 500);
        assert_eq!(
            storage.get_wallet(&UserId::new("u1")).unwrap().unwrap().balance_minor,
            510
        );
    }

    #[test]
    fn test_reference_index_distinguishes_provider_boundary() {
        let (storage, _temp) = test_storage();

        // ("agg", "b|c") and ("agg|b", "c") concatenate identically; they
        // must still be two distinct references
        let mut first = credit_draft("u1", 1000, "b|c");
        first.provider = Provider::new("agg");
        let mut second = credit_draft("u2", 2000, "c");
        second.provider = Provider::new("agg|b");

        let tx1 = storage.credit_wallet(first).unwrap();
        let tx2 = storage.credit_wallet(second).unwrap();

        let found1 = storage
            .find_tx_by_reference(&Provider::new("agg"), "b|c")
            .unwrap()
            .unwrap();
        let found2 = storage
            .find_tx_by_reference(&Provider::new("agg|b"), "c")
            .unwrap()
            .unwrap();
        assert_eq!(found1.id, tx1.id);
        assert_eq!(found2.id, tx2.id);
    }

    #[test]
    fn test_webhook_event_dedup() {
        let (storage, _temp) = test_storage();
        let event = WebhookEvent::received(
            Provider::new("paygate"),
            "evt-1",
            "charge.success",
            serde_json::json!({"amount": 250000}),
        );
        let stored = storage.record_webhook_event(event.clone()).unwrap();

        let dup = WebhookEvent::received(
            Provider::new("paygate"),
            "evt-1",
            "charge.success",
            serde_json::json!({"amount": 250000}),
        );
        match storage.record_webhook_event(dup) {
            Err(Error::DuplicateDelivery { existing, .. }) => assert_eq!(existing, stored.id),
            other => panic!("expected DuplicateDelivery, got {:?}", other),
        }
    }

    #[test]
    fn test_credit_and_mark_atomic() {
        let (storage, _temp) = test_storage();
        let event = storage
            .record_webhook_event(WebhookEvent::received(
                Provider::new("paygate"),
                "evt-1",
                "charge.success",
                serde_json::json!({}),
            ))
            .unwrap();

        let (tx, event) = storage
            .credit_and_mark(event.id, credit_draft("u1", 250_000, "pay-1"))
            .unwrap();
        assert_eq!(tx.status, TxStatus::Success);
        assert_eq!(event.status, WebhookStatus::Processed);
        assert_eq!(
            storage.get_wallet(&UserId::new("u1")).unwrap().unwrap().balance_minor,
            250_000
        );
    }

    #[test]
    fn test_virtual_account_resolution() {
        let (storage, _temp) = test_storage();
        let user = UserId::new("u1");
        storage
            .link_virtual_account(&user, Currency::NGN, "9912345678")
            .unwrap();

        assert_eq!(
            storage.find_user_by_virtual_account("9912345678").unwrap(),
            Some(user)
        );
        assert_eq!(storage.find_user_by_virtual_account("0000000000").unwrap(), None);
    }

    #[test]
    fn test_trade_lifecycle_and_cancel() {
        let (storage, _temp) = test_storage();
        let user = UserId::new("u1");
        let trade = ExchangeTrade {
            id: Uuid::now_v7(),
            user_id: user.clone(),
            sell_currency: Currency::NGN,
            buy_currency: Currency::USD,
            sell_amount_minor: 1_000_000,
            buy_amount_minor: 650,
            rate: rust_decimal::Decimal::new(65, 5),
            status: TradeStatus::PendingPayment,
            expires_at: Utc::now() + chrono::Duration::minutes(30),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        storage.put_trade(&trade).unwrap();

        let cancelled = storage.cancel_trade(trade.id, &user).unwrap();
        assert_eq!(cancelled.status, TradeStatus::PendingPayment);
        assert!(matches!(
            storage.get_trade(trade.id),
            Err(Error::TradeNotFound(_))
        ));
    }

    #[test]
    fn test_trade_lazy_expiry() {
        let (storage, _temp) = test_storage();
        let trade = ExchangeTrade {
            id: Uuid::now_v7(),
            user_id: UserId::new("u1"),
            sell_currency: Currency::NGN,
            buy_currency: Currency::USD,
            sell_amount_minor: 1_000_000,
            buy_amount_minor: 650,
            rate: rust_decimal::Decimal::new(65, 5),
            status: TradeStatus::PendingPayment,
            expires_at: Utc::now() - chrono::Duration::minutes(1),
            created_at: Utc::now() - chrono::Duration::minutes(31),
            updated_at: Utc::now() - chrono::Duration::minutes(31),
        };
        storage.put_trade(&trade).unwrap();

        let trade = storage.expire_trade_if_overdue(trade.id).unwrap();
        assert_eq!(trade.status, TradeStatus::Expired);

        // Expired trades can no longer be advanced
        let result = storage.transition_trade(
            trade.id,
            TradeStatus::PendingPayment,
            TradeStatus::PaidAwaitingConfirmation,
        );
        assert!(matches!(result, Err(Error::InvalidTransition(_))));
    }

    #[test]
    fn test_list_user_transactions() {
        let (storage, _temp) = test_storage();
        storage.credit_wallet(credit_draft("u1", 10_000, "fund-1")).unwrap();
        storage.reserve_and_debit(debit_draft("u1", 1000, "r1")).unwrap();
        storage.reserve_and_debit(debit_draft("u1", 2000, "r2")).unwrap();

        let txs = storage.list_user_transactions(&UserId::new("u1")).unwrap();
        assert_eq!(txs.len(), 3);
        assert!(txs.iter().all(|t| t.user_id == UserId::new("u1")));
    }
}
