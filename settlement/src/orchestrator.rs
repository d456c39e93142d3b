//! Settlement orchestration
//!
//! Drives the reserve → provider call → finalize cycle:
//!
//! 1. **Reserve**: balance check + debit + pending transaction, atomically.
//!    Insufficient funds stop here; the provider is never called.
//! 2. **Execute**: call the provider adapter under a deadline.
//! 3. **Finalize**: success marks the transaction settled; any failure
//!    (decline, timeout, unreachable) refunds the reservation exactly once.
//!
//! Retries with the same idempotency key replay the original transaction
//! without a second debit or a second provider call.

use crate::{
    config::Config,
    metrics::Metrics,
    provider::{ProviderAdapter, ProviderError},
    ratelimit::RateLimiter,
    types::{ProviderOutcome, ProviderRequest, ProviderStatus, SettleCommand, SettlementReceipt},
    Error, Result,
};
use ledger_core::{
    Ledger, Provider, SettleOutcome, Transaction, TxDirection, TxDraft, UserId,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{timeout, Duration};
use uuid::Uuid;

/// Settlement orchestrator
pub struct Orchestrator {
    /// Wallet ledger
    ledger: Ledger,

    /// Registered provider adapters, keyed by adapter name
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,

    /// Provider call deadline
    provider_timeout: Duration,

    /// Per-user request limiter
    limiter: RateLimiter,

    /// Metrics collector
    metrics: Metrics,
}

impl Orchestrator {
    /// Create an orchestrator, opening the ledger from configuration
    pub fn new(config: Config) -> Result<Self> {
        let ledger_config = ledger_core::Config {
            data_dir: config.ledger_data_dir.clone(),
            ..Default::default()
        };
        let ledger = Ledger::open(ledger_config)?;
        Self::with_ledger(ledger, config)
    }

    /// Create an orchestrator around an already-open ledger
    pub fn with_ledger(ledger: Ledger, config: Config) -> Result<Self> {
        let metrics = Metrics::new().map_err(|e| Error::Other(e.to_string()))?;
        Ok(Self {
            ledger,
            adapters: HashMap::new(),
            provider_timeout: Duration::from_millis(config.provider_timeout_ms),
            limiter: RateLimiter::new(config.ratelimit),
            metrics,
        })
    }

    /// Register a provider adapter under its own name
    pub fn register_adapter(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.name().to_string(), adapter);
    }

    /// Access the underlying ledger
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Access the metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Settle a purchase end to end
    pub async fn settle(&self, cmd: SettleCommand) -> Result<SettlementReceipt> {
        let started = Instant::now();
        self.limiter.check(&cmd.user_id)?;
        self.validate(&cmd)?;

        let adapter = self.adapter_for(&cmd.provider)?;
        let reference = cmd
            .idempotency_key
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        // Reserve: balance check + debit + pending row, atomically
        let draft = TxDraft {
            user_id: cmd.user_id.clone(),
            direction: TxDirection::Debit,
            category: cmd.category,
            amount_minor: cmd.amount_minor,
            fee_minor: cmd.fee_minor,
            currency: self.ledger.default_currency(),
            provider: cmd.provider.clone(),
            provider_ref: reference.clone(),
            meta: cmd.params.clone(),
        };

        let tx = match self.ledger.reserve_and_debit(draft).await {
            Ok(tx) => tx,
            Err(ledger_core::Error::DuplicateReference { existing, .. }) => {
                // Idempotent replay: surface the transaction that won
                let tx = self.ledger.get_transaction(existing)?;
                tracing::info!(
                    tx_id = %tx.id,
                    reference = %reference,
                    status = ?tx.status,
                    "Idempotency key replayed"
                );
                self.metrics.replayed_total.inc();
                return Ok(SettlementReceipt {
                    balance_minor: self.balance_of(&cmd.user_id)?,
                    transaction: tx,
                    replayed: true,
                });
            }
            Err(e) => return Err(e.into()),
        };

        // Execute under a deadline
        let request = ProviderRequest {
            transaction_id: tx.id,
            reference: reference.clone(),
            category: cmd.category,
            amount_minor: cmd.amount_minor,
            currency: tx.currency,
            params: cmd.params.clone(),
        };

        let outcome = match timeout(self.provider_timeout, adapter.execute(&request)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(ProviderError::Declined { reason, raw })) => {
                tracing::warn!(tx_id = %tx.id, reason = %reason, raw = %raw, "Provider declined");
                self.fail(tx.id, &reason).await?;
                self.metrics.declined_total.inc();
                return Err(Error::ProviderDeclined {
                    transaction_id: tx.id,
                    reason,
                });
            }
            Ok(Err(e)) => {
                let reason = e.to_string();
                tracing::error!(tx_id = %tx.id, reason = %reason, "Provider unavailable");
                self.fail(tx.id, &reason).await?;
                self.metrics.timeout_total.inc();
                return Err(Error::ProviderUnavailable {
                    transaction_id: tx.id,
                    reason,
                });
            }
            Err(_) => {
                let reason = format!(
                    "Provider call exceeded {}ms deadline",
                    self.provider_timeout.as_millis()
                );
                tracing::error!(tx_id = %tx.id, "Provider call timed out");
                self.fail(tx.id, &reason).await?;
                self.metrics.timeout_total.inc();
                return Err(Error::ProviderUnavailable {
                    transaction_id: tx.id,
                    reason,
                });
            }
        };

        // Variable-cost products: reconcile with what was actually charged
        if let Some(actual_amount) = outcome.actual_amount_minor {
            let actual_fee = outcome.actual_fee_minor.unwrap_or(tx.fee_minor);
            if let Err(e) = self
                .ledger
                .apply_actual_charge(tx.id, actual_amount, actual_fee)
                .await
            {
                self.fail(tx.id, "Wallet could not cover actual provider charge")
                    .await?;
                return Err(e.into());
            }
        }

        let (tx, _) = self
            .ledger
            .finalize(
                tx.id,
                SettleOutcome::Success {
                    provider_tx_id: outcome.provider_tx_id.clone(),
                },
            )
            .await?;

        self.metrics.success_total.inc();
        self.metrics
            .duration
            .observe(started.elapsed().as_secs_f64());
        tracing::info!(
            tx_id = %tx.id,
            user_id = %tx.user_id,
            total_minor = tx.total_minor,
            provider = %tx.provider,
            "Settlement complete"
        );

        Ok(SettlementReceipt {
            balance_minor: self.balance_of(&tx.user_id)?,
            transaction: tx,
            replayed: false,
        })
    }

    /// Re-query the provider for a transaction stuck in `Pending` and apply
    /// the answer. A still-pending answer leaves the transaction untouched.
    pub async fn refresh(&self, tx_id: Uuid) -> Result<Transaction> {
        let tx = self.ledger.get_transaction(tx_id)?;
        if tx.status.is_terminal() {
            return Ok(tx);
        }

        let adapter = self.adapter_for(&tx.provider)?;
        match adapter.check_status(&tx.provider_ref).await {
            Ok(ProviderStatus::Pending) => Ok(tx),
            Ok(ProviderStatus::Settled { provider_tx_id }) => {
                let (tx, _) = self
                    .ledger
                    .finalize(tx.id, SettleOutcome::Success { provider_tx_id })
                    .await?;
                Ok(tx)
            }
            Ok(ProviderStatus::Failed { reason }) => {
                let (tx, refunded) = self
                    .ledger
                    .finalize(tx.id, SettleOutcome::Failure { reason })
                    .await?;
                if refunded {
                    tracing::info!(tx_id = %tx.id, "Refresh refunded failed settlement");
                }
                Ok(tx)
            }
            Err(e) => Err(Error::ProviderUnavailable {
                transaction_id: tx.id,
                reason: e.to_string(),
            }),
        }
    }

    fn validate(&self, cmd: &SettleCommand) -> Result<()> {
        if cmd.amount_minor <= 0 {
            return Err(Error::InvalidCommand("Amount must be positive".to_string()));
        }
        if cmd.fee_minor < 0 {
            return Err(Error::InvalidCommand("Fee cannot be negative".to_string()));
        }
        if let Some(expected) = cmd.catalog_price_minor {
            if expected != cmd.amount_minor {
                return Err(Error::AmountMismatch {
                    expected_minor: expected,
                    got_minor: cmd.amount_minor,
                });
            }
        }
        Ok(())
    }

    fn adapter_for(&self, provider: &Provider) -> Result<Arc<dyn ProviderAdapter>> {
        self.adapters
            .get(provider.as_str())
            .cloned()
            .ok_or_else(|| Error::UnknownProvider(provider.as_str().to_string()))
    }

    async fn fail(&self, tx_id: Uuid, reason: &str) -> Result<()> {
        self.ledger
            .finalize(
                tx_id,
                SettleOutcome::Failure {
                    reason: reason.to_string(),
                },
            )
            .await?;
        Ok(())
    }

    fn balance_of(&self, user_id: &UserId) -> Result<i64> {
        Ok(self
            .ledger
            .get_wallet(user_id)?
            .map(|w| w.balance_minor)
            .unwrap_or(0))
    }
}
