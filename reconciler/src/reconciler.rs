//! Webhook ingest pipeline
//!
//! Deliveries move through a fixed sequence:
//!
//! 1. **Authenticate**: verify the provider signature against the raw body.
//!    Failures are dropped before anything is stored.
//! 2. **Record**: persist the delivery keyed by `(provider, reference)`.
//!    A redelivery stops here and is acknowledged as a duplicate.
//! 3. **Apply**: funding events credit the resolved wallet; status events
//!    finalize the matching transaction; lifecycle noise is ignored. The
//!    ledger write and the event status update commit atomically.
//!
//! Providers deliver at least once and out of order; every outcome returns
//! an [`Ack`] so the HTTP layer can answer 200 and stop the retry storm.

use crate::{
    config::{Config, ProviderProfile},
    metrics::Metrics,
    signature,
    types::{Ack, WebhookDecoder, WebhookKind},
    Error, Result,
};
use ledger_core::{
    Ledger, Provider, SettleOutcome, TxCategory, TxDirection, TxDraft, TxStatus, UserId,
    WebhookEvent, WebhookStatus,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Webhook reconciler
pub struct Reconciler {
    /// Wallet ledger
    ledger: Ledger,

    /// Per-provider authentication profiles
    profiles: HashMap<String, ProviderProfile>,

    /// Per-provider payload decoders
    decoders: HashMap<String, Arc<dyn WebhookDecoder>>,

    /// Metrics collector
    metrics: Metrics,
}

impl Reconciler {
    /// Create a reconciler over an open ledger
    pub fn new(ledger: Ledger, config: Config) -> Result<Self> {
        let metrics = Metrics::new().map_err(|e| Error::Other(e.to_string()))?;
        Ok(Self {
            ledger,
            profiles: config.providers,
            decoders: HashMap::new(),
            metrics,
        })
    }

    /// Register a payload decoder under its own name
    pub fn register_decoder(&mut self, decoder: Arc<dyn WebhookDecoder>) {
        self.decoders.insert(decoder.name().to_string(), decoder);
    }

    /// Access the metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Ingest one delivery: raw body plus the provider's signature header
    pub async fn ingest(
        &self,
        provider_name: &str,
        signature_header: Option<&str>,
        body: &[u8],
    ) -> Result<Ack> {
        let profile = self
            .profiles
            .get(provider_name)
            .ok_or_else(|| Error::UnknownProvider(provider_name.to_string()))?;

        if let Some(secret) = &profile.secret {
            let header = signature_header
                .ok_or_else(|| Error::MissingSignature(provider_name.to_string()))?;
            if let Err(e) = signature::verify(profile.scheme, provider_name, secret, body, header) {
                self.metrics.invalid_signature_total.inc();
                tracing::warn!(provider = provider_name, "Webhook signature rejected");
                return Err(e);
            }
        }
        self.metrics.received_total.inc();

        let payload: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| Error::MalformedPayload(format!("Invalid JSON: {}", e)))?;

        let decoder = self
            .decoders
            .get(provider_name)
            .ok_or_else(|| Error::UnknownProvider(provider_name.to_string()))?;
        let decoded = decoder.decode(&payload)?;

        let provider = Provider::new(provider_name);
        let event = match self
            .ledger
            .record_webhook_event(WebhookEvent::received(
                provider.clone(),
                &decoded.reference,
                &decoded.event_type,
                payload,
            ))
            .await
        {
            Ok(event) => event,
            Err(ledger_core::Error::DuplicateDelivery { existing, .. }) => {
                tracing::info!(
                    provider = provider_name,
                    reference = %decoded.reference,
                    event_id = %existing,
                    "Duplicate delivery acknowledged"
                );
                self.metrics.duplicates_total.inc();
                return Ok(Ack::Duplicate);
            }
            Err(e) => return Err(e.into()),
        };

        match decoded.kind {
            WebhookKind::Lifecycle => {
                self.ledger
                    .mark_webhook_event(event.id, WebhookStatus::Ignored)
                    .await?;
                Ok(Ack::Ignored)
            }
            WebhookKind::Funding {
                account,
                user_id,
                amount_minor,
            } => {
                self.apply_funding(&event, &provider, account, user_id, amount_minor)
                    .await
            }
            WebhookKind::StatusUpdate { status } => {
                self.apply_status(&event, &provider, &decoded.reference, &status)
                    .await
            }
        }
    }

    async fn apply_funding(
        &self,
        event: &WebhookEvent,
        provider: &Provider,
        account: Option<String>,
        user_id: Option<UserId>,
        amount_minor: i64,
    ) -> Result<Ack> {
        if amount_minor <= 0 {
            self.ledger
                .mark_webhook_event(event.id, WebhookStatus::Failed)
                .await?;
            return Err(Error::MalformedPayload(
                "Funding amount must be positive".to_string(),
            ));
        }

        let resolved = match user_id {
            Some(user) => Some(user),
            None => match &account {
                Some(acct) => self.ledger.find_user_by_virtual_account(acct)?,
                None => None,
            },
        };
        let Some(user) = resolved else {
            tracing::warn!(
                event_id = %event.id,
                provider = %provider,
                account = ?account,
                "Funding webhook does not match any wallet"
            );
            self.ledger
                .mark_webhook_event(event.id, WebhookStatus::Unmatched)
                .await?;
            self.metrics.unmatched_total.inc();
            return Ok(Ack::Unmatched);
        };

        let draft = TxDraft {
            user_id: user,
            direction: TxDirection::Credit,
            category: TxCategory::WalletFunding,
            amount_minor,
            fee_minor: 0,
            currency: self.ledger.default_currency(),
            provider: provider.clone(),
            provider_ref: event.reference.clone(),
            meta: serde_json::json!({ "webhook_event_id": event.id }),
        };

        match self.ledger.credit_and_mark(event.id, draft).await {
            Ok((tx, _)) => {
                tracing::info!(
                    event_id = %event.id,
                    tx_id = %tx.id,
                    amount_minor,
                    "Funding credited"
                );
                self.metrics.processed_total.inc();
                Ok(Ack::Processed)
            }
            // The money already landed under this reference
            Err(ledger_core::Error::DuplicateReference { existing, .. }) => {
                tracing::info!(
                    event_id = %event.id,
                    tx_id = %existing,
                    "Funding already credited"
                );
                self.ledger
                    .mark_webhook_event(event.id, WebhookStatus::Ignored)
                    .await?;
                self.metrics.duplicates_total.inc();
                Ok(Ack::Duplicate)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn apply_status(
        &self,
        event: &WebhookEvent,
        provider: &Provider,
        reference: &str,
        status: &str,
    ) -> Result<Ack> {
        let Some(tx) = self.ledger.find_tx_by_reference(provider, reference)? else {
            tracing::warn!(
                event_id = %event.id,
                provider = %provider,
                reference,
                "Status webhook does not match any transaction"
            );
            self.ledger
                .mark_webhook_event(event.id, WebhookStatus::Unmatched)
                .await?;
            self.metrics.unmatched_total.inc();
            return Ok(Ack::Unmatched);
        };

        let outcome = match TxStatus::from_provider_vocab(status) {
            Some(TxStatus::Success) => SettleOutcome::Success {
                provider_tx_id: None,
            },
            Some(TxStatus::Failed) => SettleOutcome::Failure {
                reason: format!("Provider reported {}", status),
            },
            _ => {
                tracing::debug!(
                    event_id = %event.id,
                    status,
                    "Status word carries no terminal outcome"
                );
                self.ledger
                    .mark_webhook_event(event.id, WebhookStatus::Ignored)
                    .await?;
                return Ok(Ack::Ignored);
            }
        };

        let (tx, _, refunded) = self
            .ledger
            .finalize_and_mark(event.id, tx.id, outcome)
            .await?;
        if refunded {
            tracing::info!(tx_id = %tx.id, "Status webhook refunded failed debit");
        }
        self.metrics.processed_total.inc();
        Ok(Ack::Processed)
    }
}
