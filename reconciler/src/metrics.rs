//! Metrics collection for the webhook reconciler
//!
//! # Metrics
//!
//! - `webhook_received_total` - Deliveries accepted past signature check
//! - `webhook_processed_total` - Deliveries that moved ledger state
//! - `webhook_duplicates_total` - Redeliveries and duplicate money movements
//! - `webhook_unmatched_total` - Deliveries referencing unknown transactions or accounts
//! - `webhook_invalid_signature_total` - Deliveries dropped on signature check

use prometheus::{IntCounter, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Deliveries accepted past signature check
    pub received_total: IntCounter,

    /// Deliveries that moved ledger state
    pub processed_total: IntCounter,

    /// Redeliveries and duplicate money movements
    pub duplicates_total: IntCounter,

    /// Deliveries referencing unknown transactions or accounts
    pub unmatched_total: IntCounter,

    /// Deliveries dropped on signature check
    pub invalid_signature_total: IntCounter,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let received_total = IntCounter::with_opts(Opts::new(
            "webhook_received_total",
            "Deliveries accepted past signature check",
        ))?;
        registry.register(Box::new(received_total.clone()))?;

        let processed_total = IntCounter::with_opts(Opts::new(
            "webhook_processed_total",
            "Deliveries that moved ledger state",
        ))?;
        registry.register(Box::new(processed_total.clone()))?;

        let duplicates_total = IntCounter::with_opts(Opts::new(
            "webhook_duplicates_total",
            "Redeliveries and duplicate money movements",
        ))?;
        registry.register(Box::new(duplicates_total.clone()))?;

        let unmatched_total = IntCounter::with_opts(Opts::new(
            "webhook_unmatched_total",
            "Deliveries referencing unknown transactions or accounts",
        ))?;
        registry.register(Box::new(unmatched_total.clone()))?;

        let invalid_signature_total = IntCounter::with_opts(Opts::new(
            "webhook_invalid_signature_total",
            "Deliveries dropped on signature check",
        ))?;
        registry.register(Box::new(invalid_signature_total.clone()))?;

        Ok(Self {
            received_total,
            processed_total,
            duplicates_total,
            unmatched_total,
            invalid_signature_total,
            registry,
        })
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
