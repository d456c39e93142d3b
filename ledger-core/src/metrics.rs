//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the ledger.
//!
//! # Metrics
//!
//! - `ledger_debits_total` - Total debit reservations accepted
//! - `ledger_credits_total` - Total credits applied
//! - `ledger_refunds_total` - Total compensating refunds applied
//! - `ledger_insufficient_funds_total` - Debits rejected on balance check
//! - `ledger_duplicate_references_total` - Debits short-circuited by the idempotency guard
//! - `ledger_mutation_duration_seconds` - Histogram of mutation latencies

use prometheus::{Histogram, HistogramOpts, IntCounter, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Total debit reservations accepted
    pub debits_total: IntCounter,

    /// Total credits applied
    pub credits_total: IntCounter,

    /// Total compensating refunds applied
    pub refunds_total: IntCounter,

    /// Debits rejected on balance check
    pub insufficient_funds_total: IntCounter,

    /// Debits short-circuited by the idempotency guard
    pub duplicate_references_total: IntCounter,

    /// Mutation latency histogram
    pub mutation_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let debits_total = IntCounter::with_opts(Opts::new(
            "ledger_debits_total",
            "Total debit reservations accepted",
        ))?;
        registry.register(Box::new(debits_total.clone()))?;

        let credits_total = IntCounter::with_opts(Opts::new(
            "ledger_credits_total",
            "Total credits applied",
        ))?;
        registry.register(Box::new(credits_total.clone()))?;

        let refunds_total = IntCounter::with_opts(Opts::new(
            "ledger_refunds_total",
            "Total compensating refunds applied",
        ))?;
        registry.register(Box::new(refunds_total.clone()))?;

        let insufficient_funds_total = IntCounter::with_opts(Opts::new(
            "ledger_insufficient_funds_total",
            "Debits rejected on balance check",
        ))?;
        registry.register(Box::new(insufficient_funds_total.clone()))?;

        let duplicate_references_total = IntCounter::with_opts(Opts::new(
            "ledger_duplicate_references_total",
            "Debits short-circuited by the idempotency guard",
        ))?;
        registry.register(Box::new(duplicate_references_total.clone()))?;

        let mutation_duration = Histogram::with_opts(
            HistogramOpts::new(
                "ledger_mutation_duration_seconds",
                "Histogram of mutation latencies",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0]),
        )?;
        registry.register(Box::new(mutation_duration.clone()))?;

        Ok(Self {
            debits_total,
            credits_total,
            refunds_total,
            insufficient_funds_total,
            duplicate_references_total,
            mutation_duration,
            registry,
        })
    }

    /// Record an accepted debit reservation
    pub fn record_debit(&self) {
        self.debits_total.inc();
    }

    /// Record an applied credit
    pub fn record_credit(&self) {
        self.credits_total.inc();
    }

    /// Record a compensating refund
    pub fn record_refund(&self) {
        self.refunds_total.inc();
    }

    /// Record a balance-check rejection
    pub fn record_insufficient_funds(&self) {
        self.insufficient_funds_total.inc();
    }

    /// Record an idempotency short-circuit
    pub fn record_duplicate_reference(&self) {
        self.duplicate_references_total.inc();
    }

    /// Record mutation duration
    pub fn record_mutation_duration(&self, duration_seconds: f64) {
        self.mutation_duration.observe(duration_seconds);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.debits_total.get(), 0);
        assert_eq!(metrics.refunds_total.get(), 0);
    }

    #[test]
    fn test_record_counters() {
        let metrics = Metrics::new().unwrap();
        metrics.record_debit();
        metrics.record_debit();
        metrics.record_refund();
        assert_eq!(metrics.debits_total.get(), 2);
        assert_eq!(metrics.refunds_total.get(), 1);
    }

    #[test]
    fn test_independent_registries() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.record_credit();
        assert_eq!(a.credits_total.get(), 1);
        assert_eq!(b.credits_total.get(), 0);
    }
}
