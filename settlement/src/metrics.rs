//! Metrics collection for the settlement orchestrator
//!
//! # Metrics
//!
//! - `settlement_success_total` - Settlements finalized successfully
//! - `settlement_declined_total` - Settlements declined by the provider
//! - `settlement_timeout_total` - Settlements failed on provider timeout
//! - `settlement_replayed_total` - Idempotent replays served without a new debit
//! - `settlement_duration_seconds` - End-to-end settlement latency

use prometheus::{Histogram, HistogramOpts, IntCounter, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Settlements finalized successfully
    pub success_total: IntCounter,

    /// Settlements declined by the provider
    pub declined_total: IntCounter,

    /// Settlements failed on provider timeout or unavailability
    pub timeout_total: IntCounter,

    /// Idempotent replays served without a new debit
    pub replayed_total: IntCounter,

    /// End-to-end settlement latency
    pub duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let success_total = IntCounter::with_opts(Opts::new(
            "settlement_success_total",
            "Settlements finalized successfully",
        ))?;
        registry.register(Box::new(success_total.clone()))?;

        let declined_total = IntCounter::with_opts(Opts::new(
            "settlement_declined_total",
            "Settlements declined by the provider",
        ))?;
        registry.register(Box::new(declined_total.clone()))?;

        let timeout_total = IntCounter::with_opts(Opts::new(
            "settlement_timeout_total",
            "Settlements failed on provider timeout",
        ))?;
        registry.register(Box::new(timeout_total.clone()))?;

        let replayed_total = IntCounter::with_opts(Opts::new(
            "settlement_replayed_total",
            "Idempotent replays served without a new debit",
        ))?;
        registry.register(Box::new(replayed_total.clone()))?;

        let duration = Histogram::with_opts(
            HistogramOpts::new(
                "settlement_duration_seconds",
                "End-to-end settlement latency",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        )?;
        registry.register(Box::new(duration.clone()))?;

        Ok(Self {
            success_total,
            declined_total,
            timeout_total,
            replayed_total,
            duration,
            registry,
        })
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
        assert_eq!(metrics.success_total.get(), 0);
        metrics.success_total.inc();
        assert_eq!(metrics.success_total.get(), 1);
    }
}
