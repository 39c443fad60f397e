//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the market.
//!
//! # Metrics
//!
//! - `market_commands_committed_total{command}` - Commands applied and journaled
//! - `market_commands_rejected_total{command}` - Commands rejected by validation
//! - `market_purchases_total` - Settled purchases
//! - `market_tokens_settled_total` - Token base units paid through purchases
//! - `market_command_duration_seconds` - Histogram of apply + journal latency
//! - `market_journal_length` - Number of journal entries

use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Committed commands, by command name
    pub commands_committed: IntCounterVec,

    /// Rejected commands, by command name
    pub commands_rejected: IntCounterVec,

    /// Settled purchases
    pub purchases_total: IntCounter,

    /// Tokens paid through purchases
    pub tokens_settled: IntCounter,

    /// Command duration histogram
    pub command_duration: Histogram,

    /// Journal length
    pub journal_length: IntGauge,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let commands_committed = IntCounterVec::new(
            Opts::new(
                "market_commands_committed_total",
                "Commands applied and journaled",
            ),
            &["command"],
        )?;
        registry.register(Box::new(commands_committed.clone()))?;

        let commands_rejected = IntCounterVec::new(
            Opts::new(
                "market_commands_rejected_total",
                "Commands rejected by validation",
            ),
            &["command"],
        )?;
        registry.register(Box::new(commands_rejected.clone()))?;

        let purchases_total = IntCounter::new("market_purchases_total", "Settled purchases")?;
        registry.register(Box::new(purchases_total.clone()))?;

        let tokens_settled = IntCounter::new(
            "market_tokens_settled_total",
            "Token base units paid through purchases",
        )?;
        registry.register(Box::new(tokens_settled.clone()))?;

        let command_duration = Histogram::with_opts(
            HistogramOpts::new(
                "market_command_duration_seconds",
                "Histogram of apply + journal latency",
            )
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.010, 0.050, 0.100, 0.500]),
        )?;
        registry.register(Box::new(command_duration.clone()))?;

        let journal_length = IntGauge::new("market_journal_length", "Number of journal entries")?;
        registry.register(Box::new(journal_length.clone()))?;

        Ok(Self {
            commands_committed,
            commands_rejected,
            purchases_total,
            tokens_settled,
            command_duration,
            journal_length,
            registry,
        })
    }

    /// Record a committed command
    pub fn record_committed(&self, command: &str) {
        self.commands_committed.with_label_values(&[command]).inc();
    }

    /// Record a rejected command
    pub fn record_rejected(&self, command: &str) {
        self.commands_rejected.with_label_values(&[command]).inc();
    }

    /// Record a settled purchase
    pub fn record_purchase(&self, price: u128) {
        self.purchases_total.inc();
        self.tokens_settled
            .inc_by(u64::try_from(price).unwrap_or(u64::MAX));
    }

    /// Record command duration
    pub fn record_duration(&self, duration_seconds: f64) {
        self.command_duration.observe(duration_seconds);
    }

    /// Update journal length
    pub fn set_journal_length(&self, length: u64) {
        self.journal_length
            .set(i64::try_from(length).unwrap_or(i64::MAX));
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("purchases_total", &self.purchases_total.get())
            .field("journal_length", &self.journal_length.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        // Private registries: creating twice must not collide
        let first = Metrics::new().unwrap();
        let second = Metrics::new().unwrap();
        assert_eq!(first.purchases_total.get(), 0);
        assert_eq!(second.journal_length.get(), 0);
    }

    #[test]
    fn test_record_commands() {
        let metrics = Metrics::new().unwrap();
        metrics.record_committed("purchase");
        metrics.record_committed("purchase");
        metrics.record_rejected("transfer");

        assert_eq!(
            metrics
                .commands_committed
                .with_label_values(&["purchase"])
                .get(),
            2
        );
        assert_eq!(
            metrics.commands_rejected.with_label_values(&["transfer"]).get(),
            1
        );
    }

    #[test]
    fn test_record_purchase() {
        let metrics = Metrics::new().unwrap();
        metrics.record_purchase(100);
        metrics.record_purchase(250);
        assert_eq!(metrics.purchases_total.get(), 2);
        assert_eq!(metrics.tokens_settled.get(), 350);

        // Prices beyond u64 are clamped
        let metrics = Metrics::new().unwrap();
        metrics.record_purchase(u128::MAX);
        assert_eq!(metrics.tokens_settled.get(), u64::MAX);
    }

    #[test]
    fn test_registry_gathers_families() {
        let metrics = Metrics::new().unwrap();
        metrics.set_journal_length(3);
        metrics.record_duration(0.002);

        let families = metrics.registry().gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "market_journal_length"));
    }
}
