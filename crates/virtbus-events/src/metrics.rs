//! Prometheus metrics for signal dispatch
//!
//! One registry per [`Connection`](crate::Connection), namespaced `virtbus`.

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::dispatcher::DropReason;

/// Counters and gauges describing the signal fan-out of one connection.
pub struct DispatchMetrics {
    registry: Registry,
    /// Counter: signals read from the inbound stream
    pub signals_received_total: IntCounter,
    /// Counter: callback invocations that returned normally, by event
    pub signals_delivered_total: IntCounterVec,
    /// Counter: signals a subscription discarded, by reason
    pub signals_dropped_total: IntCounterVec,
    /// Counter: callback invocations that panicked, by event
    pub callback_panics_total: IntCounterVec,
    /// Gauge: live subscriptions across all proxies
    pub active_subscriptions: IntGauge,
    /// Gauge: distinct match rules installed on the bus
    pub active_match_rules: IntGauge,
}

impl DispatchMetrics {
    /// Creates a new `DispatchMetrics` with all metrics registered.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("virtbus".to_string()), None)?;

        let signals_received_total = IntCounter::with_opts(Opts::new(
            "signals_received_total",
            "Signals read from the shared connection",
        ))?;
        registry.register(Box::new(signals_received_total.clone()))?;

        let signals_delivered_total = IntCounterVec::new(
            Opts::new(
                "signals_delivered_total",
                "Signals delivered to a subscriber callback",
            ),
            &["event"],
        )?;
        registry.register(Box::new(signals_delivered_total.clone()))?;

        let signals_dropped_total = IntCounterVec::new(
            Opts::new(
                "signals_dropped_total",
                "Signals discarded by a subscription",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(signals_dropped_total.clone()))?;

        let callback_panics_total = IntCounterVec::new(
            Opts::new("callback_panics_total", "Subscriber callbacks that panicked"),
            &["event"],
        )?;
        registry.register(Box::new(callback_panics_total.clone()))?;

        let active_subscriptions = IntGauge::with_opts(Opts::new(
            "active_subscriptions",
            "Live signal subscriptions",
        ))?;
        registry.register(Box::new(active_subscriptions.clone()))?;

        let active_match_rules = IntGauge::with_opts(Opts::new(
            "active_match_rules",
            "Match rules installed on the bus",
        ))?;
        registry.register(Box::new(active_match_rules.clone()))?;

        Ok(Self {
            registry,
            signals_received_total,
            signals_delivered_total,
            signals_dropped_total,
            callback_panics_total,
            active_subscriptions,
            active_match_rules,
        })
    }

    // ========================================================================
    // Recording helpers
    // ========================================================================

    pub fn record_received(&self) {
        self.signals_received_total.inc();
    }

    pub fn record_delivery(&self, event: &str) {
        self.signals_delivered_total.with_label_values(&[event]).inc();
    }

    pub fn record_drop(&self, reason: DropReason) {
        self.signals_dropped_total
            .with_label_values(&[reason.as_str()])
            .inc();
    }

    pub fn record_panic(&self, event: &str) {
        self.callback_panics_total.with_label_values(&[event]).inc();
    }

    /// Number of signals dropped for `reason` so far
    pub fn dropped(&self, reason: DropReason) -> u64 {
        self.signals_dropped_total
            .with_label_values(&[reason.as_str()])
            .get()
    }

    /// Number of successful deliveries of `event` so far
    pub fn delivered(&self, event: &str) -> u64 {
        self.signals_delivered_total.with_label_values(&[event]).get()
    }

    // ========================================================================
    // Encoding
    // ========================================================================

    /// Encode all metrics in Prometheus text exposition format.
    pub fn encode(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

impl std::fmt::Debug for DispatchMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchMetrics")
            .field("signals_received_total", &self.signals_received_total.get())
            .field("active_subscriptions", &self.active_subscriptions.get())
            .field("active_match_rules", &self.active_match_rules.get())
            .finish()
    }
}
