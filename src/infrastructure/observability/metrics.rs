//! Prometheus metrics describing the forwarder itself
//!
//! All metrics use the `azmon_` prefix. They are never exposed over HTTP;
//! the reporter renders them into logs.

use crate::domain::metrics::ForwardOutcome;
use prometheus::{
    CounterVec, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
    core::{AtomicF64, GenericGauge},
};
use std::sync::Arc;

/// Self-observability metrics for the monitor loop
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    /// Completed cycles by outcome (success, failure, error)
    pub cycles_total: CounterVec,
    /// Forwarded metrics by result (accepted, rejected)
    pub metrics_forwarded_total: CounterVec,
    /// Current consecutive failure count
    pub consecutive_failures: GenericGauge<AtomicF64>,
    /// Metrics produced by the last scrape (after rate derivation)
    pub scraped_metrics: GenericGauge<AtomicF64>,
    /// Wall time of a full cycle
    pub cycle_duration_seconds: Histogram,
    /// Uptime in seconds
    pub uptime_seconds: GenericGauge<AtomicF64>,
}

impl Metrics {
    /// Create a new Metrics instance with all gauges and counters registered
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let cycles_total = CounterVec::new(
            Opts::new("azmon_cycles_total", "Scrape/forward cycles by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(cycles_total.clone()))?;

        let metrics_forwarded_total = CounterVec::new(
            Opts::new(
                "azmon_metrics_forwarded_total",
                "Metrics sent to the ingestion API by result",
            ),
            &["result"],
        )?;
        registry.register(Box::new(metrics_forwarded_total.clone()))?;

        let consecutive_failures = Gauge::with_opts(Opts::new(
            "azmon_consecutive_failures",
            "Current number of consecutive failed cycles",
        ))?;
        registry.register(Box::new(consecutive_failures.clone()))?;

        let scraped_metrics = Gauge::with_opts(Opts::new(
            "azmon_scraped_metrics",
            "Metrics extracted by the last scrape",
        ))?;
        registry.register(Box::new(scraped_metrics.clone()))?;

        let cycle_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "azmon_cycle_duration_seconds",
                "Duration of a scrape/forward cycle in seconds",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        )?;
        registry.register(Box::new(cycle_duration_seconds.clone()))?;

        let uptime_seconds = Gauge::with_opts(Opts::new(
            "azmon_uptime_seconds",
            "Forwarder uptime in seconds",
        ))?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            cycles_total,
            metrics_forwarded_total,
            consecutive_failures,
            scraped_metrics,
            cycle_duration_seconds,
            uptime_seconds,
        })
    }

    /// Render all metrics in Prometheus text format
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder
            .encode_to_string(&metric_families)
            .unwrap_or_default()
    }

    pub fn inc_cycle(&self, outcome: &str) {
        self.cycles_total.with_label_values(&[outcome]).inc();
    }

    /// Count accepted and rejected metrics of one batch
    pub fn record_forward(&self, outcomes: &[ForwardOutcome]) {
        for outcome in outcomes {
            let result = if outcome.accepted { "accepted" } else { "rejected" };
            self.metrics_forwarded_total
                .with_label_values(&[result])
                .inc();
        }
    }

    pub fn cycles(&self, outcome: &str) -> f64 {
        self.cycles_total.with_label_values(&[outcome]).get()
    }

    pub fn forwarded(&self, result: &str) -> f64 {
        self.metrics_forwarded_total
            .with_label_values(&[result])
            .get()
    }
}
