//! Push-based status reporter for the forwarder
//!
//! Renders a structured JSON snapshot of the loop's own counters and writes
//! it to the log. Nothing is served; data only flows outwards.

use crate::infrastructure::observability::metrics::Metrics;
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Status snapshot for JSON output
#[derive(Debug, Serialize)]
pub struct StatusSnapshot {
    pub timestamp: String,
    pub uptime_seconds: u64,
    pub version: String,
    pub cycles: CycleSnapshot,
    pub forwarded: ForwardSnapshot,
}

#[derive(Debug, Serialize)]
pub struct CycleSnapshot {
    pub success: u64,
    pub failure: u64,
    pub error: u64,
    pub consecutive_failures: u64,
}

#[derive(Debug, Serialize)]
pub struct ForwardSnapshot {
    pub accepted: u64,
    pub rejected: u64,
    pub last_scrape_metrics: u64,
}

/// Outputs forwarder status as structured JSON logs.
pub struct MetricsReporter {
    metrics: Metrics,
    start_time: Instant,
}

impl MetricsReporter {
    pub fn new(metrics: Metrics) -> Self {
        Self {
            metrics,
            start_time: Instant::now(),
        }
    }

    /// Log the current snapshot with a `METRICS_JSON:` prefix so it can be
    /// filtered out of the regular log stream.
    pub fn report(&self) {
        let snapshot = self.snapshot();
        match serde_json::to_string(&snapshot) {
            Ok(json) => info!("METRICS_JSON:{}", json),
            Err(e) => warn!("MetricsReporter: failed to serialize status: {}", e),
        }
        debug!("MetricsReporter: registry dump\n{}", self.metrics.render());
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let uptime = self.start_time.elapsed().as_secs();
        self.metrics.uptime_seconds.set(uptime as f64);

        StatusSnapshot {
            timestamp: chrono::Utc::now().to_rfc3339(),
            uptime_seconds: uptime,
            version: env!("CARGO_PKG_VERSION").to_string(),
            cycles: CycleSnapshot {
                success: self.metrics.cycles("success") as u64,
                failure: self.metrics.cycles("failure") as u64,
                error: self.metrics.cycles("error") as u64,
                consecutive_failures: self.metrics.consecutive_failures.get() as u64,
            },
            forwarded: ForwardSnapshot {
                accepted: self.metrics.forwarded("accepted") as u64,
                rejected: self.metrics.forwarded("rejected") as u64,
                last_scrape_metrics: self.metrics.scraped_metrics.get() as u64,
            },
        }
    }
}
