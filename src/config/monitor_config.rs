//! Monitor loop configuration parsing from environment variables.
//!
//! Scrape source, cycle timing, failure threshold, metric namespace and the
//! counters that get a derived rate.

use super::{Lookup, parse_number};
use crate::application::collection::RateRule;
use crate::domain::identity::non_empty;
use crate::infrastructure::prometheus::DEFAULT_PROMETHEUS_URL;
use anyhow::{Result, bail};
use std::time::Duration;

pub const DEFAULT_NAMESPACE: &str = "Custom/NGINX";
pub const DEFAULT_RATE_COUNTERS: &str = "nginx_http_requests_total=nginx_requests_per_second";

/// Monitor environment configuration
#[derive(Debug, Clone)]
pub struct MonitorEnvConfig {
    pub prometheus_url: String,
    pub scrape_interval: Duration,
    pub max_consecutive_failures: usize,
    pub error_backoff: Duration,
    pub namespace: String,
    pub rate_rules: Vec<RateRule>,
}

impl Default for MonitorEnvConfig {
    fn default() -> Self {
        Self {
            prometheus_url: DEFAULT_PROMETHEUS_URL.to_string(),
            scrape_interval: Duration::from_secs(60),
            max_consecutive_failures: 5,
            error_backoff: Duration::from_secs(10),
            namespace: DEFAULT_NAMESPACE.to_string(),
            rate_rules: vec![RateRule::new(
                "nginx_http_requests_total",
                "nginx_requests_per_second",
            )],
        }
    }
}

impl MonitorEnvConfig {
    pub(crate) fn from_lookup(lookup: &Lookup<'_>) -> Result<Self> {
        let var = |key: &str| non_empty(lookup(key));

        let interval_secs: u64 = match var("SCRAPE_INTERVAL_SECONDS") {
            Some(raw) => parse_number("SCRAPE_INTERVAL_SECONDS", &raw)?,
            None => 60,
        };
        if interval_secs == 0 {
            bail!("SCRAPE_INTERVAL_SECONDS must be at least 1");
        }

        let max_consecutive_failures: usize = match var("MAX_CONSECUTIVE_FAILURES") {
            Some(raw) => parse_number("MAX_CONSECUTIVE_FAILURES", &raw)?,
            None => 5,
        };
        if max_consecutive_failures == 0 {
            bail!("MAX_CONSECUTIVE_FAILURES must be at least 1");
        }

        let backoff_secs: u64 = match var("ERROR_BACKOFF_SECONDS") {
            Some(raw) => parse_number("ERROR_BACKOFF_SECONDS", &raw)?,
            None => 10,
        };

        // An explicitly empty RATE_COUNTERS disables rate derivation.
        let rate_rules = match lookup("RATE_COUNTERS") {
            Some(raw) => parse_rate_rules(&raw)?,
            None => parse_rate_rules(DEFAULT_RATE_COUNTERS)?,
        };

        Ok(Self {
            prometheus_url: var("PROMETHEUS_URL")
                .unwrap_or_else(|| DEFAULT_PROMETHEUS_URL.to_string()),
            scrape_interval: Duration::from_secs(interval_secs),
            max_consecutive_failures,
            error_backoff: Duration::from_secs(backoff_secs),
            namespace: var("METRICS_NAMESPACE").unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            rate_rules,
        })
    }
}

/// Parse `counter=rate_metric` pairs separated by commas.
pub fn parse_rate_rules(raw: &str) -> Result<Vec<RateRule>> {
    let mut rules = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let Some((counter, rate_metric)) = entry.split_once('=') else {
            bail!("Invalid RATE_COUNTERS entry '{}': expected counter=rate_metric", entry);
        };
        let (counter, rate_metric) = (counter.trim(), rate_metric.trim());
        if counter.is_empty() || rate_metric.is_empty() {
            bail!("Invalid RATE_COUNTERS entry '{}': empty name", entry);
        }
        rules.push(RateRule::new(counter, rate_metric));
    }
    Ok(rules)
}
