use super::parser::MetricSampleParser;
use super::rate_deriver::{RateDeriver, RateRule};
use crate::domain::metrics::MetricSet;
use std::time::Instant;
use tracing::{debug, info};

/// Turns one exposition payload into the metric set to forward.
///
/// Parses and flattens the payload, then appends the derived rate for each
/// configured rule whose counter is present in this scrape.
pub struct MetricsCollector {
    rate_deriver: RateDeriver,
    rate_rules: Vec<RateRule>,
}

impl MetricsCollector {
    pub fn new(rate_rules: Vec<RateRule>) -> Self {
        Self {
            rate_deriver: RateDeriver::new(),
            rate_rules,
        }
    }

    pub fn collect(&mut self, payload: &str, now: Instant) -> MetricSet {
        let samples = MetricSampleParser::parse(payload);
        let mut metrics = MetricSampleParser::flatten(&samples);

        for rule in &self.rate_rules {
            let Some(&current) = metrics.get(&rule.counter) else {
                debug!(
                    "MetricsCollector: counter {} absent from scrape, no {}",
                    rule.counter, rule.rate_metric
                );
                continue;
            };

            if let Some(rate) = self.rate_deriver.derive(&rule.counter, current, now) {
                metrics.insert(rule.rate_metric.clone(), rate);
            }
        }

        info!(
            "MetricsCollector: extracted {} metrics from {} samples",
            metrics.len(),
            samples.len()
        );
        metrics
    }
}
