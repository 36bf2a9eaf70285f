use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Flattened metric identifier -> value, ready for forwarding.
pub type MetricSet = BTreeMap<String, f64>;

/// A single sample parsed from an exposition payload.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub name: String,
    pub value: f64,
    pub labels: BTreeMap<String, String>,
}

impl MetricSample {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            labels: BTreeMap::new(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Synthetic identifier for this sample.
    ///
    /// Unlabelled samples keep their bare name. Labelled samples append
    /// `_{key}_{value}` per label in ascending key order, so two samples
    /// with the same label content always share a key.
    pub fn series_key(&self) -> String {
        if self.labels.is_empty() {
            return self.name.clone();
        }

        let suffix = self
            .labels
            .iter()
            .map(|(k, v)| format!("{}_{}", k, v))
            .collect::<Vec<_>>()
            .join("_");
        format!("{}_{}", self.name, suffix)
    }
}

/// A named dimension attached to a forwarded series
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dimension {
    pub name: String,
    pub value: String,
}

/// One metric value ready to be published to the ingestion API
#[derive(Debug, Clone, PartialEq)]
pub struct MetricPoint {
    pub time: DateTime<Utc>,
    pub metric: String,
    pub namespace: String,
    pub dimension: Option<Dimension>,
    pub value: f64,
}

/// Outcome of forwarding a single metric
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForwardOutcome {
    pub metric_name: String,
    pub accepted: bool,
    pub http_status: Option<u16>,
    pub error: Option<String>,
}

impl ForwardOutcome {
    pub fn accepted(metric_name: &str, status: u16) -> Self {
        Self {
            metric_name: metric_name.to_string(),
            accepted: true,
            http_status: Some(status),
            error: None,
        }
    }

    pub fn rejected(metric_name: &str, status: Option<u16>, error: impl Into<String>) -> Self {
        Self {
            metric_name: metric_name.to_string(),
            accepted: false,
            http_status: status,
            error: Some(error.into()),
        }
    }
}

/// Aggregate result of one scrape/forward cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CycleResult {
    pub success: bool,
    pub metrics_attempted: usize,
    pub metrics_accepted: usize,
}

impl CycleResult {
    /// A cycle that produced nothing to forward.
    pub fn empty() -> Self {
        Self {
            success: false,
            metrics_attempted: 0,
            metrics_accepted: 0,
        }
    }

    /// Build the aggregate from per-metric outcomes.
    ///
    /// An empty batch is never a success: nothing reached the backend.
    pub fn from_outcomes(outcomes: &[ForwardOutcome]) -> Self {
        let metrics_attempted = outcomes.len();
        let metrics_accepted = outcomes.iter().filter(|o| o.accepted).count();
        Self {
            success: metrics_attempted > 0 && metrics_accepted == metrics_attempted,
            metrics_attempted,
            metrics_accepted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_key_without_labels_is_bare_name() {
        let sample = MetricSample::new("nginx_connections_active", 4.0);
        assert_eq!(sample.series_key(), "nginx_connections_active");
    }

    #[test]
    fn test_series_key_ignores_insertion_order() {
        let a = MetricSample::new("http_requests_total", 1.0)
            .with_label("method", "post")
            .with_label("code", "400");
        let b = MetricSample::new("http_requests_total", 1.0)
            .with_label("code", "400")
            .with_label("method", "post");

        assert_eq!(a.series_key(), b.series_key());
        assert_eq!(a.series_key(), "http_requests_total_code_400_method_post");
    }

    #[test]
    fn test_cycle_result_partial_success() {
        let outcomes = vec![
            ForwardOutcome::accepted("a", 200),
            ForwardOutcome::rejected("b", Some(500), "server error"),
        ];
        let result = CycleResult::from_outcomes(&outcomes);
        assert!(!result.success);
        assert_eq!(result.metrics_attempted, 2);
        assert_eq!(result.metrics_accepted, 1);
    }

    #[test]
    fn test_cycle_result_empty_batch_is_failure() {
        let result = CycleResult::from_outcomes(&[]);
        assert_eq!(result, CycleResult::empty());
    }
}
