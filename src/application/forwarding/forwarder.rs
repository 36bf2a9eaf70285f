use crate::domain::errors::ForwardError;
use crate::domain::identity::ResourceIdentity;
use crate::domain::metrics::{CycleResult, ForwardOutcome, MetricPoint, MetricSet};
use crate::domain::ports::{IngestionClient, MONITORING_SCOPE, TokenCredential};
use crate::infrastructure::core::http_client_factory::PROBE_TIMEOUT;
use chrono::{SubsecRound, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

/// Status codes the ingestion API answers with on success.
pub const ACCEPTED_STATUSES: [u16; 3] = [200, 202, 204];

/// Default Azure Monitor ingestion host; the region is prepended.
pub const DEFAULT_INGESTION_HOST: &str = "monitoring.azure.com";

/// Per-metric outcomes of one forwarding batch plus their aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardReport {
    pub result: CycleResult,
    pub outcomes: Vec<ForwardOutcome>,
}

impl ForwardReport {
    fn from_outcomes(outcomes: Vec<ForwardOutcome>) -> Self {
        Self {
            result: CycleResult::from_outcomes(&outcomes),
            outcomes,
        }
    }
}

/// Publishes metric sets to the ingestion API, one call per metric.
///
/// Every metric is sent independently: a token failure, a rejected status
/// or a transport error only marks that metric as not accepted and the
/// rest of the batch is still attempted.
pub struct MetricsForwarder {
    credential: Arc<dyn TokenCredential>,
    client: Arc<dyn IngestionClient>,
    ingestion_host: String,
    probe_timeout: Duration,
}

impl MetricsForwarder {
    pub fn new(
        credential: Arc<dyn TokenCredential>,
        client: Arc<dyn IngestionClient>,
        ingestion_host: impl Into<String>,
    ) -> Self {
        Self {
            credential,
            client,
            ingestion_host: ingestion_host.into(),
            probe_timeout: PROBE_TIMEOUT,
        }
    }

    /// Bound on the token acquisition done by [`probe`](Self::probe).
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Forward every metric in `metrics` for `identity`.
    ///
    /// With no identity forwarding is disabled: every metric is reported as
    /// not accepted and nothing goes over the network. Only an endpoint that
    /// cannot be built at all aborts the batch.
    pub async fn forward(
        &self,
        metrics: &MetricSet,
        identity: Option<&ResourceIdentity>,
        namespace: &str,
    ) -> Result<ForwardReport, ForwardError> {
        let Some(identity) = identity else {
            error!("MetricsForwarder: not configured, missing resource URI");
            let outcomes = metrics
                .keys()
                .map(|name| ForwardOutcome::rejected(name, None, "forwarding disabled: resource identity unconfigured"))
                .collect();
            return Ok(ForwardReport::from_outcomes(outcomes));
        };

        let endpoint = identity.metrics_endpoint(&self.ingestion_host);
        Url::parse(&endpoint).map_err(|e| ForwardError::InvalidEndpoint {
            endpoint: endpoint.clone(),
            reason: e.to_string(),
        })?;

        let time = Utc::now().trunc_subsecs(0);
        let dimension = identity.dimension();
        debug!(
            "MetricsForwarder: sending {} metrics to {} (namespace {})",
            metrics.len(),
            endpoint,
            namespace
        );

        let mut outcomes = Vec::with_capacity(metrics.len());
        for (name, value) in metrics {
            let point = MetricPoint {
                time,
                metric: name.clone(),
                namespace: namespace.to_string(),
                dimension: dimension.clone(),
                value: *value,
            };
            outcomes.push(self.send_one(&endpoint, &point).await);
        }

        let report = ForwardReport::from_outcomes(outcomes);
        if report.result.success {
            info!(
                "MetricsForwarder: sent {}/{} custom metrics",
                report.result.metrics_accepted, report.result.metrics_attempted
            );
        } else {
            warn!(
                "MetricsForwarder: only {}/{} custom metrics accepted",
                report.result.metrics_accepted, report.result.metrics_attempted
            );
        }
        Ok(report)
    }

    async fn send_one(&self, endpoint: &str, point: &MetricPoint) -> ForwardOutcome {
        let token = match self.credential.get_token(MONITORING_SCOPE).await {
            Ok(token) => token,
            Err(e) => {
                error!(
                    "MetricsForwarder: no token for metric {}: {}",
                    point.metric, e
                );
                return ForwardOutcome::rejected(&point.metric, None, e.to_string());
            }
        };

        debug!(
            "MetricsForwarder: sending metric '{}' (value: {})",
            point.metric, point.value
        );

        match self.client.publish(endpoint, &token, point).await {
            Ok(response) if ACCEPTED_STATUSES.contains(&response.status) => {
                debug!("MetricsForwarder: metric {} accepted", point.metric);
                ForwardOutcome::accepted(&point.metric, response.status)
            }
            Ok(response) => {
                error!(
                    "MetricsForwarder: failed to send metric {}. Status: {}, Response: {}",
                    point.metric, response.status, response.body
                );
                ForwardOutcome::rejected(
                    &point.metric,
                    Some(response.status),
                    format!("HTTP {}", response.status),
                )
            }
            Err(e) => {
                error!(
                    "MetricsForwarder: failed to send metric {}: {}",
                    point.metric, e
                );
                ForwardOutcome::rejected(&point.metric, None, e.to_string())
            }
        }
    }

    /// Forwarding health: an identity is known and a token can be acquired
    /// within the probe timeout. Nothing is published.
    pub async fn probe(&self, identity: Option<&ResourceIdentity>) -> bool {
        if identity.is_none() {
            error!("MetricsForwarder: Azure Monitor configuration incomplete");
            return false;
        }

        let token = tokio::time::timeout(
            self.probe_timeout,
            self.credential.get_token(MONITORING_SCOPE),
        )
        .await;
        let Ok(token) = token else {
            error!(
                "MetricsForwarder: Azure Monitor health check timed out after {:?}",
                self.probe_timeout
            );
            return false;
        };

        match token {
            Ok(token) if !token.token.is_empty() => {
                info!("MetricsForwarder: Azure Monitor authentication successful");
                true
            }
            Ok(_) => {
                error!("MetricsForwarder: empty Azure Monitor access token");
                false
            }
            Err(e) => {
                error!("MetricsForwarder: Azure Monitor health check failed: {}", e);
                false
            }
        }
    }
}
