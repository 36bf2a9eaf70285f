use crate::domain::errors::IngestionError;
use crate::domain::metrics::MetricPoint;
use crate::domain::ports::{AccessToken, IngestionClient, IngestionResponse};
use crate::infrastructure::core::http_client_factory::{FORWARD_TIMEOUT, HttpClientFactory};
use async_trait::async_trait;
use chrono::SecondsFormat;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

/// Custom metric document accepted by the Azure Monitor ingestion API.
#[derive(Debug, Serialize)]
pub struct CustomMetricPayload {
    pub time: String,
    pub data: PayloadData,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadData {
    pub base_data: BaseData,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseData {
    pub metric: String,
    pub namespace: String,
    pub dim_names: Vec<String>,
    pub series: Vec<Series>,
}

/// A pre-aggregated series. A single observation has min = max = sum.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Series {
    pub dim_values: Vec<String>,
    pub min: f64,
    pub max: f64,
    pub sum: f64,
    pub count: u64,
}

impl From<&MetricPoint> for CustomMetricPayload {
    fn from(point: &MetricPoint) -> Self {
        let (dim_names, dim_values) = match &point.dimension {
            Some(d) => (vec![d.name.clone()], vec![d.value.clone()]),
            None => (Vec::new(), Vec::new()),
        };

        Self {
            time: point.time.to_rfc3339_opts(SecondsFormat::Secs, true),
            data: PayloadData {
                base_data: BaseData {
                    metric: point.metric.clone(),
                    namespace: point.namespace.clone(),
                    dim_names,
                    series: vec![Series {
                        dim_values,
                        min: point.value,
                        max: point.value,
                        sum: point.value,
                        count: 1,
                    }],
                },
            },
        }
    }
}

/// HTTP client for the regional custom metrics endpoint.
///
/// No retries: every publish is exactly one POST.
pub struct AzureMonitorClient {
    client: Client,
}

impl AzureMonitorClient {
    pub fn new() -> Self {
        Self {
            client: HttpClientFactory::create_client(FORWARD_TIMEOUT),
        }
    }
}

impl Default for AzureMonitorClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IngestionClient for AzureMonitorClient {
    async fn publish(
        &self,
        endpoint: &str,
        token: &AccessToken,
        point: &MetricPoint,
    ) -> Result<IngestionResponse, IngestionError> {
        let payload = CustomMetricPayload::from(point);

        let response = self
            .client
            .post(endpoint)
            .bearer_auth(&token.token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    IngestionError::Timeout {
                        timeout_ms: FORWARD_TIMEOUT.as_millis() as u64,
                    }
                } else {
                    IngestionError::Transport {
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        debug!(
            "AzureMonitorClient: {} answered {} for {}",
            endpoint, status, point.metric
        );

        Ok(IngestionResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::metrics::Dimension;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn point(dimension: Option<Dimension>) -> MetricPoint {
        MetricPoint {
            time: Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap(),
            metric: "nginx_connections_active".to_string(),
            namespace: "Custom/NGINX".to_string(),
            dimension,
            value: 7.0,
        }
    }

    #[test]
    fn test_payload_for_standalone_vm() {
        let payload = CustomMetricPayload::from(&point(None));
        let value = serde_json::to_value(&payload).expect("serialize");

        assert_eq!(
            value,
            json!({
                "time": "2024-03-01T12:30:05Z",
                "data": {
                    "baseData": {
                        "metric": "nginx_connections_active",
                        "namespace": "Custom/NGINX",
                        "dimNames": [],
                        "series": [{
                            "dimValues": [],
                            "min": 7.0,
                            "max": 7.0,
                            "sum": 7.0,
                            "count": 1
                        }]
                    }
                }
            })
        );
    }

    #[test]
    fn test_payload_carries_instance_dimension() {
        let payload = CustomMetricPayload::from(&point(Some(Dimension {
            name: "VMName".to_string(),
            value: "web-fleet_3".to_string(),
        })));
        let value = serde_json::to_value(&payload).expect("serialize");

        assert_eq!(value["data"]["baseData"]["dimNames"], json!(["VMName"]));
        assert_eq!(
            value["data"]["baseData"]["series"][0]["dimValues"],
            json!(["web-fleet_3"])
        );
    }
}
