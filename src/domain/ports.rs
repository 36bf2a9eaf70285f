use crate::domain::errors::{CredentialError, IngestionError, MetadataError, ScrapeError};
use crate::domain::identity::PartialIdentity;
use crate::domain::metrics::MetricPoint;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Scope requested for every Azure Monitor ingestion call.
pub const MONITORING_SCOPE: &str = "https://monitoring.azure.com/.default";

/// Endpoint serving a text exposition payload
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Fetch the raw exposition payload.
    async fn scrape(&self) -> Result<String, ScrapeError>;

    /// Cheap reachability check used before the monitor loop starts.
    async fn probe(&self) -> bool;

    fn describe(&self) -> String;
}

/// Cloud instance metadata service
#[async_trait]
pub trait MetadataService: Send + Sync {
    async fn instance_identity(&self) -> Result<PartialIdentity, MetadataError>;
}

/// Bearer token with its expiry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expires_on: DateTime<Utc>,
}

/// Token acquisition primitive. Implementations own caching and refresh.
#[async_trait]
pub trait TokenCredential: Send + Sync {
    async fn get_token(&self, scope: &str) -> Result<AccessToken, CredentialError>;
}

/// Raw HTTP response from the ingestion API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionResponse {
    pub status: u16,
    pub body: String,
}

/// Remote time-series ingestion API
#[async_trait]
pub trait IngestionClient: Send + Sync {
    async fn publish(
        &self,
        endpoint: &str,
        token: &AccessToken,
        point: &MetricPoint,
    ) -> Result<IngestionResponse, IngestionError>;
}
