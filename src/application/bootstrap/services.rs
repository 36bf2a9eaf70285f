use std::sync::Arc;
use tracing::info;

use crate::application::forwarding::MetricsForwarder;
use crate::application::identity::ResourceIdentityResolver;
use crate::config::{AzureEnvConfig, Config, CredentialMode};
use crate::domain::ports::{MetricsSource, TokenCredential};
use crate::infrastructure::azure::{
    AzureMonitorClient, CachingCredential, ClientSecretCredential, ImdsClient,
    ManagedIdentityCredential,
};
use crate::infrastructure::prometheus::PrometheusScraper;

pub struct ServicesHandle {
    pub source: Arc<dyn MetricsSource>,
    pub resolver: ResourceIdentityResolver,
    pub forwarder: MetricsForwarder,
}

pub struct ServicesBootstrap;

impl ServicesBootstrap {
    /// Wire the production adapters: HTTP scraper, IMDS-backed resolver and
    /// the Azure Monitor forwarder.
    pub fn init(config: &Config, force_managed_identity: bool) -> ServicesHandle {
        ServicesHandle {
            source: Arc::new(PrometheusScraper::new(&config.monitor.prometheus_url)),
            resolver: Self::resolver(&config.azure),
            forwarder: Self::forwarder(&config.azure, force_managed_identity),
        }
    }

    /// Configuration overrides first, then IMDS.
    pub fn resolver(azure: &AzureEnvConfig) -> ResourceIdentityResolver {
        ResourceIdentityResolver::with_metadata(
            azure.identity_overrides(),
            Arc::new(ImdsClient::new(&azure.imds_endpoint)),
        )
    }

    pub fn forwarder(azure: &AzureEnvConfig, force_managed_identity: bool) -> MetricsForwarder {
        MetricsForwarder::new(
            Self::credential(azure, force_managed_identity),
            Arc::new(AzureMonitorClient::new()),
            &azure.ingestion_host,
        )
    }

    pub fn credential(
        azure: &AzureEnvConfig,
        force_managed_identity: bool,
    ) -> Arc<dyn TokenCredential> {
        let inner: Arc<dyn TokenCredential> = match azure.credential_mode(force_managed_identity) {
            CredentialMode::ManagedIdentity { client_id } => {
                info!("ServicesBootstrap: using Azure managed identity authentication");
                Arc::new(ManagedIdentityCredential::new(&azure.imds_endpoint, client_id))
            }
            CredentialMode::ServicePrincipal {
                tenant_id,
                client_id,
                client_secret,
            } => {
                info!("ServicesBootstrap: using Azure service principal authentication");
                Arc::new(ClientSecretCredential::new(
                    &azure.authority_host,
                    tenant_id,
                    client_id,
                    client_secret,
                ))
            }
        };
        Arc::new(CachingCredential::new(inner))
    }
}
