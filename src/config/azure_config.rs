//! Azure configuration parsing from environment variables.
//!
//! Identity overrides, credential selection and the endpoints the forwarder
//! talks to.

use super::{Lookup, parse_bool};
use crate::domain::identity::{Membership, PartialIdentity, non_empty};
use crate::infrastructure::azure::{DEFAULT_AUTHORITY_HOST, DEFAULT_IMDS_ENDPOINT};
use crate::application::forwarding::DEFAULT_INGESTION_HOST;
use anyhow::Result;

/// Credential the forwarder authenticates with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialMode {
    /// IMDS token endpoint; `client_id` picks a user-assigned identity.
    ManagedIdentity { client_id: Option<String> },
    ServicePrincipal {
        tenant_id: String,
        client_id: String,
        client_secret: String,
    },
}

/// Azure environment configuration
#[derive(Debug, Clone, Default)]
pub struct AzureEnvConfig {
    pub subscription_id: Option<String>,
    pub resource_group: Option<String>,
    pub resource_name: Option<String>,
    pub region: Option<String>,
    pub scale_set_name: Option<String>,
    pub instance_id: Option<String>,
    pub use_managed_identity: bool,
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub imds_endpoint: String,
    pub ingestion_host: String,
    pub authority_host: String,
}

impl AzureEnvConfig {
    pub(crate) fn from_lookup(lookup: &Lookup<'_>) -> Result<Self> {
        let var = |key: &str| non_empty(lookup(key));

        let use_managed_identity = match var("AZURE_USE_MANAGED_IDENTITY") {
            Some(raw) => parse_bool("AZURE_USE_MANAGED_IDENTITY", &raw)?,
            None => false,
        };

        Ok(Self {
            subscription_id: var("AZURE_SUBSCRIPTION_ID"),
            resource_group: var("AZURE_RESOURCE_GROUP"),
            resource_name: var("AZURE_RESOURCE_NAME"),
            region: var("AZURE_REGION"),
            scale_set_name: var("AZURE_VMSS_NAME"),
            instance_id: var("AZURE_INSTANCE_ID"),
            use_managed_identity,
            tenant_id: var("AZURE_TENANT_ID"),
            client_id: var("AZURE_CLIENT_ID"),
            client_secret: var("AZURE_CLIENT_SECRET"),
            imds_endpoint: var("AZURE_IMDS_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_IMDS_ENDPOINT.to_string()),
            ingestion_host: var("AZURE_MONITOR_INGESTION_HOST")
                .unwrap_or_else(|| DEFAULT_INGESTION_HOST.to_string()),
            authority_host: var("AZURE_AUTHORITY_HOST")
                .unwrap_or_else(|| DEFAULT_AUTHORITY_HOST.to_string()),
        })
    }

    /// Identity fields pinned by configuration.
    ///
    /// Scale set membership is only pinned when both the scale set name and
    /// the instance id are configured; the scale set then doubles as the
    /// resource name.
    pub fn identity_overrides(&self) -> PartialIdentity {
        let membership = match (&self.scale_set_name, &self.instance_id) {
            (Some(scale_set_name), Some(instance_id)) => Some(Membership::ScaleSet {
                scale_set_name: scale_set_name.clone(),
                instance_name: instance_id.clone(),
            }),
            _ => None,
        };
        let name = match &membership {
            Some(Membership::ScaleSet { scale_set_name, .. }) => Some(scale_set_name.clone()),
            _ => self.resource_name.clone(),
        };

        PartialIdentity {
            subscription_id: self.subscription_id.clone(),
            resource_group: self.resource_group.clone(),
            name,
            region: self.region.clone(),
            membership,
        }
    }

    /// Pick the credential: forced managed identity, else a complete
    /// service principal, else managed identity.
    pub fn credential_mode(&self, force_managed_identity: bool) -> CredentialMode {
        if force_managed_identity || self.use_managed_identity {
            return CredentialMode::ManagedIdentity {
                client_id: self.client_id.clone().filter(|id| !is_placeholder(id)),
            };
        }

        match (&self.tenant_id, &self.client_id, &self.client_secret) {
            (Some(tenant_id), Some(client_id), Some(client_secret))
                if ![tenant_id, client_id, client_secret]
                    .iter()
                    .any(|v| is_placeholder(v)) =>
            {
                CredentialMode::ServicePrincipal {
                    tenant_id: tenant_id.clone(),
                    client_id: client_id.clone(),
                    client_secret: client_secret.clone(),
                }
            }
            _ => CredentialMode::ManagedIdentity { client_id: None },
        }
    }
}

/// Values copied unchanged from a sample `.env` file.
fn is_placeholder(value: &str) -> bool {
    value.trim().to_lowercase().starts_with("your-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> AzureEnvConfig {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AzureEnvConfig::from_lookup(&|key| map.get(key).cloned()).expect("config")
    }

    #[test]
    fn test_azure_config_defaults() {
        let config = load(&[]);
        assert_eq!(config.imds_endpoint, "http://169.254.169.254");
        assert_eq!(config.ingestion_host, "monitoring.azure.com");
        assert_eq!(config.authority_host, "https://login.microsoftonline.com");
        assert!(!config.use_managed_identity);
        assert_eq!(config.identity_overrides(), PartialIdentity::default());
    }

    #[test]
    fn test_blank_values_are_absent() {
        let config = load(&[("AZURE_SUBSCRIPTION_ID", "  "), ("AZURE_REGION", "westeurope")]);
        assert_eq!(config.subscription_id, None);
        assert_eq!(config.region.as_deref(), Some("westeurope"));
    }

    #[test]
    fn test_pinned_scale_set_membership() {
        let config = load(&[
            ("AZURE_SUBSCRIPTION_ID", "sub"),
            ("AZURE_RESOURCE_GROUP", "rg"),
            ("AZURE_RESOURCE_NAME", "ignored"),
            ("AZURE_REGION", "westeurope"),
            ("AZURE_VMSS_NAME", "web-fleet"),
            ("AZURE_INSTANCE_ID", "web-fleet_2"),
        ]);

        let overrides = config.identity_overrides();
        assert!(overrides.is_complete());
        assert_eq!(overrides.name.as_deref(), Some("web-fleet"));
        assert_eq!(
            overrides.membership,
            Some(Membership::ScaleSet {
                scale_set_name: "web-fleet".to_string(),
                instance_name: "web-fleet_2".to_string(),
            })
        );
    }

    #[test]
    fn test_standalone_membership_left_to_metadata() {
        let config = load(&[
            ("AZURE_SUBSCRIPTION_ID", "sub"),
            ("AZURE_RESOURCE_GROUP", "rg"),
            ("AZURE_RESOURCE_NAME", "vm-1"),
            ("AZURE_REGION", "westeurope"),
        ]);

        let overrides = config.identity_overrides();
        assert_eq!(overrides.name.as_deref(), Some("vm-1"));
        assert_eq!(overrides.membership, None);
        assert!(!overrides.is_complete());
    }

    #[test]
    fn test_service_principal_selected_when_complete() {
        let config = load(&[
            ("AZURE_TENANT_ID", "tenant"),
            ("AZURE_CLIENT_ID", "client"),
            ("AZURE_CLIENT_SECRET", "secret"),
        ]);

        assert!(matches!(
            config.credential_mode(false),
            CredentialMode::ServicePrincipal { .. }
        ));
        assert!(matches!(
            config.credential_mode(true),
            CredentialMode::ManagedIdentity { .. }
        ));
    }

    #[test]
    fn test_placeholder_credentials_fall_back_to_managed_identity() {
        let config = load(&[
            ("AZURE_TENANT_ID", "your-tenant-id"),
            ("AZURE_CLIENT_ID", "client"),
            ("AZURE_CLIENT_SECRET", "secret"),
        ]);

        assert_eq!(
            config.credential_mode(false),
            CredentialMode::ManagedIdentity { client_id: None }
        );
    }

    #[test]
    fn test_managed_identity_flag() {
        let config = load(&[
            ("AZURE_USE_MANAGED_IDENTITY", "true"),
            ("AZURE_CLIENT_ID", "user-assigned"),
        ]);

        assert_eq!(
            config.credential_mode(false),
            CredentialMode::ManagedIdentity {
                client_id: Some("user-assigned".to_string())
            }
        );
    }

    #[test]
    fn test_invalid_managed_identity_flag_rejected() {
        let result = AzureEnvConfig::from_lookup(&|key| {
            (key == "AZURE_USE_MANAGED_IDENTITY").then(|| "maybe".to_string())
        });
        assert!(result.is_err());
    }
}
