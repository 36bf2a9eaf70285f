//! Azure Instance Metadata Service (IMDS) client.

use crate::domain::errors::MetadataError;
use crate::domain::identity::{Membership, PartialIdentity, non_empty};
use crate::domain::ports::MetadataService;
use crate::infrastructure::core::http_client_factory::{HttpClientFactory, PROBE_TIMEOUT};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info, warn};

/// Link-local IMDS address, only reachable on Azure compute
pub const DEFAULT_IMDS_ENDPOINT: &str = "http://169.254.169.254";

const COMPUTE_PATH: &str = "/metadata/instance/compute?api-version=2021-02-01";

pub struct ImdsClient {
    client: Client,
    base_url: String,
}

impl ImdsClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: HttpClientFactory::create_client(PROBE_TIMEOUT),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl MetadataService for ImdsClient {
    async fn instance_identity(&self) -> Result<PartialIdentity, MetadataError> {
        let url = format!("{}{}", self.base_url, COMPUTE_PATH);
        debug!("ImdsClient: querying {}", url);

        let response = self
            .client
            .get(&url)
            .header("Metadata", "true")
            .send()
            .await
            .map_err(|e| MetadataError::Unreachable {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(MetadataError::Status {
                status: status.as_u16(),
            });
        }

        let document: Value = response.json().await.map_err(|e| MetadataError::Malformed {
            reason: e.to_string(),
        })?;

        parse_compute_metadata(&document)
    }
}

/// Extract identity fields from an IMDS compute document.
///
/// Each field is read on its own: a missing or non-string field is left
/// empty without rejecting the rest of the document. A non-empty
/// `vmScaleSetName` marks the host as a scale set member whose instance
/// is the reported `name`.
pub fn parse_compute_metadata(document: &Value) -> Result<PartialIdentity, MetadataError> {
    let object = document.as_object().ok_or_else(|| MetadataError::Malformed {
        reason: "expected a JSON object".to_string(),
    })?;
    let field = |key: &str| non_empty(object.get(key).and_then(Value::as_str).map(str::to_string));

    let name = field("name");
    let membership = match (field("vmScaleSetName"), name.clone()) {
        (Some(scale_set_name), Some(instance_name)) => {
            info!(
                "ImdsClient: detected VMSS instance: {} - Instance: {}",
                scale_set_name, instance_name
            );
            Some(Membership::ScaleSet {
                scale_set_name,
                instance_name,
            })
        }
        (Some(scale_set_name), None) => {
            warn!(
                "ImdsClient: scale set {} reported without an instance name, membership unknown",
                scale_set_name
            );
            None
        }
        (None, _) => {
            info!(
                "ImdsClient: detected standalone VM: {}",
                name.as_deref().unwrap_or("<unnamed>")
            );
            Some(Membership::Standalone)
        }
    };

    Ok(PartialIdentity {
        subscription_id: field("subscriptionId"),
        resource_group: field("resourceGroupName"),
        name,
        region: field("location"),
        membership,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_standalone_vm() {
        let doc = json!({
            "subscriptionId": "sub-1",
            "resourceGroupName": "rg-web",
            "name": "web-01",
            "location": "westeurope",
            "vmId": "2f5c",
            "vmScaleSetName": ""
        });

        let partial = parse_compute_metadata(&doc).expect("parsed");
        assert_eq!(partial.membership, Some(Membership::Standalone));
        assert_eq!(partial.name.as_deref(), Some("web-01"));
        assert_eq!(partial.region.as_deref(), Some("westeurope"));
        assert!(partial.is_complete());
    }

    #[test]
    fn test_parse_scale_set_member() {
        let doc = json!({
            "subscriptionId": "sub-1",
            "resourceGroupName": "rg-web",
            "name": "web-fleet_3",
            "location": "westeurope",
            "vmScaleSetName": "web-fleet"
        });

        let partial = parse_compute_metadata(&doc).expect("parsed");
        assert_eq!(
            partial.membership,
            Some(Membership::ScaleSet {
                scale_set_name: "web-fleet".to_string(),
                instance_name: "web-fleet_3".to_string(),
            })
        );
    }

    #[test]
    fn test_wrongly_typed_fields_skipped_individually() {
        let doc = json!({
            "subscriptionId": 42,
            "resourceGroupName": "rg-web",
            "name": ["not", "a", "string"],
            "location": null
        });

        let partial = parse_compute_metadata(&doc).expect("parsed");
        assert_eq!(partial.subscription_id, None);
        assert_eq!(partial.resource_group.as_deref(), Some("rg-web"));
        assert_eq!(partial.name, None);
        assert_eq!(partial.region, None);
    }

    #[test]
    fn test_non_object_document_rejected() {
        let result = parse_compute_metadata(&json!(["compute"]));
        assert!(matches!(result, Err(MetadataError::Malformed { .. })));
    }

    #[test]
    fn test_scale_set_without_instance_name() {
        let doc = json!({ "vmScaleSetName": "web-fleet" });
        let partial = parse_compute_metadata(&doc).expect("parsed");
        assert_eq!(partial.membership, None);
    }
}
