use crate::domain::identity::{PartialIdentity, ResourceIdentity, ResourceKind};
use crate::domain::ports::MetadataService;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

/// One place identity fields can come from.
///
/// Sources never fail: a source that cannot answer contributes an empty
/// partial and logs why.
#[async_trait]
pub trait IdentitySource: Send + Sync {
    fn name(&self) -> &str;
    async fn fetch(&self) -> PartialIdentity;
}

/// Fields pinned by configuration. Always consulted first.
pub struct ConfiguredIdentity {
    overrides: PartialIdentity,
}

impl ConfiguredIdentity {
    pub fn new(overrides: PartialIdentity) -> Self {
        Self { overrides }
    }
}

#[async_trait]
impl IdentitySource for ConfiguredIdentity {
    fn name(&self) -> &str {
        "configuration"
    }

    async fn fetch(&self) -> PartialIdentity {
        self.overrides.clone()
    }
}

/// Fields discovered through the instance metadata service.
pub struct MetadataIdentity {
    service: Arc<dyn MetadataService>,
}

impl MetadataIdentity {
    pub fn new(service: Arc<dyn MetadataService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl IdentitySource for MetadataIdentity {
    fn name(&self) -> &str {
        "instance metadata"
    }

    async fn fetch(&self) -> PartialIdentity {
        match self.service.instance_identity().await {
            Ok(partial) => partial,
            Err(e) => {
                warn!(
                    "ResourceIdentityResolver: metadata service unavailable, using configuration only: {}",
                    e
                );
                PartialIdentity::default()
            }
        }
    }
}

/// Result of identity resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(ResourceIdentity),
    /// Forwarding is disabled; lists the fields no source could provide.
    Unconfigured { missing: Vec<&'static str> },
}

impl Resolution {
    pub fn identity(&self) -> Option<&ResourceIdentity> {
        match self {
            Resolution::Resolved(identity) => Some(identity),
            Resolution::Unconfigured { .. } => None,
        }
    }
}

/// Resolves which Azure resource this host reports metrics for.
///
/// Sources are consulted in order and merged field by field: earlier
/// sources win, later ones only fill gaps, and resolution stops at the
/// first complete result. The first resolution is cached for the lifetime
/// of the resolver.
pub struct ResourceIdentityResolver {
    sources: Vec<Box<dyn IdentitySource>>,
    cached: OnceCell<Resolution>,
}

impl ResourceIdentityResolver {
    pub fn new(sources: Vec<Box<dyn IdentitySource>>) -> Self {
        Self {
            sources,
            cached: OnceCell::new(),
        }
    }

    /// Configuration overrides first, then the metadata service.
    pub fn with_metadata(overrides: PartialIdentity, metadata: Arc<dyn MetadataService>) -> Self {
        Self::new(vec![
            Box::new(ConfiguredIdentity::new(overrides)),
            Box::new(MetadataIdentity::new(metadata)),
        ])
    }

    /// Cached resolution; queries the sources only on first use.
    pub async fn resolve(&self) -> &Resolution {
        self.cached.get_or_init(|| self.resolve_fresh()).await
    }

    /// Query every source again, bypassing the cache.
    pub async fn resolve_fresh(&self) -> Resolution {
        let mut merged = PartialIdentity::default();
        for source in &self.sources {
            if merged.is_complete() {
                break;
            }
            let partial = source.fetch().await;
            merged = merged.merge(partial);
        }

        let missing = merged.missing_fields();
        match merged.finalize() {
            Some(identity) => {
                log_identity(&identity);
                Resolution::Resolved(identity)
            }
            None => {
                warn!(
                    "ResourceIdentityResolver: missing Azure configuration {:?}, forwarding disabled",
                    missing
                );
                Resolution::Unconfigured { missing }
            }
        }
    }
}

fn log_identity(identity: &ResourceIdentity) {
    match &identity.kind {
        ResourceKind::StandaloneVm { name } => info!(
            "ResourceIdentityResolver: configured for VM {} in {} ({})",
            name, identity.resource_group, identity.subscription_id
        ),
        ResourceKind::ScaleSetMember {
            scale_set_name,
            instance_id,
        } => info!(
            "ResourceIdentityResolver: configured for VMSS {} (instance {}) in {} ({})",
            scale_set_name, instance_id, identity.resource_group, identity.subscription_id
        ),
    }
    info!(
        "ResourceIdentityResolver: resource URI {}",
        identity.resource_uri()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::MetadataError;
    use crate::domain::identity::{DEFAULT_REGION, Membership};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubMetadata {
        response: Option<PartialIdentity>,
        calls: AtomicUsize,
    }

    impl StubMetadata {
        fn answering(partial: PartialIdentity) -> Arc<Self> {
            Arc::new(Self {
                response: Some(partial),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                response: None,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl MetadataService for StubMetadata {
        async fn instance_identity(&self) -> Result<PartialIdentity, MetadataError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.response.clone().ok_or(MetadataError::Unreachable {
                reason: "timed out".to_string(),
            })
        }
    }

    fn imds_vm() -> PartialIdentity {
        PartialIdentity {
            subscription_id: Some("imds-sub".to_string()),
            resource_group: Some("imds-rg".to_string()),
            name: Some("imds-vm".to_string()),
            region: Some("westus2".to_string()),
            membership: Some(Membership::Standalone),
        }
    }

    #[tokio::test]
    async fn test_metadata_fills_missing_fields() {
        let resolver =
            ResourceIdentityResolver::with_metadata(PartialIdentity::default(), StubMetadata::answering(imds_vm()));

        let identity = resolver.resolve().await.identity().cloned().expect("resolved");
        assert_eq!(identity.subscription_id, "imds-sub");
        assert_eq!(identity.region, "westus2");
        assert_eq!(identity.name(), "imds-vm");
    }

    #[tokio::test]
    async fn test_overrides_take_precedence() {
        let overrides = PartialIdentity {
            resource_group: Some("pinned-rg".to_string()),
            region: Some("northeurope".to_string()),
            ..Default::default()
        };
        let resolver =
            ResourceIdentityResolver::with_metadata(overrides, StubMetadata::answering(imds_vm()));

        let identity = resolver.resolve_fresh().await;
        let identity = identity.identity().expect("resolved");
        assert_eq!(identity.resource_group, "pinned-rg");
        assert_eq!(identity.region, "northeurope");
        assert_eq!(identity.subscription_id, "imds-sub");
    }

    #[tokio::test]
    async fn test_metadata_failure_falls_back_to_configuration() {
        let overrides = PartialIdentity {
            subscription_id: Some("s".to_string()),
            resource_group: Some("rg".to_string()),
            name: Some("vm".to_string()),
            ..Default::default()
        };
        let resolver = ResourceIdentityResolver::with_metadata(overrides, StubMetadata::failing());

        let identity = resolver.resolve().await.identity().cloned().expect("resolved");
        assert_eq!(identity.region, DEFAULT_REGION);
        assert!(!identity.is_scale_set_member());
    }

    #[tokio::test]
    async fn test_unconfigured_when_nothing_known() {
        let resolver =
            ResourceIdentityResolver::with_metadata(PartialIdentity::default(), StubMetadata::failing());

        match resolver.resolve().await {
            Resolution::Unconfigured { missing } => {
                assert_eq!(
                    missing,
                    &vec!["subscription_id", "resource_group", "resource_name"]
                );
            }
            other => panic!("expected unconfigured, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_complete_configuration_skips_metadata() {
        let overrides = PartialIdentity {
            membership: Some(Membership::Standalone),
            ..imds_vm()
        };
        let metadata = StubMetadata::answering(imds_vm());
        let resolver = ResourceIdentityResolver::with_metadata(overrides, metadata.clone());

        resolver.resolve().await;
        assert_eq!(metadata.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unpinned_membership_still_asks_metadata() {
        let overrides = PartialIdentity {
            membership: None,
            ..imds_vm()
        };
        let metadata = StubMetadata::answering(PartialIdentity {
            name: Some("fleet_4".to_string()),
            membership: Some(Membership::ScaleSet {
                scale_set_name: "fleet".to_string(),
                instance_name: "fleet_4".to_string(),
            }),
            ..imds_vm()
        });
        let resolver = ResourceIdentityResolver::with_metadata(overrides, metadata.clone());

        let identity = resolver.resolve().await.identity().cloned().expect("resolved");
        assert_eq!(metadata.calls.load(Ordering::SeqCst), 1);
        assert!(identity.is_scale_set_member());
    }

    #[tokio::test]
    async fn test_resolution_cached_and_idempotent() {
        let metadata = StubMetadata::answering(imds_vm());
        let resolver =
            ResourceIdentityResolver::with_metadata(PartialIdentity::default(), metadata.clone());

        let first = resolver.resolve().await.clone();
        let second = resolver.resolve().await.clone();
        assert_eq!(first, second);
        assert_eq!(metadata.calls.load(Ordering::SeqCst), 1);

        let fresh = resolver.resolve_fresh().await;
        assert_eq!(fresh, first);
        assert_eq!(metadata.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_scale_set_membership_from_metadata() {
        let imds = PartialIdentity {
            name: Some("web-fleet_3".to_string()),
            membership: Some(Membership::ScaleSet {
                scale_set_name: "web-fleet".to_string(),
                instance_name: "web-fleet_3".to_string(),
            }),
            ..imds_vm()
        };
        let resolver =
            ResourceIdentityResolver::with_metadata(PartialIdentity::default(), StubMetadata::answering(imds));

        let identity = resolver.resolve().await.identity().cloned().expect("resolved");
        assert_eq!(
            identity.kind,
            ResourceKind::ScaleSetMember {
                scale_set_name: "web-fleet".to_string(),
                instance_id: "web-fleet_3".to_string(),
            }
        );
        assert!(identity.resource_uri().contains("virtualMachineScaleSets/web-fleet"));
    }
}
