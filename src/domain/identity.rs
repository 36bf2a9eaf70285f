//! Azure compute resource identity.
//!
//! A host is either a standalone virtual machine or a member of a VM scale
//! set. The two shapes are modelled as a closed enum so every place that
//! builds a resource URI or a dimension list has to handle both.

use crate::domain::metrics::Dimension;
use serde::Serialize;

/// Region used when neither configuration nor the metadata service supply one.
pub const DEFAULT_REGION: &str = "northeurope";

/// Dimension name carrying the scale set instance on forwarded series.
pub const INSTANCE_DIMENSION: &str = "VMName";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ResourceKind {
    StandaloneVm {
        name: String,
    },
    ScaleSetMember {
        scale_set_name: String,
        instance_id: String,
    },
}

/// Fully resolved identity of the compute resource we report for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceIdentity {
    pub subscription_id: String,
    pub resource_group: String,
    pub region: String,
    pub kind: ResourceKind,
}

impl ResourceIdentity {
    /// VM name, or the scale set name for scale set members.
    pub fn name(&self) -> &str {
        match &self.kind {
            ResourceKind::StandaloneVm { name } => name,
            ResourceKind::ScaleSetMember { scale_set_name, .. } => scale_set_name,
        }
    }

    pub fn instance_id(&self) -> Option<&str> {
        match &self.kind {
            ResourceKind::StandaloneVm { .. } => None,
            ResourceKind::ScaleSetMember { instance_id, .. } => Some(instance_id),
        }
    }

    pub fn is_scale_set_member(&self) -> bool {
        matches!(self.kind, ResourceKind::ScaleSetMember { .. })
    }

    /// ARM resource URI metrics are attributed to.
    ///
    /// Scale set members report against the scale set itself; the instance
    /// travels as a dimension instead (see [`ResourceIdentity::dimension`]).
    pub fn resource_uri(&self) -> String {
        let prefix = format!(
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Compute",
            self.subscription_id, self.resource_group
        );
        match &self.kind {
            ResourceKind::StandaloneVm { name } => {
                format!("{}/virtualMachines/{}", prefix, name)
            }
            ResourceKind::ScaleSetMember { scale_set_name, .. } => {
                format!("{}/virtualMachineScaleSets/{}", prefix, scale_set_name)
            }
        }
    }

    /// Per-resource custom metrics endpoint.
    pub fn metrics_endpoint(&self, ingestion_host: &str) -> String {
        format!(
            "https://{}.{}{}/metrics",
            self.region,
            ingestion_host,
            self.resource_uri()
        )
    }

    /// Dimension identifying the instance inside its scale set, if any.
    pub fn dimension(&self) -> Option<Dimension> {
        match &self.kind {
            ResourceKind::StandaloneVm { .. } => None,
            ResourceKind::ScaleSetMember {
                scale_set_name,
                instance_id,
            } => Some(Dimension {
                name: INSTANCE_DIMENSION.to_string(),
                value: format!("{}_{}", scale_set_name, instance_id),
            }),
        }
    }
}

/// Scale set membership as reported by a single identity source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Membership {
    Standalone,
    ScaleSet {
        scale_set_name: String,
        instance_name: String,
    },
}

/// Identity fields contributed by one source. Any field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialIdentity {
    pub subscription_id: Option<String>,
    pub resource_group: Option<String>,
    pub name: Option<String>,
    pub region: Option<String>,
    pub membership: Option<Membership>,
}

impl PartialIdentity {
    /// Fill fields still missing here from `other`. Present fields win.
    pub fn merge(self, other: PartialIdentity) -> PartialIdentity {
        PartialIdentity {
            subscription_id: self.subscription_id.or(other.subscription_id),
            resource_group: self.resource_group.or(other.resource_group),
            name: self.name.or(other.name),
            region: self.region.or(other.region),
            membership: self.membership.or(other.membership),
        }
    }

    /// True when no later source could add anything.
    pub fn is_complete(&self) -> bool {
        self.subscription_id.is_some()
            && self.resource_group.is_some()
            && self.name.is_some()
            && self.region.is_some()
            && self.membership.is_some()
    }

    /// Names of the fields required for forwarding that are still missing.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.subscription_id.is_none() {
            missing.push("subscription_id");
        }
        if self.resource_group.is_none() {
            missing.push("resource_group");
        }
        let standalone = !matches!(self.membership, Some(Membership::ScaleSet { .. }));
        if standalone && self.name.is_none() {
            missing.push("resource_name");
        }
        missing
    }

    /// Turn the merged partial into a usable identity.
    ///
    /// Returns `None` when subscription or resource group are missing, or
    /// when a standalone host has no resource name.
    pub fn finalize(self) -> Option<ResourceIdentity> {
        let subscription_id = self.subscription_id?;
        let resource_group = self.resource_group?;
        let region = self.region.unwrap_or_else(|| DEFAULT_REGION.to_string());

        let kind = match self.membership {
            Some(Membership::ScaleSet {
                scale_set_name,
                instance_name,
            }) => ResourceKind::ScaleSetMember {
                scale_set_name,
                instance_id: instance_name,
            },
            Some(Membership::Standalone) | None => ResourceKind::StandaloneVm { name: self.name? },
        };

        Some(ResourceIdentity {
            subscription_id,
            resource_group,
            region,
            kind,
        })
    }
}

/// Non-empty, trimmed value or `None`.
pub fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
