//! TreeQuota Custom Resource Definition
//!
//! A TreeQuota is a cluster-scoped node of the quota hierarchy in the pivot
//! cluster. It grants an entitlement (`hard`) to its direct children
//! collectively and records the aggregate entitlement those children have
//! claimed (`status.used`), together with one encoded identifier per
//! registered child (`status.subQuotas`).

use kube::CustomResource;
use kube::ResourceExt;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::quota::child::tree_child_id;
use crate::quota::resource::ResourceList;
use crate::Error;

/// The real-world entity a TreeQuota constrains
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[non_exhaustive]
pub enum TargetKind {
    /// A pool of nodes shared by tenants
    #[default]
    NodesPool,
    /// A tenant
    Tenant,
    /// A project inside a tenant
    Project,
}

impl TargetKind {
    /// True if nodes of this kind skip the overload check against their own
    /// parent.
    ///
    /// Tenant-level entitlement is not checked against the node pool that
    /// hosts it.
    pub fn bypasses_overload_check(&self) -> bool {
        matches!(self, TargetKind::Tenant)
    }
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NodesPool => write!(f, "NodesPool"),
            Self::Tenant => write!(f, "Tenant"),
            Self::Project => write!(f, "Project"),
        }
    }
}

impl std::str::FromStr for TargetKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NodesPool" => Ok(Self::NodesPool),
            "Tenant" => Ok(Self::Tenant),
            "Project" => Ok(Self::Project),
            _ => Err(Error::validation(format!(
                "invalid target kind: {s}, expected one of: NodesPool, Tenant, Project"
            ))),
        }
    }
}

/// Reference to the entity a TreeQuota constrains
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct QuotaTarget {
    /// What kind of entity this node constrains
    pub kind: TargetKind,

    /// The entity's own identifier
    pub name: String,
}

/// Specification for a TreeQuota
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "strata.dev",
    version = "v1alpha1",
    kind = "TreeQuota",
    plural = "treequotas",
    shortname = "tq",
    status = "TreeQuotaStatus",
    namespaced = false,
    printcolumn = r#"{"name":"Target","type":"string","jsonPath":".spec.target.kind"}"#,
    printcolumn = r#"{"name":"Parent","type":"string","jsonPath":".spec.parent"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TreeQuotaSpec {
    /// The entity this node constrains
    pub target: QuotaTarget,

    /// Name of the parent TreeQuota; empty or absent for a root node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,

    /// Entitlement granted to this node's children collectively
    #[serde(default, skip_serializing_if = "ResourceList::is_empty")]
    pub hard: ResourceList,
}

/// Status for a TreeQuota
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TreeQuotaStatus {
    /// Mirror of `spec.hard`, maintained by the reconciler
    #[serde(default, skip_serializing_if = "ResourceList::is_empty")]
    pub hard: ResourceList,

    /// Aggregate entitlement consumed by registered children
    #[serde(default, skip_serializing_if = "ResourceList::is_empty")]
    pub used: ResourceList,

    /// Encoded identifiers of this node's direct children
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_quotas: Vec<String>,
}

impl TreeQuota {
    /// Name of this node's parent, normalizing the empty string to `None`.
    pub fn parent_name(&self) -> Option<&str> {
        self.spec.parent.as_deref().filter(|p| !p.is_empty())
    }

    /// The identifier this node registers in its parent's `subQuotas` list.
    pub fn child_id(&self) -> String {
        tree_child_id(&self.name_any())
    }

    /// This node's status, or an empty default when unset.
    pub fn status_or_default(&self) -> TreeQuotaStatus {
        self.status.clone().unwrap_or_default()
    }
}
