//! LeafQuota Custom Resource Definition
//!
//! A LeafQuota is a namespace-scoped entitlement inside a member cluster and
//! a leaf of the quota hierarchy: it grants `hard` to the workloads of its
//! namespace and aggregates nothing of its own. Its parent is a TreeQuota in
//! the pivot cluster, referenced by the `quota.strata.dev/parent` label
//! because parent and child live in different storage domains.

use kube::CustomResource;
use kube::ResourceExt;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::quota::child::leaf_child_id;
use crate::quota::resource::ResourceList;
use crate::{Error, Result, PARENT_LABEL};

/// Specification for a LeafQuota
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "strata.dev",
    version = "v1alpha1",
    kind = "LeafQuota",
    plural = "leafquotas",
    shortname = "lq",
    namespaced,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct LeafQuotaSpec {
    /// Entitlement granted to this namespace
    #[serde(default, skip_serializing_if = "ResourceList::is_empty")]
    pub hard: ResourceList,
}

impl LeafQuota {
    /// Name of this leaf's parent TreeQuota, read from the parent label.
    pub fn parent_name(&self) -> Option<&str> {
        self.metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get(PARENT_LABEL))
            .map(String::as_str)
            .filter(|p| !p.is_empty())
    }

    /// The identifier this leaf registers in its parent's `subQuotas` list.
    ///
    /// Errors when the object has no namespace yet, which only happens for
    /// hand-built objects that never passed the API server.
    pub fn child_id(&self) -> Result<String> {
        let namespace = self
            .metadata
            .namespace
            .as_deref()
            .ok_or_else(|| Error::validation("leaf quota has no namespace"))?;
        Ok(leaf_child_id(&self.name_any(), namespace))
    }
}
