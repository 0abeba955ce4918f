//! Custom Resource Definitions for Strata
//!
//! Two kinds form the quota hierarchy: cluster-scoped [`TreeQuota`] nodes in
//! the pivot cluster and namespace-scoped [`LeafQuota`] leaves in member
//! clusters.

mod leaf;
mod tree;

pub use leaf::{LeafQuota, LeafQuotaSpec};
pub use tree::{QuotaTarget, TargetKind, TreeQuota, TreeQuotaSpec, TreeQuotaStatus};
