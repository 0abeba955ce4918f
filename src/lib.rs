//! Strata - multi-tenant control plane for Kubernetes
//!
//! Strata layers tenancy and hierarchical resource-quota governance on top of
//! Kubernetes. A pivot (control-plane) cluster holds the quota hierarchy as
//! cluster-scoped `TreeQuota` objects; every member cluster holds
//! namespace-scoped `LeafQuota` objects whose parent is a `TreeQuota` in the
//! pivot cluster.
//!
//! # Architecture
//!
//! The quota engine keeps one invariant across the tree: for every tracked
//! resource, a node's aggregate usage never exceeds the entitlement its
//! parent granted it. Enforcement happens in two places:
//!
//! - Admission webhooks validate every quota write synchronously against the
//!   immediate parent (overload check plus update/delete guardrails) and, on
//!   allow, kick off a best-effort asynchronous usage propagation.
//! - Reconcilers run level-triggered in the background, attach finalizers,
//!   initialize status, and re-run propagation idempotently so the tree
//!   converges even when an asynchronous propagation was dropped.
//!
//! # Modules
//!
//! - [`crd`] - Custom Resource Definitions (TreeQuota, LeafQuota)
//! - [`quota`] - The quota engine: quantities, resource vocabulary, child
//!   identifiers, parent resolution, overload evaluation, usage propagation
//! - [`cluster`] - Per-cluster client handles (pivot vs. member resolution)
//! - [`webhook`] - Validating admission webhooks for both quota kinds
//! - [`controller`] - Kubernetes controller reconciliation logic
//! - [`retry`] - Backoff/retry utilities for transient store errors
//! - [`error`] - Error types for the control plane

#![deny(missing_docs)]

pub mod cluster;
pub mod controller;
pub mod crd;
pub mod error;
pub mod quota;
pub mod retry;
pub mod webhook;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Finalizer attached to every quota object to gate deletion.
///
/// The reconciler flushes a node's contribution out of its parent before
/// removing this marker; the value is part of on-disk compatibility and must
/// not change between releases.
pub const QUOTA_FINALIZER: &str = "quota.strata.dev/cleanup";

/// Label on a `LeafQuota` naming its parent `TreeQuota` in the pivot cluster.
pub const PARENT_LABEL: &str = "quota.strata.dev/parent";

/// Field manager used for all server-side apply patches.
pub const FIELD_MANAGER: &str = "strata-controller";
