//! The hierarchical quota engine
//!
//! Quota objects form a forest: cluster-scoped `TreeQuota` nodes in the
//! pivot cluster, namespace-scoped `LeafQuota` leaves in member clusters.
//! This module holds everything that reasons about that structure:
//!
//! - [`quantity`] / [`resource`] - the value types accounting runs over
//! - [`child`] - the string encoding that registers a child with its parent
//! - [`parent`] - immediate-parent resolution against the pivot cluster
//! - [`overload`] - the admission-time non-overload check
//! - [`propagate`] - asynchronous usage propagation up the tree

pub mod child;
pub mod overload;
pub mod parent;
pub mod propagate;
pub mod quantity;
pub mod resource;

pub use overload::Overload;
pub use quantity::Quantity;
pub use resource::{ResourceKind, ResourceList, ResourceListExt};
