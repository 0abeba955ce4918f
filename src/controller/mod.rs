//! Controller implementations for Strata CRDs
//!
//! One level-triggered reconciler per quota kind, each idempotent on every
//! re-run. Reconcilers guarantee finalizer presence, initialize status on
//! first observation, and re-run usage propagation so the tree converges
//! after any drift, including a dropped admission-time propagation.
//!
//! Watch-trigger hygiene: reconcilers only write when state actually
//! drifted, so the status updates they (and the propagators) produce do not
//! ping-pong the controllers into reconcile loops, while deletion-marker
//! changes still reconcile immediately.

pub mod leaf;
pub mod tree;

pub use leaf::LeafContext;
pub use tree::TreeContext;
