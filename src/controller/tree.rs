//! TreeQuota controller implementation
//!
//! Level-triggered reconciliation for the pivot-cluster quota nodes. Every
//! pass is idempotent:
//!
//! 1. attach the finalizer on first observation
//! 2. on deletion, flush this node out of its parent and drop the finalizer
//! 3. initialize status on first observation (hard mirror, zeroed used)
//! 4. keep `status.hard` mirroring `spec.hard` and every granted kind
//!    backed by a used entry, persisting only on drift
//! 5. finish with a non-flushing propagation toward the immediate parent,
//!    which is what converges the tree after a dropped asynchronous
//!    propagation

use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use kube::ResourceExt;
use tracing::{error, info, instrument};

use crate::cluster::QuotaClient;
use crate::crd::TreeQuota;
use crate::quota::propagate::propagate_tree_child;
use crate::quota::quantity::Quantity;
use crate::{Error, QUOTA_FINALIZER};

/// Requeue interval for converged objects.
///
/// Propagation drift heals on this cadence when no watch event arrives.
const REQUEUE_INTERVAL: Duration = Duration::from_secs(60);

/// Controller context for TreeQuota reconciliation
pub struct TreeContext {
    /// Handle to the pivot cluster
    pub pivot: Arc<dyn QuotaClient>,
}

impl TreeContext {
    /// Create a context from the pivot cluster handle.
    pub fn new(pivot: Arc<dyn QuotaClient>) -> Self {
        Self { pivot }
    }
}

/// Reconcile a TreeQuota resource
#[instrument(skip(quota, ctx), fields(quota = %quota.name_any()))]
pub async fn reconcile(quota: Arc<TreeQuota>, ctx: Arc<TreeContext>) -> Result<Action, Error> {
    let has_finalizer = quota.finalizers().iter().any(|f| f == QUOTA_FINALIZER);

    if quota.metadata.deletion_timestamp.is_some() {
        if has_finalizer {
            // The only path that permanently detaches a node from the tree.
            propagate_tree_child(ctx.pivot.as_ref(), &quota, None, true).await?;

            let mut updated = (*quota).clone();
            updated.finalizers_mut().retain(|f| f != QUOTA_FINALIZER);
            ctx.pivot.update_tree(&updated).await?;
            info!("flushed deleted quota out of its parent");
        }
        return Ok(Action::await_change());
    }

    let mut current = (*quota).clone();
    if !has_finalizer {
        current.finalizers_mut().push(QUOTA_FINALIZER.to_string());
        current = ctx.pivot.update_tree(&current).await?;
        info!("attached finalizer");
    }

    // Status init on first observation, hard mirror and used backfill on
    // every pass; a write only happens when something drifted.
    let before = current.status_or_default();
    let mut status = before.clone();
    status.hard = current.spec.hard.clone();
    for kind in current.spec.hard.keys() {
        status.used.entry(*kind).or_insert(Quantity::ZERO);
    }
    if status != before {
        current.status = Some(status);
        current = ctx.pivot.update_tree_status(&current).await?;
        info!("initialized quota status");
    }

    // Eventual consistency: re-run propagation even when the admission-time
    // asynchronous call was dropped.
    propagate_tree_child(ctx.pivot.as_ref(), &current, None, false).await?;

    Ok(Action::requeue(REQUEUE_INTERVAL))
}

/// Error policy for the TreeQuota controller
pub fn error_policy(quota: Arc<TreeQuota>, err: &Error, _ctx: Arc<TreeContext>) -> Action {
    error!(
        quota = %quota.name_any(),
        error = %err,
        "reconciliation failed"
    );
    Action::requeue(Duration::from_secs(5))
}
