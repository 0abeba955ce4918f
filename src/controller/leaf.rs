//! LeafQuota controller implementation
//!
//! Runs inside each member cluster. Leaves carry no status of their own, so
//! the pass reduces to finalizer management plus the full-rescan propagation
//! toward the pivot parent:
//!
//! 1. attach the finalizer on first observation
//! 2. on deletion, flush this leaf out of its parent and drop the finalizer
//! 3. finish with a non-flushing rescan, which both registers the leaf and
//!    converges the parent after a dropped asynchronous propagation

use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use kube::ResourceExt;
use tracing::{error, info, instrument};

use crate::cluster::QuotaClient;
use crate::crd::LeafQuota;
use crate::quota::propagate::propagate_leaf_child;
use crate::{Error, QUOTA_FINALIZER};

/// Requeue interval for converged objects.
const REQUEUE_INTERVAL: Duration = Duration::from_secs(60);

/// Controller context for LeafQuota reconciliation
pub struct LeafContext {
    /// Handle to the pivot cluster (where the parent lives)
    pub pivot: Arc<dyn QuotaClient>,
    /// Handle to the local member cluster (where the leaves live)
    pub local: Arc<dyn QuotaClient>,
}

impl LeafContext {
    /// Create a context from the pivot and local cluster handles.
    pub fn new(pivot: Arc<dyn QuotaClient>, local: Arc<dyn QuotaClient>) -> Self {
        Self { pivot, local }
    }
}

/// Reconcile a LeafQuota resource
#[instrument(skip(quota, ctx), fields(quota = %quota.name_any(), namespace = %quota.namespace().unwrap_or_default()))]
pub async fn reconcile(quota: Arc<LeafQuota>, ctx: Arc<LeafContext>) -> Result<Action, Error> {
    let has_finalizer = quota.finalizers().iter().any(|f| f == QUOTA_FINALIZER);

    if quota.metadata.deletion_timestamp.is_some() {
        if has_finalizer {
            propagate_leaf_child(ctx.pivot.as_ref(), ctx.local.as_ref(), &quota, true).await?;

            let mut updated = (*quota).clone();
            updated.finalizers_mut().retain(|f| f != QUOTA_FINALIZER);
            ctx.local.update_leaf(&updated).await?;
            info!("flushed deleted quota out of its parent");
        }
        return Ok(Action::await_change());
    }

    if !has_finalizer {
        let mut updated = (*quota).clone();
        updated.finalizers_mut().push(QUOTA_FINALIZER.to_string());
        ctx.local.update_leaf(&updated).await?;
        info!("attached finalizer");
    }

    // The rescan is idempotent: it registers the leaf if needed and
    // recomputes the parent's used map from the live children.
    propagate_leaf_child(ctx.pivot.as_ref(), ctx.local.as_ref(), &quota, false).await?;

    Ok(Action::requeue(REQUEUE_INTERVAL))
}

/// Error policy for the LeafQuota controller
pub fn error_policy(quota: Arc<LeafQuota>, err: &Error, _ctx: Arc<LeafContext>) -> Action {
    error!(
        quota = %quota.name_any(),
        error = %err,
        "reconciliation failed"
    );
    Action::requeue(Duration::from_secs(5))
}
