//! Validating webhook for TreeQuota writes
//!
//! Checks per operation:
//!
//! | Operation | Decoded        | Checks                                     |
//! |-----------|----------------|--------------------------------------------|
//! | Create    | current        | overload against the parent                |
//! | Update    | current + old  | hard-below-used guardrail, then overload   |
//! | Delete    | old            | child list must be empty                   |
//!
//! On allow, if the object was already persisted (non-empty UID) the delta
//! propagator is invoked asynchronously; its outcome never reaches the
//! writer.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use kube::core::DynamicObject;
use kube::ResourceExt;
use tracing::{info, warn};

use crate::cluster::QuotaClient;
use crate::crd::TreeQuota;
use crate::quota::overload::evaluate_tree_child;
use crate::quota::propagate::propagate_tree_child;
use crate::quota::resource::{ResourceKind, ResourceListExt};

use super::WebhookState;

/// Axum handler for TreeQuota admission reviews
pub async fn validate_handler(
    State(state): State<Arc<WebhookState>>,
    Json(review): Json<AdmissionReview<TreeQuota>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let req: AdmissionRequest<TreeQuota> = match review.try_into() {
        Ok(req) => req,
        Err(e) => {
            warn!(error = %e, "malformed TreeQuota admission review");
            return Json(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };
    Json(admit(&state, &req).await.into_review())
}

/// Run the per-operation checks and schedule propagation on allow.
async fn admit(state: &WebhookState, req: &AdmissionRequest<TreeQuota>) -> AdmissionResponse {
    let response = AdmissionResponse::from(req);

    let verdict = match req.operation {
        Operation::Create => validate_create(state, req.object.as_ref()).await,
        Operation::Update => {
            validate_update(state, req.object.as_ref(), req.old_object.as_ref()).await
        }
        Operation::Delete => validate_delete(req.old_object.as_ref()),
        Operation::Connect => Ok(()),
    };

    match verdict {
        Ok(()) => {
            schedule_propagation(state, req);
            response
        }
        Err(reason) => {
            info!(name = %req.name, operation = ?req.operation, reason = %reason, "denying TreeQuota write");
            response.deny(reason)
        }
    }
}

/// Create: overload check with the old snapshot treated as absent.
async fn validate_create(
    state: &WebhookState,
    current: Option<&TreeQuota>,
) -> Result<(), String> {
    let current = current.ok_or("admission request carries no object")?;
    overload_verdict(state, current, None).await
}

/// Update: the hard map may not drop below the recorded used map, then the
/// overload check runs on the delta.
async fn validate_update(
    state: &WebhookState,
    current: Option<&TreeQuota>,
    old: Option<&TreeQuota>,
) -> Result<(), String> {
    let current = current.ok_or("admission request carries no object")?;
    let old = old.ok_or("admission request carries no old object")?;

    let used = old.status_or_default().used;
    for kind in ResourceKind::ALL {
        let Some(recorded) = used.get(&kind) else {
            continue;
        };
        if current.spec.hard.get_or_zero(kind) < *recorded {
            return Err(format!(
                "hard of quota {} should not be less than used",
                current.name_any()
            ));
        }
    }

    overload_verdict(state, current, Some(old)).await
}

/// Delete: gated on the child list being empty.
fn validate_delete(old: Option<&TreeQuota>) -> Result<(), String> {
    let old = old.ok_or("admission request carries no old object")?;
    if !old.status_or_default().sub_quotas.is_empty() {
        return Err(format!(
            "must delete sub resource of quota {} first",
            old.name_any()
        ));
    }
    Ok(())
}

/// Run the overload evaluator, failing closed on engine errors.
async fn overload_verdict(
    state: &WebhookState,
    current: &TreeQuota,
    old: Option<&TreeQuota>,
) -> Result<(), String> {
    match evaluate_tree_child(state.pivot.as_ref(), current, old).await {
        Ok(None) => Ok(()),
        Ok(Some(overload)) => Err(overload.reason),
        Err(e) => Err(format!("quota validation failed: {e}")),
    }
}

/// Fire the delta propagator asynchronously for an allowed write.
///
/// Only objects that were already persisted (non-empty UID) propagate here;
/// freshly created objects are picked up by the reconciler's first pass.
fn schedule_propagation(state: &WebhookState, req: &AdmissionRequest<TreeQuota>) {
    if req.dry_run {
        return;
    }
    let (subject, old, flush) = match req.operation {
        Operation::Create => (req.object.clone(), None, false),
        Operation::Update => (req.object.clone(), req.old_object.clone(), false),
        Operation::Delete => (req.old_object.clone(), None, true),
        Operation::Connect => (None, None, false),
    };
    let Some(subject) = subject else {
        return;
    };
    if subject.metadata.uid.as_deref().unwrap_or_default().is_empty() {
        return;
    }

    let pivot: Arc<dyn QuotaClient> = state.pivot.clone();
    tokio::spawn(async move {
        let old_hard = old.as_ref().map(|o| &o.spec.hard);
        if let Err(e) =
            propagate_tree_child(pivot.as_ref(), &subject, old_hard, flush).await
        {
            // Best-effort: the reconciler's next pass converges the parent.
            warn!(
                quota = %subject.name_any(),
                error = %e,
                "asynchronous usage propagation failed"
            );
        }
    });
}
