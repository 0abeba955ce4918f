//! Validating webhook for LeafQuota writes
//!
//! Leaves carry no aggregation of their own, so only the overload check
//! applies (create and update); deletion is ungated here and the hard-
//! below-used guardrail does not exist at this level. On allow, the
//! full-rescan propagator runs asynchronously against the pivot parent.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use kube::core::DynamicObject;
use kube::ResourceExt;
use tracing::{info, warn};

use crate::cluster::QuotaClient;
use crate::crd::LeafQuota;
use crate::quota::overload::evaluate_leaf_child;
use crate::quota::propagate::propagate_leaf_child;

use super::WebhookState;

/// Axum handler for LeafQuota admission reviews
pub async fn validate_handler(
    State(state): State<Arc<WebhookState>>,
    Json(review): Json<AdmissionReview<LeafQuota>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let req: AdmissionRequest<LeafQuota> = match review.try_into() {
        Ok(req) => req,
        Err(e) => {
            warn!(error = %e, "malformed LeafQuota admission review");
            return Json(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };
    Json(admit(&state, &req).await.into_review())
}

/// Run the per-operation checks and schedule propagation on allow.
async fn admit(state: &WebhookState, req: &AdmissionRequest<LeafQuota>) -> AdmissionResponse {
    let response = AdmissionResponse::from(req);

    let verdict = match req.operation {
        Operation::Create => validate_write(state, req.object.as_ref(), None).await,
        Operation::Update => {
            validate_write(state, req.object.as_ref(), req.old_object.as_ref()).await
        }
        // Leaves gate nothing on delete; the flush runs after allow.
        Operation::Delete | Operation::Connect => Ok(()),
    };

    match verdict {
        Ok(()) => {
            schedule_propagation(state, req);
            response
        }
        Err(reason) => {
            info!(name = %req.name, operation = ?req.operation, reason = %reason, "denying LeafQuota write");
            response.deny(reason)
        }
    }
}

/// Create/update: overload check against the pivot parent.
async fn validate_write(
    state: &WebhookState,
    current: Option<&LeafQuota>,
    old: Option<&LeafQuota>,
) -> Result<(), String> {
    let current = current.ok_or("admission request carries no object")?;
    match evaluate_leaf_child(state.pivot.as_ref(), current, old).await {
        Ok(None) => Ok(()),
        Ok(Some(overload)) => Err(overload.reason),
        Err(e) => Err(format!("quota validation failed: {e}")),
    }
}

/// Fire the full-rescan propagator asynchronously for an allowed write.
fn schedule_propagation(state: &WebhookState, req: &AdmissionRequest<LeafQuota>) {
    if req.dry_run {
        return;
    }
    let (subject, flush) = match req.operation {
        Operation::Create | Operation::Update => (req.object.clone(), false),
        Operation::Delete => (req.old_object.clone(), true),
        Operation::Connect => (None, false),
    };
    let Some(subject) = subject else {
        return;
    };
    if subject.metadata.uid.as_deref().unwrap_or_default().is_empty() {
        return;
    }

    let pivot: Arc<dyn QuotaClient> = state.pivot.clone();
    let local: Arc<dyn QuotaClient> = state.local.clone();
    tokio::spawn(async move {
        if let Err(e) =
            propagate_leaf_child(pivot.as_ref(), local.as_ref(), &subject, flush).await
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
