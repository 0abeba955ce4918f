//! Validating admission webhooks for quota objects
//!
//! Every create/update/delete of a `TreeQuota` or `LeafQuota` passes through
//! these handlers synchronously. They run the overload check and the
//! update/delete guardrails over already-decoded snapshots plus exactly one
//! parent fetch, return an allow/deny verdict within the admission deadline,
//! and on allow fire a best-effort asynchronous usage propagation whose
//! failure is logged but never surfaced to the writer.

pub mod leaf;
pub mod tree;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::cluster::QuotaClient;

/// Shared state for webhook handlers
pub struct WebhookState {
    /// Handle to the pivot cluster (parent fetches, status propagation)
    pub pivot: Arc<dyn QuotaClient>,
    /// Handle to the local cluster (leaf rescans read live leaves here)
    pub local: Arc<dyn QuotaClient>,
}

impl WebhookState {
    /// Create webhook state from the pivot and local cluster handles.
    ///
    /// In the pivot cluster the two handles are the same client.
    pub fn new(pivot: Arc<dyn QuotaClient>, local: Arc<dyn QuotaClient>) -> Self {
        Self { pivot, local }
    }
}

/// Create the webhook router with all validation endpoints
///
/// - POST /validate/treequotas - validate TreeQuota writes (pivot cluster)
/// - POST /validate/leafquotas - validate LeafQuota writes (member clusters)
/// - GET /healthz - liveness probe
pub fn webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/validate/treequotas", post(tree::validate_handler))
        .route("/validate/leafquotas", post(leaf::validate_handler))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(state)
}
