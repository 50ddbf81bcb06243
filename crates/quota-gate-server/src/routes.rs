// crates/quota-gate-server/src/routes.rs
// ============================================================================
// Module: Quota Gate Routes
// Description: axum router and handlers for access and admin endpoints.
// Purpose: Map HTTP requests onto engine decisions and catalog updates.
// Dependencies: quota-gate-core, axum, serde, tokio
// ============================================================================

//! ## Overview
//! Access routes are built once from the configured [`MeterableApis`]: each
//! name becomes `GET {prefix}{name}/{entity_id}`, and every route shares the
//! single [`handle_access`] handler with the API name attached as a request
//! extension. Store calls are synchronous and run on the blocking pool.
//!
//! Admin routes are mounted only when bearer tokens are configured.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use axum::Extension;
use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::DefaultBodyLimit;
use axum::extract::Path;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use axum::routing::put;
use quota_gate_core::AccessError;
use quota_gate_core::AccessErrorKind;
use quota_gate_core::ApiName;
use quota_gate_core::CatalogAdmin;
use quota_gate_core::EntityId;
use quota_gate_core::MeterableApis;
use quota_gate_core::Plan;
use quota_gate_core::PlanId;
use quota_gate_core::SharedAccessEngine;
use quota_gate_core::SharedMeteringStore;
use quota_gate_core::StoreError;
use quota_gate_core::Timestamp;
use quota_gate_core::route_segment;
use serde::Serialize;

use crate::audit::AccessAuditEvent;
use crate::audit::AdminAuditEvent;
use crate::audit::AdminAuditEventParams;
use crate::audit::AuditSink;
use crate::auth::AdminAuthz;
use crate::auth::AdminPrincipal;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Header carrying a caller-supplied request identifier.
const REQUEST_ID_HEADER: &str = "x-request-id";
/// Longest request identifier echoed into audit records.
const MAX_REQUEST_ID_BYTES: usize = 128;

// ============================================================================
// SECTION: State
// ============================================================================

/// Shared handler state.
pub struct AppState {
    /// Decision engine over the configured store.
    engine: Arc<SharedAccessEngine>,
    /// Store used for admin catalog writes.
    store: SharedMeteringStore,
    /// Admin bearer authorizer.
    authz: AdminAuthz,
    /// Audit sink for decisions and admin calls.
    audit: Arc<dyn AuditSink>,
}

impl AppState {
    /// Builds handler state over a shared store.
    #[must_use]
    pub fn new(store: SharedMeteringStore, authz: AdminAuthz, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            engine: Arc::new(SharedAccessEngine::from_store(&store)),
            store,
            authz,
            audit,
        }
    }
}

// ============================================================================
// SECTION: Router
// ============================================================================

/// Builds the HTTP router for the configured APIs.
#[must_use]
pub fn build_router(
    state: AppState,
    apis: &MeterableApis,
    route_prefix: &str,
    max_body_bytes: usize,
) -> Router {
    let admin_enabled = state.authz.enabled();
    let mut router = Router::new();
    for api in apis.iter() {
        let path = format!("{route_prefix}{}/{{entity_id}}", route_segment(api.as_str()));
        router = router.route(&path, get(handle_access).layer(Extension(api.clone())));
    }
    if admin_enabled {
        let admin = Router::new()
            .route("/admin/plans", post(handle_upsert_plans))
            .route("/admin/plans/{plan_id}", put(handle_replace_plan).delete(handle_delete_plan))
            .layer(DefaultBodyLimit::max(max_body_bytes));
        router = router.merge(admin);
    }
    router.with_state(Arc::new(state))
}

// ============================================================================
// SECTION: Payloads
// ============================================================================

/// Successful access response.
#[derive(Debug, Serialize)]
struct AccessResponse {
    /// Entity display name.
    display_name: String,
    /// Human-readable confirmation.
    message: String,
    /// Usage including this call.
    used: u64,
    /// Allowance in effect.
    allowed: u64,
}

/// Error envelope shared by the HTTP surface and the CLI.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    /// Error details.
    pub error: ErrorBody,
}

impl ErrorEnvelope {
    /// Builds the envelope for a failed access decision.
    #[must_use]
    pub fn from_access_error(err: &AccessError) -> Self {
        Self {
            error: ErrorBody::from_access_error(err),
        }
    }
}

/// Error details.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Stable error kind label.
    pub kind: &'static str,
    /// Human-readable message.
    pub message: String,
    /// API involved, when relevant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api: Option<ApiName>,
    /// Usage at check time, for quota denials.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used: Option<u64>,
    /// Allowance in effect, for quota denials.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed: Option<u64>,
}

impl ErrorBody {
    /// Builds an error body without API or usage context.
    fn plain(kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            api: None,
            used: None,
            allowed: None,
        }
    }

    /// Builds the body for a failed access decision, with API and usage context.
    #[must_use]
    pub fn from_access_error(err: &AccessError) -> Self {
        let mut body = Self::plain(err.kind().as_str(), err.to_string());
        match err {
            AccessError::PermissionDenied {
                api,
            } => body.api = Some(api.clone()),
            AccessError::QuotaExceeded {
                api,
                used,
                allowed,
            } => {
                body.api = Some(api.clone());
                body.used = Some(*used);
                body.allowed = Some(*allowed);
            }
            _ => {}
        }
        body
    }

    /// Wraps the body in the error envelope with `status`.
    fn respond(self, status: StatusCode) -> Response {
        (
            status,
            Json(ErrorEnvelope {
                error: self,
            }),
        )
            .into_response()
    }
}

/// Admin success payload.
#[derive(Debug, Serialize)]
struct AdminResponse {
    /// Action performed.
    action: &'static str,
    /// Plans touched.
    plan_ids: Vec<PlanId>,
}

// ============================================================================
// SECTION: Access Handler
// ============================================================================

/// Handles one access request for the API bound to the route.
async fn handle_access(
    State(state): State<Arc<AppState>>,
    Extension(api): Extension<ApiName>,
    Path(entity_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let entity_id = EntityId::new(entity_id);
    let request_id = request_id(&headers);
    let engine = Arc::clone(&state.engine);
    let task_entity = entity_id.clone();
    let task_api = api.clone();
    let decision = tokio::task::spawn_blocking(move || {
        engine.decide(&task_entity, &task_api, request_timestamp())
    })
    .await
    .unwrap_or_else(|err| {
        Err(AccessError::Storage(StoreError::Store(format!("decision task failed: {err}"))))
    });

    match decision {
        Ok(result) => {
            state.audit.record_access(&AccessAuditEvent::granted(request_id, &result));
            let body = AccessResponse {
                message: result.message(),
                display_name: result.display_name,
                used: result.used_after,
                allowed: result.allowed,
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(err) => {
            if err.is_retryable() {
                tracing::warn!(entity = %entity_id, api = %api, "access decision failed: {err}");
            }
            state.audit.record_access(&AccessAuditEvent::denied(request_id, &entity_id, &api, &err));
            access_error_response(&err)
        }
    }
}

/// Maps an access error onto its HTTP status.
const fn access_status(kind: AccessErrorKind) -> StatusCode {
    match kind {
        AccessErrorKind::EntityNotFound
        | AccessErrorKind::SubscriptionNotFound
        | AccessErrorKind::PlanNotFound => StatusCode::NOT_FOUND,
        AccessErrorKind::PermissionDenied | AccessErrorKind::QuotaExceeded => {
            StatusCode::FORBIDDEN
        }
        AccessErrorKind::StorageFailure => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Renders an access error as an HTTP response.
fn access_error_response(err: &AccessError) -> Response {
    ErrorBody::from_access_error(err).respond(access_status(err.kind()))
}

// ============================================================================
// SECTION: Admin Handlers
// ============================================================================

/// Upserts a batch of plans; each plan is written atomically.
async fn handle_upsert_plans(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = request_id(&headers);
    let principal = match authorize_admin(&state, &headers, request_id.as_ref(), "upsert_plans") {
        Ok(principal) => principal,
        Err(response) => return response,
    };
    let plans: Vec<Plan> = match serde_json::from_slice(&body) {
        Ok(plans) => plans,
        Err(err) => {
            return ErrorBody::plain("invalid_request", format!("invalid plan list: {err}"))
                .respond(StatusCode::BAD_REQUEST);
        }
    };
    if let Some(message) = first_plan_problem(&plans) {
        return ErrorBody::plain("invalid_request", message).respond(StatusCode::BAD_REQUEST);
    }
    let plan_ids: Vec<PlanId> = plans.iter().map(|plan| plan.plan_id.clone()).collect();
    let store = state.store.clone();
    let outcome = run_blocking(move || {
        for plan in &plans {
            store.put_plan(plan)?;
        }
        Ok(())
    })
    .await;
    finish_admin(&state, request_id, "upsert_plans", &principal, plan_ids, outcome.map(|()| true))
}

/// Replaces one plan; the body's `plan_id` must match the path.
async fn handle_replace_plan(
    State(state): State<Arc<AppState>>,
    Path(plan_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = request_id(&headers);
    let principal = match authorize_admin(&state, &headers, request_id.as_ref(), "replace_plan") {
        Ok(principal) => principal,
        Err(response) => return response,
    };
    let plan: Plan = match serde_json::from_slice(&body) {
        Ok(plan) => plan,
        Err(err) => {
            return ErrorBody::plain("invalid_request", format!("invalid plan: {err}"))
                .respond(StatusCode::BAD_REQUEST);
        }
    };
    if plan.plan_id.as_str() != plan_id {
        return ErrorBody::plain("invalid_request", "plan_id in body does not match path")
            .respond(StatusCode::BAD_REQUEST);
    }
    if let Some(message) = first_plan_problem(std::slice::from_ref(&plan)) {
        return ErrorBody::plain("invalid_request", message).respond(StatusCode::BAD_REQUEST);
    }
    let store = state.store.clone();
    let plan_ids = vec![plan.plan_id.clone()];
    let outcome = run_blocking(move || store.put_plan(&plan).map(|()| true)).await;
    finish_admin(&state, request_id, "replace_plan", &principal, plan_ids, outcome)
}

/// Deletes one plan.
async fn handle_delete_plan(
    State(state): State<Arc<AppState>>,
    Path(plan_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let request_id = request_id(&headers);
    let principal = match authorize_admin(&state, &headers, request_id.as_ref(), "delete_plan") {
        Ok(principal) => principal,
        Err(response) => return response,
    };
    let plan_id = PlanId::new(plan_id);
    let store = state.store.clone();
    let target = plan_id.clone();
    let outcome = run_blocking(move || store.delete_plan(&target)).await;
    finish_admin(&state, request_id, "delete_plan", &principal, vec![plan_id], outcome)
}

/// Authenticates an admin request, auditing denials.
fn authorize_admin(
    state: &AppState,
    headers: &HeaderMap,
    request_id: Option<&String>,
    action: &'static str,
) -> Result<AdminPrincipal, Response> {
    let header = headers.get(AUTHORIZATION).and_then(|value| value.to_str().ok());
    state.authz.authorize(header).map_err(|err| {
        state.audit.record_admin(&AdminAuditEvent::new(AdminAuditEventParams {
            event: "admin_auth",
            request_id: request_id.cloned(),
            action,
            plan_ids: Vec::new(),
            decision: "deny",
            token_fingerprint: None,
            reason: Some(err.to_string()),
        }));
        ErrorBody::plain("unauthenticated", err.to_string()).respond(StatusCode::UNAUTHORIZED)
    })
}

/// Audits and renders the result of an admin write.
fn finish_admin(
    state: &AppState,
    request_id: Option<String>,
    action: &'static str,
    principal: &AdminPrincipal,
    plan_ids: Vec<PlanId>,
    outcome: Result<bool, StoreError>,
) -> Response {
    let (decision, reason, response) = match outcome {
        Ok(true) => {
            tracing::info!(action, plans = plan_ids.len(), "admin plan change applied");
            let body = AdminResponse {
                action,
                plan_ids: plan_ids.clone(),
            };
            ("allow", None, (StatusCode::OK, Json(body)).into_response())
        }
        Ok(false) => {
            let message = "plan not found".to_string();
            let response = ErrorBody::plain("plan_not_found", message.clone())
                .respond(StatusCode::NOT_FOUND);
            ("deny", Some(message), response)
        }
        Err(err) => {
            tracing::warn!(action, "admin plan change failed: {err}");
            let (kind, status) = match err {
                StoreError::Invalid(_) => ("invalid_request", StatusCode::BAD_REQUEST),
                _ => ("storage_failure", StatusCode::SERVICE_UNAVAILABLE),
            };
            let message = err.to_string();
            ("error", Some(message.clone()), ErrorBody::plain(kind, message).respond(status))
        }
    };
    state.audit.record_admin(&AdminAuditEvent::new(AdminAuditEventParams {
        event: "admin_plan_change",
        request_id,
        action,
        plan_ids: plan_ids.iter().map(ToString::to_string).collect(),
        decision,
        token_fingerprint: Some(principal.token_fingerprint.clone()),
        reason,
    }));
    response
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the first shape problem in a batch of admin plans.
fn first_plan_problem(plans: &[Plan]) -> Option<String> {
    let mut seen: Vec<&PlanId> = Vec::with_capacity(plans.len());
    for plan in plans {
        if plan.plan_id.as_str().trim().is_empty() {
            return Some("plan_id must be non-empty".to_string());
        }
        if seen.contains(&&plan.plan_id) {
            return Some(format!("duplicate plan_id {}", plan.plan_id));
        }
        seen.push(&plan.plan_id);
    }
    None
}

/// Runs a store call on the blocking pool.
async fn run_blocking<T, F>(work: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| StoreError::Store(format!("store task failed: {err}")))?
}

/// Extracts a bounded `x-request-id` header value.
fn request_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty() && value.len() <= MAX_REQUEST_ID_BYTES)
        .map(ToString::to_string)
}

/// Returns the wall-clock time used to stamp usage events.
fn request_timestamp() -> Timestamp {
    let millis = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
    Timestamp::UnixMillis(i64::try_from(millis).unwrap_or(i64::MAX))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
