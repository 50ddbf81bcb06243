// crates/quota-gate-server/tests/common/mod.rs
// ============================================================================
// Module: Server Test Harness
// Description: In-process router construction and request helpers.
// Purpose: Drive the axum router without binding sockets.
// ============================================================================

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;

use axum::Router;
use axum::body::Body;
use axum::http::Request;
use axum::http::StatusCode;
use http_body_util::BodyExt;
use quota_gate_config::AdminConfig;
use quota_gate_core::ApiName;
use quota_gate_core::CatalogAdmin;
use quota_gate_core::Entity;
use quota_gate_core::EntityId;
use quota_gate_core::InMemoryMeteringStore;
use quota_gate_core::MeterableApis;
use quota_gate_core::Plan;
use quota_gate_core::PlanId;
use quota_gate_core::SharedMeteringStore;
use quota_gate_core::Subscription;
use quota_gate_core::SubscriptionId;
use quota_gate_core::SubscriptionStatus;
use quota_gate_core::Timestamp;
use quota_gate_server::AccessAuditEvent;
use quota_gate_server::AdminAuditEvent;
use quota_gate_server::AdminAuthz;
use quota_gate_server::AppState;
use quota_gate_server::AuditSink;
use quota_gate_server::build_router;
use serde_json::Value;
use tower::ServiceExt;

/// Admin token used by suites that mount admin routes.
pub const ADMIN_TOKEN: &str = "test-admin-token";

/// Audit sink that keeps serialized events in memory.
#[derive(Default)]
pub struct RecordingAuditSink {
    /// Recorded events as JSON values.
    pub events: Mutex<Vec<Value>>,
}

impl RecordingAuditSink {
    /// Returns a snapshot of recorded events.
    pub fn events(&self) -> Vec<Value> {
        self.events.lock().expect("audit lock").clone()
    }
}

impl AuditSink for RecordingAuditSink {
    fn record_access(&self, event: &AccessAuditEvent) {
        self.events.lock().expect("audit lock").push(serde_json::to_value(event).expect("json"));
    }

    fn record_admin(&self, event: &AdminAuditEvent) {
        self.events.lock().expect("audit lock").push(serde_json::to_value(event).expect("json"));
    }
}

/// Router plus handles to its store and audit sink.
pub struct Harness {
    /// Router under test.
    pub router: Router,
    /// Backing store.
    pub store: InMemoryMeteringStore,
    /// Audit recorder.
    pub audit: Arc<RecordingAuditSink>,
}

/// Builds a harness over the default APIs with the given admin tokens.
pub fn harness(admin_tokens: &[&str]) -> Harness {
    harness_with(admin_tokens, "/cloud", 1024 * 1024)
}

/// Builds a harness with explicit prefix and body cap.
pub fn harness_with(admin_tokens: &[&str], prefix: &str, max_body_bytes: usize) -> Harness {
    let store = InMemoryMeteringStore::new();
    let audit = Arc::new(RecordingAuditSink::default());
    let authz = AdminAuthz::from_config(&AdminConfig {
        bearer_tokens: admin_tokens.iter().map(|token| (*token).to_string()).collect(),
    });
    let state = AppState::new(
        SharedMeteringStore::from_store(store.clone()),
        authz,
        Arc::clone(&audit) as Arc<dyn AuditSink>,
    );
    let router = build_router(state, &MeterableApis::defaults(), prefix, max_body_bytes);
    Harness {
        router,
        store,
        audit,
    }
}

/// Builds a plan.
pub fn plan(plan_id: &str, permitted: &[&str], limits: &[(&str, u64)]) -> Plan {
    Plan {
        plan_id: PlanId::new(plan_id),
        name: plan_id.to_string(),
        permitted_apis: permitted.iter().map(|name| ApiName::new(*name)).collect::<BTreeSet<_>>(),
        usage_limits: limits
            .iter()
            .map(|(name, limit)| (ApiName::new(*name), *limit))
            .collect::<BTreeMap<_, _>>(),
    }
}

/// Seeds an entity subscribed to `plan`.
pub fn seed_subscriber(store: &InMemoryMeteringStore, entity: &str, plan: &Plan) {
    store.put_plan(plan).expect("put plan");
    store
        .put_entity(&Entity {
            entity_id: EntityId::new(entity),
            display_name: format!("{entity} display"),
        })
        .expect("put entity");
    store
        .put_subscription(&Subscription {
            subscription_id: SubscriptionId::new(format!("sub-{entity}")),
            entity_id: EntityId::new(entity),
            plan_id: Some(plan.plan_id.clone()),
            status: SubscriptionStatus::Active,
            created_at: Timestamp::Logical(1),
        })
        .expect("put subscription");
}

/// Sends a request and returns status plus parsed JSON body.
pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.expect("router response");
    let status = response.status();
    let bytes = response.into_body().collect().await.expect("body").to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

/// Builds a GET request.
pub fn get(uri: &str) -> Request<Body> {
    Request::builder().method("GET").uri(uri).body(Body::empty()).expect("request")
}

/// Builds an authenticated admin request with a JSON body.
pub fn admin(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let body = body.map_or_else(Body::empty, |value| Body::from(value.to_string()));
    builder.header("content-type", "application/json").body(body).expect("request")
}
