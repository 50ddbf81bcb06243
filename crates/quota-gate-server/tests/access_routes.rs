// crates/quota-gate-server/tests/access_routes.rs
// ============================================================================
// Module: Access Route Tests
// Description: HTTP behavior of the per-API access routes.
// Purpose: Verify status mapping, payload shape, and audit emission.
// Dependencies: quota-gate-server, axum, tower, http-body-util
// ============================================================================

//! ## Overview
//! Drives the router in-process and checks the success payload, the error
//! envelope for every failure kind, and route binding for configured APIs.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only panic-based assertions are permitted."
)]

mod common;

use axum::body::Body;
use axum::http::Request;
use axum::http::StatusCode;
use quota_gate_core::ApiName;
use quota_gate_core::CatalogAdmin;
use quota_gate_core::EntityId;
use quota_gate_core::Subscription;
use quota_gate_core::SubscriptionId;
use quota_gate_core::SubscriptionStatus;
use quota_gate_core::Timestamp;
use quota_gate_core::UsageKey;

use crate::common::get;
use crate::common::harness;
use crate::common::harness_with;
use crate::common::plan;
use crate::common::seed_subscriber;
use crate::common::send;

/// Verifies the two-call allowance scenario end to end.
#[tokio::test]
async fn allowance_is_enforced_over_http() {
    let harness = harness(&[]);
    seed_subscriber(&harness.store, "E1", &plan("P1", &["/users/"], &[("/users/", 2)]));

    let (status, body) = send(&harness.router, get("/cloud/users/E1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["display_name"], "E1 display");
    assert_eq!(body["message"], "/users/ accessed successfully");
    assert_eq!(body["used"], 1);
    assert_eq!(body["allowed"], 2);

    let (status, body) = send(&harness.router, get("/cloud/users/E1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["used"], 2);

    let (status, body) = send(&harness.router, get("/cloud/users/E1")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["kind"], "quota_exceeded");
    assert_eq!(body["error"]["api"], "/users/");
    assert_eq!(body["error"]["used"], 2);
    assert_eq!(body["error"]["allowed"], 2);

    let key = UsageKey::new(EntityId::new("E1"), ApiName::new("/users/"));
    assert_eq!(harness.store.events_for(&key).unwrap().len(), 2);
}

/// Verifies not-found kinds map to 404.
#[tokio::test]
async fn missing_entity_and_subscription_are_not_found() {
    let harness = harness(&[]);
    let (status, body) = send(&harness.router, get("/cloud/plans/ghost")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["kind"], "entity_not_found");
    assert!(body["error"].get("used").is_none());

    seed_subscriber(&harness.store, "E2", &plan("P2", &["/plans"], &[("/plans", 5)]));
    harness
        .store
        .put_subscription(&Subscription {
            subscription_id: SubscriptionId::new("sub-E2"),
            entity_id: EntityId::new("E2"),
            plan_id: None,
            status: SubscriptionStatus::Inactive,
            created_at: Timestamp::Logical(2),
        })
        .unwrap();
    let (status, body) = send(&harness.router, get("/cloud/plans/E2")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["kind"], "subscription_not_found");
}

/// Verifies permission denial maps to 403 and names the API.
#[tokio::test]
async fn unpermitted_api_is_forbidden() {
    let harness = harness(&[]);
    seed_subscriber(&harness.store, "E3", &plan("P3", &["/token"], &[("/token", 5)]));
    let (status, body) = send(&harness.router, get("/cloud/plans/E3")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["kind"], "permission_denied");
    assert_eq!(body["error"]["api"], "/plans");
    assert!(body["error"]["message"].as_str().unwrap().contains("/plans"));
}

/// Verifies unconfigured APIs have no route.
#[tokio::test]
async fn unknown_api_has_no_route() {
    let harness = harness(&[]);
    let (status, _) = send(&harness.router, get("/cloud/billing/E1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let request =
        Request::builder().method("POST").uri("/cloud/users/E1").body(Body::empty()).unwrap();
    let (status, _) = send(&harness.router, request).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

/// Verifies the route prefix is applied and admin routes stay unmounted.
#[tokio::test]
async fn empty_prefix_binds_at_root_without_admin() {
    let harness = harness_with(&[], "", 1024);
    seed_subscriber(&harness.store, "E1", &plan("P1", &["/vpn"], &[("/vpn", 1)]));
    let (status, _) = send(&harness.router, get("/vpn/E1")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&harness.router, get("/admin/plans")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

/// Verifies every decision produces an audit record with the request id.
#[tokio::test]
async fn decisions_are_audited_with_request_id() {
    let harness = harness(&[]);
    seed_subscriber(&harness.store, "E1", &plan("P1", &["/users/"], &[("/users/", 1)]));
    let request = Request::builder()
        .uri("/cloud/users/E1")
        .header("x-request-id", "req-42")
        .body(Body::empty())
        .unwrap();
    send(&harness.router, request).await;
    send(&harness.router, get("/cloud/users/E1")).await;

    let events = harness.audit.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["event"], "access_decision");
    assert_eq!(events[0]["outcome"], "allow");
    assert_eq!(events[0]["request_id"], "req-42");
    assert_eq!(events[1]["outcome"], "deny");
    assert_eq!(events[1]["error_kind"], "quota_exceeded");
}
