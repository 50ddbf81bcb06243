// crates/quota-gate-core/tests/engine.rs
// ============================================================================
// Module: Access Engine Tests
// Description: Decision ordering, error classification, and quota scenarios.
// Purpose: Validate the access decision algorithm against the in-memory store.
// Dependencies: quota-gate-core
// ============================================================================
//! ## Overview
//! Drives [`AccessEngine::decide`] through each gate in order and checks that
//! failing gates leave the ledger untouched.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod common;

use quota_gate_core::AccessEngine;
use quota_gate_core::AccessError;
use quota_gate_core::AccessErrorKind;
use quota_gate_core::ApiName;
use quota_gate_core::CatalogAdmin;
use quota_gate_core::Entity;
use quota_gate_core::EntityId;
use quota_gate_core::InMemoryMeteringStore;
use quota_gate_core::LedgerOutcome;
use quota_gate_core::LedgerWork;
use quota_gate_core::PlanId;
use quota_gate_core::StoreError;
use quota_gate_core::Timestamp;
use quota_gate_core::UsageEvent;
use quota_gate_core::UsageKey;
use quota_gate_core::UsageLedger;
use quota_gate_core::UsageTransaction;

use common::at;
use common::engine;
use common::plan;
use common::put_entity;
use common::seed_subscriber;
use common::subscribe;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn key(entity: &str, api: &str) -> UsageKey {
    UsageKey::new(EntityId::new(entity), ApiName::new(api))
}

/// Ledger that fails every transaction.
struct FailingLedger;

impl UsageLedger for FailingLedger {
    fn sum_usage(&self, _key: &UsageKey) -> Result<u64, StoreError> {
        Err(StoreError::Io("disk unavailable".to_string()))
    }

    fn record_usage(
        &self,
        _key: &UsageKey,
        _count: u64,
        _recorded_at: Timestamp,
    ) -> Result<UsageEvent, StoreError> {
        Err(StoreError::Io("disk unavailable".to_string()))
    }

    fn transact(
        &self,
        _key: &UsageKey,
        _work: &mut LedgerWork<'_>,
    ) -> Result<LedgerOutcome, StoreError> {
        Err(StoreError::Conflict("database is locked".to_string()))
    }
}

// ============================================================================
// SECTION: Scenarios
// ============================================================================

/// Verifies two grants followed by a quota denial at allowance two.
#[test]
fn allowance_of_two_grants_twice_then_denies() {
    let store = InMemoryMeteringStore::new();
    seed_subscriber(&store, "e1", &plan("p1", &["/users/"], &[("/users/", 2)]));
    let engine = engine(&store);
    let entity = EntityId::new("e1");
    let api = ApiName::new("/users/");

    let first = engine.decide(&entity, &api, at(1)).unwrap();
    assert_eq!((first.used_after, first.allowed), (1, 2));
    assert_eq!(first.display_name, "e1 display");
    assert_eq!(first.message(), "/users/ accessed successfully");

    let second = engine.decide(&entity, &api, at(2)).unwrap();
    assert_eq!((second.used_after, second.allowed), (2, 2));
    assert!(second.event_id > first.event_id);

    let third = engine.decide(&entity, &api, at(3)).unwrap_err();
    assert_eq!(
        third,
        AccessError::QuotaExceeded {
            api: api.clone(),
            used: 2,
            allowed: 2,
        }
    );
    assert!(!third.is_retryable());
    assert_eq!(store.sum_usage(&key("e1", "/users/")).unwrap(), 2);
}

/// Verifies an entity without an active subscription is reported as such.
#[test]
fn missing_subscription_is_reported() {
    let store = InMemoryMeteringStore::new();
    put_entity(&store, "e2");
    let err = engine(&store).decide(&EntityId::new("e2"), &ApiName::new("/plans"), at(1));
    assert_eq!(err.unwrap_err().kind(), AccessErrorKind::SubscriptionNotFound);
}

/// Verifies permission denial happens without touching the ledger.
#[test]
fn unpermitted_api_is_denied_before_usage() {
    let store = InMemoryMeteringStore::new();
    seed_subscriber(&store, "e3", &plan("p3", &["/token"], &[("/token", 5), ("/plans", 5)]));
    let err = engine(&store)
        .decide(&EntityId::new("e3"), &ApiName::new("/plans"), at(1))
        .unwrap_err();
    assert_eq!(
        err,
        AccessError::PermissionDenied {
            api: ApiName::new("/plans"),
        }
    );
    assert!(store.events_for(&key("e3", "/plans")).unwrap().is_empty());
}

// ============================================================================
// SECTION: Gate Ordering
// ============================================================================

/// Verifies unknown entities fail first.
#[test]
fn unknown_entity_fails_first() {
    let store = InMemoryMeteringStore::new();
    let err = engine(&store)
        .decide(&EntityId::new("ghost"), &ApiName::new("/users/"), at(1))
        .unwrap_err();
    assert_eq!(
        err,
        AccessError::EntityNotFound {
            entity_id: EntityId::new("ghost"),
        }
    );
}

/// Verifies a subscription without a plan is a plan failure, not a denial.
#[test]
fn subscription_without_plan_reports_plan_not_found() {
    let store = InMemoryMeteringStore::new();
    put_entity(&store, "e4");
    subscribe(&store, "e4", None, 1);
    let err = engine(&store)
        .decide(&EntityId::new("e4"), &ApiName::new("/users/"), at(1))
        .unwrap_err();
    assert_eq!(
        err,
        AccessError::PlanNotFound {
            entity_id: EntityId::new("e4"),
            plan_id: None,
        }
    );
}

/// Verifies a subscription pointing at a deleted plan reports the plan id.
#[test]
fn dangling_plan_reference_reports_plan_id() {
    let store = InMemoryMeteringStore::new();
    put_entity(&store, "e5");
    subscribe(&store, "e5", Some("retired"), 1);
    let err = engine(&store)
        .decide(&EntityId::new("e5"), &ApiName::new("/users/"), at(1))
        .unwrap_err();
    assert_eq!(err.kind(), AccessErrorKind::PlanNotFound);
    assert!(matches!(
        err,
        AccessError::PlanNotFound { plan_id: Some(ref id), .. } if *id == PlanId::new("retired")
    ));
    assert_eq!(err.kind().as_str(), "plan_not_found");
}

/// Verifies a permitted API without a limit entry is denied with allowed=0.
#[test]
fn permitted_api_without_limit_is_denied_by_quota() {
    let store = InMemoryMeteringStore::new();
    seed_subscriber(&store, "e6", &plan("p6", &["/token"], &[]));
    let err = engine(&store)
        .decide(&EntityId::new("e6"), &ApiName::new("/token"), at(1))
        .unwrap_err();
    assert_eq!(
        err,
        AccessError::QuotaExceeded {
            api: ApiName::new("/token"),
            used: 0,
            allowed: 0,
        }
    );
}

/// Verifies prior usage recorded outside the engine counts against quota.
#[test]
fn prior_usage_counts_against_allowance() {
    let store = InMemoryMeteringStore::new();
    seed_subscriber(&store, "e7", &plan("p7", &["/plans"], &[("/plans", 5)]));
    store.record_usage(&key("e7", "/plans"), 4, at(0)).unwrap();
    let engine = engine(&store);
    let granted = engine.decide(&EntityId::new("e7"), &ApiName::new("/plans"), at(1)).unwrap();
    assert_eq!(granted.used_after, 5);
    let denied = engine.decide(&EntityId::new("e7"), &ApiName::new("/plans"), at(2)).unwrap_err();
    assert_eq!(denied.kind(), AccessErrorKind::QuotaExceeded);
}

/// Verifies usage is tracked per API, not per entity.
#[test]
fn usage_is_isolated_per_api() {
    let store = InMemoryMeteringStore::new();
    seed_subscriber(
        &store,
        "e8",
        &plan("p8", &["/token", "/plans"], &[("/token", 1), ("/plans", 1)]),
    );
    let engine = engine(&store);
    let entity = EntityId::new("e8");
    engine.decide(&entity, &ApiName::new("/token"), at(1)).unwrap();
    engine.decide(&entity, &ApiName::new("/plans"), at(2)).unwrap();
    assert_eq!(engine.usage(&entity, &ApiName::new("/token")).unwrap(), 1);
    assert_eq!(engine.usage(&entity, &ApiName::new("/plans")).unwrap(), 1);
}

/// Verifies a plan change is picked up by the next decision.
#[test]
fn plan_upgrade_takes_effect_on_next_decision() {
    let store = InMemoryMeteringStore::new();
    seed_subscriber(&store, "e9", &plan("p9", &["/token"], &[("/token", 1)]));
    let engine = engine(&store);
    let entity = EntityId::new("e9");
    let api = ApiName::new("/token");
    engine.decide(&entity, &api, at(1)).unwrap();
    assert!(engine.decide(&entity, &api, at(2)).is_err());
    store.put_plan(&plan("p9", &["/token"], &[("/token", 3)])).unwrap();
    assert_eq!(engine.decide(&entity, &api, at(3)).unwrap().used_after, 2);
}

// ============================================================================
// SECTION: Storage Failures
// ============================================================================

/// Verifies ledger failures surface as retryable storage failures.
#[test]
fn ledger_failure_is_retryable_storage_failure() {
    let store = InMemoryMeteringStore::new();
    seed_subscriber(&store, "e10", &plan("p10", &["/token"], &[("/token", 3)]));
    let engine = AccessEngine::new(store.clone(), store.clone(), store, FailingLedger);
    let err = engine.decide(&EntityId::new("e10"), &ApiName::new("/token"), at(1)).unwrap_err();
    assert_eq!(err.kind(), AccessErrorKind::StorageFailure);
    assert!(err.is_retryable());
}

/// Verifies an error raised inside the transaction discards staged events.
#[test]
fn failed_transaction_discards_staged_events() {
    let store = InMemoryMeteringStore::new();
    let pair = key("e11", "/token");
    let result = store.transact(&pair, &mut |tx: &mut dyn UsageTransaction| {
        tx.record_usage(1, at(1))?;
        assert_eq!(tx.sum_usage()?, 1);
        Err(StoreError::Conflict("abort".to_string()))
    });
    assert!(result.is_err());
    assert_eq!(store.sum_usage(&pair).unwrap(), 0);
    assert!(store.events_for(&pair).unwrap().is_empty());
}

/// Verifies the display name comes from the entity record.
#[test]
fn display_name_comes_from_entity_record() {
    let store = InMemoryMeteringStore::new();
    store
        .put_entity(&Entity {
            entity_id: EntityId::new("e12"),
            display_name: "Acme Corp".to_string(),
        })
        .unwrap();
    store.put_plan(&plan("p12", &["/token"], &[("/token", 1)])).unwrap();
    subscribe(&store, "e12", Some("p12"), 1);
    let granted =
        engine(&store).decide(&EntityId::new("e12"), &ApiName::new("/token"), at(1)).unwrap();
    assert_eq!(granted.display_name, "Acme Corp");
}
