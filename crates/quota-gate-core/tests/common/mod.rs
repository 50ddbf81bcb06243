// crates/quota-gate-core/tests/common/mod.rs
// =============================================================================
// Module: Core Test Fixtures
// Description: Catalog builders and engine wiring shared by core suites.
// Purpose: Reduce duplication across quota-gate-core integration tests.
// =============================================================================

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use quota_gate_core::AccessEngine;
use quota_gate_core::ApiName;
use quota_gate_core::CatalogAdmin;
use quota_gate_core::Entity;
use quota_gate_core::EntityId;
use quota_gate_core::InMemoryMeteringStore;
use quota_gate_core::Plan;
use quota_gate_core::PlanId;
use quota_gate_core::Subscription;
use quota_gate_core::SubscriptionId;
use quota_gate_core::SubscriptionStatus;
use quota_gate_core::Timestamp;

/// Engine wired entirely to one in-memory store.
pub type MemoryEngine = AccessEngine<
    InMemoryMeteringStore,
    InMemoryMeteringStore,
    InMemoryMeteringStore,
    InMemoryMeteringStore,
>;

/// Builds an engine whose dependencies share `store`'s state.
pub fn engine(store: &InMemoryMeteringStore) -> MemoryEngine {
    AccessEngine::new(store.clone(), store.clone(), store.clone(), store.clone())
}

/// Builds a plan from permitted names and (name, allowance) limits.
pub fn plan(plan_id: &str, permitted: &[&str], limits: &[(&str, u64)]) -> Plan {
    Plan {
        plan_id: PlanId::new(plan_id),
        name: plan_id.to_string(),
        permitted_apis: permitted.iter().map(|api| ApiName::new(*api)).collect::<BTreeSet<_>>(),
        usage_limits: limits
            .iter()
            .map(|(api, allowed)| (ApiName::new(*api), *allowed))
            .collect::<BTreeMap<_, _>>(),
    }
}

/// Writes an entity with a display name derived from its identifier.
pub fn put_entity(store: &impl CatalogAdmin, entity_id: &str) {
    store
        .put_entity(&Entity {
            entity_id: EntityId::new(entity_id),
            display_name: format!("{entity_id} display"),
        })
        .unwrap();
}

/// Writes an active subscription for `entity_id` bound to `plan_id`.
pub fn subscribe(store: &impl CatalogAdmin, entity_id: &str, plan_id: Option<&str>, at: u64) {
    store
        .put_subscription(&Subscription {
            subscription_id: SubscriptionId::new(format!("{entity_id}-sub-{at}")),
            entity_id: EntityId::new(entity_id),
            plan_id: plan_id.map(PlanId::new),
            status: SubscriptionStatus::Active,
            created_at: Timestamp::Logical(at),
        })
        .unwrap();
}

/// Seeds an entity subscribed to `plan` and writes the plan.
pub fn seed_subscriber(store: &impl CatalogAdmin, entity_id: &str, plan: &Plan) {
    put_entity(store, entity_id);
    store.put_plan(plan).unwrap();
    subscribe(store, entity_id, Some(plan.plan_id.as_str()), 1);
}

/// Logical request time used by tests.
pub const fn at(tick: u64) -> Timestamp {
    Timestamp::Logical(tick)
}
