// crates/quota-gate-core/tests/quota_properties.rs
// ============================================================================
// Module: Quota Property Tests
// Description: Property coverage for quota monotonicity and gate ordering.
// Purpose: Check decision invariants over generated allowances and plans.
// Dependencies: quota-gate-core, proptest
// ============================================================================
//! ## Overview
//! Generated allowances and attempt counts confirm that grants never exceed
//! the allowance, that the first attempt past the allowance is always denied,
//! and that the permission gate wins regardless of limits.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod common;

use proptest::prelude::*;
use quota_gate_core::AccessErrorKind;
use quota_gate_core::ApiName;
use quota_gate_core::EntityId;
use quota_gate_core::InMemoryMeteringStore;
use quota_gate_core::UsageKey;
use quota_gate_core::UsageLedger;

use common::at;
use common::engine;
use common::plan;
use common::seed_subscriber;

proptest! {
    /// Grants never exceed the allowance and attempt A+1 is always denied.
    #[test]
    fn grants_never_exceed_allowance(allowance in 0_u64 .. 24, attempts in 0_u64 .. 48) {
        let store = InMemoryMeteringStore::new();
        seed_subscriber(&store, "e1", &plan("p1", &["/users/"], &[("/users/", allowance)]));
        let engine = engine(&store);
        let entity = EntityId::new("e1");
        let api = ApiName::new("/users/");
        let mut granted = 0_u64;
        for tick in 0 .. attempts {
            match engine.decide(&entity, &api, at(tick)) {
                Ok(result) => {
                    granted += 1;
                    prop_assert_eq!(result.used_after, granted);
                    prop_assert_eq!(result.allowed, allowance);
                }
                Err(err) => {
                    prop_assert_eq!(err.kind(), AccessErrorKind::QuotaExceeded);
                    prop_assert!(tick >= allowance);
                }
            }
        }
        prop_assert_eq!(granted, attempts.min(allowance));
        let extra = engine.decide(&entity, &api, at(attempts));
        if attempts >= allowance {
            prop_assert_eq!(extra.unwrap_err().kind(), AccessErrorKind::QuotaExceeded);
        }
    }

    /// The permission gate denies regardless of the configured limit.
    #[test]
    fn permission_gate_precedes_quota(limit in 0_u64 .. 1_000) {
        let store = InMemoryMeteringStore::new();
        seed_subscriber(&store, "e1", &plan("p1", &["/token"], &[("/plans", limit)]));
        let err = engine(&store)
            .decide(&EntityId::new("e1"), &ApiName::new("/plans"), at(0))
            .unwrap_err();
        prop_assert_eq!(err.kind(), AccessErrorKind::PermissionDenied);
        let key = UsageKey::new(EntityId::new("e1"), ApiName::new("/plans"));
        prop_assert_eq!(store.sum_usage(&key).unwrap(), 0);
    }

    /// Repeated sums without appends agree.
    #[test]
    fn sum_usage_is_idempotent(counts in proptest::collection::vec(1_u64 .. 50, 0 .. 12)) {
        let store = InMemoryMeteringStore::new();
        let key = UsageKey::new(EntityId::new("e1"), ApiName::new("/token"));
        for (tick, count) in counts.iter().enumerate() {
            store.record_usage(&key, *count, at(tick as u64)).unwrap();
        }
        let first = store.sum_usage(&key).unwrap();
        let second = store.sum_usage(&key).unwrap();
        prop_assert_eq!(first, second);
        prop_assert_eq!(first, counts.iter().sum::<u64>());
    }
}
