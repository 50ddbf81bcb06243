// crates/quota-gate-core/src/runtime/resolver.rs
// ============================================================================
// Module: Subscription Resolver
// Description: Deterministic active-subscription selection.
// Purpose: Map an entity's subscription rows to at most one plan binding.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! An entity may carry several subscription rows (renewals, upgrades, stale
//! imports). Resolution ignores inactive rows and picks the most recently
//! created active row, breaking creation-time ties by the greater
//! subscription identifier. The result depends only on row contents, never on
//! storage iteration order.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::Subscription;

// ============================================================================
// SECTION: Resolution
// ============================================================================

/// Selects the active subscription from an entity's rows.
///
/// Returns `None` when no row is active.
#[must_use]
pub fn select_active_subscription(
    subscriptions: impl IntoIterator<Item = Subscription>,
) -> Option<Subscription> {
    subscriptions.into_iter().filter(Subscription::is_active).max_by(|left, right| {
        (left.created_at, &left.subscription_id).cmp(&(right.created_at, &right.subscription_id))
    })
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        reason = "Test fixtures use explicit unwraps for clarity."
    )]

    use super::select_active_subscription;
    use crate::core::EntityId;
    use crate::core::PlanId;
    use crate::core::Subscription;
    use crate::core::SubscriptionId;
    use crate::core::SubscriptionStatus;
    use crate::core::Timestamp;

    fn row(id: &str, plan: &str, status: SubscriptionStatus, at: u64) -> Subscription {
        Subscription {
            subscription_id: SubscriptionId::new(id),
            entity_id: EntityId::new("acme"),
            plan_id: Some(PlanId::new(plan)),
            status,
            created_at: Timestamp::Logical(at),
        }
    }

    #[test]
    fn latest_active_row_wins() {
        let rows = vec![
            row("s1", "basic", SubscriptionStatus::Active, 1),
            row("s2", "pro", SubscriptionStatus::Active, 5),
            row("s3", "enterprise", SubscriptionStatus::Inactive, 9),
        ];
        let selected = select_active_subscription(rows).unwrap();
        assert_eq!(selected.subscription_id.as_str(), "s2");
    }

    #[test]
    fn ties_break_on_subscription_id_regardless_of_order() {
        let forward = vec![
            row("a", "basic", SubscriptionStatus::Active, 3),
            row("b", "pro", SubscriptionStatus::Active, 3),
        ];
        let mut reversed = forward.clone();
        reversed.reverse();
        let first = select_active_subscription(forward).unwrap();
        let second = select_active_subscription(reversed).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.subscription_id.as_str(), "b");
    }

    #[test]
    fn only_inactive_rows_resolve_to_none() {
        let rows = vec![row("s1", "basic", SubscriptionStatus::Inactive, 1)];
        assert!(select_active_subscription(rows).is_none());
        assert!(select_active_subscription(Vec::new()).is_none());
    }
}
