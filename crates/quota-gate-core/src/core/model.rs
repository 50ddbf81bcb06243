// crates/quota-gate-core/src/core/model.rs
// ============================================================================
// Module: Quota Gate Data Model
// Description: Entities, plans, subscriptions, and usage events.
// Purpose: Define the records the access engine reads and appends.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Entities and subscriptions are owned by external identity and billing
//! systems. Plans are mutated only through administrative writes. Usage events
//! are append-only; the running usage of an (entity, api) pair is the sum of
//! the `count` of every event recorded for that pair.
//!
//! A plan carries two independent gates: the permitted API set and the usage
//! limits. An API that is permitted but has no limit entry has an allowance of
//! zero, not an unlimited one.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::ApiName;
use crate::core::identifiers::EntityId;
use crate::core::identifiers::PlanId;
use crate::core::identifiers::SubscriptionId;
use crate::core::identifiers::UsageEventId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Entities
// ============================================================================

/// Billing entity known to the identity system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Entity identifier.
    pub entity_id: EntityId,
    /// Human-readable display name returned on successful access.
    pub display_name: String,
}

// ============================================================================
// SECTION: Plans
// ============================================================================

/// Named bundle of permitted APIs and per-API usage allowances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    /// Plan identifier.
    pub plan_id: PlanId,
    /// Plan display name.
    pub name: String,
    /// APIs the plan grants access to.
    #[serde(default)]
    pub permitted_apis: BTreeSet<ApiName>,
    /// Lifetime usage allowance per API. Absent entries mean zero.
    #[serde(default)]
    pub usage_limits: BTreeMap<ApiName, u64>,
}

impl Plan {
    /// Returns true when the plan's permission gate admits `api`.
    #[must_use]
    pub fn permits(&self, api: &ApiName) -> bool {
        self.permitted_apis.contains(api)
    }

    /// Returns the usage allowance for `api`, defaulting to zero.
    #[must_use]
    pub fn allowance(&self, api: &ApiName) -> u64 {
        self.usage_limits.get(api).copied().unwrap_or(0)
    }
}

// ============================================================================
// SECTION: Subscriptions
// ============================================================================

/// Subscription lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Subscription is current and eligible for access decisions.
    #[default]
    Active,
    /// Subscription has ended or is suspended.
    Inactive,
}

impl SubscriptionStatus {
    /// Returns the stable storage label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }

    /// Parses a storage label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            _ => None,
        }
    }
}

/// Binding of one entity to one plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Subscription identifier.
    pub subscription_id: SubscriptionId,
    /// Subscribed entity.
    pub entity_id: EntityId,
    /// Bound plan. `None` models a subscription row whose plan was never set.
    pub plan_id: Option<PlanId>,
    /// Lifecycle status.
    #[serde(default)]
    pub status: SubscriptionStatus,
    /// Creation time supplied by the billing system.
    pub created_at: Timestamp,
}

impl Subscription {
    /// Returns true when the subscription is eligible for decisions.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }
}

// ============================================================================
// SECTION: Usage
// ============================================================================

/// Ledger key identifying one (entity, api) pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UsageKey {
    /// Metered entity.
    pub entity_id: EntityId,
    /// Metered API.
    pub api: ApiName,
}

impl UsageKey {
    /// Creates a usage key.
    #[must_use]
    pub const fn new(entity_id: EntityId, api: ApiName) -> Self {
        Self {
            entity_id,
            api,
        }
    }
}

/// Immutable record of one counted access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageEvent {
    /// Ledger-assigned identifier.
    pub event_id: UsageEventId,
    /// Metered entity.
    pub entity_id: EntityId,
    /// Metered API.
    pub api: ApiName,
    /// Units counted against the allowance (at least one).
    pub count: u64,
    /// Time the access was recorded.
    pub recorded_at: Timestamp,
}

// ============================================================================
// SECTION: Tests
// ============================================================================
