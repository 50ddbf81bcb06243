// crates/quota-gate-core/src/runtime/engine.rs
// ============================================================================
// Module: Access Decision Engine
// Description: Permission and quota evaluation with atomic usage recording.
// Purpose: Decide one access request and append its usage event.
// Dependencies: crate::{core, interfaces}, serde, thiserror
// ============================================================================

//! ## Overview
//! [`AccessEngine::decide`] evaluates one request in a fixed order:
//!
//! 1. the entity must exist;
//! 2. the entity must have an active subscription;
//! 3. the subscription must reference a plan that exists;
//! 4. the plan must permit the API (checked before any usage read);
//! 5. summed usage must be strictly below the plan's allowance for the API,
//!    where a missing limit entry means an allowance of zero;
//! 6. one usage event is appended;
//! 7. the result reports usage after the append.
//!
//! Steps 5 and 6 run inside a single [`UsageLedger::transact`] scope, so two
//! concurrent decisions on the same (entity, api) pair cannot both pass the
//! quota check against the same stale total. Failures in steps 1 through 5
//! leave the ledger untouched and are not retryable. Storage failures are the
//! only retryable class; a failed commit leaves no event behind.
//!
//! Once step 6 commits, the event stands even if the caller abandons the
//! request: usage is charged on attempt, not on delivery.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use thiserror::Error;

use crate::core::ApiName;
use crate::core::EntityId;
use crate::core::PlanId;
use crate::core::Timestamp;
use crate::core::UsageEventId;
use crate::core::UsageKey;
use crate::interfaces::EntityStore;
use crate::interfaces::LedgerOutcome;
use crate::interfaces::PlanStore;
use crate::interfaces::StoreError;
use crate::interfaces::SubscriptionStore;
use crate::interfaces::UsageLedger;
use crate::interfaces::UsageTransaction;
use crate::runtime::store::SharedMeteringStore;

// ============================================================================
// SECTION: Results
// ============================================================================

/// Successful access decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessResult {
    /// Entity that was granted access.
    pub entity_id: EntityId,
    /// Entity display name.
    pub display_name: String,
    /// API that was accessed.
    pub api: ApiName,
    /// Usage for the pair after this access was recorded.
    pub used_after: u64,
    /// Allowance in effect at commit time.
    pub allowed: u64,
    /// Identifier of the appended usage event.
    pub event_id: UsageEventId,
}

impl AccessResult {
    /// Returns the caller-facing success message.
    #[must_use]
    pub fn message(&self) -> String {
        format!("{} accessed successfully", self.api)
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Stable classification of access failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessErrorKind {
    /// Entity does not exist.
    EntityNotFound,
    /// Entity has no active subscription.
    SubscriptionNotFound,
    /// Subscription references no plan or a missing plan.
    PlanNotFound,
    /// Plan does not permit the API.
    PermissionDenied,
    /// Allowance for the API is exhausted.
    QuotaExceeded,
    /// Storage failed before the decision could commit.
    StorageFailure,
}

impl AccessErrorKind {
    /// Returns the stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EntityNotFound => "entity_not_found",
            Self::SubscriptionNotFound => "subscription_not_found",
            Self::PlanNotFound => "plan_not_found",
            Self::PermissionDenied => "permission_denied",
            Self::QuotaExceeded => "quota_exceeded",
            Self::StorageFailure => "storage_failure",
        }
    }
}

/// Access decision failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    /// Entity does not exist.
    #[error("entity not found: {entity_id}")]
    EntityNotFound {
        /// Requested entity.
        entity_id: EntityId,
    },
    /// Entity has no active subscription.
    #[error("no active subscription for entity {entity_id}")]
    SubscriptionNotFound {
        /// Requested entity.
        entity_id: EntityId,
    },
    /// Subscription references no plan or a plan that does not exist.
    #[error("plan not found for entity {entity_id}{}", plan_suffix(.plan_id.as_ref()))]
    PlanNotFound {
        /// Requested entity.
        entity_id: EntityId,
        /// Referenced plan, if any.
        plan_id: Option<PlanId>,
    },
    /// Plan does not permit the API.
    #[error("access denied to {api}")]
    PermissionDenied {
        /// Requested API.
        api: ApiName,
    },
    /// Allowance for the API is exhausted.
    #[error("usage limit exceeded for {api} (used {used} of {allowed})")]
    QuotaExceeded {
        /// Requested API.
        api: ApiName,
        /// Usage at check time.
        used: u64,
        /// Allowance in effect.
        allowed: u64,
    },
    /// Storage failure.
    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),
}

impl AccessError {
    /// Returns the stable error kind.
    #[must_use]
    pub const fn kind(&self) -> AccessErrorKind {
        match self {
            Self::EntityNotFound {
                ..
            } => AccessErrorKind::EntityNotFound,
            Self::SubscriptionNotFound {
                ..
            } => AccessErrorKind::SubscriptionNotFound,
            Self::PlanNotFound {
                ..
            } => AccessErrorKind::PlanNotFound,
            Self::PermissionDenied {
                ..
            } => AccessErrorKind::PermissionDenied,
            Self::QuotaExceeded {
                ..
            } => AccessErrorKind::QuotaExceeded,
            Self::Storage(_) => AccessErrorKind::StorageFailure,
        }
    }

    /// Returns true when the caller may safely retry the request.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

/// Formats the optional plan identifier for error messages.
fn plan_suffix(plan_id: Option<&PlanId>) -> String {
    plan_id.map_or_else(
        || " (subscription has no plan)".to_string(),
        |plan_id| format!(" (plan {plan_id})"),
    )
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Access decision engine over explicit store dependencies.
pub struct AccessEngine<E, S, P, L> {
    /// Entity lookups.
    entities: E,
    /// Subscription lookups.
    subscriptions: S,
    /// Plan lookups.
    plans: P,
    /// Usage ledger.
    ledger: L,
}

/// Access engine where every dependency is the same shared store.
pub type SharedAccessEngine =
    AccessEngine<SharedMeteringStore, SharedMeteringStore, SharedMeteringStore, SharedMeteringStore>;

impl SharedAccessEngine {
    /// Builds an engine backed entirely by one shared store.
    #[must_use]
    pub fn from_store(store: &SharedMeteringStore) -> Self {
        Self::new(store.clone(), store.clone(), store.clone(), store.clone())
    }
}

impl<E, S, P, L> AccessEngine<E, S, P, L>
where
    E: EntityStore,
    S: SubscriptionStore,
    P: PlanStore,
    L: UsageLedger,
{
    /// Creates an engine from its store dependencies.
    #[must_use]
    pub const fn new(entities: E, subscriptions: S, plans: P, ledger: L) -> Self {
        Self {
            entities,
            subscriptions,
            plans,
            ledger,
        }
    }

    /// Decides one access request and records its usage on success.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError`] when any gate fails or storage fails.
    pub fn decide(
        &self,
        entity_id: &EntityId,
        api: &ApiName,
        requested_at: Timestamp,
    ) -> Result<AccessResult, AccessError> {
        let entity = self.entities.entity(entity_id)?.ok_or_else(|| {
            AccessError::EntityNotFound {
                entity_id: entity_id.clone(),
            }
        })?;

        let subscription =
            self.subscriptions.active_subscription(entity_id)?.ok_or_else(|| {
                AccessError::SubscriptionNotFound {
                    entity_id: entity_id.clone(),
                }
            })?;

        let plan_not_found = |plan_id: Option<PlanId>| AccessError::PlanNotFound {
            entity_id: entity_id.clone(),
            plan_id,
        };
        let plan_id = subscription.plan_id.ok_or_else(|| plan_not_found(None))?;
        let plan =
            self.plans.plan(&plan_id)?.ok_or_else(|| plan_not_found(Some(plan_id.clone())))?;

        if !plan.permits(api) {
            return Err(AccessError::PermissionDenied {
                api: api.clone(),
            });
        }

        let allowed = plan.allowance(api);
        let key = UsageKey::new(entity_id.clone(), api.clone());
        let outcome = self.ledger.transact(&key, &mut |tx: &mut dyn UsageTransaction| {
            let used = tx.sum_usage()?;
            if used >= allowed {
                return Ok(LedgerOutcome::Exhausted {
                    used,
                });
            }
            let event = tx.record_usage(1, requested_at)?;
            Ok(LedgerOutcome::Recorded {
                used_before: used,
                event,
            })
        })?;

        match outcome {
            LedgerOutcome::Exhausted {
                used,
            } => Err(AccessError::QuotaExceeded {
                api: api.clone(),
                used,
                allowed,
            }),
            LedgerOutcome::Recorded {
                used_before,
                event,
            } => Ok(AccessResult {
                entity_id: entity.entity_id,
                display_name: entity.display_name,
                api: api.clone(),
                used_after: used_before.saturating_add(event.count),
                allowed,
                event_id: event.event_id,
            }),
        }
    }

    /// Returns summed usage for an (entity, api) pair without recording.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::Storage`] when the ledger read fails.
    pub fn usage(&self, entity_id: &EntityId, api: &ApiName) -> Result<u64, AccessError> {
        let key = UsageKey::new(entity_id.clone(), api.clone());
        Ok(self.ledger.sum_usage(&key)?)
    }
}
