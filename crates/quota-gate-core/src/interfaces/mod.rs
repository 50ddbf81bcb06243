// crates/quota-gate-core/src/interfaces/mod.rs
// ============================================================================
// Module: Quota Gate Interfaces
// Description: Storage-facing traits consumed by the access engine.
// Purpose: Keep the engine independent of persistence technology.
// Dependencies: crate::core, thiserror
// ============================================================================

//! ## Overview
//! The access engine reads entities, subscriptions, and plans, and appends
//! usage events, exclusively through the traits below. All methods are
//! synchronous and may block on I/O; async hosts should call the engine from
//! a blocking worker.
//!
//! The ledger is the only mutated shared resource. [`UsageLedger::transact`]
//! opens a scope bound to a single (entity, api) pair: reads and appends made
//! through the [`UsageTransaction`] handle are atomic with respect to other
//! transactions on the same pair, and are discarded unless the closure returns
//! `Ok`. Implementations must not serialize transactions on unrelated pairs
//! behind a process-wide lock.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::Entity;
use crate::core::EntityId;
use crate::core::Plan;
use crate::core::PlanId;
use crate::core::Subscription;
use crate::core::Timestamp;
use crate::core::UsageEvent;
use crate::core::UsageKey;
use crate::runtime::select_active_subscription;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Storage errors surfaced by every store interface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("metering store io error: {0}")]
    Io(String),
    /// Store data is corrupted or fails integrity checks.
    #[error("metering store corruption: {0}")]
    Corrupt(String),
    /// Store data version is incompatible.
    #[error("metering store version mismatch: {0}")]
    VersionMismatch(String),
    /// Input or stored data is invalid.
    #[error("metering store invalid data: {0}")]
    Invalid(String),
    /// Concurrent writer contention that did not resolve in time.
    #[error("metering store conflict: {0}")]
    Conflict(String),
    /// Store reported an error.
    #[error("metering store error: {0}")]
    Store(String),
}

/// Rejects usage counts below one.
///
/// # Errors
///
/// Returns [`StoreError::Invalid`] when `count` is zero.
pub fn validate_usage_count(count: u64) -> Result<(), StoreError> {
    if count == 0 {
        return Err(StoreError::Invalid("usage count must be at least 1".to_string()));
    }
    Ok(())
}

// ============================================================================
// SECTION: Catalog Reads
// ============================================================================

/// Read access to billing entities.
pub trait EntityStore {
    /// Loads an entity by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn entity(&self, entity_id: &EntityId) -> Result<Option<Entity>, StoreError>;

    /// Returns true when the entity exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn exists(&self, entity_id: &EntityId) -> Result<bool, StoreError> {
        Ok(self.entity(entity_id)?.is_some())
    }
}

/// Read access to subscriptions.
pub trait SubscriptionStore {
    /// Lists every subscription row for an entity, in any order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn subscriptions_for(&self, entity_id: &EntityId) -> Result<Vec<Subscription>, StoreError>;

    /// Resolves the entity's active subscription.
    ///
    /// Applies [`select_active_subscription`], so every store resolves
    /// multiple candidates the same way.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn active_subscription(&self, entity_id: &EntityId) -> Result<Option<Subscription>, StoreError> {
        Ok(select_active_subscription(self.subscriptions_for(entity_id)?))
    }
}

/// Read access to the plan catalog.
pub trait PlanStore {
    /// Loads a plan by identifier.
    ///
    /// The returned plan is a consistent snapshot: its permitted set and
    /// limits come from the same committed write.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn plan(&self, plan_id: &PlanId) -> Result<Option<Plan>, StoreError>;
}

// ============================================================================
// SECTION: Usage Ledger
// ============================================================================

/// Result of a ledger transaction run by the access engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerOutcome {
    /// An event was appended.
    Recorded {
        /// Usage summed before the append.
        used_before: u64,
        /// Appended event.
        event: UsageEvent,
    },
    /// The allowance was exhausted; nothing was appended.
    Exhausted {
        /// Usage summed at check time.
        used: u64,
    },
}

/// Handle for reads and appends inside one ledger transaction.
///
/// The handle is bound to the (entity, api) pair passed to
/// [`UsageLedger::transact`].
pub trait UsageTransaction {
    /// Sums usage for the bound pair, including events staged in this transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn sum_usage(&mut self) -> Result<u64, StoreError>;

    /// Stages one usage event for the bound pair.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when `count` is zero or the write fails.
    fn record_usage(&mut self, count: u64, recorded_at: Timestamp)
    -> Result<UsageEvent, StoreError>;
}

/// Closure run inside a ledger transaction.
pub type LedgerWork<'a> =
    dyn FnMut(&mut dyn UsageTransaction) -> Result<LedgerOutcome, StoreError> + 'a;

/// Append-only usage ledger.
pub trait UsageLedger {
    /// Sums usage for a pair. Returns zero when no events exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn sum_usage(&self, key: &UsageKey) -> Result<u64, StoreError>;

    /// Appends one event outside any caller transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when `count` is zero or the write fails.
    fn record_usage(
        &self,
        key: &UsageKey,
        count: u64,
        recorded_at: Timestamp,
    ) -> Result<UsageEvent, StoreError>;

    /// Runs `work` inside a transaction scoped to `key`.
    ///
    /// Staged appends are committed when `work` returns `Ok` and discarded
    /// when it returns `Err`. The scope is released on every exit path.
    ///
    /// # Errors
    ///
    /// Returns the error produced by `work`, or [`StoreError`] when the
    /// transaction cannot be opened or committed. A commit failure leaves no
    /// staged event behind.
    fn transact(&self, key: &UsageKey, work: &mut LedgerWork<'_>)
    -> Result<LedgerOutcome, StoreError>;
}

// ============================================================================
// SECTION: Catalog Administration
// ============================================================================

/// Administrative writes for entities, plans, and subscriptions.
pub trait CatalogAdmin {
    /// Inserts or replaces an entity.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn put_entity(&self, entity: &Entity) -> Result<(), StoreError>;

    /// Inserts or replaces a plan atomically (permitted set and limits together).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn put_plan(&self, plan: &Plan) -> Result<(), StoreError>;

    /// Deletes a plan. Returns false when no plan existed.
    ///
    /// Subscriptions that reference the plan are left in place and resolve
    /// to a missing plan afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn delete_plan(&self, plan_id: &PlanId) -> Result<bool, StoreError>;

    /// Inserts or replaces a subscription.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn put_subscription(&self, subscription: &Subscription) -> Result<(), StoreError>;

    /// Returns true when the store holds no entities, plans, or subscriptions.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn is_catalog_empty(&self) -> Result<bool, StoreError>;
}

// ============================================================================
// SECTION: Combined Store
// ============================================================================

/// Every interface a complete metering backend provides.
pub trait MeteringStore:
    EntityStore + SubscriptionStore + PlanStore + UsageLedger + CatalogAdmin
{
}

impl<T> MeteringStore for T where
    T: EntityStore + SubscriptionStore + PlanStore + UsageLedger + CatalogAdmin
{
}
