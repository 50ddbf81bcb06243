// crates/quota-gate-core/src/runtime/store.rs
// ============================================================================
// Module: Quota Gate In-Memory Store
// Description: In-memory metering store with per-pair ledger locking.
// Purpose: Provide a deterministic backend for tests and local runs.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! [`InMemoryMeteringStore`] implements every store interface in process
//! memory. Catalog maps each sit behind their own mutex; a plan is replaced
//! under a single lock acquisition, so readers never see a partial plan.
//!
//! The ledger keeps one mutex per (entity, api) pair. The outer map lock is
//! held only long enough to find or create the pair entry; the pair lock is
//! held for the whole transaction. Transactions on different pairs therefore
//! never contend. Staged events are appended only after the transaction
//! closure returns `Ok`.
//!
//! Event identifiers are unique and increasing but not dense: an identifier
//! handed out to a discarded transaction is never reused.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use crate::core::Entity;
use crate::core::EntityId;
use crate::core::Plan;
use crate::core::PlanId;
use crate::core::Subscription;
use crate::core::SubscriptionId;
use crate::core::Timestamp;
use crate::core::UsageEvent;
use crate::core::UsageEventId;
use crate::core::UsageKey;
use crate::interfaces::CatalogAdmin;
use crate::interfaces::EntityStore;
use crate::interfaces::LedgerOutcome;
use crate::interfaces::LedgerWork;
use crate::interfaces::MeteringStore;
use crate::interfaces::PlanStore;
use crate::interfaces::StoreError;
use crate::interfaces::SubscriptionStore;
use crate::interfaces::UsageLedger;
use crate::interfaces::UsageTransaction;
use crate::interfaces::validate_usage_count;

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// Committed events for one (entity, api) pair.
#[derive(Debug, Default)]
struct PairLedger {
    /// Append-only event log.
    events: Vec<UsageEvent>,
    /// Sum of `count` over `events`.
    total: u64,
}

impl PairLedger {
    /// Appends committed events and updates the running total.
    fn append(&mut self, events: Vec<UsageEvent>) -> Result<(), StoreError> {
        let mut total = self.total;
        for event in &events {
            total = total
                .checked_add(event.count)
                .ok_or_else(|| StoreError::Invalid("usage total overflow".to_string()))?;
        }
        self.total = total;
        self.events.extend(events);
        Ok(())
    }
}

/// Shared handle to one pair's ledger.
type PairHandle = Arc<Mutex<PairLedger>>;

/// In-memory metering store for tests and local runs.
#[derive(Debug, Default, Clone)]
pub struct InMemoryMeteringStore {
    /// Entities keyed by identifier.
    entities: Arc<Mutex<BTreeMap<EntityId, Entity>>>,
    /// Plans keyed by identifier.
    plans: Arc<Mutex<BTreeMap<PlanId, Plan>>>,
    /// Subscriptions keyed by identifier.
    subscriptions: Arc<Mutex<BTreeMap<SubscriptionId, Subscription>>>,
    /// Per-pair ledgers.
    ledger: Arc<Mutex<BTreeMap<UsageKey, PairHandle>>>,
    /// Last issued event identifier.
    last_event_id: Arc<AtomicU64>,
}

impl InMemoryMeteringStore {
    /// Creates an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns committed events for a pair in append order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when a lock is poisoned.
    pub fn events_for(&self, key: &UsageKey) -> Result<Vec<UsageEvent>, StoreError> {
        let Some(pair) = self.existing_pair(key)? else {
            return Ok(Vec::new());
        };
        let guard = pair.lock().map_err(|_| poisoned("usage ledger"))?;
        Ok(guard.events.clone())
    }

    /// Looks up a pair ledger without creating it.
    fn existing_pair(&self, key: &UsageKey) -> Result<Option<PairHandle>, StoreError> {
        let guard = self.ledger.lock().map_err(|_| poisoned("usage ledger index"))?;
        Ok(guard.get(key).cloned())
    }

    /// Looks up or creates a pair ledger.
    fn pair(&self, key: &UsageKey) -> Result<PairHandle, StoreError> {
        let mut guard = self.ledger.lock().map_err(|_| poisoned("usage ledger index"))?;
        Ok(Arc::clone(guard.entry(key.clone()).or_default()))
    }

    /// Issues the next event identifier.
    fn next_event_id(&self) -> UsageEventId {
        UsageEventId::new(self.last_event_id.fetch_add(1, Ordering::SeqCst).saturating_add(1))
    }
}

/// Builds the error reported for a poisoned mutex.
fn poisoned(what: &str) -> StoreError {
    StoreError::Store(format!("{what} mutex poisoned"))
}

impl EntityStore for InMemoryMeteringStore {
    fn entity(&self, entity_id: &EntityId) -> Result<Option<Entity>, StoreError> {
        let guard = self.entities.lock().map_err(|_| poisoned("entity store"))?;
        Ok(guard.get(entity_id).cloned())
    }
}

impl SubscriptionStore for InMemoryMeteringStore {
    fn subscriptions_for(&self, entity_id: &EntityId) -> Result<Vec<Subscription>, StoreError> {
        let guard = self.subscriptions.lock().map_err(|_| poisoned("subscription store"))?;
        Ok(guard
            .values()
            .filter(|subscription| subscription.entity_id == *entity_id)
            .cloned()
            .collect())
    }
}

impl PlanStore for InMemoryMeteringStore {
    fn plan(&self, plan_id: &PlanId) -> Result<Option<Plan>, StoreError> {
        let guard = self.plans.lock().map_err(|_| poisoned("plan store"))?;
        Ok(guard.get(plan_id).cloned())
    }
}

impl CatalogAdmin for InMemoryMeteringStore {
    fn put_entity(&self, entity: &Entity) -> Result<(), StoreError> {
        self.entities
            .lock()
            .map_err(|_| poisoned("entity store"))?
            .insert(entity.entity_id.clone(), entity.clone());
        Ok(())
    }

    fn put_plan(&self, plan: &Plan) -> Result<(), StoreError> {
        self.plans
            .lock()
            .map_err(|_| poisoned("plan store"))?
            .insert(plan.plan_id.clone(), plan.clone());
        Ok(())
    }

    fn delete_plan(&self, plan_id: &PlanId) -> Result<bool, StoreError> {
        let removed =
            self.plans.lock().map_err(|_| poisoned("plan store"))?.remove(plan_id).is_some();
        Ok(removed)
    }

    fn put_subscription(&self, subscription: &Subscription) -> Result<(), StoreError> {
        self.subscriptions
            .lock()
            .map_err(|_| poisoned("subscription store"))?
            .insert(subscription.subscription_id.clone(), subscription.clone());
        Ok(())
    }

    fn is_catalog_empty(&self) -> Result<bool, StoreError> {
        let no_entities = self.entities.lock().map_err(|_| poisoned("entity store"))?.is_empty();
        let no_plans = self.plans.lock().map_err(|_| poisoned("plan store"))?.is_empty();
        let no_subscriptions =
            self.subscriptions.lock().map_err(|_| poisoned("subscription store"))?.is_empty();
        Ok(no_entities && no_plans && no_subscriptions)
    }
}

/// Transaction handle over a locked pair ledger.
struct InMemoryTransaction<'a> {
    /// Store used to issue event identifiers.
    store: &'a InMemoryMeteringStore,
    /// Bound pair.
    key: &'a UsageKey,
    /// Committed total at transaction start.
    committed_total: u64,
    /// Events staged for commit.
    staged: Vec<UsageEvent>,
}

impl UsageTransaction for InMemoryTransaction<'_> {
    fn sum_usage(&mut self) -> Result<u64, StoreError> {
        self.staged.iter().try_fold(self.committed_total, |total, event| {
            total
                .checked_add(event.count)
                .ok_or_else(|| StoreError::Invalid("usage total overflow".to_string()))
        })
    }

    fn record_usage(
        &mut self,
        count: u64,
        recorded_at: Timestamp,
    ) -> Result<UsageEvent, StoreError> {
        validate_usage_count(count)?;
        let event = UsageEvent {
            event_id: self.store.next_event_id(),
            entity_id: self.key.entity_id.clone(),
            api: self.key.api.clone(),
            count,
            recorded_at,
        };
        self.staged.push(event.clone());
        Ok(event)
    }
}

impl UsageLedger for InMemoryMeteringStore {
    fn sum_usage(&self, key: &UsageKey) -> Result<u64, StoreError> {
        let Some(pair) = self.existing_pair(key)? else {
            return Ok(0);
        };
        let total = pair.lock().map_err(|_| poisoned("usage ledger"))?.total;
        Ok(total)
    }

    fn record_usage(
        &self,
        key: &UsageKey,
        count: u64,
        recorded_at: Timestamp,
    ) -> Result<UsageEvent, StoreError> {
        validate_usage_count(count)?;
        let pair = self.pair(key)?;
        let mut guard = pair.lock().map_err(|_| poisoned("usage ledger"))?;
        let event = UsageEvent {
            event_id: self.next_event_id(),
            entity_id: key.entity_id.clone(),
            api: key.api.clone(),
            count,
            recorded_at,
        };
        guard.append(vec![event.clone()])?;
        drop(guard);
        Ok(event)
    }

    fn transact(
        &self,
        key: &UsageKey,
        work: &mut LedgerWork<'_>,
    ) -> Result<LedgerOutcome, StoreError> {
        let pair = self.pair(key)?;
        let mut guard = pair.lock().map_err(|_| poisoned("usage ledger"))?;
        let mut tx = InMemoryTransaction {
            store: self,
            key,
            committed_total: guard.total,
            staged: Vec::new(),
        };
        let outcome = work(&mut tx)?;
        guard.append(tx.staged)?;
        drop(guard);
        Ok(outcome)
    }
}

// ============================================================================
// SECTION: Shared Store Wrapper
// ============================================================================

/// Shared metering store backed by an `Arc` trait object.
#[derive(Clone)]
pub struct SharedMeteringStore {
    /// Inner store implementation.
    inner: Arc<dyn MeteringStore + Send + Sync>,
}

impl SharedMeteringStore {
    /// Wraps a metering store in a shared, clonable wrapper.
    #[must_use]
    pub fn from_store(store: impl MeteringStore + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(store),
        }
    }

    /// Wraps an existing shared store.
    #[must_use]
    pub const fn new(store: Arc<dyn MeteringStore + Send + Sync>) -> Self {
        Self {
            inner: store,
        }
    }
}

impl EntityStore for SharedMeteringStore {
    fn entity(&self, entity_id: &EntityId) -> Result<Option<Entity>, StoreError> {
        self.inner.entity(entity_id)
    }

    fn exists(&self, entity_id: &EntityId) -> Result<bool, StoreError> {
        self.inner.exists(entity_id)
    }
}

impl SubscriptionStore for SharedMeteringStore {
    fn subscriptions_for(&self, entity_id: &EntityId) -> Result<Vec<Subscription>, StoreError> {
        self.inner.subscriptions_for(entity_id)
    }

    fn active_subscription(&self, entity_id: &EntityId) -> Result<Option<Subscription>, StoreError> {
        self.inner.active_subscription(entity_id)
    }
}

impl PlanStore for SharedMeteringStore {
    fn plan(&self, plan_id: &PlanId) -> Result<Option<Plan>, StoreError> {
        self.inner.plan(plan_id)
    }
}

impl UsageLedger for SharedMeteringStore {
    fn sum_usage(&self, key: &UsageKey) -> Result<u64, StoreError> {
        self.inner.sum_usage(key)
    }

    fn record_usage(
        &self,
        key: &UsageKey,
        count: u64,
        recorded_at: Timestamp,
    ) -> Result<UsageEvent, StoreError> {
        self.inner.record_usage(key, count, recorded_at)
    }

    fn transact(
        &self,
        key: &UsageKey,
        work: &mut LedgerWork<'_>,
    ) -> Result<LedgerOutcome, StoreError> {
        self.inner.transact(key, work)
    }
}

impl CatalogAdmin for SharedMeteringStore {
    fn put_entity(&self, entity: &Entity) -> Result<(), StoreError> {
        self.inner.put_entity(entity)
    }

    fn put_plan(&self, plan: &Plan) -> Result<(), StoreError> {
        self.inner.put_plan(plan)
    }

    fn delete_plan(&self, plan_id: &PlanId) -> Result<bool, StoreError> {
        self.inner.delete_plan(plan_id)
    }

    fn put_subscription(&self, subscription: &Subscription) -> Result<(), StoreError> {
        self.inner.put_subscription(subscription)
    }

    fn is_catalog_empty(&self) -> Result<bool, StoreError> {
        self.inner.is_catalog_empty()
    }
}
