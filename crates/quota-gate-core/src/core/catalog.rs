// crates/quota-gate-core/src/core/catalog.rs
// ============================================================================
// Module: Catalog Snapshots
// Description: Bulk entity, plan, and subscription records for seeding.
// Purpose: Load an initial catalog into any store through admin writes.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! A [`CatalogSnapshot`] is the JSON document accepted by `catalog import` and
//! by the optional startup seed. Applying a snapshot issues one administrative
//! write per record; each plan is written atomically, so in-flight decisions
//! never observe a half-applied plan. Snapshots are untrusted input: the byte
//! size is bounded and identifiers must be unique within each section.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

use crate::core::model::Entity;
use crate::core::model::Plan;
use crate::core::model::Subscription;
use crate::interfaces::CatalogAdmin;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum accepted snapshot size in bytes.
pub const MAX_CATALOG_BYTES: usize = 16 * 1024 * 1024;

// ============================================================================
// SECTION: Snapshot
// ============================================================================

/// Bulk catalog document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogSnapshot {
    /// Entities to upsert.
    #[serde(default)]
    pub entities: Vec<Entity>,
    /// Plans to replace.
    #[serde(default)]
    pub plans: Vec<Plan>,
    /// Subscriptions to upsert.
    #[serde(default)]
    pub subscriptions: Vec<Subscription>,
}

/// Record counts written by [`CatalogSnapshot::apply_to`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CatalogSummary {
    /// Entities written.
    pub entities: usize,
    /// Plans written.
    pub plans: usize,
    /// Subscriptions written.
    pub subscriptions: usize,
}

impl CatalogSnapshot {
    /// Parses and validates a snapshot from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] when the payload is oversized,
    /// malformed, or contains duplicate identifiers.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, StoreError> {
        if bytes.len() > MAX_CATALOG_BYTES {
            return Err(StoreError::Invalid(format!(
                "catalog exceeds size limit: {} bytes (max {MAX_CATALOG_BYTES})",
                bytes.len()
            )));
        }
        let snapshot: Self = serde_json::from_slice(bytes)
            .map_err(|err| StoreError::Invalid(format!("invalid catalog json: {err}")))?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Checks identifier uniqueness within each section.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] on the first duplicate found.
    pub fn validate(&self) -> Result<(), StoreError> {
        ensure_unique("entity", self.entities.iter().map(|entity| entity.entity_id.as_str()))?;
        ensure_unique("plan", self.plans.iter().map(|plan| plan.plan_id.as_str()))?;
        ensure_unique(
            "subscription",
            self.subscriptions.iter().map(|subscription| subscription.subscription_id.as_str()),
        )
    }

    /// Writes every record through the admin interface.
    ///
    /// Entities go first so subscriptions never reference an unknown entity
    /// mid-import; plans go before subscriptions for the same reason.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] from the first failed write. Records written
    /// before the failure stay written.
    pub fn apply_to(&self, admin: &dyn CatalogAdmin) -> Result<CatalogSummary, StoreError> {
        self.validate()?;
        for entity in &self.entities {
            admin.put_entity(entity)?;
        }
        for plan in &self.plans {
            admin.put_plan(plan)?;
        }
        for subscription in &self.subscriptions {
            admin.put_subscription(subscription)?;
        }
        Ok(CatalogSummary {
            entities: self.entities.len(),
            plans: self.plans.len(),
            subscriptions: self.subscriptions.len(),
        })
    }
}

/// Rejects the first repeated identifier in `ids`.
fn ensure_unique<'a>(
    label: &str,
    ids: impl Iterator<Item = &'a str>,
) -> Result<(), StoreError> {
    let mut seen = BTreeSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(StoreError::Invalid(format!("duplicate {label} id in catalog: {id}")));
        }
    }
    Ok(())
}
