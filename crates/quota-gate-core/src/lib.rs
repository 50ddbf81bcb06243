// crates/quota-gate-core/src/lib.rs
// ============================================================================
// Module: Quota Gate Core Library
// Description: Public API surface for the Quota Gate core.
// Purpose: Expose domain types, store interfaces, and the access engine.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Quota Gate core decides whether a billing entity may call a metered API.
//! A decision resolves the entity's active subscription and plan, applies the
//! permission gate, applies the quota gate, and records one usage event inside
//! a transaction scoped to the (entity, api) pair. Storage is reached only
//! through the traits in [`interfaces`]; the core never reads the wall clock.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use interfaces::CatalogAdmin;
pub use interfaces::EntityStore;
pub use interfaces::LedgerOutcome;
pub use interfaces::LedgerWork;
pub use interfaces::MeteringStore;
pub use interfaces::PlanStore;
pub use interfaces::StoreError;
pub use interfaces::SubscriptionStore;
pub use interfaces::UsageLedger;
pub use interfaces::UsageTransaction;
pub use interfaces::validate_usage_count;
pub use runtime::AccessEngine;
pub use runtime::AccessError;
pub use runtime::AccessErrorKind;
pub use runtime::AccessResult;
pub use runtime::InMemoryMeteringStore;
pub use runtime::SharedAccessEngine;
pub use runtime::SharedMeteringStore;
pub use runtime::select_active_subscription;
