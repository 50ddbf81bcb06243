// crates/quota-gate-core/src/core/mod.rs
// ============================================================================
// Module: Quota Gate Domain Types
// Description: Identifiers, time values, catalog records, and usage events.
// Purpose: Group the serializable data model shared by every crate.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Plain data types with no storage or transport behavior attached.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod apis;
pub mod catalog;
pub mod identifiers;
pub mod model;
pub mod time;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use apis::ApiNameError;
pub use apis::DEFAULT_API_NAMES;
pub use apis::MAX_API_NAME_BYTES;
pub use apis::MAX_METERABLE_APIS;
pub use apis::MeterableApis;
pub use apis::route_segment;
pub use catalog::CatalogSnapshot;
pub use catalog::CatalogSummary;
pub use catalog::MAX_CATALOG_BYTES;
pub use identifiers::ApiName;
pub use identifiers::EntityId;
pub use identifiers::PlanId;
pub use identifiers::SubscriptionId;
pub use identifiers::UsageEventId;
pub use model::Entity;
pub use model::Plan;
pub use model::Subscription;
pub use model::SubscriptionStatus;
pub use model::UsageEvent;
pub use model::UsageKey;
pub use time::Timestamp;
