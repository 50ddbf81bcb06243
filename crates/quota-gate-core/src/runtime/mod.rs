// crates/quota-gate-core/src/runtime/mod.rs
// ============================================================================
// Module: Quota Gate Runtime
// Description: Access engine, subscription resolver, and in-memory store.
// Purpose: Group the decision logic and its reference storage backend.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Runtime components that turn store reads into access decisions.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod engine;
pub mod resolver;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use engine::AccessEngine;
pub use engine::AccessError;
pub use engine::AccessErrorKind;
pub use engine::AccessResult;
pub use engine::SharedAccessEngine;
pub use resolver::select_active_subscription;
pub use store::InMemoryMeteringStore;
pub use store::SharedMeteringStore;
