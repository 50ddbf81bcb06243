// crates/quota-gate-store-sqlite/src/lib.rs
// ============================================================================
// Module: SQLite Metering Store
// Description: Durable metering store backend using SQLite WAL.
// Purpose: Provide production persistence for catalogs and the usage ledger.
// Dependencies: quota-gate-core, rusqlite
// ============================================================================

//! ## Overview
//! This crate provides a SQLite-backed implementation of every Quota Gate
//! store interface. Ledger transactions open with `BEGIN IMMEDIATE`, which
//! takes the database write lock before usage is summed, so the
//! sum/compare/append sequence is atomic against every other writer,
//! including other processes sharing the file. Connections come from a small
//! bounded pool so unrelated reads proceed in parallel under WAL.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod pool;
mod schema;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::SqliteMeteringStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
