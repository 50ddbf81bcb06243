// crates/quota-gate-server/src/lib.rs
// ============================================================================
// Module: Quota Gate Server
// Description: HTTP access and admin surface for Quota Gate.
// Purpose: Expose access decisions and plan administration over axum.
// Dependencies: quota-gate-core, quota-gate-config, axum, tokio
// ============================================================================

//! ## Overview
//! The server binds one access route per configured meterable API and an
//! optional bearer-protected admin surface for plan maintenance. Every route
//! is a thin wrapper over [`quota_gate_core::AccessEngine`] or the store's
//! [`quota_gate_core::CatalogAdmin`] implementation.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod auth;
pub mod routes;
pub mod server;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::AccessAuditEvent;
pub use audit::AdminAuditEvent;
pub use audit::AuditSink;
pub use audit::FileAuditSink;
pub use audit::NoopAuditSink;
pub use audit::StderrAuditSink;
pub use auth::AdminAuthz;
pub use auth::AuthError;
pub use routes::AppState;
pub use routes::ErrorBody;
pub use routes::ErrorEnvelope;
pub use routes::build_router;
pub use server::AccessServer;
pub use server::ServerError;
pub use server::build_store;
pub use server::open_store;
