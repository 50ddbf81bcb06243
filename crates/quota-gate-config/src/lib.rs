// crates/quota-gate-config/src/lib.rs
// ============================================================================
// Module: Quota Gate Config Library
// Description: Canonical config model and fail-closed validation.
// Purpose: Single source of truth for quota-gate.toml semantics.
// Dependencies: quota-gate-core, quota-gate-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! `quota-gate-config` defines the configuration model for Quota Gate: the
//! HTTP surface, the metering store backend, the meterable API enumeration,
//! and the optional catalog seed. Every section has defaults; validation is
//! strict and rejects unknown keys.
//!
//! Security posture: config inputs are untrusted.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
