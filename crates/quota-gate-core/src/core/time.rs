// crates/quota-gate-core/src/core/time.rs
// ============================================================================
// Module: Quota Gate Time Model
// Description: Caller-supplied timestamps for usage events and subscriptions.
// Purpose: Keep decisions reproducible by never reading the wall clock.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Timestamps are supplied by the host (the HTTP surface stamps requests with
//! unix milliseconds; tests use logical time). The ordering defined here is
//! used to pick the most recent subscription and nothing else.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Time Values
// ============================================================================

/// Timestamp attached to usage events and subscriptions.
///
/// # Invariants
/// - Values are explicitly provided by callers; the core never reads wall-clock time.
/// - Ordering compares the variant first (`UnixMillis` before `Logical`), then the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Timestamp {
    /// Unix epoch milliseconds.
    UnixMillis(i64),
    /// Monotonic logical time value.
    Logical(u64),
}

impl Timestamp {
    /// Returns the stable label for the timestamp kind.
    #[must_use]
    pub const fn kind_label(&self) -> &'static str {
        match self {
            Self::UnixMillis(_) => "unix_millis",
            Self::Logical(_) => "logical",
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
