// crates/quota-gate-core/src/core/identifiers.rs
// ============================================================================
// Module: Quota Gate Identifiers
// Description: Opaque identifiers for entities, plans, subscriptions, and APIs.
// Purpose: Keep identifier kinds distinct at compile time.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Identifiers are opaque strings owned by external systems (identity, billing,
//! configuration). The core compares them for equality and ordering only and
//! never parses their contents. Usage event identifiers are numeric and are
//! assigned by the ledger on append.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: String Identifiers
// ============================================================================

/// Declares an opaque string identifier newtype.
macro_rules! string_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }
    };
}

string_identifier! {
    /// Billing entity (user or account) identifier.
    EntityId
}

string_identifier! {
    /// Plan identifier.
    PlanId
}

string_identifier! {
    /// Subscription identifier.
    SubscriptionId
}

string_identifier! {
    /// Meterable API name, e.g. `/users/`.
    ///
    /// The engine treats the name as an opaque key into a plan's permitted set
    /// and usage limits. Shape checks live in [`crate::MeterableApis`].
    ApiName
}

// ============================================================================
// SECTION: Usage Event Identifier
// ============================================================================

/// Ledger-assigned identifier for an appended usage event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UsageEventId(u64);

impl UsageEventId {
    /// Creates a usage event identifier from its raw value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw identifier value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for UsageEventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
