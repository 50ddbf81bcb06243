// crates/quota-gate-core/src/core/apis.rs
// ============================================================================
// Module: Meterable API Set
// Description: Validated enumeration of API names exposed for metering.
// Purpose: Keep the meterable API list in configuration instead of code.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! The set of meterable APIs is supplied by configuration at startup and used
//! by transports to bind one generic access handler per name. The access
//! engine itself never consults this set: a plan's permitted APIs and usage
//! limits are the only inputs to a decision.
//!
//! Names must start with `/`, stay within [`MAX_API_NAME_BYTES`], use a
//! restricted path alphabet, and remain unique once a trailing `/` is trimmed
//! (so `/users/` and `/users` cannot both be bound to the same route).

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::identifiers::ApiName;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum length of a meterable API name in bytes.
pub const MAX_API_NAME_BYTES: usize = 128;
/// Maximum number of meterable APIs accepted from configuration.
pub const MAX_METERABLE_APIS: usize = 256;
/// API names metered when configuration does not override them.
pub const DEFAULT_API_NAMES: [&str; 6] =
    ["/users/", "/plans", "/subscriptions", "/token", "/usage/limit", "/permissions"];

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Meterable API validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiNameError {
    /// The configured set is empty.
    #[error("at least one meterable api is required")]
    Empty,
    /// Too many APIs were configured.
    #[error("too many meterable apis: {count} (max {max})")]
    TooMany {
        /// Configured count.
        count: usize,
        /// Allowed maximum.
        max: usize,
    },
    /// A name failed shape validation.
    #[error("invalid api name {name:?}: {reason}")]
    Invalid {
        /// Offending name.
        name: String,
        /// Reason for rejection.
        reason: &'static str,
    },
    /// Two names map to the same route.
    #[error("duplicate api name {name:?} (conflicts with {existing:?})")]
    Duplicate {
        /// Offending name.
        name: String,
        /// Previously accepted name with the same route.
        existing: String,
    },
}

// ============================================================================
// SECTION: Meterable APIs
// ============================================================================

/// Ordered, validated set of meterable API names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeterableApis {
    /// Names in configuration order.
    names: Vec<ApiName>,
}

impl MeterableApis {
    /// Validates and builds a meterable API set.
    ///
    /// # Errors
    ///
    /// Returns [`ApiNameError`] when the set is empty, too large, or contains
    /// malformed or conflicting names.
    pub fn new<I, N>(names: I) -> Result<Self, ApiNameError>
    where
        I: IntoIterator<Item = N>,
        N: Into<ApiName>,
    {
        let names: Vec<ApiName> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(ApiNameError::Empty);
        }
        if names.len() > MAX_METERABLE_APIS {
            return Err(ApiNameError::TooMany {
                count: names.len(),
                max: MAX_METERABLE_APIS,
            });
        }
        let mut seen: Vec<(&str, &str)> = Vec::with_capacity(names.len());
        for name in &names {
            validate_api_name(name.as_str())?;
            let route = route_segment(name.as_str());
            if let Some((_, existing)) = seen.iter().find(|(seen_route, _)| *seen_route == route) {
                return Err(ApiNameError::Duplicate {
                    name: name.to_string(),
                    existing: (*existing).to_string(),
                });
            }
            seen.push((route, name.as_str()));
        }
        Ok(Self {
            names,
        })
    }

    /// Returns the default meterable API set.
    #[must_use]
    pub fn defaults() -> Self {
        Self {
            names: DEFAULT_API_NAMES.iter().map(|name| ApiName::new(*name)).collect(),
        }
    }

    /// Iterates names in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = &ApiName> {
        self.names.iter()
    }

    /// Returns the number of configured names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns true when no names are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Returns true when `api` is a configured meterable API.
    #[must_use]
    pub fn contains(&self, api: &ApiName) -> bool {
        self.names.iter().any(|name| name == api)
    }
}

/// Returns the route segment for an API name (trailing `/` trimmed).
#[must_use]
pub fn route_segment(name: &str) -> &str {
    name.strip_suffix('/').unwrap_or(name)
}

/// Checks the shape of a single API name.
fn validate_api_name(name: &str) -> Result<(), ApiNameError> {
    let invalid = |reason| ApiNameError::Invalid {
        name: name.to_string(),
        reason,
    };
    if name.len() > MAX_API_NAME_BYTES {
        return Err(invalid("name too long"));
    }
    if !name.starts_with('/') {
        return Err(invalid("name must start with '/'"));
    }
    if route_segment(name).is_empty() {
        return Err(invalid("name must contain a path segment"));
    }
    if name.contains("//") {
        return Err(invalid("name must not contain empty segments"));
    }
    let allowed = |ch: char| ch.is_ascii_alphanumeric() || matches!(ch, '/' | '-' | '_' | '.');
    if !name.chars().all(allowed) {
        return Err(invalid("name contains unsupported characters"));
    }
    if name.split('/').any(|segment| segment == "." || segment == "..") {
        return Err(invalid("name must not contain dot segments"));
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
