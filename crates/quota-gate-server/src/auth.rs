// crates/quota-gate-server/src/auth.rs
// ============================================================================
// Module: Quota Gate Admin Auth
// Description: Bearer token enforcement for admin endpoints.
// Purpose: Provide fail-closed, constant-time admin authentication.
// Dependencies: quota-gate-config, sha2, subtle, thiserror
// ============================================================================

//! ## Overview
//! Admin endpoints accept `Authorization: Bearer <token>` against the token
//! list in `server.admin.bearer_tokens`. Every configured token is compared
//! in constant time. Successful callers are identified in audit records by a
//! SHA-256 fingerprint of the presented token.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt::Write as _;

use quota_gate_config::AdminConfig;
use sha2::Digest;
use sha2::Sha256;
use subtle::Choice;
use subtle::ConstantTimeEq;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

const MAX_AUTH_HEADER_BYTES: usize = 8 * 1024;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Authentication errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Missing or invalid authentication.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
}

// ============================================================================
// SECTION: Authorizer
// ============================================================================

/// Authenticated admin caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminPrincipal {
    /// SHA-256 fingerprint of the presented token (lowercase hex).
    pub token_fingerprint: String,
}

/// Admin bearer token authorizer.
#[derive(Clone)]
pub struct AdminAuthz {
    /// Accepted tokens.
    tokens: Vec<Vec<u8>>,
}

impl AdminAuthz {
    /// Builds an authorizer from admin configuration.
    #[must_use]
    pub fn from_config(config: &AdminConfig) -> Self {
        Self {
            tokens: config.bearer_tokens.iter().map(|token| token.as_bytes().to_vec()).collect(),
        }
    }

    /// Returns true when at least one token is configured.
    #[must_use]
    pub fn enabled(&self) -> bool {
        !self.tokens.is_empty()
    }

    /// Authenticates an `Authorization` header value.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Unauthenticated`] when the header is missing,
    /// malformed, or carries an unknown token.
    pub fn authorize(&self, auth_header: Option<&str>) -> Result<AdminPrincipal, AuthError> {
        let token = parse_bearer_token(auth_header)?;
        let mut matched = Choice::from(0);
        for candidate in &self.tokens {
            matched |= candidate.as_slice().ct_eq(token.as_bytes());
        }
        if !bool::from(matched) {
            return Err(AuthError::Unauthenticated("invalid bearer token".to_string()));
        }
        Ok(AdminPrincipal {
            token_fingerprint: token_fingerprint(&token),
        })
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the lowercase hex SHA-256 digest of a token.
#[must_use]
pub fn token_fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest.iter() {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Extracts the token from a `Bearer` authorization header.
fn parse_bearer_token(auth_header: Option<&str>) -> Result<String, AuthError> {
    let header = auth_header
        .ok_or_else(|| AuthError::Unauthenticated("missing authorization".to_string()))?;
    if header.len() > MAX_AUTH_HEADER_BYTES {
        return Err(AuthError::Unauthenticated("authorization header too large".to_string()));
    }
    let mut parts = header.trim().splitn(2, ' ');
    let scheme = parts.next().unwrap_or_default();
    let token = parts.next().unwrap_or_default().trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthError::Unauthenticated("invalid authorization header".to_string()));
    }
    Ok(token.to_string())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
