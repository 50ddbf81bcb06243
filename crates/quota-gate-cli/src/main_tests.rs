// crates/quota-gate-cli/src/main_tests.rs
// ============================================================================
// Module: CLI Main Helpers Tests
// Description: Unit tests for bounded reads and error payloads.
// Purpose: Ensure CLI inputs fail closed and errors render consistently.
// Dependencies: quota-gate-cli main helpers
// ============================================================================

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only panic-based assertions are permitted."
)]

use std::fs;

use quota_gate_core::AccessError;
use quota_gate_core::ApiName;
use quota_gate_core::EntityId;
use quota_gate_server::ErrorEnvelope;

use super::ReadLimitError;
use super::read_bytes_with_limit;

#[test]
fn read_bytes_with_limit_allows_small_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("small.bin");
    fs::write(&path, b"abc").unwrap();
    assert_eq!(read_bytes_with_limit(&path, 3).unwrap(), b"abc");
}

#[test]
fn read_bytes_with_limit_rejects_large_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("large.bin");
    fs::write(&path, b"abcd").unwrap();
    let err = read_bytes_with_limit(&path, 3).unwrap_err();
    assert!(matches!(
        err,
        ReadLimitError::TooLarge {
            size: 4,
            limit: 3
        }
    ));
}

#[test]
fn access_error_envelope_uses_stable_kind() {
    let err = AccessError::SubscriptionNotFound {
        entity_id: EntityId::new("E2"),
    };
    let value = serde_json::to_value(ErrorEnvelope::from_access_error(&err)).unwrap();
    assert_eq!(value["error"]["kind"], "subscription_not_found");
    assert!(value["error"]["message"].as_str().unwrap().contains("E2"));

    let err = AccessError::PermissionDenied {
        api: ApiName::new("/plans"),
    };
    let value = serde_json::to_value(ErrorEnvelope::from_access_error(&err)).unwrap();
    assert_eq!(value["error"]["kind"], "permission_denied");
}

#[test]
fn access_error_envelope_carries_quota_context() {
    let err = AccessError::QuotaExceeded {
        api: ApiName::new("/users/"),
        used: 2,
        allowed: 2,
    };
    let value = serde_json::to_value(ErrorEnvelope::from_access_error(&err)).unwrap();
    assert_eq!(value["error"]["kind"], "quota_exceeded");
    assert_eq!(value["error"]["api"], "/users/");
    assert_eq!(value["error"]["used"], 2);
    assert_eq!(value["error"]["allowed"], 2);

    let err = AccessError::EntityNotFound {
        entity_id: EntityId::new("E9"),
    };
    let value = serde_json::to_value(ErrorEnvelope::from_access_error(&err)).unwrap();
    assert!(value["error"].get("api").is_none());
    assert!(value["error"].get("used").is_none());
}
