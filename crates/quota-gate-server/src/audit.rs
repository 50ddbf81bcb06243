// crates/quota-gate-server/src/audit.rs
// ============================================================================
// Module: Quota Gate Audit Logging
// Description: Structured audit events for access decisions and admin calls.
// Purpose: Emit JSON-line audit records without a hard logging dependency.
// Dependencies: quota-gate-core, serde, serde_json
// ============================================================================

//! ## Overview
//! Every access decision and every admin request produces one audit record.
//! Records are serialized as JSON lines and handed to an [`AuditSink`]; the
//! stock sinks write to stderr, append to a file, or discard. Admin records
//! carry a SHA-256 token fingerprint, never the token itself.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use quota_gate_core::AccessError;
use quota_gate_core::AccessErrorKind;
use quota_gate_core::AccessResult;
use quota_gate_core::ApiName;
use quota_gate_core::EntityId;
use serde::Serialize;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Access decision audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct AccessAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Request identifier when provided.
    pub request_id: Option<String>,
    /// Entity named by the request.
    pub entity_id: EntityId,
    /// API named by the route.
    pub api: ApiName,
    /// Decision outcome label.
    pub outcome: &'static str,
    /// Error kind when the decision failed.
    pub error_kind: Option<AccessErrorKind>,
    /// Usage after a granted call, or at check time for quota denials.
    pub used: Option<u64>,
    /// Allowance in effect when known.
    pub allowed: Option<u64>,
}

impl AccessAuditEvent {
    /// Builds an audit event for a granted call.
    #[must_use]
    pub fn granted(request_id: Option<String>, result: &AccessResult) -> Self {
        Self {
            event: "access_decision",
            timestamp_ms: now_ms(),
            request_id,
            entity_id: result.entity_id.clone(),
            api: result.api.clone(),
            outcome: "allow",
            error_kind: None,
            used: Some(result.used_after),
            allowed: Some(result.allowed),
        }
    }

    /// Builds an audit event for a denied or failed call.
    #[must_use]
    pub fn denied(
        request_id: Option<String>,
        entity_id: &EntityId,
        api: &ApiName,
        error: &AccessError,
    ) -> Self {
        let (used, allowed) = match error {
            AccessError::QuotaExceeded {
                used,
                allowed,
                ..
            } => (Some(*used), Some(*allowed)),
            _ => (None, None),
        };
        Self {
            event: "access_decision",
            timestamp_ms: now_ms(),
            request_id,
            entity_id: entity_id.clone(),
            api: api.clone(),
            outcome: if error.is_retryable() { "error" } else { "deny" },
            error_kind: Some(error.kind()),
            used,
            allowed,
        }
    }
}

/// Admin request audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct AdminAuditEvent {
    /// Event identifier (`admin_auth` or `admin_plan_change`).
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Request identifier when provided.
    pub request_id: Option<String>,
    /// Admin action label.
    pub action: &'static str,
    /// Plan identifiers touched by the action.
    pub plan_ids: Vec<String>,
    /// Decision label (`allow`, `deny`, or `error`).
    pub decision: &'static str,
    /// SHA-256 fingerprint of the presented bearer token.
    pub token_fingerprint: Option<String>,
    /// Failure reason when the request did not succeed.
    pub reason: Option<String>,
}

/// Admin audit event parameters.
pub struct AdminAuditEventParams {
    /// Event identifier.
    pub event: &'static str,
    /// Request identifier when provided.
    pub request_id: Option<String>,
    /// Admin action label.
    pub action: &'static str,
    /// Plan identifiers touched by the action.
    pub plan_ids: Vec<String>,
    /// Decision label.
    pub decision: &'static str,
    /// Token fingerprint when authenticated.
    pub token_fingerprint: Option<String>,
    /// Failure reason.
    pub reason: Option<String>,
}

impl AdminAuditEvent {
    /// Creates a new admin audit event with a consistent timestamp.
    #[must_use]
    pub fn new(params: AdminAuditEventParams) -> Self {
        Self {
            event: params.event,
            timestamp_ms: now_ms(),
            request_id: params.request_id,
            action: params.action,
            plan_ids: params.plan_ids,
            decision: params.decision,
            token_fingerprint: params.token_fingerprint,
            reason: params.reason,
        }
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Audit sink for access and admin events.
pub trait AuditSink: Send + Sync {
    /// Record an access decision.
    fn record_access(&self, event: &AccessAuditEvent);

    /// Record an admin request.
    fn record_admin(&self, _event: &AdminAuditEvent) {}
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl AuditSink for StderrAuditSink {
    fn record_access(&self, event: &AccessAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }

    fn record_admin(&self, event: &AdminAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// Audit sink that logs JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Appends one line and flushes.
    fn write_line(&self, payload: &str) {
        if let Ok(mut file) = self.file.lock() {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

impl AuditSink for FileAuditSink {
    fn record_access(&self, event: &AccessAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            self.write_line(&payload);
        }
    }

    fn record_admin(&self, event: &AdminAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            self.write_line(&payload);
        }
    }
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record_access(&self, _event: &AccessAuditEvent) {}

    fn record_admin(&self, _event: &AdminAuditEvent) {}
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns milliseconds since the Unix epoch.
fn now_ms() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test fixtures use unwraps for clarity."
    )]

    use std::fs;

    use quota_gate_core::ApiName;
    use quota_gate_core::EntityId;

    use super::*;

    #[test]
    fn quota_denial_carries_counts() {
        let error = AccessError::QuotaExceeded {
            api: ApiName::new("/users/"),
            used: 2,
            allowed: 2,
        };
        let event = AccessAuditEvent::denied(
            Some("req-1".to_string()),
            &EntityId::new("e1"),
            &ApiName::new("/users/"),
            &error,
        );
        assert_eq!(event.outcome, "deny");
        assert_eq!(event.used, Some(2));
        assert_eq!(event.allowed, Some(2));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["error_kind"], "quota_exceeded");
        assert_eq!(json["request_id"], "req-1");
    }

    #[test]
    fn file_sink_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let sink = FileAuditSink::new(&path).unwrap();
        let event = AdminAuditEvent::new(AdminAuditEventParams {
            event: "admin_plan_change",
            request_id: None,
            action: "delete_plan",
            plan_ids: vec!["basic".to_string()],
            decision: "allow",
            token_fingerprint: Some("ab".to_string()),
            reason: None,
        });
        sink.record_admin(&event);
        sink.record_admin(&event);
        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["action"], "delete_plan");
    }
}
