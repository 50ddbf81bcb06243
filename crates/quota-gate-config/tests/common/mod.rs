// crates/quota-gate-config/tests/common/mod.rs
// ============================================================================
// Module: Config Test Helpers
// Description: Shared parsing and file helpers for config suites.
// Purpose: Keep TOML fixtures and error assertions consistent.
// ============================================================================

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]

use std::fs;
use std::path::PathBuf;

use quota_gate_config::ConfigError;
use quota_gate_config::QuotaGateConfig;
use tempfile::TempDir;

/// Parses and validates a TOML fixture.
pub fn parse(content: &str) -> Result<QuotaGateConfig, ConfigError> {
    QuotaGateConfig::from_toml_str(content)
}

/// Asserts that `result` is an invalid-config error mentioning `needle`.
pub fn assert_invalid(result: Result<QuotaGateConfig, ConfigError>, needle: &str) {
    match result {
        Err(ConfigError::Invalid(message)) => {
            assert!(message.contains(needle), "expected '{needle}' in '{message}'");
        }
        Err(other) => panic!("expected invalid config error, got {other}"),
        Ok(_) => panic!("expected invalid config error containing '{needle}'"),
    }
}

/// Writes `content` to a config file in a fresh temp dir.
pub fn write_config(content: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("quota-gate.toml");
    fs::write(&path, content).expect("write config");
    (dir, path)
}
