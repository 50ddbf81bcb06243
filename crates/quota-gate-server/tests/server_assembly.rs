// crates/quota-gate-server/tests/server_assembly.rs
// ============================================================================
// Module: Server Assembly Tests
// Description: Building servers from configuration.
// Purpose: Verify store selection, catalog seeding, and audit file wiring.
// Dependencies: quota-gate-server, quota-gate-config, tempfile
// ============================================================================

//! ## Overview
//! Assembles [`AccessServer`] from TOML and exercises the composed router.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only panic-based assertions are permitted."
)]

mod common;

use std::fs;
use std::path::Path;

use axum::http::StatusCode;
use quota_gate_config::QuotaGateConfig;
use quota_gate_core::CatalogAdmin;
use quota_gate_server::AccessServer;
use quota_gate_server::ServerError;
use serde_json::json;
use tempfile::TempDir;

use crate::common::get;
use crate::common::plan;
use crate::common::send;

fn write_seed(dir: &Path) -> String {
    let seed = json!({
        "entities": [{ "entity_id": "E1", "display_name": "Acme" }],
        "plans": [{
            "plan_id": "P1",
            "name": "Starter",
            "permitted_apis": ["/users/"],
            "usage_limits": { "/users/": 2 }
        }],
        "subscriptions": [{
            "subscription_id": "S1",
            "entity_id": "E1",
            "plan_id": "P1",
            "created_at": { "kind": "logical", "value": 1 }
        }]
    });
    let path = dir.join("seed.json");
    fs::write(&path, seed.to_string()).unwrap();
    path.to_string_lossy().replace('\\', "/")
}

/// Verifies a seeded sqlite server persists usage across rebuilds.
#[tokio::test]
async fn sqlite_server_persists_usage_across_restarts() {
    let dir = TempDir::new().unwrap();
    let seed = write_seed(dir.path());
    let db = dir.path().join("quota.db").to_string_lossy().replace('\\', "/");
    let audit = dir.path().join("audit.log").to_string_lossy().replace('\\', "/");
    let toml = format!(
        "[server.audit]\npath = \"{audit}\"\n[store]\ntype = \"sqlite\"\npath = \"{db}\"\n\
         [catalog]\nseed_path = \"{seed}\"\n"
    );
    let config = QuotaGateConfig::from_toml_str(&toml).unwrap();

    let server = AccessServer::from_config(&config).unwrap();
    let (status, body) = send(&server.router(), get("/cloud/users/E1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["display_name"], "Acme");
    drop(server);

    let server = AccessServer::from_config(&config).unwrap();
    let (status, body) = send(&server.router(), get("/cloud/users/E1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["used"], 2);
    let (status, _) = send(&server.router(), get("/cloud/users/E1")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let lines = fs::read_to_string(dir.path().join("audit.log")).unwrap();
    assert_eq!(lines.lines().count(), 3);
}

/// Verifies a restart does not replay the seed over later plan changes.
#[tokio::test]
async fn seed_does_not_overwrite_populated_catalog() {
    let dir = TempDir::new().unwrap();
    let seed = write_seed(dir.path());
    let db = dir.path().join("quota.db").to_string_lossy().replace('\\', "/");
    let toml = format!(
        "[server.audit]\nenabled = false\n[store]\ntype = \"sqlite\"\npath = \"{db}\"\n\
         [catalog]\nseed_path = \"{seed}\"\n"
    );
    let config = QuotaGateConfig::from_toml_str(&toml).unwrap();

    let server = AccessServer::from_config(&config).unwrap();
    server.store().put_plan(&plan("P1", &["/users/"], &[("/users/", 5)])).unwrap();
    drop(server);

    let server = AccessServer::from_config(&config).unwrap();
    for expected in 1 ..= 3 {
        let (status, body) = send(&server.router(), get("/cloud/users/E1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["used"], expected);
        assert_eq!(body["allowed"], 5);
    }
}

/// Verifies a missing seed file fails initialization.
#[test]
fn missing_seed_fails_closed() {
    let dir = TempDir::new().unwrap();
    let seed = dir.path().join("absent.json").to_string_lossy().replace('\\', "/");
    let config =
        QuotaGateConfig::from_toml_str(&format!("[catalog]\nseed_path = \"{seed}\"\n")).unwrap();
    let result = AccessServer::from_config(&config);
    assert!(matches!(result, Err(ServerError::Init(_))));
}

/// Verifies the default config builds a loopback memory server.
#[test]
fn default_config_builds_memory_server() {
    let config = QuotaGateConfig::default();
    let server = AccessServer::from_config(&config).unwrap();
    assert!(server.bind_addr().ip().is_loopback());
}
