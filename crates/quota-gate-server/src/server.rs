// crates/quota-gate-server/src/server.rs
// ============================================================================
// Module: Quota Gate Server
// Description: Server assembly from configuration and the HTTP serve loop.
// Purpose: Compose store, engine, auth, audit, and routes once at startup.
// Dependencies: quota-gate-config, quota-gate-core, quota-gate-store-sqlite, axum, tokio
// ============================================================================

//! ## Overview
//! [`AccessServer::from_config`] validates configuration, opens the metering
//! store, seeds it when its catalog is empty, and builds the router. Nothing is
//! looked up ambiently after that point; [`AccessServer::serve`] only binds
//! and runs the composed router until ctrl-c.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use quota_gate_config::QuotaGateConfig;
use quota_gate_config::StoreConfig;
use quota_gate_config::StoreType;
use quota_gate_core::CatalogAdmin;
use quota_gate_core::CatalogSnapshot;
use quota_gate_core::CatalogSummary;
use quota_gate_core::InMemoryMeteringStore;
use quota_gate_core::MAX_CATALOG_BYTES;
use quota_gate_core::SharedMeteringStore;
use quota_gate_store_sqlite::SqliteMeteringStore;

use crate::audit::AuditSink;
use crate::audit::FileAuditSink;
use crate::audit::NoopAuditSink;
use crate::audit::StderrAuditSink;
use crate::auth::AdminAuthz;
use crate::routes::AppState;
use crate::routes::build_router;

// ============================================================================
// SECTION: Server
// ============================================================================

/// Quota Gate HTTP server instance.
pub struct AccessServer {
    /// Validated bind address.
    addr: SocketAddr,
    /// Composed router.
    router: Router,
    /// Store shared by the router.
    store: SharedMeteringStore,
}

impl AccessServer {
    /// Builds a server from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when configuration is invalid or the store,
    /// seed catalog, or audit log cannot be opened.
    pub fn from_config(config: &QuotaGateConfig) -> Result<Self, ServerError> {
        config.validate().map_err(|err| ServerError::Config(err.to_string()))?;
        let addr = config.server.bind_addr().map_err(|err| ServerError::Config(err.to_string()))?;
        let apis = config.meterable_apis().map_err(|err| ServerError::Config(err.to_string()))?;
        let store = open_store(config)?;
        let audit = build_audit_sink(config)?;
        let authz = AdminAuthz::from_config(&config.server.admin);
        emit_posture_warnings(config, &addr, authz.enabled());
        let state = AppState::new(store.clone(), authz, audit);
        let router =
            build_router(state, &apis, &config.server.route_prefix, config.server.max_body_bytes);
        Ok(Self {
            addr,
            router,
            store,
        })
    }

    /// Returns the configured bind address.
    #[must_use]
    pub const fn bind_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Returns a clone of the composed router.
    #[must_use]
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Returns the store backing the router.
    #[must_use]
    pub fn store(&self) -> SharedMeteringStore {
        self.store.clone()
    }

    /// Binds and serves until ctrl-c.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Transport`] when binding or serving fails.
    pub async fn serve(self) -> Result<(), ServerError> {
        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(|err| ServerError::Transport(format!("http bind failed: {err}")))?;
        tracing::info!(addr = %self.addr, "quota gate listening");
        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|err| ServerError::Transport(format!("http server failed: {err}")))
    }
}

// ============================================================================
// SECTION: Assembly Helpers
// ============================================================================

/// Opens the metering store named by configuration.
///
/// # Errors
///
/// Returns [`ServerError`] when the sqlite store cannot be opened.
pub fn build_store(config: &StoreConfig) -> Result<SharedMeteringStore, ServerError> {
    let store = match config.store_type {
        StoreType::Memory => SharedMeteringStore::from_store(InMemoryMeteringStore::new()),
        StoreType::Sqlite => {
            let sqlite_config = config.sqlite_config().ok_or_else(|| {
                ServerError::Config("sqlite store requires path".to_string())
            })?;
            let store = SqliteMeteringStore::new(sqlite_config)
                .map_err(|err| ServerError::Init(err.to_string()))?;
            SharedMeteringStore::from_store(store)
        }
    };
    Ok(store)
}

/// Opens the configured store and seeds an empty catalog.
///
/// The seed only populates a store with no entities, plans, or
/// subscriptions, so admin writes and imports survive restarts.
///
/// # Errors
///
/// Returns [`ServerError`] when the store cannot be opened or the seed fails.
pub fn open_store(config: &QuotaGateConfig) -> Result<SharedMeteringStore, ServerError> {
    let store = build_store(&config.store)?;
    let Some(seed_path) = &config.catalog.seed_path else {
        return Ok(store);
    };
    if !store.is_catalog_empty().map_err(|err| ServerError::Init(err.to_string()))? {
        tracing::info!(seed = %seed_path.display(), "catalog already populated; seed skipped");
        return Ok(store);
    }
    let summary = seed_catalog(&store, seed_path)?;
    tracing::info!(
        entities = summary.entities,
        plans = summary.plans,
        subscriptions = summary.subscriptions,
        "catalog seed applied"
    );
    Ok(store)
}

/// Reads a catalog snapshot from disk and applies it to the store.
fn seed_catalog(store: &SharedMeteringStore, path: &Path) -> Result<CatalogSummary, ServerError> {
    let metadata = fs::metadata(path)
        .map_err(|err| ServerError::Init(format!("catalog seed unreadable: {err}")))?;
    if metadata.len() > u64::try_from(MAX_CATALOG_BYTES).unwrap_or(u64::MAX) {
        return Err(ServerError::Init("catalog seed exceeds size limit".to_string()));
    }
    let bytes = fs::read(path)
        .map_err(|err| ServerError::Init(format!("catalog seed unreadable: {err}")))?;
    let snapshot =
        CatalogSnapshot::from_json_slice(&bytes).map_err(|err| ServerError::Init(err.to_string()))?;
    snapshot.apply_to(store).map_err(|err| ServerError::Init(err.to_string()))
}

/// Selects the audit sink from configuration.
fn build_audit_sink(config: &QuotaGateConfig) -> Result<Arc<dyn AuditSink>, ServerError> {
    let audit = &config.server.audit;
    if !audit.enabled {
        return Ok(Arc::new(NoopAuditSink));
    }
    match &audit.path {
        Some(path) => {
            let sink = FileAuditSink::new(Path::new(path))
                .map_err(|err| ServerError::Init(format!("audit log open failed: {err}")))?;
            Ok(Arc::new(sink))
        }
        None => Ok(Arc::new(StderrAuditSink)),
    }
}

/// Logs security-relevant deployment posture.
fn emit_posture_warnings(config: &QuotaGateConfig, addr: &SocketAddr, admin_enabled: bool) {
    if !addr.ip().is_loopback() {
        tracing::warn!(%addr, "binding a non-loopback address; access routes are unauthenticated");
    }
    if !admin_enabled {
        tracing::info!("no admin tokens configured; admin routes are disabled");
    }
    if config.store.store_type == StoreType::Memory {
        tracing::info!("memory store selected; usage is lost on restart");
    }
}

/// Resolves when ctrl-c is received.
async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),
    /// Initialization errors.
    #[error("init error: {0}")]
    Init(String),
    /// Transport errors.
    #[error("transport error: {0}")]
    Transport(String),
}
