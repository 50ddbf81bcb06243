// crates/quota-gate-config/src/config.rs
// ============================================================================
// Module: Quota Gate Configuration
// Description: Configuration loading and validation for Quota Gate.
// Purpose: Provide strict, fail-closed config parsing with safe defaults.
// Dependencies: quota-gate-core, quota-gate-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is read from TOML. The path comes from the caller, then the
//! `QUOTA_GATE_CONFIG` environment variable, then `quota-gate.toml` in the
//! working directory. Files are size-limited and must be UTF-8.
//!
//! Defaults bind the HTTP surface to loopback, keep metering in memory, and
//! meter the six standard cloud APIs. Binding a non-loopback address must be
//! opted into explicitly.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;

use quota_gate_core::DEFAULT_API_NAMES;
use quota_gate_core::MeterableApis;
use quota_gate_store_sqlite::SqliteStoreConfig;
use quota_gate_store_sqlite::SqliteStoreMode;
use quota_gate_store_sqlite::SqliteSyncMode;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Limits and Defaults
// ============================================================================

/// Default config file name.
const DEFAULT_CONFIG_NAME: &str = "quota-gate.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "QUOTA_GATE_CONFIG";
/// Maximum configuration file size in bytes.
pub const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Default bind address.
const DEFAULT_BIND: &str = "127.0.0.1:8080";
/// Default route prefix for access routes.
const DEFAULT_ROUTE_PREFIX: &str = "/cloud";
/// Default request body cap for admin endpoints.
const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;
/// Maximum route prefix length.
const MAX_ROUTE_PREFIX_LENGTH: usize = 128;
/// Maximum number of admin bearer tokens.
const MAX_ADMIN_TOKENS: usize = 64;
/// Maximum admin bearer token length.
const MAX_ADMIN_TOKEN_LENGTH: usize = 256;
/// Default `SQLite` busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum `SQLite` busy timeout (ms).
const MAX_BUSY_TIMEOUT_MS: u64 = 600_000;
/// Default `SQLite` connection pool size.
const DEFAULT_MAX_CONNECTIONS: usize = 8;
/// Maximum `SQLite` connection pool size.
const MAX_CONNECTIONS: usize = 64;

// ============================================================================
// SECTION: Config Model
// ============================================================================

/// Quota Gate configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuotaGateConfig {
    /// HTTP surface configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Metering store configuration.
    #[serde(default)]
    pub store: StoreConfig,
    /// Meterable API enumeration.
    #[serde(default)]
    pub apis: ApisConfig,
    /// Catalog seeding configuration.
    #[serde(default)]
    pub catalog: CatalogConfig,
}

impl QuotaGateConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses configuration without validating it.
    ///
    /// Callers that apply command-line overrides validate afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read or parsed.
    pub fn read(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Parses and validates configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.store.validate()?;
        self.apis.validate()?;
        self.catalog.validate()?;
        if self.server.route_prefix.is_empty()
            && self.apis.names.iter().any(|name| name == "/admin" || name.starts_with("/admin/"))
        {
            return Err(ConfigError::Invalid(
                "apis.names must not shadow the admin routes when server.route_prefix is empty"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the validated meterable API set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when an API name is invalid.
    pub fn meterable_apis(&self) -> Result<MeterableApis, ConfigError> {
        self.apis.meterable_apis()
    }
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// HTTP surface configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Socket address to bind.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Explicit opt-in for binding a non-loopback address.
    #[serde(default)]
    pub allow_non_loopback: bool,
    /// Path prefix for access routes (empty for none).
    #[serde(default = "default_route_prefix")]
    pub route_prefix: String,
    /// Maximum admin request body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Admin endpoint configuration.
    #[serde(default)]
    pub admin: AdminConfig,
    /// Audit logging configuration.
    #[serde(default)]
    pub audit: ServerAuditConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            allow_non_loopback: false,
            route_prefix: default_route_prefix(),
            max_body_bytes: default_max_body_bytes(),
            admin: AdminConfig::default(),
            audit: ServerAuditConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Returns the parsed bind address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the address does not parse.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("invalid server.bind: {}", self.bind)))
    }

    /// Validates server configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        let addr = self.bind_addr()?;
        if !addr.ip().is_loopback() && !self.allow_non_loopback {
            return Err(ConfigError::Invalid(
                "non-loopback server.bind requires server.allow_non_loopback = true".to_string(),
            ));
        }
        validate_route_prefix(&self.route_prefix)?;
        if self.max_body_bytes == 0 {
            return Err(ConfigError::Invalid(
                "server.max_body_bytes must be greater than zero".to_string(),
            ));
        }
        self.admin.validate()?;
        self.audit.validate()
    }
}

/// Admin endpoint configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdminConfig {
    /// Bearer tokens accepted on admin endpoints. Empty disables them.
    #[serde(default)]
    pub bearer_tokens: Vec<String>,
}

impl AdminConfig {
    /// Returns true when admin endpoints should be mounted.
    #[must_use]
    pub fn enabled(&self) -> bool {
        !self.bearer_tokens.is_empty()
    }

    /// Validates admin configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.bearer_tokens.len() > MAX_ADMIN_TOKENS {
            return Err(ConfigError::Invalid(format!(
                "server.admin.bearer_tokens exceeds max count ({MAX_ADMIN_TOKENS})"
            )));
        }
        for token in &self.bearer_tokens {
            if token.is_empty() || token.len() > MAX_ADMIN_TOKEN_LENGTH {
                return Err(ConfigError::Invalid(format!(
                    "server.admin bearer token length must be 1..={MAX_ADMIN_TOKEN_LENGTH} bytes"
                )));
            }
            if token.chars().any(char::is_whitespace) {
                return Err(ConfigError::Invalid(
                    "server.admin bearer token must not contain whitespace".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Audit logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerAuditConfig {
    /// Enable structured audit logging.
    #[serde(default = "default_audit_enabled")]
    pub enabled: bool,
    /// Optional audit log path (JSON lines). Stderr when unset.
    #[serde(default)]
    pub path: Option<String>,
}

impl Default for ServerAuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_audit_enabled(),
            path: None,
        }
    }
}

impl ServerAuditConfig {
    /// Validates audit configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.path {
            validate_path_string("server.audit.path", path)?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Metering store backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    /// Use the in-memory store.
    #[default]
    Memory,
    /// Use the `SQLite`-backed durable store.
    Sqlite,
}

/// Metering store configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Store backend type.
    #[serde(rename = "type", default)]
    pub store_type: StoreType,
    /// Database path (sqlite only).
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Busy timeout in milliseconds (sqlite only).
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// Connection pool size (sqlite only).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_type: StoreType::Memory,
            path: None,
            busy_timeout_ms: default_busy_timeout_ms(),
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
            max_connections: default_max_connections(),
        }
    }
}

impl StoreConfig {
    /// Returns the `SQLite` store config when the sqlite backend is selected.
    #[must_use]
    pub fn sqlite_config(&self) -> Option<SqliteStoreConfig> {
        match self.store_type {
            StoreType::Memory => None,
            StoreType::Sqlite => self.path.as_ref().map(|path| SqliteStoreConfig {
                path: path.clone(),
                busy_timeout_ms: self.busy_timeout_ms,
                journal_mode: self.journal_mode,
                sync_mode: self.sync_mode,
                max_connections: self.max_connections,
            }),
        }
    }

    /// Validates store configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match self.store_type {
            StoreType::Memory => {
                if self.path.is_some() {
                    return Err(ConfigError::Invalid(
                        "memory store must not set path".to_string(),
                    ));
                }
                Ok(())
            }
            StoreType::Sqlite => {
                let path = self.path.as_ref().ok_or_else(|| {
                    ConfigError::Invalid("sqlite store requires path".to_string())
                })?;
                validate_path_string("store.path", &path.to_string_lossy())?;
                if self.busy_timeout_ms > MAX_BUSY_TIMEOUT_MS {
                    return Err(ConfigError::Invalid(format!(
                        "store.busy_timeout_ms exceeds max ({MAX_BUSY_TIMEOUT_MS})"
                    )));
                }
                if self.max_connections == 0 || self.max_connections > MAX_CONNECTIONS {
                    return Err(ConfigError::Invalid(format!(
                        "store.max_connections must be 1..={MAX_CONNECTIONS}"
                    )));
                }
                Ok(())
            }
        }
    }
}

// ============================================================================
// SECTION: APIs and Catalog
// ============================================================================

/// Meterable API enumeration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApisConfig {
    /// API names bound to access routes, in route registration order.
    #[serde(default = "default_api_names")]
    pub names: Vec<String>,
}

impl Default for ApisConfig {
    fn default() -> Self {
        Self {
            names: default_api_names(),
        }
    }
}

impl ApisConfig {
    /// Returns the validated meterable API set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when an API name is invalid.
    pub fn meterable_apis(&self) -> Result<MeterableApis, ConfigError> {
        MeterableApis::new(self.names.iter().map(String::as_str))
            .map_err(|err| ConfigError::Invalid(format!("apis.names: {err}")))
    }

    /// Validates the API enumeration.
    fn validate(&self) -> Result<(), ConfigError> {
        self.meterable_apis().map(|_| ())
    }
}

/// Catalog seeding configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogConfig {
    /// Optional JSON catalog snapshot applied at startup.
    #[serde(default)]
    pub seed_path: Option<PathBuf>,
}

impl CatalogConfig {
    /// Validates catalog configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.seed_path {
            validate_path_string("catalog.seed_path", &path.to_string_lossy())?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing failure.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Configuration failed validation.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    if path
        .components()
        .any(|component| component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH)
    {
        return Err(ConfigError::Invalid("config path component too long".to_string()));
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    if Path::new(trimmed)
        .components()
        .any(|component| component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH)
    {
        return Err(ConfigError::Invalid(format!("{field} path component too long")));
    }
    Ok(())
}

/// Validates the access route prefix.
fn validate_route_prefix(prefix: &str) -> Result<(), ConfigError> {
    if prefix.is_empty() {
        return Ok(());
    }
    if prefix.len() > MAX_ROUTE_PREFIX_LENGTH {
        return Err(ConfigError::Invalid("server.route_prefix exceeds max length".to_string()));
    }
    if !prefix.starts_with('/') || prefix.ends_with('/') {
        return Err(ConfigError::Invalid(
            "server.route_prefix must start with '/' and must not end with '/'".to_string(),
        ));
    }
    let allowed = |ch: char| ch.is_ascii_alphanumeric() || matches!(ch, '/' | '-' | '_' | '.');
    if !prefix.chars().all(allowed) || prefix.contains("//") {
        return Err(ConfigError::Invalid(
            "server.route_prefix contains unsupported characters".to_string(),
        ));
    }
    if prefix.starts_with("/admin") {
        return Err(ConfigError::Invalid(
            "server.route_prefix must not shadow the admin routes".to_string(),
        ));
    }
    Ok(())
}

/// Default bind address.
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

/// Default route prefix.
fn default_route_prefix() -> String {
    DEFAULT_ROUTE_PREFIX.to_string()
}

/// Default admin body cap.
const fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

/// Default audit toggle.
const fn default_audit_enabled() -> bool {
    true
}

/// Default `SQLite` busy timeout.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Default `SQLite` pool size.
const fn default_max_connections() -> usize {
    DEFAULT_MAX_CONNECTIONS
}

/// Default meterable API names.
fn default_api_names() -> Vec<String> {
    DEFAULT_API_NAMES.iter().map(|name| (*name).to_string()).collect()
}

// ============================================================================
// SECTION: Tests
// ============================================================================
