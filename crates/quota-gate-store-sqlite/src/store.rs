// crates/quota-gate-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Metering Store
// Description: Durable catalog and usage ledger backed by SQLite WAL.
// Purpose: Persist entities, plans, subscriptions, and usage events.
// Dependencies: quota-gate-core, rusqlite, serde, thiserror
// ============================================================================

//! ## Overview
//! [`SqliteMeteringStore`] implements the Quota Gate store interfaces over a
//! single `SQLite` database file. Plans are normalized across three tables and
//! replaced inside one transaction; reads of a plan happen inside one read
//! transaction, so a reader sees either the old plan or the new one.
//!
//! Usage events are append-only rows. [`UsageLedger::transact`] runs the
//! caller's closure inside an `IMMEDIATE` transaction and commits only when
//! the closure succeeds. Writer contention that outlasts the busy timeout is
//! reported as [`StoreError::Conflict`]; nothing is appended in that case.
//! Database contents are treated as untrusted and decoded fail-closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;

use quota_gate_core::CatalogAdmin;
use quota_gate_core::Entity;
use quota_gate_core::EntityId;
use quota_gate_core::EntityStore;
use quota_gate_core::LedgerOutcome;
use quota_gate_core::LedgerWork;
use quota_gate_core::Plan;
use quota_gate_core::PlanId;
use quota_gate_core::PlanStore;
use quota_gate_core::StoreError;
use quota_gate_core::Subscription;
use quota_gate_core::SubscriptionStore;
use quota_gate_core::Timestamp;
use quota_gate_core::UsageEvent;
use quota_gate_core::UsageEventId;
use quota_gate_core::UsageKey;
use quota_gate_core::UsageLedger;
use quota_gate_core::UsageTransaction;
use quota_gate_core::validate_usage_count;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use serde::Deserialize;
use thiserror::Error;

use crate::pool::ConnectionPool;
use crate::schema::decode_subscription;
use crate::schema::decode_timestamp_value;
use crate::schema::encode_timestamp;
use crate::schema::initialize_schema;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Default number of pooled connections.
const DEFAULT_MAX_CONNECTIONS: usize = 8;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` metering store.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds (also bounds pool waits).
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// Maximum number of open connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl SqliteStoreConfig {
    /// Builds a config for `path` with default tuning.
    #[must_use]
    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Returns the default connection pool size.
const fn default_max_connections() -> usize {
    DEFAULT_MAX_CONNECTIONS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Database or pool stayed busy past the timeout.
    #[error("sqlite store busy: {0}")]
    Busy(String),
    /// Stored data failed to decode.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid input or configuration.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Store(message),
            SqliteStoreError::Busy(message) => Self::Conflict(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::VersionMismatch(message) => Self::VersionMismatch(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
        }
    }
}

/// Classifies a `rusqlite` error, separating lock contention from failures.
pub(crate) fn db_error(err: &rusqlite::Error) -> SqliteStoreError {
    match err.sqlite_error_code() {
        Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked) => {
            SqliteStoreError::Busy(err.to_string())
        }
        _ => SqliteStoreError::Db(err.to_string()),
    }
}

/// Converts a `rusqlite` error straight into a core store error.
fn store_error(err: &rusqlite::Error) -> StoreError {
    StoreError::from(db_error(err))
}

/// Converts an unsigned quantity into an `SQLite` integer.
fn to_sql_int(value: u64, what: &str) -> Result<i64, SqliteStoreError> {
    i64::try_from(value).map_err(|_| SqliteStoreError::Invalid(format!("{what} too large")))
}

/// Converts an `SQLite` integer into an unsigned quantity.
fn from_sql_int(value: i64, what: &str) -> Result<u64, SqliteStoreError> {
    u64::try_from(value).map_err(|_| SqliteStoreError::Corrupt(format!("negative {what}")))
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed metering store with WAL support.
#[derive(Clone)]
pub struct SqliteMeteringStore {
    /// Pooled connections.
    pool: std::sync::Arc<ConnectionPool>,
}

impl SqliteMeteringStore {
    /// Opens an `SQLite`-backed metering store.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized, or when the schema version is unsupported.
    pub fn new(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        if config.max_connections == 0 {
            return Err(SqliteStoreError::Invalid(
                "max_connections must be greater than zero".to_string(),
            ));
        }
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let pool = ConnectionPool::new(config);
        pool.with_connection(initialize_schema)?;
        Ok(Self {
            pool: std::sync::Arc::new(pool),
        })
    }

    /// Returns committed events for a pair in append order.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails or rows are corrupt.
    pub fn events_for(&self, key: &UsageKey) -> Result<Vec<UsageEvent>, SqliteStoreError> {
        self.pool.with_connection(|connection| {
            let mut statement = connection
                .prepare(
                    "SELECT event_id, count, recorded_kind, recorded_value FROM usage_events \
                     WHERE entity_id = ?1 AND api_name = ?2 ORDER BY event_id",
                )
                .map_err(|err| db_error(&err))?;
            let rows = statement
                .query_map(params![key.entity_id.as_str(), key.api.as_str()], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                })
                .map_err(|err| db_error(&err))?;
            let mut events = Vec::new();
            for row in rows {
                let (event_id, count, kind, value) = row.map_err(|err| db_error(&err))?;
                events.push(UsageEvent {
                    event_id: UsageEventId::new(from_sql_int(event_id, "event id")?),
                    entity_id: key.entity_id.clone(),
                    api: key.api.clone(),
                    count: from_sql_int(count, "usage count")?,
                    recorded_at: decode_timestamp_value(&kind, value)?,
                });
            }
            Ok(events)
        })
    }
}

impl EntityStore for SqliteMeteringStore {
    fn entity(&self, entity_id: &EntityId) -> Result<Option<Entity>, StoreError> {
        self.pool.with_connection(|connection| {
            let display_name: Option<String> = connection
                .query_row(
                    "SELECT display_name FROM entities WHERE entity_id = ?1",
                    params![entity_id.as_str()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|err| store_error(&err))?;
            Ok(display_name.map(|display_name| Entity {
                entity_id: entity_id.clone(),
                display_name,
            }))
        })
    }
}

impl SubscriptionStore for SqliteMeteringStore {
    fn subscriptions_for(&self, entity_id: &EntityId) -> Result<Vec<Subscription>, StoreError> {
        self.pool.with_connection(|connection| {
            let mut statement = connection
                .prepare(
                    "SELECT subscription_id, plan_id, status, created_kind, created_value FROM \
                     subscriptions WHERE entity_id = ?1",
                )
                .map_err(|err| store_error(&err))?;
            let rows = statement
                .query_map(params![entity_id.as_str()], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                })
                .map_err(|err| store_error(&err))?;
            let mut subscriptions = Vec::new();
            for row in rows {
                let row = row.map_err(|err| store_error(&err))?;
                subscriptions.push(decode_subscription(entity_id, row)?);
            }
            Ok(subscriptions)
        })
    }
}

impl PlanStore for SqliteMeteringStore {
    fn plan(&self, plan_id: &PlanId) -> Result<Option<Plan>, StoreError> {
        self.pool.with_connection(|connection| {
            let tx = connection.transaction().map_err(|err| store_error(&err))?;
            let plan = load_plan(&tx, plan_id)?;
            tx.commit().map_err(|err| store_error(&err))?;
            Ok(plan)
        })
    }
}

/// Reads one plan and its permission and limit rows.
fn load_plan(connection: &Connection, plan_id: &PlanId) -> Result<Option<Plan>, SqliteStoreError> {
    let name: Option<String> = connection
        .query_row("SELECT name FROM plans WHERE plan_id = ?1", params![plan_id.as_str()], |row| {
            row.get(0)
        })
        .optional()
        .map_err(|err| db_error(&err))?;
    let Some(name) = name else {
        return Ok(None);
    };
    let mut plan = Plan {
        plan_id: plan_id.clone(),
        name,
        permitted_apis: std::collections::BTreeSet::new(),
        usage_limits: std::collections::BTreeMap::new(),
    };

    let mut statement = connection
        .prepare("SELECT api_name FROM plan_apis WHERE plan_id = ?1")
        .map_err(|err| db_error(&err))?;
    let apis = statement
        .query_map(params![plan_id.as_str()], |row| row.get::<_, String>(0))
        .map_err(|err| db_error(&err))?;
    for api in apis {
        plan.permitted_apis.insert(api.map_err(|err| db_error(&err))?.into());
    }

    let mut statement = connection
        .prepare("SELECT api_name, allowance FROM plan_limits WHERE plan_id = ?1")
        .map_err(|err| db_error(&err))?;
    let limits = statement
        .query_map(params![plan_id.as_str()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })
        .map_err(|err| db_error(&err))?;
    for limit in limits {
        let (api, allowance) = limit.map_err(|err| db_error(&err))?;
        plan.usage_limits.insert(api.into(), from_sql_int(allowance, "allowance")?);
    }
    Ok(Some(plan))
}

impl CatalogAdmin for SqliteMeteringStore {
    fn put_entity(&self, entity: &Entity) -> Result<(), StoreError> {
        self.pool.with_connection(|connection| {
            connection
                .execute(
                    "INSERT INTO entities (entity_id, display_name) VALUES (?1, ?2) \
                     ON CONFLICT(entity_id) DO UPDATE SET display_name = excluded.display_name",
                    params![entity.entity_id.as_str(), entity.display_name],
                )
                .map_err(|err| store_error(&err))?;
            Ok(())
        })
    }

    fn put_plan(&self, plan: &Plan) -> Result<(), StoreError> {
        let limits = plan
            .usage_limits
            .iter()
            .map(|(api, allowance)| Ok((api.as_str(), to_sql_int(*allowance, "allowance")?)))
            .collect::<Result<Vec<_>, SqliteStoreError>>()?;
        self.pool.with_connection(|connection| {
            let tx = connection
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|err| store_error(&err))?;
            let plan_id = plan.plan_id.as_str();
            tx.execute(
                "INSERT INTO plans (plan_id, name) VALUES (?1, ?2) \
                 ON CONFLICT(plan_id) DO UPDATE SET name = excluded.name",
                params![plan_id, plan.name],
            )
            .map_err(|err| store_error(&err))?;
            tx.execute("DELETE FROM plan_apis WHERE plan_id = ?1", params![plan_id])
                .map_err(|err| store_error(&err))?;
            tx.execute("DELETE FROM plan_limits WHERE plan_id = ?1", params![plan_id])
                .map_err(|err| store_error(&err))?;
            for api in &plan.permitted_apis {
                tx.execute(
                    "INSERT INTO plan_apis (plan_id, api_name) VALUES (?1, ?2)",
                    params![plan_id, api.as_str()],
                )
                .map_err(|err| store_error(&err))?;
            }
            for (api, allowance) in &limits {
                tx.execute(
                    "INSERT INTO plan_limits (plan_id, api_name, allowance) VALUES (?1, ?2, ?3)",
                    params![plan_id, api, allowance],
                )
                .map_err(|err| store_error(&err))?;
            }
            tx.commit().map_err(|err| store_error(&err))
        })
    }

    fn delete_plan(&self, plan_id: &PlanId) -> Result<bool, StoreError> {
        self.pool.with_connection(|connection| {
            let removed = connection
                .execute("DELETE FROM plans WHERE plan_id = ?1", params![plan_id.as_str()])
                .map_err(|err| store_error(&err))?;
            Ok(removed > 0)
        })
    }

    fn put_subscription(&self, subscription: &Subscription) -> Result<(), StoreError> {
        let (created_kind, created_value) = encode_timestamp(subscription.created_at)?;
        self.pool.with_connection(|connection| {
            connection
                .execute(
                    "INSERT INTO subscriptions (subscription_id, entity_id, plan_id, status, \
                     created_kind, created_value) VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
                     ON CONFLICT(subscription_id) DO UPDATE SET entity_id = excluded.entity_id, \
                     plan_id = excluded.plan_id, status = excluded.status, \
                     created_kind = excluded.created_kind, created_value = excluded.created_value",
                    params![
                        subscription.subscription_id.as_str(),
                        subscription.entity_id.as_str(),
                        subscription.plan_id.as_ref().map(PlanId::as_str),
                        subscription.status.as_str(),
                        created_kind,
                        created_value
                    ],
                )
                .map_err(|err| store_error(&err))?;
            Ok(())
        })
    }

    fn is_catalog_empty(&self) -> Result<bool, StoreError> {
        self.pool.with_connection(|connection| {
            let populated: bool = connection
                .query_row(
                    "SELECT EXISTS (SELECT 1 FROM entities) OR EXISTS (SELECT 1 FROM plans) \
                     OR EXISTS (SELECT 1 FROM subscriptions)",
                    params![],
                    |row| row.get(0),
                )
                .map_err(|err| store_error(&err))?;
            Ok(!populated)
        })
    }
}

// ============================================================================
// SECTION: Usage Ledger
// ============================================================================

/// Sums committed usage for a pair on the given connection.
fn sum_pair(connection: &Connection, key: &UsageKey) -> Result<u64, SqliteStoreError> {
    let total: i64 = connection
        .query_row(
            "SELECT COALESCE(SUM(count), 0) FROM usage_events WHERE entity_id = ?1 AND api_name = ?2",
            params![key.entity_id.as_str(), key.api.as_str()],
            |row| row.get(0),
        )
        .map_err(|err| db_error(&err))?;
    from_sql_int(total, "usage total")
}

/// Appends one event for a pair on the given connection.
fn append_event(
    connection: &Connection,
    key: &UsageKey,
    count: u64,
    recorded_at: Timestamp,
) -> Result<UsageEvent, SqliteStoreError> {
    let (recorded_kind, recorded_value) = encode_timestamp(recorded_at)?;
    connection
        .execute(
            "INSERT INTO usage_events (entity_id, api_name, count, recorded_kind, recorded_value) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                key.entity_id.as_str(),
                key.api.as_str(),
                to_sql_int(count, "usage count")?,
                recorded_kind,
                recorded_value
            ],
        )
        .map_err(|err| db_error(&err))?;
    let event_id = from_sql_int(connection.last_insert_rowid(), "event id")?;
    Ok(UsageEvent {
        event_id: UsageEventId::new(event_id),
        entity_id: key.entity_id.clone(),
        api: key.api.clone(),
        count,
        recorded_at,
    })
}

/// Ledger transaction handle over an open `IMMEDIATE` transaction.
struct SqliteUsageTransaction<'a> {
    /// Open transaction.
    tx: &'a rusqlite::Transaction<'a>,
    /// Bound pair.
    key: &'a UsageKey,
}

impl UsageTransaction for SqliteUsageTransaction<'_> {
    fn sum_usage(&mut self) -> Result<u64, StoreError> {
        Ok(sum_pair(self.tx, self.key)?)
    }

    fn record_usage(
        &mut self,
        count: u64,
        recorded_at: Timestamp,
    ) -> Result<UsageEvent, StoreError> {
        validate_usage_count(count)?;
        Ok(append_event(self.tx, self.key, count, recorded_at)?)
    }
}

impl UsageLedger for SqliteMeteringStore {
    fn sum_usage(&self, key: &UsageKey) -> Result<u64, StoreError> {
        self.pool.with_connection(|connection| Ok(sum_pair(connection, key)?))
    }

    fn record_usage(
        &self,
        key: &UsageKey,
        count: u64,
        recorded_at: Timestamp,
    ) -> Result<UsageEvent, StoreError> {
        validate_usage_count(count)?;
        self.pool.with_connection(|connection| Ok(append_event(connection, key, count, recorded_at)?))
    }

    fn transact(
        &self,
        key: &UsageKey,
        work: &mut LedgerWork<'_>,
    ) -> Result<LedgerOutcome, StoreError> {
        self.pool.with_connection(|connection| {
            let tx = connection
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|err| store_error(&err))?;
            let outcome = {
                let mut handle = SqliteUsageTransaction {
                    tx: &tx,
                    key,
                };
                work(&mut handle)
            };
            match outcome {
                Ok(outcome) => {
                    tx.commit().map_err(|err| store_error(&err))?;
                    Ok(outcome)
                }
                Err(err) => {
                    tx.rollback().map_err(|rollback| store_error(&rollback))?;
                    Err(err)
                }
            }
        })
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    let path_string = path.display().to_string();
    if path_string.is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    if path
        .components()
        .any(|component| component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH)
    {
        return Err(SqliteStoreError::Invalid(
            "store path contains an overlong component".to_string(),
        ));
    }
    if path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}
