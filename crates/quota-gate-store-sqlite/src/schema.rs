// crates/quota-gate-store-sqlite/src/schema.rs
// ============================================================================
// Module: SQLite Schema
// Description: Schema creation, version checks, and row codecs.
// Purpose: Keep table layout and value encoding in one place.
// Dependencies: quota-gate-core, rusqlite
// ============================================================================

//! ## Overview
//! The schema is versioned through `store_meta`; an unknown version fails
//! closed. Timestamps are stored as a kind label plus an integer value so
//! unix and logical times round-trip without loss.

// ============================================================================
// SECTION: Imports
// ============================================================================

use quota_gate_core::EntityId;
use quota_gate_core::PlanId;
use quota_gate_core::Subscription;
use quota_gate_core::SubscriptionId;
use quota_gate_core::SubscriptionStatus;
use quota_gate_core::Timestamp;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;

use crate::store::SqliteStoreError;
use crate::store::db_error;

// ============================================================================
// SECTION: Schema
// ============================================================================

/// `SQLite` schema version for the store.
pub const SCHEMA_VERSION: i64 = 1;

/// Initializes the `SQLite` schema or validates the existing version.
pub fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(|err| db_error(&err))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| db_error(&err))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| db_error(&err))?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| db_error(&err))?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS entities (
                    entity_id TEXT PRIMARY KEY,
                    display_name TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS plans (
                    plan_id TEXT PRIMARY KEY,
                    name TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS plan_apis (
                    plan_id TEXT NOT NULL,
                    api_name TEXT NOT NULL,
                    PRIMARY KEY (plan_id, api_name),
                    FOREIGN KEY (plan_id) REFERENCES plans(plan_id) ON DELETE CASCADE
                );
                CREATE TABLE IF NOT EXISTS plan_limits (
                    plan_id TEXT NOT NULL,
                    api_name TEXT NOT NULL,
                    allowance INTEGER NOT NULL CHECK (allowance >= 0),
                    PRIMARY KEY (plan_id, api_name),
                    FOREIGN KEY (plan_id) REFERENCES plans(plan_id) ON DELETE CASCADE
                );
                CREATE TABLE IF NOT EXISTS subscriptions (
                    subscription_id TEXT PRIMARY KEY,
                    entity_id TEXT NOT NULL,
                    plan_id TEXT,
                    status TEXT NOT NULL,
                    created_kind TEXT NOT NULL,
                    created_value INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_subscriptions_entity_id
                    ON subscriptions (entity_id);
                CREATE TABLE IF NOT EXISTS usage_events (
                    event_id INTEGER PRIMARY KEY AUTOINCREMENT,
                    entity_id TEXT NOT NULL,
                    api_name TEXT NOT NULL,
                    count INTEGER NOT NULL CHECK (count >= 1),
                    recorded_kind TEXT NOT NULL,
                    recorded_value INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_usage_events_pair
                    ON usage_events (entity_id, api_name);",
            )
            .map_err(|err| db_error(&err))?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(|err| db_error(&err))?;
    Ok(())
}

// ============================================================================
// SECTION: Codecs
// ============================================================================

/// Encodes a timestamp as (kind, value) columns.
pub fn encode_timestamp(timestamp: Timestamp) -> Result<(&'static str, i64), SqliteStoreError> {
    let value = match timestamp {
        Timestamp::UnixMillis(value) => value,
        Timestamp::Logical(value) => i64::try_from(value)
            .map_err(|_| SqliteStoreError::Invalid("logical timestamp too large".to_string()))?,
    };
    Ok((timestamp.kind_label(), value))
}

/// Decodes (kind, value) columns into a timestamp.
pub fn decode_timestamp_value(kind: &str, value: i64) -> Result<Timestamp, SqliteStoreError> {
    match kind {
        "unix_millis" => Ok(Timestamp::UnixMillis(value)),
        "logical" => u64::try_from(value)
            .map(Timestamp::Logical)
            .map_err(|_| SqliteStoreError::Corrupt("negative logical timestamp".to_string())),
        other => Err(SqliteStoreError::Corrupt(format!("unknown timestamp kind: {other}"))),
    }
}

/// Raw subscription row: id, plan, status, created kind, created value.
pub type SubscriptionRow = (String, Option<String>, String, String, i64);

/// Decodes a subscription row for `entity_id`.
pub fn decode_subscription(
    entity_id: &EntityId,
    row: SubscriptionRow,
) -> Result<Subscription, SqliteStoreError> {
    let (subscription_id, plan_id, status, created_kind, created_value) = row;
    let status = SubscriptionStatus::parse(&status).ok_or_else(|| {
        SqliteStoreError::Corrupt(format!("unknown subscription status: {status}"))
    })?;
    Ok(Subscription {
        subscription_id: SubscriptionId::new(subscription_id),
        entity_id: entity_id.clone(),
        plan_id: plan_id.map(PlanId::new),
        status,
        created_at: decode_timestamp_value(&created_kind, created_value)?,
    })
}

// ============================================================================
// SECTION: Tests
// ============================================================================
