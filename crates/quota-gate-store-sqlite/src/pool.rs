// crates/quota-gate-store-sqlite/src/pool.rs
// ============================================================================
// Module: SQLite Connection Pool
// Description: Bounded pool of configured SQLite connections.
// Purpose: Let unrelated requests use separate connections under WAL.
// Dependencies: rusqlite
// ============================================================================

//! ## Overview
//! A connection is checked out for the duration of one closure and returned
//! on every exit path, including unwinding. At most `max_connections` are
//! open at once; callers beyond that wait up to the busy timeout and then
//! fail with [`SqliteStoreError::Busy`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Condvar;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::Connection;
use rusqlite::OpenFlags;

use crate::store::SqliteStoreConfig;
use crate::store::SqliteStoreError;
use crate::store::db_error;

// ============================================================================
// SECTION: Pool
// ============================================================================

/// Mutable pool bookkeeping.
struct PoolState {
    /// Idle connections ready for reuse.
    idle: Vec<Connection>,
    /// Connections currently open (idle or checked out).
    open: usize,
}

/// Bounded `SQLite` connection pool.
pub struct ConnectionPool {
    /// Store configuration used to open connections.
    config: SqliteStoreConfig,
    /// Pool bookkeeping.
    state: Mutex<PoolState>,
    /// Signalled when a connection is returned or closed.
    available: Condvar,
}

/// Checked-out connection returned to the pool on drop.
struct Checkout<'a> {
    /// Owning pool.
    pool: &'a ConnectionPool,
    /// Connection; `None` only after it has been handed back.
    connection: Option<Connection>,
}

impl Drop for Checkout<'_> {
    fn drop(&mut self) {
        self.pool.release(self.connection.take());
    }
}

impl ConnectionPool {
    /// Creates an empty pool; connections open lazily.
    pub fn new(config: SqliteStoreConfig) -> Self {
        Self {
            config,
            state: Mutex::new(PoolState {
                idle: Vec::new(),
                open: 0,
            }),
            available: Condvar::new(),
        }
    }

    /// Runs `f` with a pooled connection.
    pub fn with_connection<T, E>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<SqliteStoreError>,
    {
        let mut checkout = self.checkout()?;
        let Some(connection) = checkout.connection.as_mut() else {
            return Err(SqliteStoreError::Db("pooled connection missing".to_string()).into());
        };
        f(connection)
    }

    /// Takes an idle connection, opens a new one, or waits for one.
    fn checkout(&self) -> Result<Checkout<'_>, SqliteStoreError> {
        let timeout = Duration::from_millis(self.config.busy_timeout_ms);
        let guard = self.state.lock().map_err(|_| poisoned())?;
        let (mut guard, wait) = self
            .available
            .wait_timeout_while(guard, timeout, |state| {
                state.idle.is_empty() && state.open >= self.config.max_connections
            })
            .map_err(|_| poisoned())?;
        if let Some(connection) = guard.idle.pop() {
            drop(guard);
            return Ok(Checkout {
                pool: self,
                connection: Some(connection),
            });
        }
        if wait.timed_out() && guard.open >= self.config.max_connections {
            return Err(SqliteStoreError::Busy("connection pool exhausted".to_string()));
        }
        guard.open += 1;
        drop(guard);
        match open_connection(&self.config) {
            Ok(connection) => Ok(Checkout {
                pool: self,
                connection: Some(connection),
            }),
            Err(err) => {
                self.release(None);
                Err(err)
            }
        }
    }

    /// Returns a connection to the pool, or forgets a slot when `None`.
    fn release(&self, connection: Option<Connection>) {
        if let Ok(mut state) = self.state.lock() {
            match connection {
                Some(connection) => state.idle.push(connection),
                None => state.open = state.open.saturating_sub(1),
            }
        }
        self.available.notify_one();
    }
}

/// Builds the error reported for a poisoned pool mutex.
fn poisoned() -> SqliteStoreError {
    SqliteStoreError::Db("connection pool mutex poisoned".to_string())
}

// ============================================================================
// SECTION: Connections
// ============================================================================

/// Opens an `SQLite` connection with secure defaults.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection =
        Connection::open_with_flags(&config.path, flags).map_err(|err| db_error(&err))?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| db_error(&err))?;
    connection.execute_batch("PRAGMA foreign_keys = ON;").map_err(|err| db_error(&err))?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| db_error(&err))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| db_error(&err))?;
    Ok(())
}
