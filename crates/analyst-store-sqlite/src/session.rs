// crates/analyst-store-sqlite/src/session.rs
// ============================================================================
// Module: SQLite Store Session
// Description: Connection lifecycle, pragmas, and schema bootstrap.
// Purpose: Provide one explicitly owned database session per run.
// Dependencies: rusqlite, serde, thiserror
// ============================================================================

//! ## Overview
//! A [`StoreSession`] wraps one mutex-guarded `SQLite` connection. It is opened
//! by the process bootstrap, passed explicitly to every component, and closed
//! when dropped. Concurrent processes open separate sessions on the same file;
//! every session runs in WAL mode with `synchronous = NORMAL`, and the busy
//! timeout serializes writers. Neither pragma is configurable: lock rows and
//! the run ledger assume readers never block the writer.
//!
//! Metadata relations are shared by every vertical and scoped by a
//! `namespace` column. Partition tables are created on demand by the
//! partition materializer.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::Transaction;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Configuration for an analyst store session.
///
/// # Invariants
/// - `path` names the database file; directories are rejected at open.
/// - `busy_timeout_ms` bounds how long a writer waits on a locked database.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SqliteStoreConfig {
    /// Database file shared by every vertical.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl SqliteStoreConfig {
    /// Builds a configuration with the default busy timeout for `path`.
    #[must_use]
    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

/// Serde default for `busy_timeout_ms`.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Analyst store errors.
///
/// # Invariants
/// - Error messages avoid embedding raw record payloads.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Store I/O error.
    #[error("analyst store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("analyst store db error: {0}")]
    Db(String),
    /// Invalid input or stored data.
    #[error("analyst store invalid data: {0}")]
    Invalid(String),
    /// Referenced row does not exist.
    #[error("analyst store row not found: {0}")]
    NotFound(String),
    /// Write conflicts with the current row state.
    #[error("analyst store conflict: {0}")]
    Conflict(String),
    /// JSON encoding or decoding failed.
    #[error("analyst store serialization error: {0}")]
    Serialization(String),
}

// ============================================================================
// SECTION: Session
// ============================================================================

/// Long-lived database session shared by every component of a run.
///
/// # Invariants
/// - All access goes through the internal mutex; one statement or transaction
///   runs at a time per session.
/// - The schema is initialized (or its version verified) before the session
///   is returned.
pub struct StoreSession {
    /// Guarded connection.
    connection: Mutex<Connection>,
    /// Database file path.
    path: PathBuf,
}

impl StoreSession {
    /// Opens a session, applying pragmas and bootstrapping the schema.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the path is invalid, the database cannot be
    /// opened, or the stored schema version is unsupported.
    pub fn open(config: &SqliteStoreConfig) -> Result<Self, StoreError> {
        prepare_store_file(&config.path)?;
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
        let mut connection = Connection::open_with_flags(&config.path, flags)
            .map_err(|err| StoreError::Db(err.to_string()))?;
        configure_connection(&connection, Duration::from_millis(config.busy_timeout_ms))?;
        initialize_schema(&mut connection)?;
        Ok(Self {
            connection: Mutex::new(connection),
            path: config.path.clone(),
        })
    }

    /// Returns the database file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs `operation` against the guarded connection.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when the session mutex is poisoned, or the
    /// error produced by `operation`.
    pub fn with_connection<T>(
        &self,
        operation: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let guard = self
            .connection
            .lock()
            .map_err(|_| StoreError::Io("store session mutex poisoned".to_string()))?;
        operation(&guard)
    }

    /// Runs `operation` inside an immediate (write-locking) transaction.
    ///
    /// The transaction commits when `operation` succeeds and rolls back on
    /// any error.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the transaction cannot begin or commit, or
    /// the error produced by `operation`.
    pub fn with_transaction<T>(
        &self,
        operation: impl FnOnce(&Transaction<'_>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut guard = self
            .connection
            .lock()
            .map_err(|_| StoreError::Io("store session mutex poisoned".to_string()))?;
        let tx = guard
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| StoreError::Db(err.to_string()))?;
        let value = operation(&tx)?;
        tx.commit().map_err(|err| StoreError::Db(err.to_string()))?;
        Ok(value)
    }
}

// ============================================================================
// SECTION: Conversions
// ============================================================================

/// Converts a counter to its `SQLite` integer form.
pub(crate) fn counter_to_sql(value: u64, label: &str) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::Invalid(format!("{label} out of range")))
}

/// Converts a stored `SQLite` integer back to a counter.
pub(crate) fn counter_from_sql(value: i64, label: &str) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::Invalid(format!("negative {label} in store")))
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Checks that `path` can hold the database file and creates its directory.
fn prepare_store_file(path: &Path) -> Result<(), StoreError> {
    if path.as_os_str().is_empty() {
        return Err(StoreError::Invalid("store path must not be empty".to_string()));
    }
    if path.is_dir() {
        return Err(StoreError::Invalid(format!("store path {} is a directory", path.display())));
    }
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent).map_err(|err| StoreError::Io(err.to_string()))
        }
        _ => Ok(()),
    }
}

/// Sets the busy timeout and the fixed session pragmas.
///
/// Fails when the database refuses WAL, since concurrent refresh processes
/// depend on it.
fn configure_connection(connection: &Connection, busy_timeout: Duration) -> Result<(), StoreError> {
    let db = |err: rusqlite::Error| StoreError::Db(err.to_string());
    connection.busy_timeout(busy_timeout).map_err(db)?;
    connection.execute_batch("PRAGMA foreign_keys = ON;").map_err(db)?;
    let journal: String =
        connection.query_row("PRAGMA journal_mode = WAL", params![], |row| row.get(0)).map_err(db)?;
    if !journal.eq_ignore_ascii_case("wal") {
        return Err(StoreError::Invalid(format!("store refused wal journal mode: {journal}")));
    }
    connection.execute_batch("PRAGMA synchronous = NORMAL;").map_err(db)
}

/// Initializes the `SQLite` schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), StoreError> {
    let tx = connection
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|err| StoreError::Db(err.to_string()))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| StoreError::Db(err.to_string()))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| StoreError::Db(err.to_string()))?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| StoreError::Db(err.to_string()))?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS job_locks (
                    namespace TEXT NOT NULL,
                    lock_key TEXT NOT NULL,
                    acquired_at INTEGER NOT NULL,
                    PRIMARY KEY (namespace, lock_key)
                );
                CREATE TABLE IF NOT EXISTS analyst_runs (
                    namespace TEXT NOT NULL,
                    run_id TEXT NOT NULL,
                    plugin TEXT NOT NULL,
                    version TEXT NOT NULL,
                    started_at INTEGER NOT NULL,
                    finished_at INTEGER,
                    status TEXT NOT NULL,
                    processed INTEGER NOT NULL DEFAULT 0,
                    errors INTEGER NOT NULL DEFAULT 0,
                    notes TEXT,
                    PRIMARY KEY (namespace, run_id)
                );
                CREATE INDEX IF NOT EXISTS idx_analyst_runs_baseline
                    ON analyst_runs (namespace, status, finished_at);
                CREATE INDEX IF NOT EXISTS idx_analyst_runs_started
                    ON analyst_runs (namespace, started_at);
                CREATE TABLE IF NOT EXISTS dead_letters (
                    id TEXT PRIMARY KEY,
                    namespace TEXT NOT NULL,
                    run_id TEXT NOT NULL,
                    raw_id TEXT,
                    reason TEXT NOT NULL,
                    payload_excerpt TEXT,
                    created_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_dead_letters_run
                    ON dead_letters (namespace, run_id);
                CREATE TABLE IF NOT EXISTS anomalies (
                    id TEXT PRIMARY KEY,
                    namespace TEXT NOT NULL,
                    run_id TEXT NOT NULL,
                    type TEXT NOT NULL,
                    details_json TEXT NOT NULL,
                    created_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_anomalies_run
                    ON anomalies (namespace, run_id);
                CREATE TABLE IF NOT EXISTS quality_reports (
                    namespace TEXT NOT NULL,
                    run_id TEXT NOT NULL,
                    field TEXT NOT NULL,
                    total INTEGER NOT NULL,
                    failed INTEGER NOT NULL,
                    completeness REAL NOT NULL,
                    notes TEXT,
                    created_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_quality_reports_run
                    ON quality_reports (namespace, run_id);",
            )
            .map_err(|err| StoreError::Db(err.to_string()))?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(StoreError::Invalid(format!("unsupported schema version: {value}")));
        }
    }
    tx.commit().map_err(|err| StoreError::Db(err.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test fixtures use explicit asserts and unwraps for clarity."
    )]

    use super::*;

    #[test]
    fn counters_reject_out_of_range_values() {
        assert_eq!(counter_to_sql(7, "processed").unwrap(), 7);
        assert!(counter_to_sql(u64::MAX, "processed").is_err());
        assert!(counter_from_sql(-1, "errors").is_err());
    }

    #[test]
    fn store_path_rejects_directories_and_empty_paths() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(matches!(prepare_store_file(dir.path()), Err(StoreError::Invalid(_))));
        assert!(matches!(prepare_store_file(Path::new("")), Err(StoreError::Invalid(_))));
    }

    #[test]
    fn open_creates_parent_and_runs_wal_with_normal_sync() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("analyst.sqlite");
        let session = StoreSession::open(&SqliteStoreConfig::for_path(&path)).unwrap();
        assert!(path.exists());
        let (journal, synchronous, foreign_keys) = session
            .with_connection(|connection| {
                let db = |err: rusqlite::Error| StoreError::Db(err.to_string());
                let journal: String =
                    connection.query_row("PRAGMA journal_mode", params![], |row| row.get(0)).map_err(db)?;
                let synchronous: i64 =
                    connection.query_row("PRAGMA synchronous", params![], |row| row.get(0)).map_err(db)?;
                let foreign_keys: i64 =
                    connection.query_row("PRAGMA foreign_keys", params![], |row| row.get(0)).map_err(db)?;
                Ok((journal, synchronous, foreign_keys))
            })
            .unwrap();
        assert_eq!(journal, "wal");
        assert_eq!(synchronous, 1);
        assert_eq!(foreign_keys, 1);
    }
}
