// crates/analyst-store-sqlite/src/ledger.rs
// ============================================================================
// Module: Run Ledger
// Description: Append-only run provenance with single-shot completion.
// Purpose: Record run start, finish, counters, and baseline statistics.
// Dependencies: analyst-core, rusqlite
// ============================================================================

//! ## Overview
//! Runs are inserted as `RUNNING` and closed exactly once. The close is a
//! conditional update on `status = 'RUNNING'`, so a second close can never
//! rewrite a terminal row. Rows are never deleted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use analyst_core::MetaNamespace;
use analyst_core::Run;
use analyst_core::RunCompletion;
use analyst_core::RunEvent;
use analyst_core::RunEventSink;
use analyst_core::RunId;
use analyst_core::RunStatus;
use analyst_core::unix_millis;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::params;

use crate::session::StoreError;
use crate::session::StoreSession;
use crate::session::counter_from_sql;
use crate::session::counter_to_sql;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Column list shared by run queries.
const RUN_COLUMNS: &str =
    "run_id, plugin, version, started_at, finished_at, status, processed, errors, notes";

// ============================================================================
// SECTION: Ledger
// ============================================================================

/// Run ledger backed by the `analyst_runs` relation.
pub struct RunLedger {
    /// Event sink for ledger transitions.
    events: Arc<dyn RunEventSink>,
}

impl RunLedger {
    /// Creates a ledger reporting to `events`.
    #[must_use]
    pub fn new(events: Arc<dyn RunEventSink>) -> Self {
        Self {
            events,
        }
    }

    /// Opens a new `RUNNING` run with zero counters.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the insert fails.
    pub fn start(
        &self,
        session: &StoreSession,
        namespace: &MetaNamespace,
        plugin: &str,
        version: &str,
    ) -> Result<Run, StoreError> {
        let run = Run {
            run_id: RunId::generate(),
            plugin: plugin.to_string(),
            version: version.to_string(),
            started_at_ms: unix_millis(),
            finished_at_ms: None,
            status: RunStatus::Running,
            processed: 0,
            errors: 0,
            notes: None,
        };
        session.with_connection(|connection| {
            connection
                .execute(
                    "INSERT INTO analyst_runs (namespace, run_id, plugin, version, started_at, \
                     status, processed, errors) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 0)",
                    params![
                        namespace.as_str(),
                        run.run_id.as_str(),
                        run.plugin,
                        run.version,
                        run.started_at_ms,
                        run.status.as_str(),
                    ],
                )
                .map_err(|err| StoreError::Db(err.to_string()))
        })?;
        self.events.record(
            &RunEvent::info("run_started")
                .with("namespace", namespace.as_str())
                .with("run_id", run.run_id.as_str())
                .with("plugin", run.plugin.as_str()),
        );
        Ok(run)
    }

    /// Closes a run with a terminal status and final counters.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] for a non-terminal status,
    /// [`StoreError::NotFound`] for an unknown run, [`StoreError::Conflict`]
    /// when the run is already terminal, or [`StoreError::Db`] on persistence
    /// failure.
    pub fn finish(
        &self,
        session: &StoreSession,
        namespace: &MetaNamespace,
        run_id: &RunId,
        completion: &RunCompletion,
    ) -> Result<(), StoreError> {
        if !completion.status.is_terminal() {
            return Err(StoreError::Invalid(format!(
                "run completion status must be terminal: {}",
                completion.status
            )));
        }
        let processed = counter_to_sql(completion.processed, "processed")?;
        let errors = counter_to_sql(completion.errors, "errors")?;
        session.with_transaction(|tx| {
            let changed = tx
                .execute(
                    "UPDATE analyst_runs SET status = ?1, processed = ?2, errors = ?3, notes = ?4, \
                     finished_at = ?5 WHERE namespace = ?6 AND run_id = ?7 AND status = 'RUNNING'",
                    params![
                        completion.status.as_str(),
                        processed,
                        errors,
                        completion.notes,
                        unix_millis(),
                        namespace.as_str(),
                        run_id.as_str(),
                    ],
                )
                .map_err(|err| StoreError::Db(err.to_string()))?;
            if changed > 0 {
                return Ok(());
            }
            let status: Option<String> = tx
                .query_row(
                    "SELECT status FROM analyst_runs WHERE namespace = ?1 AND run_id = ?2",
                    params![namespace.as_str(), run_id.as_str()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|err| StoreError::Db(err.to_string()))?;
            match status {
                None => Err(StoreError::NotFound(format!("run {run_id}"))),
                Some(status) => {
                    Err(StoreError::Conflict(format!("run {run_id} already finished as {status}")))
                }
            }
        })?;
        self.events.record(
            &RunEvent::info("run_finished")
                .with("namespace", namespace.as_str())
                .with("run_id", run_id.as_str())
                .with("status", completion.status.as_str())
                .with("processed", completion.processed)
                .with("errors", completion.errors),
        );
        Ok(())
    }

    /// Loads a run by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails or the row is malformed.
    pub fn get(
        &self,
        session: &StoreSession,
        namespace: &MetaNamespace,
        run_id: &RunId,
    ) -> Result<Option<Run>, StoreError> {
        let raw = session.with_connection(|connection| {
            connection
                .query_row(
                    &format!(
                        "SELECT {RUN_COLUMNS} FROM analyst_runs WHERE namespace = ?1 AND run_id = \
                         ?2"
                    ),
                    params![namespace.as_str(), run_id.as_str()],
                    RawRun::from_row,
                )
                .optional()
                .map_err(|err| StoreError::Db(err.to_string()))
        })?;
        raw.map(RawRun::into_run).transpose()
    }

    /// Lists the most recent runs, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails or a row is malformed.
    pub fn recent(
        &self,
        session: &StoreSession,
        namespace: &MetaNamespace,
        limit: usize,
    ) -> Result<Vec<Run>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let raws = session.with_connection(|connection| {
            let mut stmt = connection
                .prepare(&format!(
                    "SELECT {RUN_COLUMNS} FROM analyst_runs WHERE namespace = ?1 ORDER BY \
                     started_at DESC, rowid DESC LIMIT ?2"
                ))
                .map_err(|err| StoreError::Db(err.to_string()))?;
            let rows = stmt
                .query_map(params![namespace.as_str(), limit], RawRun::from_row)
                .map_err(|err| StoreError::Db(err.to_string()))?;
            rows.collect::<Result<Vec<_>, _>>().map_err(|err| StoreError::Db(err.to_string()))
        })?;
        raws.into_iter().map(RawRun::into_run).collect()
    }

    /// Returns the average processed count of `SUCCESS` runs finished at or
    /// after `since_ms`, or `None` when there are none.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    pub fn average_processed_since(
        &self,
        session: &StoreSession,
        namespace: &MetaNamespace,
        since_ms: i64,
    ) -> Result<Option<f64>, StoreError> {
        session.with_connection(|connection| {
            connection
                .query_row(
                    "SELECT AVG(processed) FROM analyst_runs WHERE namespace = ?1 AND status = \
                     'SUCCESS' AND finished_at >= ?2",
                    params![namespace.as_str(), since_ms],
                    |row| row.get::<_, Option<f64>>(0),
                )
                .map_err(|err| StoreError::Db(err.to_string()))
        })
    }
}

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Run row as stored, before domain validation.
struct RawRun {
    /// Run identifier.
    run_id: String,
    /// Plugin identity.
    plugin: String,
    /// Engine version.
    version: String,
    /// Start time.
    started_at: i64,
    /// Finish time.
    finished_at: Option<i64>,
    /// Status label.
    status: String,
    /// Processed counter.
    processed: i64,
    /// Error counter.
    errors: i64,
    /// Notes.
    notes: Option<String>,
}

impl RawRun {
    /// Reads a row selected with [`RUN_COLUMNS`].
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            run_id: row.get(0)?,
            plugin: row.get(1)?,
            version: row.get(2)?,
            started_at: row.get(3)?,
            finished_at: row.get(4)?,
            status: row.get(5)?,
            processed: row.get(6)?,
            errors: row.get(7)?,
            notes: row.get(8)?,
        })
    }

    /// Validates the row into a [`Run`].
    fn into_run(self) -> Result<Run, StoreError> {
        let status = self
            .status
            .parse::<RunStatus>()
            .map_err(|err| StoreError::Invalid(err.to_string()))?;
        Ok(Run {
            run_id: RunId::new(self.run_id),
            plugin: self.plugin,
            version: self.version,
            started_at_ms: self.started_at,
            finished_at_ms: self.finished_at,
            status,
            processed: counter_from_sql(self.processed, "processed")?,
            errors: counter_from_sql(self.errors, "errors")?,
            notes: self.notes,
        })
    }
}
