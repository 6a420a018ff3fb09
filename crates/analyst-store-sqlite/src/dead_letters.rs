// crates/analyst-store-sqlite/src/dead_letters.rs
// ============================================================================
// Module: Dead Letter Sink
// Description: Quarantine store for individually invalid records.
// Purpose: Keep rejected records reviewable without failing the batch.
// Dependencies: analyst-core, rusqlite
// ============================================================================

//! ## Overview
//! Each rejected record becomes one `dead_letters` row written in its own
//! short statement, so quarantined rows survive a rollback of the
//! materialization transaction that follows.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use analyst_core::DeadLetter;
use analyst_core::DeadLetterId;
use analyst_core::DeadLetterInput;
use analyst_core::MetaNamespace;
use analyst_core::RunEvent;
use analyst_core::RunEventSink;
use analyst_core::RunId;
use analyst_core::truncate_excerpt;
use analyst_core::unix_millis;
use rusqlite::params;

use crate::session::StoreError;
use crate::session::StoreSession;

// ============================================================================
// SECTION: Sink
// ============================================================================

/// Dead-letter sink backed by the `dead_letters` relation.
pub struct DeadLetterSink {
    /// Event sink for quarantine writes.
    events: Arc<dyn RunEventSink>,
}

impl DeadLetterSink {
    /// Creates a sink reporting to `events`.
    #[must_use]
    pub fn new(events: Arc<dyn RunEventSink>) -> Self {
        Self {
            events,
        }
    }

    /// Persists one dead letter, truncating its excerpt.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the insert fails.
    pub fn record(
        &self,
        session: &StoreSession,
        namespace: &MetaNamespace,
        input: &DeadLetterInput,
    ) -> Result<DeadLetterId, StoreError> {
        let id = DeadLetterId::generate();
        let excerpt = truncate_excerpt(input.payload_excerpt.as_deref());
        let result = session.with_connection(|connection| {
            connection
                .execute(
                    "INSERT INTO dead_letters (id, namespace, run_id, raw_id, reason, \
                     payload_excerpt, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        id.as_str(),
                        namespace.as_str(),
                        input.run_id.as_str(),
                        input.raw_id,
                        input.reason,
                        excerpt,
                        unix_millis(),
                    ],
                )
                .map_err(|err| StoreError::Db(err.to_string()))
        });
        let event = match &result {
            Ok(_) => RunEvent::warn("dead_letter_recorded").with("dead_letter_id", id.as_str()),
            Err(err) => RunEvent::error("dead_letter_error").with("error", err.to_string()),
        };
        self.events.record(
            &event
                .with("namespace", namespace.as_str())
                .with("run_id", input.run_id.as_str())
                .with("raw_id", input.raw_id.clone())
                .with("reason", input.reason.as_str()),
        );
        result.map(|_| id)
    }

    /// Lists the dead letters recorded for a run, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    pub fn for_run(
        &self,
        session: &StoreSession,
        namespace: &MetaNamespace,
        run_id: &RunId,
    ) -> Result<Vec<DeadLetter>, StoreError> {
        session.with_connection(|connection| {
            let mut stmt = connection
                .prepare(
                    "SELECT id, run_id, raw_id, reason, payload_excerpt FROM dead_letters WHERE \
                     namespace = ?1 AND run_id = ?2 ORDER BY created_at, rowid",
                )
                .map_err(|err| StoreError::Db(err.to_string()))?;
            let rows = stmt
                .query_map(params![namespace.as_str(), run_id.as_str()], |row| {
                    Ok(DeadLetter {
                        id: DeadLetterId::new(row.get::<_, String>(0)?),
                        run_id: RunId::new(row.get::<_, String>(1)?),
                        raw_id: row.get(2)?,
                        reason: row.get(3)?,
                        payload_excerpt: row.get(4)?,
                    })
                })
                .map_err(|err| StoreError::Db(err.to_string()))?;
            rows.collect::<Result<Vec<_>, _>>().map_err(|err| StoreError::Db(err.to_string()))
        })
    }
}
