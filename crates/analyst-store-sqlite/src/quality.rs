// crates/analyst-store-sqlite/src/quality.rs
// ============================================================================
// Module: Quality Gate
// Description: Zero-tolerance batch gate with persisted per-field reports.
// Purpose: Block publication of batches that fail declared quality rules.
// Dependencies: analyst-core, rusqlite, serde, thiserror
// ============================================================================

//! ## Overview
//! The gate assesses a candidate batch, replaces the run's report rows in a
//! short transaction of their own, and only then renders the verdict. Reports
//! of a rejected batch therefore stay available for review.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use analyst_core::MetaNamespace;
use analyst_core::QualityError;
use analyst_core::QualityReport;
use analyst_core::QualityRules;
use analyst_core::RunEvent;
use analyst_core::RunEventSink;
use analyst_core::RunId;
use analyst_core::assess_quality;
use analyst_core::unix_millis;
use rusqlite::params;
use serde::Serialize;
use thiserror::Error;

use crate::session::StoreError;
use crate::session::StoreSession;
use crate::session::counter_from_sql;
use crate::session::counter_to_sql;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Quality gate errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QualityGateError {
    /// Batch failed the zero-tolerance verdict.
    #[error("quality gate failed: {reason}")]
    Rejected {
        /// `empty dataset` or the failing field list.
        reason: String,
        /// Fields with at least one failure.
        failing_fields: Vec<String>,
    },
    /// Records could not be inspected.
    #[error(transparent)]
    Assessment(#[from] QualityError),
    /// Reports could not be persisted.
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ============================================================================
// SECTION: Gate
// ============================================================================

/// Quality gate backed by the `quality_reports` relation.
pub struct QualityGate {
    /// Event sink for gate verdicts.
    events: Arc<dyn RunEventSink>,
}

impl QualityGate {
    /// Creates a gate reporting to `events`.
    #[must_use]
    pub fn new(events: Arc<dyn RunEventSink>) -> Self {
        Self {
            events,
        }
    }

    /// Evaluates a batch, persists its reports, and renders the verdict.
    ///
    /// # Errors
    ///
    /// Returns [`QualityGateError::Rejected`] for an empty batch or any
    /// failed check, and the other variants when assessment or persistence
    /// fails.
    pub fn evaluate<T: Serialize>(
        &self,
        session: &StoreSession,
        namespace: &MetaNamespace,
        run_id: &RunId,
        records: &[T],
        rules: &QualityRules,
    ) -> Result<Vec<QualityReport>, QualityGateError> {
        let assessment = assess_quality(run_id, records, rules)?;
        replace_reports(session, namespace, run_id, &assessment.reports)?;
        self.events.record(
            &RunEvent::info("quality_evaluated")
                .with("namespace", namespace.as_str())
                .with("run_id", run_id.as_str())
                .with("total", assessment.total)
                .with("failed", assessment.failed_total()),
        );
        if let Some(reason) = assessment.rejection_reason() {
            let failing_fields = assessment.failing_fields();
            self.events.record(
                &RunEvent::error("quality_gate_failed")
                    .with("namespace", namespace.as_str())
                    .with("run_id", run_id.as_str())
                    .with("reason", reason.as_str()),
            );
            return Err(QualityGateError::Rejected {
                reason,
                failing_fields,
            });
        }
        Ok(assessment.reports)
    }

    /// Lists the persisted reports for a run in field order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    pub fn reports_for_run(
        &self,
        session: &StoreSession,
        namespace: &MetaNamespace,
        run_id: &RunId,
    ) -> Result<Vec<QualityReport>, StoreError> {
        let rows = session.with_connection(|connection| {
            let mut stmt = connection
                .prepare(
                    "SELECT field, total, failed, completeness, notes FROM quality_reports WHERE \
                     namespace = ?1 AND run_id = ?2 ORDER BY rowid",
                )
                .map_err(|err| StoreError::Db(err.to_string()))?;
            let rows = stmt
                .query_map(params![namespace.as_str(), run_id.as_str()], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, f64>(3)?,
                        row.get::<_, Option<String>>(4)?,
                    ))
                })
                .map_err(|err| StoreError::Db(err.to_string()))?;
            rows.collect::<Result<Vec<_>, _>>().map_err(|err| StoreError::Db(err.to_string()))
        })?;
        rows.into_iter()
            .map(|(field, total, failed, completeness, notes)| {
                Ok(QualityReport {
                    run_id: run_id.clone(),
                    field,
                    total: counter_from_sql(total, "total")?,
                    failed: counter_from_sql(failed, "failed")?,
                    completeness,
                    notes,
                })
            })
            .collect()
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Replaces the report rows of a run (delete-then-insert).
fn replace_reports(
    session: &StoreSession,
    namespace: &MetaNamespace,
    run_id: &RunId,
    reports: &[QualityReport],
) -> Result<(), StoreError> {
    let created_at = unix_millis();
    session.with_transaction(|tx| {
        tx.execute(
            "DELETE FROM quality_reports WHERE namespace = ?1 AND run_id = ?2",
            params![namespace.as_str(), run_id.as_str()],
        )
        .map_err(|err| StoreError::Db(err.to_string()))?;
        let mut stmt = tx
            .prepare(
                "INSERT INTO quality_reports (namespace, run_id, field, total, failed, \
                 completeness, notes, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )
            .map_err(|err| StoreError::Db(err.to_string()))?;
        for report in reports {
            stmt.execute(params![
                namespace.as_str(),
                run_id.as_str(),
                report.field,
                counter_to_sql(report.total, "total")?,
                counter_to_sql(report.failed, "failed")?,
                report.completeness,
                report.notes,
                created_at,
            ])
            .map_err(|err| StoreError::Db(err.to_string()))?;
        }
        Ok(())
    })
}
