// crates/analyst-store-sqlite/src/anomaly.rs
// ============================================================================
// Module: Anomaly Detector
// Description: Post-run statistical deviation check with persisted findings.
// Purpose: Flag suspicious runs for review without blocking delivery.
// Dependencies: analyst-core, rusqlite, serde_json
// ============================================================================

//! ## Overview
//! After a successful plugin run the detector loads the trailing baseline
//! from the run ledger, evaluates the anomaly rules, and appends one row per
//! finding. Detection never fails: baseline and persistence errors are
//! reported as events and swallowed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use analyst_core::Anomaly;
use analyst_core::AnomalyConfig;
use analyst_core::AnomalyId;
use analyst_core::AnomalyKind;
use analyst_core::MetaNamespace;
use analyst_core::RunEvent;
use analyst_core::RunEventSink;
use analyst_core::RunId;
use analyst_core::RunSummary;
use analyst_core::evaluate_anomalies;
use analyst_core::unix_millis;
use analyst_core::window_start_millis;
use rusqlite::params;

use crate::ledger::RunLedger;
use crate::session::StoreError;
use crate::session::StoreSession;

// ============================================================================
// SECTION: Detector
// ============================================================================

/// Anomaly detector backed by the `anomalies` relation.
pub struct AnomalyDetector {
    /// Validated thresholds.
    config: AnomalyConfig,
    /// Ledger used to compute the baseline.
    ledger: RunLedger,
    /// Event sink for findings and swallowed failures.
    events: Arc<dyn RunEventSink>,
}

impl AnomalyDetector {
    /// Creates a detector with validated thresholds.
    #[must_use]
    pub fn new(config: AnomalyConfig, events: Arc<dyn RunEventSink>) -> Self {
        Self {
            config,
            ledger: RunLedger::new(Arc::clone(&events)),
            events,
        }
    }

    /// Returns the detector thresholds.
    #[must_use]
    pub const fn config(&self) -> &AnomalyConfig {
        &self.config
    }

    /// Evaluates and persists anomalies for a finished run.
    ///
    /// Returns every detected anomaly, including any whose row could not be
    /// written.
    pub fn detect(
        &self,
        session: &StoreSession,
        namespace: &MetaNamespace,
        summary: &RunSummary,
    ) -> Vec<Anomaly> {
        let since = window_start_millis(unix_millis(), self.config.baseline_days());
        let baseline = match self.ledger.average_processed_since(session, namespace, since) {
            Ok(baseline) => baseline,
            Err(err) => {
                self.events.record(
                    &RunEvent::warn("anomaly_baseline_unavailable")
                        .with("namespace", namespace.as_str())
                        .with("run_id", summary.run_id.as_str())
                        .with("error", err.to_string()),
                );
                None
            }
        };

        let findings = evaluate_anomalies(summary, baseline, &self.config);
        let mut anomalies = Vec::with_capacity(findings.len());
        for finding in findings {
            let anomaly = Anomaly {
                id: AnomalyId::generate(),
                run_id: summary.run_id.clone(),
                kind: finding.kind,
                details: finding.details,
            };
            let event = match persist_anomaly(session, namespace, &anomaly) {
                Ok(()) => RunEvent::warn("anomaly_recorded"),
                Err(err) => RunEvent::error("anomaly_error").with("error", err.to_string()),
            };
            self.events.record(
                &event
                    .with("namespace", namespace.as_str())
                    .with("run_id", summary.run_id.as_str())
                    .with("type", anomaly.kind.as_str()),
            );
            anomalies.push(anomaly);
        }
        anomalies
    }

    /// Lists the persisted anomalies for a run, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails or a row is malformed.
    pub fn for_run(
        &self,
        session: &StoreSession,
        namespace: &MetaNamespace,
        run_id: &RunId,
    ) -> Result<Vec<Anomaly>, StoreError> {
        let rows = session.with_connection(|connection| {
            let mut stmt = connection
                .prepare(
                    "SELECT id, type, details_json FROM anomalies WHERE namespace = ?1 AND run_id \
                     = ?2 ORDER BY created_at, rowid",
                )
                .map_err(|err| StoreError::Db(err.to_string()))?;
            let rows = stmt
                .query_map(params![namespace.as_str(), run_id.as_str()], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })
                .map_err(|err| StoreError::Db(err.to_string()))?;
            rows.collect::<Result<Vec<_>, _>>().map_err(|err| StoreError::Db(err.to_string()))
        })?;
        rows.into_iter()
            .map(|(id, label, details_json)| {
                let kind = AnomalyKind::from_label(&label)
                    .ok_or_else(|| StoreError::Invalid(format!("unknown anomaly type: {label}")))?;
                let details = serde_json::from_str(&details_json)
                    .map_err(|err| StoreError::Serialization(err.to_string()))?;
                Ok(Anomaly {
                    id: AnomalyId::new(id),
                    run_id: run_id.clone(),
                    kind,
                    details,
                })
            })
            .collect()
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Appends one anomaly row.
fn persist_anomaly(
    session: &StoreSession,
    namespace: &MetaNamespace,
    anomaly: &Anomaly,
) -> Result<(), StoreError> {
    let details_json = serde_json::to_string(&anomaly.details)
        .map_err(|err| StoreError::Serialization(err.to_string()))?;
    session.with_connection(|connection| {
        connection
            .execute(
                "INSERT INTO anomalies (id, namespace, run_id, type, details_json, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    anomaly.id.as_str(),
                    namespace.as_str(),
                    anomaly.run_id.as_str(),
                    anomaly.kind.as_str(),
                    details_json,
                    unix_millis(),
                ],
            )
            .map_err(|err| StoreError::Db(err.to_string()))?;
        Ok(())
    })
}
