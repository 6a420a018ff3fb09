// crates/analyst-core/src/core/quality.rs
// ============================================================================
// Module: Analyst Quality Assessment
// Description: Zero-tolerance, per-field data quality evaluation.
// Purpose: Compute quality reports for a candidate batch before publication.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Quality rules are declared per vertical as static field lists. Records are
//! inspected through their `serde_json` serialization so the assessment works
//! for any record type without field accessors.
//!
//! The verdict is all-or-nothing: an empty batch or any failed check rejects
//! the whole batch. There is no percentage threshold.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::identifiers::RunId;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Note attached to reports produced by non-negative rules.
pub const NON_NEGATIVE_NOTE: &str = "must_be_non_negative";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Static quality rules declared by a vertical.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityRules {
    /// Fields that must be present and non-null on every record.
    pub required_non_null: &'static [&'static str],
    /// Numeric fields that must be present, numeric, and `>= 0`.
    pub non_negative: &'static [&'static str],
}

/// Per-field quality report row.
///
/// # Invariants
/// - `failed <= total`.
/// - `completeness` is within `[0, 1]` and is `0` when `total == 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    /// Run the report belongs to.
    pub run_id: RunId,
    /// Field name.
    pub field: String,
    /// Records evaluated.
    pub total: u64,
    /// Records failing the rule.
    pub failed: u64,
    /// Share of passing records.
    pub completeness: f64,
    /// Rule note, when the rule carries one.
    pub notes: Option<String>,
}

/// Outcome of evaluating a batch against its rules.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityAssessment {
    /// Number of records in the batch.
    pub total: u64,
    /// Report rows, required fields first, then non-negative fields.
    pub reports: Vec<QualityReport>,
}

impl QualityAssessment {
    /// Returns the aggregate failed count across all rules.
    #[must_use]
    pub fn failed_total(&self) -> u64 {
        self.reports.iter().fold(0_u64, |acc, report| acc.saturating_add(report.failed))
    }

    /// Returns the fields with at least one failure, in report order.
    ///
    /// A field checked by several rules is listed once.
    #[must_use]
    pub fn failing_fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = Vec::new();
        for report in self.reports.iter().filter(|report| report.failed > 0) {
            if !fields.contains(&report.field) {
                fields.push(report.field.clone());
            }
        }
        fields
    }

    /// Returns the rejection reason, or `None` when the batch passes.
    #[must_use]
    pub fn rejection_reason(&self) -> Option<String> {
        if self.total == 0 {
            return Some("empty dataset".to_string());
        }
        if self.failed_total() > 0 {
            return Some(format!("fields={}", self.failing_fields().join(",")));
        }
        None
    }

    /// Returns true when the batch may be published.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.rejection_reason().is_none()
    }
}

/// Errors raised while inspecting records.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QualityError {
    /// Record could not be serialized for inspection.
    #[error("quality record serialization failed: {0}")]
    Serialization(String),
    /// Record did not serialize to a JSON object.
    #[error("quality record at index {0} is not an object")]
    NotAnObject(usize),
}

// ============================================================================
// SECTION: Assessment
// ============================================================================

/// Evaluates `records` against `rules`.
///
/// # Errors
///
/// Returns [`QualityError`] when a record cannot be inspected as an object.
pub fn assess_quality<T: Serialize>(
    run_id: &RunId,
    records: &[T],
    rules: &QualityRules,
) -> Result<QualityAssessment, QualityError> {
    let mut rows = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        let value =
            serde_json::to_value(record).map_err(|err| QualityError::Serialization(err.to_string()))?;
        if !value.is_object() {
            return Err(QualityError::NotAnObject(index));
        }
        rows.push(value);
    }
    let total = u64::try_from(rows.len()).unwrap_or(u64::MAX);

    let mut reports = Vec::with_capacity(rules.required_non_null.len() + rules.non_negative.len());
    for field in rules.required_non_null {
        let failed = count_failures(&rows, |value| is_missing(value.get(*field)));
        reports.push(report(run_id, field, total, failed, None));
    }
    for field in rules.non_negative {
        let failed = count_failures(&rows, |value| {
            numeric_value(value.get(*field)).is_none_or(|number| number < 0.0)
        });
        reports.push(report(run_id, field, total, failed, Some(NON_NEGATIVE_NOTE)));
    }

    Ok(QualityAssessment {
        total,
        reports,
    })
}

/// Computes completeness as `(total - failed) / total`, clamped to `[0, 1]`.
#[must_use]
#[allow(clippy::cast_precision_loss, reason = "Batch sizes stay far below 2^52.")]
pub fn completeness(total: u64, failed: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let passing = total.saturating_sub(failed) as f64;
    (passing / total as f64).clamp(0.0, 1.0)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds a single report row.
fn report(
    run_id: &RunId,
    field: &str,
    total: u64,
    failed: u64,
    notes: Option<&str>,
) -> QualityReport {
    QualityReport {
        run_id: run_id.clone(),
        field: field.to_string(),
        total,
        failed,
        completeness: completeness(total, failed),
        notes: notes.map(str::to_string),
    }
}

/// Counts rows matching `is_failure`.
fn count_failures(rows: &[Value], is_failure: impl Fn(&Value) -> bool) -> u64 {
    let count = rows.iter().filter(|row| is_failure(row)).count();
    u64::try_from(count).unwrap_or(u64::MAX)
}

/// Returns true for absent or null values.
const fn is_missing(value: Option<&Value>) -> bool {
    matches!(value, None | Some(Value::Null))
}

/// Reads a finite number from a JSON number or numeric string.
fn numeric_value(value: Option<&Value>) -> Option<f64> {
    let number = match value? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}
