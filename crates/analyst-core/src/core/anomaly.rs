// crates/analyst-core/src/core/anomaly.rs
// ============================================================================
// Module: Analyst Anomaly Rules
// Description: Pure anomaly rules evaluated after a successful run.
// Purpose: Flag volume and error deviations without blocking publication.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Anomaly rules compare a finished run's counters with a historical baseline
//! (the average processed count of recent successful runs). Findings are
//! advisory: they are persisted for review and never change the run outcome.
//!
//! Configuration is validated once at construction; detection itself has no
//! failure mode.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::core::identifiers::AnomalyId;
use crate::core::identifiers::RunId;
use crate::core::run::RunSummary;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default trailing baseline window in days.
pub const DEFAULT_BASELINE_DAYS: u32 = 14;
/// Default volume drop threshold in percent.
pub const DEFAULT_DROP_THRESHOLD_PCT: u32 = 80;

// ============================================================================
// SECTION: Kinds
// ============================================================================

/// Anomaly classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalyKind {
    /// Run published nothing.
    ZeroProcessed,
    /// Run rejected at least one record.
    ErrorSpike,
    /// Run published far fewer records than the baseline.
    VolumeDrop,
}

impl AnomalyKind {
    /// Returns the persisted label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ZeroProcessed => "ZERO_PROCESSED",
            Self::ErrorSpike => "ERROR_SPIKE",
            Self::VolumeDrop => "VOLUME_DROP",
        }
    }

    /// Parses a persisted label.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "ZERO_PROCESSED" => Some(Self::ZeroProcessed),
            "ERROR_SPIKE" => Some(Self::ErrorSpike),
            "VOLUME_DROP" => Some(Self::VolumeDrop),
            _ => None,
        }
    }
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unpersisted anomaly produced by [`evaluate_anomalies`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyFinding {
    /// Classification.
    pub kind: AnomalyKind,
    /// Rule-specific details.
    pub details: Value,
}

/// Persisted anomaly row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    /// Row identifier.
    pub id: AnomalyId,
    /// Run the anomaly was detected on.
    pub run_id: RunId,
    /// Classification.
    pub kind: AnomalyKind,
    /// Rule-specific details.
    pub details: Value,
}

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Anomaly configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnomalyConfigError {
    /// Baseline window was zero.
    #[error("anomaly baseline_days must be a positive integer")]
    BaselineDays,
    /// Drop threshold was zero.
    #[error("anomaly drop_threshold_pct must be a positive integer")]
    DropThreshold,
}

/// Anomaly detection tuning.
///
/// # Invariants
/// - Both values are positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnomalyConfig {
    /// Trailing baseline window in days.
    baseline_days: u32,
    /// Drop threshold in percent.
    drop_threshold_pct: u32,
}

impl AnomalyConfig {
    /// Builds a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AnomalyConfigError`] when either value is zero.
    pub const fn new(baseline_days: u32, drop_threshold_pct: u32) -> Result<Self, AnomalyConfigError> {
        if baseline_days == 0 {
            return Err(AnomalyConfigError::BaselineDays);
        }
        if drop_threshold_pct == 0 {
            return Err(AnomalyConfigError::DropThreshold);
        }
        Ok(Self {
            baseline_days,
            drop_threshold_pct,
        })
    }

    /// Returns the baseline window in days.
    #[must_use]
    pub const fn baseline_days(&self) -> u32 {
        self.baseline_days
    }

    /// Returns the drop threshold in percent.
    #[must_use]
    pub const fn drop_threshold_pct(&self) -> u32 {
        self.drop_threshold_pct
    }
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            baseline_days: DEFAULT_BASELINE_DAYS,
            drop_threshold_pct: DEFAULT_DROP_THRESHOLD_PCT,
        }
    }
}

// ============================================================================
// SECTION: Rules
// ============================================================================

/// Evaluates anomaly rules for a finished run.
///
/// `baseline` is the average processed count of recent successful runs, or
/// `None` when no baseline could be computed. Volume drops are only checked
/// against a positive baseline.
#[must_use]
#[allow(clippy::cast_precision_loss, reason = "Run counters stay far below 2^52.")]
pub fn evaluate_anomalies(
    summary: &RunSummary,
    baseline: Option<f64>,
    config: &AnomalyConfig,
) -> Vec<AnomalyFinding> {
    let mut findings = Vec::new();
    if summary.processed == 0 {
        findings.push(AnomalyFinding {
            kind: AnomalyKind::ZeroProcessed,
            details: json!({ "processed": summary.processed }),
        });
    }
    if summary.errors > 0 {
        findings.push(AnomalyFinding {
            kind: AnomalyKind::ErrorSpike,
            details: json!({ "errors": summary.errors }),
        });
    }
    if let Some(baseline) = baseline.filter(|value| value.is_finite() && *value > 0.0) {
        let processed = summary.processed as f64;
        let drop_pct = (baseline - processed) / baseline * 100.0;
        if drop_pct >= f64::from(config.drop_threshold_pct) {
            findings.push(AnomalyFinding {
                kind: AnomalyKind::VolumeDrop,
                details: json!({
                    "drop_pct": drop_pct,
                    "processed": summary.processed,
                    "baseline_processed": baseline,
                }),
            });
        }
    }
    findings
}
