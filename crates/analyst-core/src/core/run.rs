// crates/analyst-core/src/core/run.rs
// ============================================================================
// Module: Analyst Run Model
// Description: Run ledger rows, lifecycle status, and completion payloads.
// Purpose: Describe run provenance independent of the persistence backend.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! A run is opened as [`RunStatus::Running`] and closed exactly once with a
//! terminal status. Rows are never deleted; the ledger doubles as the audit
//! log and as the baseline source for anomaly detection.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::identifiers::RunId;

// ============================================================================
// SECTION: Status
// ============================================================================

/// Run lifecycle status.
///
/// # Invariants
/// - `Running` is the only non-terminal state.
/// - Persisted labels are the upper-case variant names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// Run is in progress.
    Running,
    /// Run completed and published its output.
    Success,
    /// Run aborted; nothing from the main transaction was published.
    Failed,
}

impl RunStatus {
    /// Returns the persisted label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
        }
    }

    /// Returns true for `Success` and `Failed`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a persisted status label is unknown.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown run status: {0}")]
pub struct UnknownRunStatus(pub String);

impl FromStr for RunStatus {
    type Err = UnknownRunStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "RUNNING" => Ok(Self::Running),
            "SUCCESS" => Ok(Self::Success),
            "FAILED" => Ok(Self::Failed),
            other => Err(UnknownRunStatus(other.to_string())),
        }
    }
}

// ============================================================================
// SECTION: Run Rows
// ============================================================================

/// Run ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    /// Run identifier.
    pub run_id: RunId,
    /// Plugin identity recorded as `name@version`.
    pub plugin: String,
    /// Engine version that executed the run.
    pub version: String,
    /// Start time (unix millis).
    pub started_at_ms: i64,
    /// Finish time (unix millis) once terminal.
    pub finished_at_ms: Option<i64>,
    /// Lifecycle status.
    pub status: RunStatus,
    /// Records published by the run.
    pub processed: u64,
    /// Records rejected or failures counted by the run.
    pub errors: u64,
    /// Free-form notes (plugin notes or the failure message).
    pub notes: Option<String>,
}

/// Terminal update applied to a run by the ledger.
///
/// # Invariants
/// - `status` must be terminal; the ledger rejects `Running`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunCompletion {
    /// Terminal status.
    pub status: RunStatus,
    /// Final processed counter.
    pub processed: u64,
    /// Final error counter.
    pub errors: u64,
    /// Optional notes.
    pub notes: Option<String>,
}

impl RunCompletion {
    /// Builds a successful completion.
    #[must_use]
    pub const fn success(processed: u64, errors: u64, notes: Option<String>) -> Self {
        Self {
            status: RunStatus::Success,
            processed,
            errors,
            notes,
        }
    }

    /// Builds a failed completion carrying the triggering message.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Failed,
            processed: 0,
            errors: 1,
            notes: Some(message.into()),
        }
    }
}

/// Counters handed to anomaly detection after a successful plugin run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Run identifier.
    pub run_id: RunId,
    /// Records published.
    pub processed: u64,
    /// Records rejected.
    pub errors: u64,
}
