// crates/analyst-core/src/core/dead_letter.rs
// ============================================================================
// Module: Analyst Dead Letters
// Description: Quarantine rows for records that fail identity validation.
// Purpose: Carry rejected records out of a batch without failing it.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A record that fails identity or required-field validation is turned into a
//! [`DeadLetterInput`] and persisted by the dead-letter sink. Payload excerpts
//! are bounded to [`MAX_EXCERPT_CHARS`] characters.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::DeadLetterId;
use crate::core::identifiers::RunId;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum excerpt length in characters before truncation.
pub const MAX_EXCERPT_CHARS: usize = 500;
/// Marker appended to truncated excerpts.
pub const EXCERPT_MARKER: &str = "...";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Reason a record was rejected before materialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRejection {
    /// Raw identity as seen in the source, when present.
    pub raw_id: Option<String>,
    /// Stable reason label.
    pub reason: String,
}

impl RecordRejection {
    /// Rejection for records missing their identity or required fields.
    #[must_use]
    pub fn missing_key_fields(raw_id: Option<String>) -> Self {
        Self {
            raw_id,
            reason: "missing_key_fields".to_string(),
        }
    }
}

/// Dead-letter payload handed to the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetterInput {
    /// Run that produced the rejection.
    pub run_id: RunId,
    /// Raw identity, when the source carried one.
    pub raw_id: Option<String>,
    /// Stable reason label.
    pub reason: String,
    /// Serialized record excerpt (truncated by the sink).
    pub payload_excerpt: Option<String>,
}

/// Persisted dead-letter row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
    /// Row identifier.
    pub id: DeadLetterId,
    /// Run that produced the rejection.
    pub run_id: RunId,
    /// Raw identity, when present.
    pub raw_id: Option<String>,
    /// Reason label.
    pub reason: String,
    /// Bounded payload excerpt.
    pub payload_excerpt: Option<String>,
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Truncates an excerpt to [`MAX_EXCERPT_CHARS`] characters.
///
/// Longer inputs keep their first [`MAX_EXCERPT_CHARS`] characters followed
/// by [`EXCERPT_MARKER`]. Empty inputs collapse to `None`.
#[must_use]
pub fn truncate_excerpt(input: Option<&str>) -> Option<String> {
    let input = input?;
    if input.is_empty() {
        return None;
    }
    match input.char_indices().nth(MAX_EXCERPT_CHARS) {
        Some((cut, _)) => Some(format!("{}{EXCERPT_MARKER}", &input[.. cut])),
        None => Some(input.to_string()),
    }
}
