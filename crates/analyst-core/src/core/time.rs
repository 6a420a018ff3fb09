// crates/analyst-core/src/core/time.rs
// ============================================================================
// Module: Analyst Time Helpers
// Description: Wall-clock helpers for ledger and audit timestamps.
// Purpose: Keep every persisted timestamp in unix epoch milliseconds.
// Dependencies: std
// ============================================================================

//! ## Overview
//! All persisted timestamps are unix epoch milliseconds stored as `i64`.
//! Baseline windows are expressed in whole days and converted here.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::SystemTime;
use std::time::UNIX_EPOCH;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Milliseconds in one day.
pub const MILLIS_PER_DAY: i64 = 86_400_000;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the current unix epoch in milliseconds.
#[must_use]
pub fn unix_millis() -> i64 {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}

/// Returns the start of a trailing window of `days` days ending at `now_ms`.
#[must_use]
pub fn window_start_millis(now_ms: i64, days: u32) -> i64 {
    now_ms.saturating_sub(MILLIS_PER_DAY.saturating_mul(i64::from(days)))
}
