// crates/analyst-verticals/src/columns.rs
// ============================================================================
// Module: Vertical Column Helpers
// Description: Shared conversions between record fields and SQLite values.
// Purpose: Keep partition and staging column encoding uniform across verticals.
// Dependencies: analyst-store-sqlite, rusqlite
// ============================================================================

//! ## Overview
//! Small conversions used by every vertical when building partition rows and
//! reading staged snapshots. Optional fields map to SQL `NULL`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use analyst_store_sqlite::SqlValue;
use analyst_store_sqlite::StoreError;

// ============================================================================
// SECTION: Conversions
// ============================================================================

/// Encodes optional text.
pub(crate) fn text(value: Option<&str>) -> SqlValue {
    value.map_or(SqlValue::Null, |text| SqlValue::Text(text.to_string()))
}

/// Encodes an optional float.
pub(crate) fn real(value: Option<f64>) -> SqlValue {
    value.map_or(SqlValue::Null, SqlValue::Real)
}

/// Encodes a flag as `0` or `1`.
pub(crate) fn flag(value: bool) -> SqlValue {
    SqlValue::Integer(i64::from(value))
}

/// Returns true when the value is absent or blank.
pub(crate) fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|text| text.trim().is_empty())
}

/// Maps a `rusqlite` failure into a store error.
pub(crate) fn db_error(err: &rusqlite::Error) -> StoreError {
    StoreError::Db(err.to_string())
}
