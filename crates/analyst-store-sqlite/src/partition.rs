// crates/analyst-store-sqlite/src/partition.rs
// ============================================================================
// Module: Partition Materializer
// Description: Transactional upsert into current and historical partitions.
// Purpose: Publish a vertical's batch with last-write-wins and migration pruning.
// Dependencies: analyst-core, rusqlite, serde, serde_json
// ============================================================================

//! ## Overview
//! A vertical declares its partitions as a static [`PartitionLayout`]. Table
//! and column names are `&'static str` constants checked against the
//! identifier grammar when the materializer is built; no SQL identifier is
//! ever derived from runtime input.
//!
//! [`PartitionMaterializer::apply`] validates every record first (pure), then
//! quarantines rejects through the dead-letter sink as independent writes,
//! then upserts and prunes both partitions in one immediate transaction. A
//! failure inside that transaction publishes nothing, while quarantined rows
//! remain.
//!
//! When a natural key appears in both batches, the historical classification
//! wins.
//!
//! A materializer may also carry a [`SummaryLayout`]: a companion table keyed
//! by the same natural key and filled from
//! [`PartitionRecord::summary_values`] inside the publication transaction.
//! Summary rows are upserted for every published record, whichever partition
//! it lands in.
//!
//! Read paths never create tables; a partition that was never published
//! reads as empty.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::sync::Arc;

use analyst_core::DeadLetterInput;
use analyst_core::MetaNamespace;
use analyst_core::NaturalKey;
use analyst_core::RecordRejection;
use analyst_core::RunEvent;
use analyst_core::RunEventSink;
use analyst_core::RunId;
use analyst_core::is_snake_identifier;
use analyst_core::unix_millis;
use rusqlite::OptionalExtension;
use rusqlite::Transaction;
use rusqlite::params;
use rusqlite::params_from_iter;
use rusqlite::types::Value;
use serde::Serialize;

use crate::dead_letters::DeadLetterSink;
use crate::session::StoreError;
use crate::session::StoreSession;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Column refreshed on every upsert.
const UPDATED_AT_COLUMN: &str = "updated_at";

// ============================================================================
// SECTION: Layout
// ============================================================================

/// Storage class of a partition column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// 64-bit integer.
    Integer,
    /// Floating point.
    Real,
    /// UTF-8 text.
    Text,
}

impl ColumnType {
    /// Returns the `SQLite` type name.
    #[must_use]
    pub const fn sql_type(self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
            Self::Text => "TEXT",
        }
    }
}

/// Non-key column of a partition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionColumn {
    /// Column name.
    pub name: &'static str,
    /// Storage class.
    pub column_type: ColumnType,
}

impl PartitionColumn {
    /// Declares a column.
    #[must_use]
    pub const fn new(name: &'static str, column_type: ColumnType) -> Self {
        Self {
            name,
            column_type,
        }
    }
}

/// Which partition a row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionSide {
    /// Live records.
    Current,
    /// Closed or inactive records.
    Historical,
}

/// Static partition declaration of a vertical.
///
/// # Invariants
/// - Every identifier matches `[a-z][a-z0-9_]*` (checked by [`Self::validate`]).
/// - The two tables differ; column names are unique and exclude the key and
///   `updated_at`.
/// - Both tables share the same column list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionLayout {
    /// Current partition table.
    pub current_table: &'static str,
    /// Historical partition table.
    pub historical_table: &'static str,
    /// Natural key column (`INTEGER PRIMARY KEY`).
    pub key_column: &'static str,
    /// Non-key columns in [`PartitionRecord::column_values`] order.
    pub columns: &'static [PartitionColumn],
}

impl PartitionLayout {
    /// Returns the table backing `side`.
    #[must_use]
    pub const fn table(&self, side: PartitionSide) -> &'static str {
        match side {
            PartitionSide::Current => self.current_table,
            PartitionSide::Historical => self.historical_table,
        }
    }

    /// Checks the layout invariants.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] naming the first violation.
    pub fn validate(&self) -> Result<(), StoreError> {
        for identifier in [self.current_table, self.historical_table, self.key_column] {
            ensure_identifier(identifier)?;
        }
        if self.current_table == self.historical_table {
            return Err(StoreError::Invalid(
                "current and historical partitions must use different tables".to_string(),
            ));
        }
        validate_columns(self.key_column, self.columns)
    }

    /// Builds the `CREATE TABLE` statement for `table`.
    fn create_sql(&self, table: &str) -> String {
        create_table_sql(table, self.key_column, self.columns)
    }

    /// Builds the last-write-wins upsert statement for `table`.
    fn upsert_sql(&self, table: &str) -> String {
        upsert_table_sql(table, self.key_column, self.columns)
    }

    /// Builds the single-key delete statement for `table`.
    fn delete_sql(&self, table: &str) -> String {
        format!("DELETE FROM {table} WHERE {key} = ?1", key = self.key_column)
    }
}

/// Companion table holding one derived row per published natural key.
///
/// # Invariants
/// - The table and every column name match `[a-z][a-z0-9_]*`.
/// - The table differs from both partition tables; column names are unique
///   and exclude the partition key and `updated_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryLayout {
    /// Summary table, keyed by the partition key column.
    pub table: &'static str,
    /// Columns in [`PartitionRecord::summary_values`] order.
    pub columns: &'static [PartitionColumn],
}

impl SummaryLayout {
    /// Checks the summary invariants against the partitions it accompanies.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] naming the first violation.
    pub fn validate(&self, partitions: &PartitionLayout) -> Result<(), StoreError> {
        ensure_identifier(self.table)?;
        if self.table == partitions.current_table || self.table == partitions.historical_table {
            return Err(StoreError::Invalid(format!(
                "summary table {} collides with a partition table",
                self.table
            )));
        }
        validate_columns(partitions.key_column, self.columns)
    }
}

// ============================================================================
// SECTION: Records
// ============================================================================

/// Record that can be published into a partition.
pub trait PartitionRecord: Serialize {
    /// Returns the natural key, or the rejection when identity or required
    /// fields are missing.
    ///
    /// # Errors
    ///
    /// Returns [`RecordRejection`] for records that must be quarantined.
    fn identity(&self) -> Result<NaturalKey, RecordRejection>;

    /// Returns column values in [`PartitionLayout::columns`] order.
    fn column_values(&self) -> Vec<Value>;

    /// Returns summary values in [`SummaryLayout::columns`] order.
    ///
    /// Only consulted when the materializer carries a summary layout.
    fn summary_values(&self) -> Vec<Value> {
        Vec::new()
    }
}

/// Published partition row (without `updated_at`).
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionRow {
    /// Natural key.
    pub key: NaturalKey,
    /// Column values in layout order.
    pub values: Vec<Value>,
}

/// Counters reported by [`PartitionMaterializer::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MaterializeCounts {
    /// Records upserted.
    pub processed: u64,
    /// Records quarantined.
    pub errors: u64,
    /// Rows removed from the current partition.
    pub demoted: u64,
    /// Rows removed from the historical partition.
    pub promoted: u64,
    /// Summary rows written.
    pub summarized: u64,
}

/// Validated record awaiting publication.
struct Publication {
    /// Partition row.
    row: PartitionRow,
    /// Summary values (empty without a summary layout).
    summary: Vec<Value>,
}

// ============================================================================
// SECTION: Materializer
// ============================================================================

/// Publishes batches into a vertical's partitions.
pub struct PartitionMaterializer {
    /// Validated partition layout.
    layout: &'static PartitionLayout,
    /// Optional validated summary layout.
    summary: Option<&'static SummaryLayout>,
    /// Quarantine for rejected records.
    dead_letters: DeadLetterSink,
    /// Event sink for materialization results.
    events: Arc<dyn RunEventSink>,
}

impl PartitionMaterializer {
    /// Creates a materializer after validating `layout`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] when the layout violates its invariants.
    pub fn new(
        layout: &'static PartitionLayout,
        events: Arc<dyn RunEventSink>,
    ) -> Result<Self, StoreError> {
        layout.validate()?;
        Ok(Self {
            layout,
            summary: None,
            dead_letters: DeadLetterSink::new(Arc::clone(&events)),
            events,
        })
    }

    /// Attaches a summary table filled on every publication.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] when `summary` violates its invariants.
    pub fn with_summary(mut self, summary: &'static SummaryLayout) -> Result<Self, StoreError> {
        summary.validate(self.layout)?;
        self.summary = Some(summary);
        Ok(self)
    }

    /// Returns the partition layout.
    #[must_use]
    pub const fn layout(&self) -> &'static PartitionLayout {
        self.layout
    }

    /// Publishes `current` and `historical` batches.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when quarantining fails, a record yields the
    /// wrong number of values, or any statement of the publication
    /// transaction fails (in which case nothing is published).
    pub fn apply<R: PartitionRecord>(
        &self,
        session: &StoreSession,
        namespace: &MetaNamespace,
        run_id: &RunId,
        current: &[R],
        historical: &[R],
    ) -> Result<MaterializeCounts, StoreError> {
        let mut rejects = Vec::new();
        let current_rows = self.classify(run_id, current, &mut rejects)?;
        let historical_rows = self.classify(run_id, historical, &mut rejects)?;
        for input in &rejects {
            self.dead_letters.record(session, namespace, input)?;
        }

        let (demoted, promoted, summarized) = session.with_transaction(|tx| {
            self.ensure_tables(tx)?;
            let updated_at = unix_millis();
            for (side, entries) in [
                (PartitionSide::Current, &current_rows),
                (PartitionSide::Historical, &historical_rows),
            ] {
                let upsert = self.layout.upsert_sql(self.layout.table(side));
                let rows = entries.iter().map(|entry| (&entry.row.key, &entry.row.values));
                upsert_rows(tx, &upsert, rows, updated_at)?;
            }
            let historical_keys: BTreeSet<NaturalKey> =
                historical_rows.iter().map(|entry| entry.row.key).collect();
            let current_keys: BTreeSet<NaturalKey> = current_rows
                .iter()
                .map(|entry| entry.row.key)
                .filter(|key| !historical_keys.contains(key))
                .collect();
            let demoted = self.delete_keys(tx, self.layout.current_table, &historical_keys)?;
            let promoted = self.delete_keys(tx, self.layout.historical_table, &current_keys)?;
            let summarized = match self.summary {
                Some(summary) => {
                    tx.execute_batch(&create_table_sql(
                        summary.table,
                        self.layout.key_column,
                        summary.columns,
                    ))
                    .map_err(|err| StoreError::Db(err.to_string()))?;
                    let upsert =
                        upsert_table_sql(summary.table, self.layout.key_column, summary.columns);
                    let entries = current_rows
                        .iter()
                        .chain(&historical_rows)
                        .map(|entry| (&entry.row.key, &entry.summary));
                    upsert_rows(tx, &upsert, entries, updated_at)?;
                    count(current_rows.len() + historical_rows.len())
                }
                None => 0,
            };
            Ok((demoted, promoted, summarized))
        })?;

        let counts = MaterializeCounts {
            processed: count(current_rows.len() + historical_rows.len()),
            errors: count(rejects.len()),
            demoted,
            promoted,
            summarized,
        };
        self.events.record(
            &RunEvent::info("partitions_materialized")
                .with("namespace", namespace.as_str())
                .with("run_id", run_id.as_str())
                .with("processed", counts.processed)
                .with("errors", counts.errors)
                .with("demoted", counts.demoted)
                .with("promoted", counts.promoted)
                .with("summarized", counts.summarized),
        );
        Ok(counts)
    }

    /// Returns the rows of one partition ordered by natural key.
    ///
    /// A partition that was never published reads as empty.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    pub fn rows(
        &self,
        session: &StoreSession,
        side: PartitionSide,
    ) -> Result<Vec<PartitionRow>, StoreError> {
        read_rows(session, self.layout.table(side), self.layout.key_column, self.layout.columns)
    }

    /// Returns the summary rows ordered by natural key.
    ///
    /// Empty when no summary layout is attached or nothing was published.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    pub fn summary_rows(&self, session: &StoreSession) -> Result<Vec<PartitionRow>, StoreError> {
        match self.summary {
            Some(summary) => {
                read_rows(session, summary.table, self.layout.key_column, summary.columns)
            }
            None => Ok(Vec::new()),
        }
    }

    /// Returns the natural keys of one partition in ascending order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    pub fn keys(
        &self,
        session: &StoreSession,
        side: PartitionSide,
    ) -> Result<Vec<NaturalKey>, StoreError> {
        Ok(self.rows(session, side)?.into_iter().map(|row| row.key).collect())
    }

    /// Splits records into publishable rows and quarantine inputs.
    fn classify<R: PartitionRecord>(
        &self,
        run_id: &RunId,
        records: &[R],
        rejects: &mut Vec<DeadLetterInput>,
    ) -> Result<Vec<Publication>, StoreError> {
        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            match record.identity() {
                Ok(key) => {
                    let values = record.column_values();
                    ensure_width(key, "layout", values.len(), self.layout.columns.len())?;
                    let summary = match self.summary {
                        Some(layout) => {
                            let summary = record.summary_values();
                            ensure_width(key, "summary", summary.len(), layout.columns.len())?;
                            summary
                        }
                        None => Vec::new(),
                    };
                    rows.push(Publication {
                        row: PartitionRow {
                            key,
                            values,
                        },
                        summary,
                    });
                }
                Err(rejection) => rejects.push(DeadLetterInput {
                    run_id: run_id.clone(),
                    raw_id: rejection.raw_id,
                    reason: rejection.reason,
                    payload_excerpt: serde_json::to_string(record).ok(),
                }),
            }
        }
        Ok(rows)
    }

    /// Creates both partition tables when missing.
    fn ensure_tables(&self, tx: &Transaction<'_>) -> Result<(), StoreError> {
        for table in [self.layout.current_table, self.layout.historical_table] {
            tx.execute_batch(&self.layout.create_sql(table))
                .map_err(|err| StoreError::Db(err.to_string()))?;
        }
        Ok(())
    }

    /// Deletes `keys` from `table`, returning the rows removed.
    fn delete_keys(
        &self,
        tx: &Transaction<'_>,
        table: &str,
        keys: &BTreeSet<NaturalKey>,
    ) -> Result<u64, StoreError> {
        let mut stmt = tx
            .prepare(&self.layout.delete_sql(table))
            .map_err(|err| StoreError::Db(err.to_string()))?;
        let mut removed = 0_u64;
        for key in keys {
            let changed =
                stmt.execute(params![key.get()]).map_err(|err| StoreError::Db(err.to_string()))?;
            removed = removed.saturating_add(count(changed));
        }
        Ok(removed)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Checks non-key column declarations shared by partitions and summaries.
fn validate_columns(key_column: &str, columns: &[PartitionColumn]) -> Result<(), StoreError> {
    if columns.is_empty() {
        return Err(StoreError::Invalid("layout declares no columns".to_string()));
    }
    let mut seen = BTreeSet::from([key_column, UPDATED_AT_COLUMN]);
    for column in columns {
        ensure_identifier(column.name)?;
        if !seen.insert(column.name) {
            return Err(StoreError::Invalid(format!(
                "column declared twice or reserved: {}",
                column.name
            )));
        }
    }
    Ok(())
}

/// Builds the `CREATE TABLE` statement for a keyed table.
fn create_table_sql(table: &str, key_column: &str, columns: &[PartitionColumn]) -> String {
    let columns = columns
        .iter()
        .map(|column| format!("{} {}", column.name, column.column_type.sql_type()))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "CREATE TABLE IF NOT EXISTS {table} ({key_column} INTEGER PRIMARY KEY, {columns}, \
         {UPDATED_AT_COLUMN} INTEGER NOT NULL)"
    )
}

/// Builds the last-write-wins upsert statement for a keyed table.
fn upsert_table_sql(table: &str, key_column: &str, columns: &[PartitionColumn]) -> String {
    let names: Vec<&str> = columns.iter().map(|column| column.name).collect();
    let placeholders =
        (1 ..= names.len() + 2).map(|index| format!("?{index}")).collect::<Vec<_>>().join(", ");
    let assignments = names
        .iter()
        .chain(std::iter::once(&UPDATED_AT_COLUMN))
        .map(|name| format!("{name} = excluded.{name}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {table} ({key_column}, {columns}, {UPDATED_AT_COLUMN}) VALUES \
         ({placeholders}) ON CONFLICT({key_column}) DO UPDATE SET {assignments}",
        columns = names.join(", ")
    )
}

/// Runs `upsert` once per `(key, values)` entry, stamping `updated_at`.
fn upsert_rows<'a>(
    tx: &Transaction<'_>,
    upsert: &str,
    entries: impl Iterator<Item = (&'a NaturalKey, &'a Vec<Value>)>,
    updated_at: i64,
) -> Result<(), StoreError> {
    let mut stmt = tx.prepare(upsert).map_err(|err| StoreError::Db(err.to_string()))?;
    for (key, values) in entries {
        let params = std::iter::once(Value::Integer(key.get()))
            .chain(values.iter().cloned())
            .chain(std::iter::once(Value::Integer(updated_at)));
        stmt.execute(params_from_iter(params)).map_err(|err| StoreError::Db(err.to_string()))?;
    }
    Ok(())
}

/// Reads a keyed table ordered by key; a missing table reads as empty.
fn read_rows(
    session: &StoreSession,
    table: &str,
    key_column: &str,
    columns: &[PartitionColumn],
) -> Result<Vec<PartitionRow>, StoreError> {
    let names: Vec<&str> = columns.iter().map(|column| column.name).collect();
    let sql = format!(
        "SELECT {key_column}, {columns} FROM {table} ORDER BY {key_column}",
        columns = names.join(", ")
    );
    let width = names.len();
    session.with_connection(|connection| {
        let exists = connection
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![table],
                |_| Ok(()),
            )
            .optional()
            .map_err(|err| StoreError::Db(err.to_string()))?
            .is_some();
        if !exists {
            return Ok(Vec::new());
        }
        let mut stmt = connection.prepare(&sql).map_err(|err| StoreError::Db(err.to_string()))?;
        let rows = stmt
            .query_map(params![], |row| {
                let key = NaturalKey::new(row.get(0)?);
                let values =
                    (1 ..= width).map(|index| row.get::<_, Value>(index)).collect::<Result<_, _>>()?;
                Ok(PartitionRow {
                    key,
                    values,
                })
            })
            .map_err(|err| StoreError::Db(err.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(|err| StoreError::Db(err.to_string()))
    })
}

/// Rejects a record whose value count differs from its declaration.
fn ensure_width(
    key: NaturalKey,
    target: &str,
    actual: usize,
    declared: usize,
) -> Result<(), StoreError> {
    if actual == declared {
        return Ok(());
    }
    Err(StoreError::Invalid(format!("record {key} has {actual} values, {target} declares {declared}")))
}

/// Rejects identifiers outside the `[a-z][a-z0-9_]*` grammar.
fn ensure_identifier(identifier: &str) -> Result<(), StoreError> {
    if is_snake_identifier(identifier) {
        Ok(())
    } else {
        Err(StoreError::Invalid(format!("invalid partition identifier: {identifier:?}")))
    }
}

/// Widens a collection length to a counter.
fn count(value: usize) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}
