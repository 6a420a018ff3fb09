// crates/analyst-store-sqlite/tests/common/mod.rs
// =============================================================================
// Module: Store Test Helpers
// Description: Shared sessions, namespaces, and records for store tests.
// Purpose: Reduce duplication across integration tests for analyst-store-sqlite.
// =============================================================================

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]

use std::path::Path;
use std::sync::Arc;

use analyst_core::MemoryRunEventSink;
use analyst_core::MetaNamespace;
use analyst_core::NaturalKey;
use analyst_core::RecordRejection;
use analyst_core::RunEventSink;
use analyst_store_sqlite::ColumnType;
use analyst_store_sqlite::PartitionColumn;
use analyst_store_sqlite::PartitionLayout;
use analyst_store_sqlite::PartitionRecord;
use analyst_store_sqlite::SqlValue;
use analyst_store_sqlite::SqliteStoreConfig;
use analyst_store_sqlite::StoreSession;
use analyst_store_sqlite::SummaryLayout;
use serde::Serialize;

/// Columns of the demo partitions.
pub const DEMO_COLUMNS: &[PartitionColumn] = &[
    PartitionColumn::new("name", ColumnType::Text),
    PartitionColumn::new("price", ColumnType::Real),
];

/// Demo partition layout.
pub static DEMO_LAYOUT: PartitionLayout = PartitionLayout {
    current_table: "demo_current_items",
    historical_table: "demo_historical_items",
    key_column: "raw_id",
    columns: DEMO_COLUMNS,
};

/// Layout whose declared columns do not match [`DemoRecord::column_values`].
pub static MISMATCHED_LAYOUT: PartitionLayout = PartitionLayout {
    current_table: "demo_current_items",
    historical_table: "demo_historical_items",
    key_column: "raw_id",
    columns: &[PartitionColumn::new("name", ColumnType::Text)],
};

/// Summary table accompanying the demo partitions.
pub static DEMO_SUMMARY: SummaryLayout = SummaryLayout {
    table: "demo_item_summaries",
    columns: &[PartitionColumn::new("label", ColumnType::Text)],
};

/// Minimal record used to exercise the materializer.
#[derive(Debug, Clone, Serialize)]
pub struct DemoRecord {
    pub raw_id: Option<i64>,
    pub name: Option<String>,
    pub price: f64,
}

impl DemoRecord {
    pub fn valid(raw_id: i64, name: &str, price: f64) -> Self {
        Self {
            raw_id: Some(raw_id),
            name: Some(name.to_string()),
            price,
        }
    }

    pub fn missing_id(name: &str) -> Self {
        Self {
            raw_id: None,
            name: Some(name.to_string()),
            price: 1.0,
        }
    }
}

impl PartitionRecord for DemoRecord {
    fn identity(&self) -> Result<NaturalKey, RecordRejection> {
        match (self.raw_id, &self.name) {
            (Some(raw_id), Some(_)) => Ok(NaturalKey::new(raw_id)),
            (raw_id, _) => Err(RecordRejection::missing_key_fields(raw_id.map(|id| id.to_string()))),
        }
    }

    fn column_values(&self) -> Vec<SqlValue> {
        vec![
            self.name.clone().map_or(SqlValue::Null, SqlValue::Text),
            SqlValue::Real(self.price),
        ]
    }

    fn summary_values(&self) -> Vec<SqlValue> {
        let name = self.name.as_deref().unwrap_or("?");
        vec![SqlValue::Text(format!("{name}@{}", self.price))]
    }
}

/// Opens a session on `dir/analyst.sqlite` with default pragmas.
pub fn open_session(dir: &Path) -> StoreSession {
    StoreSession::open(&SqliteStoreConfig::for_path(dir.join("analyst.sqlite"))).expect("store open")
}

/// Returns the demo metadata namespace.
pub fn namespace() -> MetaNamespace {
    MetaNamespace::parse("demo_meta").expect("namespace")
}

/// Returns a memory sink and the same sink as a trait object.
pub fn memory_events() -> (Arc<MemoryRunEventSink>, Arc<dyn RunEventSink>) {
    let sink = Arc::new(MemoryRunEventSink::new());
    let shared: Arc<dyn RunEventSink> = sink.clone();
    (sink, shared)
}

/// Drops a metadata table to simulate persistence failures.
pub fn drop_table(session: &StoreSession, table: &str) {
    session
        .with_connection(|connection| {
            connection
                .execute_batch(&format!("DROP TABLE {table}"))
                .map_err(|err| analyst_store_sqlite::StoreError::Db(err.to_string()))
        })
        .expect("drop table");
}

/// Counts tables named `name` in the schema.
pub fn table_count(session: &StoreSession, name: &str) -> i64 {
    session
        .with_connection(|connection| {
            connection
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    [name],
                    |row| row.get(0),
                )
                .map_err(|err| analyst_store_sqlite::StoreError::Db(err.to_string()))
        })
        .expect("table count")
}
