// crates/analyst-verticals/src/pharma.rs
// ============================================================================
// Module: Pharmacy Registry Vertical
// Description: Publishes the staged pharmacy registry into search partitions.
// Purpose: Keep active pharmacies queryable and retire closed ones.
// Dependencies: analyst-core, analyst-runtime, analyst-store-sqlite, rusqlite
// ============================================================================

//! ## Overview
//! The ingestion boundary writes a full snapshot of the registry into
//! `pharma_staging_pharmacies`. Each run reads that snapshot, gates it on
//! `status` completeness, and republishes: `active` pharmacies go to the
//! current partition, every other status to the historical one.
//!
//! Records without `raw_id` or `name` are quarantined rather than failing
//! the batch.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use analyst_core::NaturalKey;
use analyst_core::QualityRules;
use analyst_core::RecordRejection;
use analyst_runtime::PluginContext;
use analyst_runtime::PluginError;
use analyst_runtime::PluginOutcome;
use analyst_runtime::VerticalPlugin;
use analyst_store_sqlite::ColumnType;
use analyst_store_sqlite::PartitionColumn;
use analyst_store_sqlite::PartitionLayout;
use analyst_store_sqlite::PartitionMaterializer;
use analyst_store_sqlite::PartitionRecord;
use analyst_store_sqlite::QualityGate;
use analyst_store_sqlite::SqlValue;
use analyst_store_sqlite::StoreError;
use analyst_store_sqlite::StoreSession;
use rusqlite::params;
use serde::Deserialize;
use serde::Serialize;

use crate::columns::db_error;
use crate::columns::is_blank;
use crate::columns::text;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Plugin name.
pub const PHARMA_PLUGIN_NAME: &str = "pharma";
/// Plugin version.
pub const PHARMA_PLUGIN_VERSION: &str = "1.0.0";
/// Metadata namespace.
pub const PHARMA_META_NAMESPACE: &str = "pharma_meta";
/// Staged snapshot table.
pub const PHARMA_STAGING_TABLE: &str = "pharma_staging_pharmacies";
/// Status routed to the current partition.
const ACTIVE_STATUS: &str = "active";

/// Published columns, in [`PharmacyRecord::column_values`] order.
const PHARMACY_COLUMNS: &[PartitionColumn] = &[
    PartitionColumn::new("name", ColumnType::Text),
    PartitionColumn::new("address", ColumnType::Text),
    PartitionColumn::new("municipality", ColumnType::Text),
    PartitionColumn::new("province", ColumnType::Text),
    PartitionColumn::new("status", ColumnType::Text),
    PartitionColumn::new("checksum", ColumnType::Text),
];

/// Pharmacy partitions.
pub static PHARMACY_LAYOUT: PartitionLayout = PartitionLayout {
    current_table: "pharma_current_pharmacies",
    historical_table: "pharma_historical_pharmacies",
    key_column: "raw_id",
    columns: PHARMACY_COLUMNS,
};

/// Pharmacy quality rules.
pub const PHARMACY_RULES: QualityRules = QualityRules {
    required_non_null: &["status"],
    non_negative: &[],
};

// ============================================================================
// SECTION: Records
// ============================================================================

/// Normalized pharmacy registry entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PharmacyRecord {
    /// Registry identifier.
    pub raw_id: Option<i64>,
    /// Trading name.
    pub name: Option<String>,
    /// Street address.
    pub address: Option<String>,
    /// Municipality.
    pub municipality: Option<String>,
    /// Province.
    pub province: Option<String>,
    /// Normalized status (`active`, `closed`, ...).
    pub status: Option<String>,
    /// Source checksum.
    pub checksum: Option<String>,
}

impl PharmacyRecord {
    /// Returns true when the pharmacy belongs in the current partition.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status.as_deref().is_some_and(|status| status.trim().eq_ignore_ascii_case(ACTIVE_STATUS))
    }
}

impl PartitionRecord for PharmacyRecord {
    fn identity(&self) -> Result<NaturalKey, RecordRejection> {
        let Some(raw_id) = self.raw_id else {
            return Err(RecordRejection::missing_key_fields(None));
        };
        if is_blank(self.name.as_deref()) {
            return Err(RecordRejection::missing_key_fields(Some(raw_id.to_string())));
        }
        Ok(NaturalKey::new(raw_id))
    }

    fn column_values(&self) -> Vec<SqlValue> {
        vec![
            text(self.name.as_deref()),
            text(self.address.as_deref()),
            text(self.municipality.as_deref()),
            text(self.province.as_deref()),
            text(self.status.as_deref()),
            text(self.checksum.as_deref()),
        ]
    }
}

// ============================================================================
// SECTION: Staging
// ============================================================================

/// Staging table definition.
const STAGING_DDL: &str = "CREATE TABLE IF NOT EXISTS pharma_staging_pharmacies (raw_id INTEGER, \
                           name TEXT, address TEXT, municipality TEXT, province TEXT, status TEXT, \
                           checksum TEXT)";

/// Replaces the staged registry snapshot with `records`.
///
/// # Errors
///
/// Returns [`StoreError`] when the snapshot cannot be written; the previous
/// snapshot is kept in that case.
pub fn stage_pharmacies(
    session: &StoreSession,
    records: &[PharmacyRecord],
) -> Result<usize, StoreError> {
    session.with_transaction(|tx| {
        tx.execute_batch(STAGING_DDL).map_err(|err| db_error(&err))?;
        tx.execute("DELETE FROM pharma_staging_pharmacies", []).map_err(|err| db_error(&err))?;
        let mut stmt = tx
            .prepare(
                "INSERT INTO pharma_staging_pharmacies (raw_id, name, address, municipality, \
                 province, status, checksum) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .map_err(|err| db_error(&err))?;
        for record in records {
            stmt.execute(params![
                record.raw_id,
                record.name,
                record.address,
                record.municipality,
                record.province,
                record.status,
                record.checksum,
            ])
            .map_err(|err| db_error(&err))?;
        }
        Ok(records.len())
    })
}

/// Reads the staged snapshot in staging order.
///
/// # Errors
///
/// Returns [`StoreError`] when the query fails.
pub fn load_staged_pharmacies(session: &StoreSession) -> Result<Vec<PharmacyRecord>, StoreError> {
    session.with_connection(|connection| {
        connection.execute_batch(STAGING_DDL).map_err(|err| db_error(&err))?;
        let mut stmt = connection
            .prepare(
                "SELECT raw_id, name, address, municipality, province, status, checksum FROM \
                 pharma_staging_pharmacies ORDER BY rowid",
            )
            .map_err(|err| db_error(&err))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(PharmacyRecord {
                    raw_id: row.get(0)?,
                    name: row.get(1)?,
                    address: row.get(2)?,
                    municipality: row.get(3)?,
                    province: row.get(4)?,
                    status: row.get(5)?,
                    checksum: row.get(6)?,
                })
            })
            .map_err(|err| db_error(&err))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(|err| db_error(&err))
    })
}

// ============================================================================
// SECTION: Plugin
// ============================================================================

/// Pharmacy registry plugin.
#[derive(Debug, Clone, Copy, Default)]
pub struct PharmaPlugin;

impl VerticalPlugin for PharmaPlugin {
    fn name(&self) -> &str {
        PHARMA_PLUGIN_NAME
    }

    fn version(&self) -> &str {
        PHARMA_PLUGIN_VERSION
    }

    fn meta_namespace(&self) -> &str {
        PHARMA_META_NAMESPACE
    }

    fn materialize(&self, context: &PluginContext<'_>) -> Result<PluginOutcome, PluginError> {
        let records = load_staged_pharmacies(context.session)?;
        QualityGate::new(Arc::clone(context.events)).evaluate(
            context.session,
            context.namespace,
            context.run_id,
            &records,
            &PHARMACY_RULES,
        )?;

        let (current, historical): (Vec<_>, Vec<_>) =
            records.into_iter().partition(PharmacyRecord::is_active);
        let materializer = PartitionMaterializer::new(&PHARMACY_LAYOUT, Arc::clone(context.events))?;
        let counts =
            materializer.apply(context.session, context.namespace, context.run_id, &current, &historical)?;
        Ok(PluginOutcome {
            processed: counts.processed,
            errors: counts.errors,
            notes: Some(format!("demoted={},promoted={}", counts.demoted, counts.promoted)),
        })
    }
}
