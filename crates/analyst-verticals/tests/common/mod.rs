// crates/analyst-verticals/tests/common/mod.rs
// =============================================================================
// Module: Vertical Test Helpers
// Description: Sessions, orchestrators, and staged fixtures for vertical tests.
// Purpose: Reduce duplication across integration tests for analyst-verticals.
// =============================================================================

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]

use std::path::Path;
use std::sync::Arc;

use analyst_core::AnomalyConfig;
use analyst_core::MemoryRunEventSink;
use analyst_core::MetaNamespace;
use analyst_core::NaturalKey;
use analyst_core::RunEventSink;
use analyst_runtime::Orchestrator;
use analyst_runtime::PluginRegistry;
use analyst_store_sqlite::PartitionLayout;
use analyst_store_sqlite::PartitionMaterializer;
use analyst_store_sqlite::PartitionRow;
use analyst_store_sqlite::PartitionSide;
use analyst_store_sqlite::SqlValue;
use analyst_store_sqlite::SqliteStoreConfig;
use analyst_store_sqlite::StoreSession;
use analyst_verticals::AuctionListing;
use analyst_verticals::PharmacyRecord;
use analyst_verticals::auctions::LISTING_LAYOUT;
use analyst_verticals::auctions::LISTING_SUMMARY;
use analyst_verticals::register_all;

pub fn open_session(dir: &Path) -> StoreSession {
    StoreSession::open(&SqliteStoreConfig::for_path(dir.join("analyst.sqlite"))).expect("store open")
}

pub fn orchestrator() -> (Arc<MemoryRunEventSink>, Orchestrator) {
    let sink = Arc::new(MemoryRunEventSink::new());
    let events: Arc<dyn RunEventSink> = sink.clone();
    let mut registry = PluginRegistry::new();
    register_all(&mut registry).expect("register verticals");
    (sink, Orchestrator::new(registry, AnomalyConfig::default(), events))
}

pub fn namespace(value: &str) -> MetaNamespace {
    MetaNamespace::parse(value).expect("namespace")
}

pub fn pharmacy(raw_id: Option<i64>, name: &str, status: Option<&str>) -> PharmacyRecord {
    PharmacyRecord {
        raw_id,
        name: Some(name.to_string()),
        address: Some(format!("{name} street 1")),
        municipality: Some("Valencia".to_string()),
        province: Some("Valencia".to_string()),
        status: status.map(str::to_string),
        checksum: raw_id.map(|id| format!("sum-{id}")),
    }
}

pub fn listing(
    auction_id: Option<i64>,
    title: &str,
    status: &str,
    opening_price: f64,
    appraisal_value: f64,
) -> AuctionListing {
    let uid = auction_id.map_or_else(|| "SUB-NONE".to_string(), |id| format!("SUB-{id:04}"));
    AuctionListing {
        auction_id,
        auction_uid: Some(uid.clone()),
        title: Some(title.to_string()),
        status: Some(status.to_string()),
        starts_on: Some("2026-03-01".to_string()),
        ends_on: Some("2026-03-21".to_string()),
        municipality: Some("Sevilla".to_string()),
        province: Some("Sevilla".to_string()),
        opening_price: Some(opening_price),
        appraisal_value: Some(appraisal_value),
        detail_url: Some(format!("https://auctions.example/{uid}")),
    }
}

pub fn partition_rows(
    session: &StoreSession,
    layout: &'static PartitionLayout,
    side: PartitionSide,
) -> Vec<PartitionRow> {
    let events: Arc<dyn RunEventSink> = Arc::new(MemoryRunEventSink::new());
    PartitionMaterializer::new(layout, events).expect("layout").rows(session, side).expect("rows")
}

pub fn partition_keys(
    session: &StoreSession,
    layout: &'static PartitionLayout,
    side: PartitionSide,
) -> Vec<i64> {
    partition_rows(session, layout, side).into_iter().map(|row| row.key.get()).collect()
}

pub fn keys_of(rows: &[PartitionRow]) -> Vec<NaturalKey> {
    rows.iter().map(|row| row.key).collect()
}

/// Returns `(key, summary, completeness)` for every listing summary row.
pub fn listing_summaries(session: &StoreSession) -> Vec<(i64, String, String)> {
    let events: Arc<dyn RunEventSink> = Arc::new(MemoryRunEventSink::new());
    PartitionMaterializer::new(&LISTING_LAYOUT, events)
        .and_then(|materializer| materializer.with_summary(&LISTING_SUMMARY))
        .expect("summary layout")
        .summary_rows(session)
        .expect("summary rows")
        .into_iter()
        .map(|row| match row.values.as_slice() {
            [SqlValue::Text(summary), SqlValue::Text(completeness)] => {
                (row.key.get(), summary.clone(), completeness.clone())
            }
            other => panic!("unexpected summary row: {other:?}"),
        })
        .collect()
}
