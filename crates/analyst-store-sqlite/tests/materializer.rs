// crates/analyst-store-sqlite/tests/materializer.rs
// ============================================================================
// Module: Partition Materializer Tests
// Description: Validate transactional partition publication.
// Purpose: Ensure quarantine, idempotence, and migration pruning hold.
// Dependencies: analyst-store-sqlite, analyst-core, tempfile
// ============================================================================

//! ## Overview
//! Exercises the materializer end to end against a temporary database:
//! dead-letter routing, repeatable upserts, current/historical migration,
//! and rollback behavior.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

mod common;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use analyst_core::MAX_EXCERPT_CHARS;
use analyst_core::NaturalKey;
use analyst_core::NoopRunEventSink;
use analyst_core::RunId;
use analyst_store_sqlite::DeadLetterSink;
use analyst_store_sqlite::PartitionMaterializer;
use analyst_store_sqlite::PartitionSide;
use analyst_store_sqlite::SqlValue;
use analyst_store_sqlite::StoreError;
use analyst_store_sqlite::SummaryLayout;
use tempfile::TempDir;

use crate::common::DEMO_LAYOUT;
use crate::common::DEMO_SUMMARY;
use crate::common::DemoRecord;
use crate::common::MISMATCHED_LAYOUT;
use crate::common::memory_events;
use crate::common::namespace;
use crate::common::open_session;
use crate::common::table_count;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn materializer() -> PartitionMaterializer {
    PartitionMaterializer::new(&DEMO_LAYOUT, Arc::new(NoopRunEventSink)).unwrap()
}

fn keys(values: &[i64]) -> Vec<NaturalKey> {
    values.iter().copied().map(NaturalKey::new).collect()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn invalid_records_are_quarantined_and_skipped() {
    let temp = TempDir::new().unwrap();
    let session = open_session(temp.path());
    let run_id = RunId::new("run-10-3");
    let mut current: Vec<DemoRecord> =
        (1 ..= 10).map(|id| DemoRecord::valid(id, &format!("item-{id}"), 2.5)).collect();
    current.push(DemoRecord::missing_id("orphan-a"));
    current.push(DemoRecord::missing_id("orphan-b"));
    let historical = vec![DemoRecord {
        raw_id: Some(99),
        name: None,
        price: 1.0,
    }];

    let counts = materializer().apply(&session, &namespace(), &run_id, &current, &historical).unwrap();
    assert_eq!((counts.processed, counts.errors), (10, 3));

    let letters = DeadLetterSink::new(Arc::new(NoopRunEventSink))
        .for_run(&session, &namespace(), &run_id)
        .unwrap();
    assert_eq!(letters.len(), 3);
    assert!(letters.iter().all(|letter| letter.reason == "missing_key_fields"));
    assert_eq!(letters[2].raw_id.as_deref(), Some("99"));
    assert!(letters[0].payload_excerpt.as_deref().unwrap().contains("orphan-a"));

    let materializer = materializer();
    assert_eq!(materializer.keys(&session, PartitionSide::Current).unwrap().len(), 10);
    assert!(materializer.keys(&session, PartitionSide::Historical).unwrap().is_empty());
}

#[test]
fn reapplying_identical_batch_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let session = open_session(temp.path());
    let materializer = materializer();
    let current = vec![DemoRecord::valid(1, "a", 1.0), DemoRecord::valid(2, "b", 2.0)];
    let historical = vec![DemoRecord::valid(3, "c", 3.0)];

    materializer.apply(&session, &namespace(), &RunId::new("r1"), &current, &historical).unwrap();
    let first_current = materializer.rows(&session, PartitionSide::Current).unwrap();
    let first_historical = materializer.rows(&session, PartitionSide::Historical).unwrap();
    materializer.apply(&session, &namespace(), &RunId::new("r2"), &current, &historical).unwrap();

    assert_eq!(materializer.rows(&session, PartitionSide::Current).unwrap(), first_current);
    assert_eq!(materializer.rows(&session, PartitionSide::Historical).unwrap(), first_historical);
}

#[test]
fn upsert_overwrites_every_column() {
    let temp = TempDir::new().unwrap();
    let session = open_session(temp.path());
    let materializer = materializer();
    let none: Vec<DemoRecord> = Vec::new();

    materializer
        .apply(&session, &namespace(), &RunId::new("r1"), &[DemoRecord::valid(7, "old", 1.0)], &none)
        .unwrap();
    materializer
        .apply(&session, &namespace(), &RunId::new("r2"), &[DemoRecord::valid(7, "new", 9.5)], &none)
        .unwrap();

    let rows = materializer.rows(&session, PartitionSide::Current).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].values, vec![SqlValue::Text("new".into()), SqlValue::Real(9.5)]);
}

#[test]
fn record_flipping_to_historical_is_demoted() {
    let temp = TempDir::new().unwrap();
    let session = open_session(temp.path());
    let materializer = materializer();
    let none: Vec<DemoRecord> = Vec::new();

    materializer
        .apply(
            &session,
            &namespace(),
            &RunId::new("r1"),
            &[DemoRecord::valid(1, "a", 1.0), DemoRecord::valid(2, "b", 1.0)],
            &none,
        )
        .unwrap();
    let counts = materializer
        .apply(
            &session,
            &namespace(),
            &RunId::new("r2"),
            &[DemoRecord::valid(2, "b", 1.0)],
            &[DemoRecord::valid(1, "a", 1.0)],
        )
        .unwrap();

    assert_eq!((counts.demoted, counts.promoted), (1, 0));
    assert_eq!(materializer.keys(&session, PartitionSide::Current).unwrap(), keys(&[2]));
    assert_eq!(materializer.keys(&session, PartitionSide::Historical).unwrap(), keys(&[1]));
}

#[test]
fn record_returning_to_current_is_promoted() {
    let temp = TempDir::new().unwrap();
    let session = open_session(temp.path());
    let materializer = materializer();
    let none: Vec<DemoRecord> = Vec::new();

    materializer
        .apply(&session, &namespace(), &RunId::new("r1"), &none, &[DemoRecord::valid(5, "e", 1.0)])
        .unwrap();
    let counts = materializer
        .apply(&session, &namespace(), &RunId::new("r2"), &[DemoRecord::valid(5, "e", 1.0)], &none)
        .unwrap();

    assert_eq!((counts.demoted, counts.promoted), (0, 1));
    assert_eq!(materializer.keys(&session, PartitionSide::Current).unwrap(), keys(&[5]));
    assert!(materializer.keys(&session, PartitionSide::Historical).unwrap().is_empty());
}

#[test]
fn key_in_both_batches_ends_up_historical() {
    let temp = TempDir::new().unwrap();
    let session = open_session(temp.path());
    let materializer = materializer();

    materializer
        .apply(
            &session,
            &namespace(),
            &RunId::new("r1"),
            &[DemoRecord::valid(4, "d", 1.0)],
            &[DemoRecord::valid(4, "d", 1.0)],
        )
        .unwrap();

    assert!(materializer.keys(&session, PartitionSide::Current).unwrap().is_empty());
    assert_eq!(materializer.keys(&session, PartitionSide::Historical).unwrap(), keys(&[4]));
}

#[test]
fn failed_transaction_publishes_nothing_but_keeps_dead_letters() {
    let temp = TempDir::new().unwrap();
    let session = open_session(temp.path());
    let run_id = RunId::new("run-rollback");
    let broken = PartitionMaterializer::new(&MISMATCHED_LAYOUT, Arc::new(NoopRunEventSink)).unwrap();
    let current = vec![DemoRecord::missing_id("orphan"), DemoRecord::valid(1, "a", 1.0)];
    let none: Vec<DemoRecord> = Vec::new();

    let err = broken.apply(&session, &namespace(), &run_id, &current, &none).unwrap_err();
    assert!(matches!(err, StoreError::Invalid(_)));
    let letters = DeadLetterSink::new(Arc::new(NoopRunEventSink))
        .for_run(&session, &namespace(), &run_id)
        .unwrap();
    assert!(letters.is_empty(), "validation failure aborts before quarantine writes");

    // Quarantine happens before the publication transaction, which is then
    // forced to fail on a constraint.
    let materializer = materializer();
    let batch = vec![DemoRecord::missing_id("orphan"), DemoRecord::valid(1, "a", 1.0)];
    session
        .with_connection(|connection| {
            connection
                .execute_batch(
                    "CREATE TABLE demo_current_items (raw_id INTEGER PRIMARY KEY, name TEXT \
                     CHECK (name <> 'a'), price REAL, updated_at INTEGER NOT NULL)",
                )
                .map_err(|err| StoreError::Db(err.to_string()))
        })
        .unwrap();
    let err = materializer.apply(&session, &namespace(), &run_id, &batch, &none).unwrap_err();
    assert!(matches!(err, StoreError::Db(_)));
    let letters = DeadLetterSink::new(Arc::new(NoopRunEventSink))
        .for_run(&session, &namespace(), &run_id)
        .unwrap();
    assert_eq!(letters.len(), 1);
    assert!(materializer.keys(&session, PartitionSide::Current).unwrap().is_empty());
    assert!(materializer.keys(&session, PartitionSide::Historical).unwrap().is_empty());
}

#[test]
fn dead_letter_excerpts_are_truncated() {
    let temp = TempDir::new().unwrap();
    let session = open_session(temp.path());
    let run_id = RunId::new("run-long");
    let long_name = "x".repeat(MAX_EXCERPT_CHARS * 2);
    let none: Vec<DemoRecord> = Vec::new();

    materializer()
        .apply(&session, &namespace(), &run_id, &[DemoRecord::missing_id(&long_name)], &none)
        .unwrap();
    let letters = DeadLetterSink::new(Arc::new(NoopRunEventSink))
        .for_run(&session, &namespace(), &run_id)
        .unwrap();
    let excerpt = letters[0].payload_excerpt.as_deref().unwrap();
    assert_eq!(excerpt.chars().count(), MAX_EXCERPT_CHARS + 3);
    assert!(excerpt.ends_with("..."));
}

#[test]
fn materialization_emits_counts_event() {
    let temp = TempDir::new().unwrap();
    let session = open_session(temp.path());
    let (sink, events) = memory_events();
    let materializer = PartitionMaterializer::new(&DEMO_LAYOUT, events).unwrap();
    let none: Vec<DemoRecord> = Vec::new();

    materializer
        .apply(
            &session,
            &namespace(),
            &RunId::new("r1"),
            &[DemoRecord::valid(1, "a", 1.0), DemoRecord::missing_id("b")],
            &none,
        )
        .unwrap();

    assert_eq!(sink.names(), vec!["dead_letter_recorded", "partitions_materialized"]);
    let event = sink.events().pop().unwrap();
    assert_eq!(event.field("processed"), Some(&serde_json::json!(1)));
    assert_eq!(event.field("errors"), Some(&serde_json::json!(1)));
}

#[test]
fn reads_before_first_publication_are_empty_and_create_nothing() {
    let temp = TempDir::new().unwrap();
    let session = open_session(temp.path());
    let materializer = materializer().with_summary(&DEMO_SUMMARY).unwrap();

    assert!(materializer.rows(&session, PartitionSide::Current).unwrap().is_empty());
    assert!(materializer.keys(&session, PartitionSide::Historical).unwrap().is_empty());
    assert!(materializer.summary_rows(&session).unwrap().is_empty());
    for table in ["demo_current_items", "demo_historical_items", "demo_item_summaries"] {
        assert_eq!(table_count(&session, table), 0, "{table} created by a read");
    }
}

#[test]
fn summaries_cover_every_published_record() {
    let temp = TempDir::new().unwrap();
    let session = open_session(temp.path());
    let (sink, events) = memory_events();
    let materializer =
        PartitionMaterializer::new(&DEMO_LAYOUT, events).unwrap().with_summary(&DEMO_SUMMARY).unwrap();

    let counts = materializer
        .apply(
            &session,
            &namespace(),
            &RunId::new("r1"),
            &[DemoRecord::valid(1, "a", 2.5), DemoRecord::valid(2, "b", 1.0), DemoRecord::missing_id("c")],
            &[DemoRecord::valid(3, "d", 4.0)],
        )
        .unwrap();

    assert_eq!((counts.processed, counts.errors, counts.summarized), (3, 1, 3));
    let summaries = materializer.summary_rows(&session).unwrap();
    assert_eq!(summaries.iter().map(|row| row.key).collect::<Vec<_>>(), keys(&[1, 2, 3]));
    assert_eq!(summaries[0].values, vec![SqlValue::Text("a@2.5".to_string())]);
    assert_eq!(summaries[2].values, vec![SqlValue::Text("d@4".to_string())]);
    let event = sink.events().pop().unwrap();
    assert_eq!(event.field("summarized"), Some(&serde_json::json!(3)));
}

#[test]
fn materializer_without_summary_writes_none() {
    let temp = TempDir::new().unwrap();
    let session = open_session(temp.path());
    let none: Vec<DemoRecord> = Vec::new();

    let counts = materializer()
        .apply(&session, &namespace(), &RunId::new("r1"), &[DemoRecord::valid(1, "a", 1.0)], &none)
        .unwrap();

    assert_eq!(counts.summarized, 0);
    assert_eq!(table_count(&session, "demo_item_summaries"), 0);
}

#[test]
fn summary_layout_must_not_reuse_partition_tables() {
    static COLLIDING: SummaryLayout = SummaryLayout {
        table: "demo_current_items",
        columns: &[],
    };
    static KEYED: SummaryLayout = SummaryLayout {
        table: "demo_item_summaries",
        columns: &[analyst_store_sqlite::PartitionColumn::new(
            "raw_id",
            analyst_store_sqlite::ColumnType::Integer,
        )],
    };
    assert!(matches!(materializer().with_summary(&COLLIDING), Err(StoreError::Invalid(_))));
    assert!(matches!(materializer().with_summary(&KEYED), Err(StoreError::Invalid(_))));
    assert!(materializer().with_summary(&DEMO_SUMMARY).is_ok());
}
