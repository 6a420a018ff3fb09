// crates/analyst-core/tests/rules.rs
// ============================================================================
// Module: Quality and Anomaly Rule Tests
// Description: Validate zero-tolerance quality and anomaly rule outcomes.
// Purpose: Pin the verdicts the refresh engine depends on.
// Dependencies: analyst-core, serde, serde_json
// ============================================================================

//! ## Overview
//! Exercises the pure rule layer: per-field quality reports, the
//! all-or-nothing verdict, anomaly thresholds, and configuration validation.

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

// ============================================================================
// SECTION: Imports
// ============================================================================

use analyst_core::AnomalyConfig;
use analyst_core::AnomalyConfigError;
use analyst_core::AnomalyKind;
use analyst_core::NON_NEGATIVE_NOTE;
use analyst_core::QualityError;
use analyst_core::QualityRules;
use analyst_core::RunId;
use analyst_core::RunSummary;
use analyst_core::assess_quality;
use analyst_core::evaluate_anomalies;
use serde::Serialize;
use serde_json::json;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

#[derive(Serialize)]
struct Listing {
    uid: Option<String>,
    price: Option<f64>,
}

const RULES: QualityRules = QualityRules {
    required_non_null: &["uid"],
    non_negative: &["price"],
};

fn run_id() -> RunId {
    RunId::new("run-rules")
}

fn summary(processed: u64, errors: u64) -> RunSummary {
    RunSummary {
        run_id: run_id(),
        processed,
        errors,
    }
}

fn kinds(processed: u64, errors: u64, baseline: Option<f64>) -> Vec<AnomalyKind> {
    evaluate_anomalies(&summary(processed, errors), baseline, &AnomalyConfig::default())
        .into_iter()
        .map(|finding| finding.kind)
        .collect()
}

// ============================================================================
// SECTION: Quality
// ============================================================================

#[test]
fn clean_batch_passes() {
    let records = vec![
        Listing {
            uid: Some("a".into()),
            price: Some(10.0),
        },
        Listing {
            uid: Some("b".into()),
            price: Some(0.0),
        },
    ];
    let assessment = assess_quality(&run_id(), &records, &RULES).unwrap();
    assert!(assessment.passed());
    assert_eq!(assessment.failed_total(), 0);
    assert_eq!(assessment.reports.len(), 2);
    assert_eq!(assessment.reports[1].notes.as_deref(), Some(NON_NEGATIVE_NOTE));
}

#[test]
fn single_failure_rejects_batch() {
    let records = vec![
        Listing {
            uid: Some("a".into()),
            price: Some(10.0),
        },
        Listing {
            uid: None,
            price: Some(-1.0),
        },
        Listing {
            uid: Some("c".into()),
            price: Some(3.0),
        },
        Listing {
            uid: Some("d".into()),
            price: Some(4.0),
        },
    ];
    let assessment = assess_quality(&run_id(), &records, &RULES).unwrap();
    assert!(!assessment.passed());
    assert_eq!(assessment.failing_fields(), vec!["uid".to_string(), "price".to_string()]);
    assert_eq!(assessment.rejection_reason().as_deref(), Some("fields=uid,price"));
    let uid = &assessment.reports[0];
    assert_eq!((uid.total, uid.failed), (4, 1));
    assert!((uid.completeness - 0.75).abs() < f64::EPSILON);
}

#[test]
fn empty_batch_always_fails() {
    let records: Vec<Listing> = Vec::new();
    let assessment = assess_quality(&run_id(), &records, &RULES).unwrap();
    assert!(!assessment.passed());
    assert_eq!(assessment.rejection_reason().as_deref(), Some("empty dataset"));
    assert!(assessment.reports.iter().all(|report| report.completeness == 0.0));
}

#[test]
fn numeric_strings_satisfy_non_negative_rule() {
    let records = vec![json!({ "uid": "a", "price": "12.50" }), json!({ "uid": "b", "price": "n/a" })];
    let assessment = assess_quality(&run_id(), &records, &RULES).unwrap();
    assert_eq!(assessment.reports[1].failed, 1);
}

#[test]
fn non_object_records_are_rejected() {
    let records = vec![json!(1)];
    let err = assess_quality(&run_id(), &records, &RULES).unwrap_err();
    assert_eq!(err, QualityError::NotAnObject(0));
}

// ============================================================================
// SECTION: Anomalies
// ============================================================================

#[test]
fn volume_drop_respects_threshold() {
    assert_eq!(kinds(15, 0, Some(100.0)), vec![AnomalyKind::VolumeDrop]);
    assert!(kinds(25, 0, Some(100.0)).is_empty());
}

#[test]
fn zero_processed_with_baseline_flags_both() {
    assert_eq!(kinds(0, 0, Some(40.0)), vec![AnomalyKind::ZeroProcessed, AnomalyKind::VolumeDrop]);
}

#[test]
fn missing_baseline_skips_volume_rule() {
    assert_eq!(kinds(0, 2, None), vec![AnomalyKind::ZeroProcessed, AnomalyKind::ErrorSpike]);
}

#[test]
fn volume_drop_details_carry_baseline() {
    let findings = evaluate_anomalies(&summary(10, 0), Some(100.0), &AnomalyConfig::default());
    let details = &findings[0].details;
    assert_eq!(details["processed"], 10);
    assert_eq!(details["baseline_processed"], 100.0);
    assert_eq!(details["drop_pct"], 90.0);
}

#[test]
fn anomaly_config_rejects_zero_values() {
    assert_eq!(AnomalyConfig::new(0, 80), Err(AnomalyConfigError::BaselineDays));
    assert_eq!(AnomalyConfig::new(14, 0), Err(AnomalyConfigError::DropThreshold));
    let config = AnomalyConfig::new(7, 50).unwrap();
    assert_eq!((config.baseline_days(), config.drop_threshold_pct()), (7, 50));
    assert_eq!(AnomalyConfig::default().baseline_days(), 14);
    assert_eq!(AnomalyConfig::default().drop_threshold_pct(), 80);
}
