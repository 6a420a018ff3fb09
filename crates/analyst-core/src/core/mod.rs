// crates/analyst-core/src/core/mod.rs
// ============================================================================
// Module: Analyst Core Types
// Description: Canonical run, quarantine, quality, and anomaly structures.
// Purpose: Provide stable, serializable types shared by store and runtime.
// Dependencies: serde, serde_json, thiserror, uuid
// ============================================================================

//! ## Overview
//! Core types describe run provenance and the per-run artifacts produced by
//! a refresh: dead letters, quality reports, and anomalies. Pure rules
//! (quality assessment, anomaly evaluation) live next to their types so the
//! store crate only handles persistence.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod anomaly;
pub mod dead_letter;
pub mod identifiers;
pub mod quality;
pub mod run;
pub mod time;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use anomaly::Anomaly;
pub use anomaly::AnomalyConfig;
pub use anomaly::AnomalyConfigError;
pub use anomaly::AnomalyFinding;
pub use anomaly::AnomalyKind;
pub use anomaly::DEFAULT_BASELINE_DAYS;
pub use anomaly::DEFAULT_DROP_THRESHOLD_PCT;
pub use anomaly::evaluate_anomalies;
pub use dead_letter::DeadLetter;
pub use dead_letter::DeadLetterInput;
pub use dead_letter::EXCERPT_MARKER;
pub use dead_letter::MAX_EXCERPT_CHARS;
pub use dead_letter::RecordRejection;
pub use dead_letter::truncate_excerpt;
pub use identifiers::AnomalyId;
pub use identifiers::DeadLetterId;
pub use identifiers::IdentifierError;
pub use identifiers::LockKey;
pub use identifiers::MAX_NAMESPACE_LENGTH;
pub use identifiers::MetaNamespace;
pub use identifiers::NaturalKey;
pub use identifiers::RunId;
pub use identifiers::is_snake_identifier;
pub use quality::NON_NEGATIVE_NOTE;
pub use quality::QualityAssessment;
pub use quality::QualityError;
pub use quality::QualityReport;
pub use quality::QualityRules;
pub use quality::assess_quality;
pub use quality::completeness;
pub use run::Run;
pub use run::RunCompletion;
pub use run::RunStatus;
pub use run::RunSummary;
pub use run::UnknownRunStatus;
pub use time::MILLIS_PER_DAY;
pub use time::unix_millis;
pub use time::window_start_millis;
