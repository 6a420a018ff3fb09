// crates/analyst-store-sqlite/src/lib.rs
// ============================================================================
// Module: Analyst SQLite Store
// Description: SQLite persistence for the analyst refresh engine.
// Purpose: Provide locking, run ledger, quarantine, quality, anomaly, and
//          partition persistence over one explicit session.
// Dependencies: analyst-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Every component takes a [`StoreSession`] explicitly; there is no global
//! connection. Metadata relations are scoped by [`analyst_core::MetaNamespace`]
//! so verticals sharing one database file never see each other's rows.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod anomaly;
pub mod dead_letters;
pub mod ledger;
pub mod lock;
pub mod partition;
pub mod quality;
pub mod session;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use anomaly::AnomalyDetector;
pub use dead_letters::DeadLetterSink;
pub use ledger::RunLedger;
pub use lock::HeldLock;
pub use lock::RunLock;
pub use partition::ColumnType;
pub use partition::MaterializeCounts;
pub use partition::PartitionColumn;
pub use partition::PartitionLayout;
pub use partition::PartitionMaterializer;
pub use partition::PartitionRecord;
pub use partition::PartitionRow;
pub use partition::PartitionSide;
pub use partition::SummaryLayout;
pub use quality::QualityGate;
pub use quality::QualityGateError;
pub use rusqlite::types::Value as SqlValue;
pub use session::SqliteStoreConfig;
pub use session::StoreError;
pub use session::StoreSession;
