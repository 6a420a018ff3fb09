// crates/analyst-runtime/src/plugin.rs
// ============================================================================
// Module: Vertical Plugin Contract
// Description: Trait and context shared by every data vertical.
// Purpose: Define the surface the orchestrator drives for one refresh.
// Dependencies: analyst-core, analyst-store-sqlite, serde, thiserror
// ============================================================================

//! ## Overview
//! A vertical plugin owns its source ingestion, quality rules, and partition
//! layout. The orchestrator hands it a [`PluginContext`] carrying the session,
//! the validated metadata namespace, the open run, and the event sink; the
//! plugin reports its counters through a [`PluginOutcome`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use analyst_core::MetaNamespace;
use analyst_core::RunEventSink;
use analyst_core::RunId;
use analyst_store_sqlite::QualityGateError;
use analyst_store_sqlite::StoreError;
use analyst_store_sqlite::StoreSession;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Context
// ============================================================================

/// Resources available to a plugin for the duration of one run.
pub struct PluginContext<'a> {
    /// Session shared with the orchestrator.
    pub session: &'a StoreSession,
    /// Validated metadata namespace of the plugin.
    pub namespace: &'a MetaNamespace,
    /// Run being executed.
    pub run_id: &'a RunId,
    /// Event sink for plugin-level events.
    pub events: &'a Arc<dyn RunEventSink>,
}

/// Counters reported by a successful plugin run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct PluginOutcome {
    /// Records published.
    pub processed: u64,
    /// Records quarantined.
    pub errors: u64,
    /// Free-form summary recorded on the run.
    pub notes: Option<String>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors a plugin can raise; every variant fails the run.
#[derive(Debug, Error)]
pub enum PluginError {
    /// Quality gate rejected the batch or could not evaluate it.
    #[error(transparent)]
    Quality(#[from] QualityGateError),
    /// Persistence failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Source data could not be read or interpreted.
    #[error("source error: {0}")]
    Source(String),
}

// ============================================================================
// SECTION: Plugin Trait
// ============================================================================

/// Data vertical driven by the orchestrator.
///
/// # Invariants
/// - `name`, `version`, and `meta_namespace` are constant for the lifetime of
///   the value.
/// - `materialize` either publishes the whole batch or returns an error.
pub trait VerticalPlugin: Send + Sync {
    /// Returns the registry name (also the lock key suffix).
    fn name(&self) -> &str;

    /// Returns the plugin version recorded on runs.
    fn version(&self) -> &str;

    /// Returns the metadata namespace owned by the plugin.
    fn meta_namespace(&self) -> &str;

    /// Ingests, gates, and publishes one batch.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError`] when any step fails; the run is then marked
    /// failed.
    fn materialize(&self, context: &PluginContext<'_>) -> Result<PluginOutcome, PluginError>;
}
