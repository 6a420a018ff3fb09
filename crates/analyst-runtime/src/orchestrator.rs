// crates/analyst-runtime/src/orchestrator.rs
// ============================================================================
// Module: Run Orchestrator
// Description: Single run path from plugin resolution to lock release.
// Purpose: Compose locking, ledger, plugin execution, and anomaly detection.
// Dependencies: analyst-core, analyst-store-sqlite, serde
// ============================================================================

//! ## Overview
//! One call to [`Orchestrator::run`] executes one refresh of one vertical:
//!
//! 1. resolve the plugin (unknown: exit 2, no run row);
//! 2. acquire the vertical lock (held elsewhere: exit 3, no run row);
//! 3. open a run in the ledger;
//! 4. invoke the plugin; any error closes the run as `FAILED` (exit 4);
//! 5. on success detect anomalies, then close the run as `SUCCESS` (exit 0).
//!
//! The lock guard is dropped last on every path after acquisition. Secondary
//! failures while closing a failed run are reported as events and swallowed.
//! There are no retries inside a run.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use analyst_core::Anomaly;
use analyst_core::AnomalyConfig;
use analyst_core::LockKey;
use analyst_core::MetaNamespace;
use analyst_core::Run;
use analyst_core::RunCompletion;
use analyst_core::RunEvent;
use analyst_core::RunEventSink;
use analyst_core::RunId;
use analyst_core::RunSummary;
use analyst_store_sqlite::AnomalyDetector;
use analyst_store_sqlite::RunLedger;
use analyst_store_sqlite::RunLock;
use analyst_store_sqlite::StoreSession;
use serde::Serialize;

use crate::plugin::PluginContext;
use crate::plugin::PluginOutcome;
use crate::registry::PluginRegistry;
use crate::registry::RegisteredPlugin;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Engine version recorded on every run.
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// SECTION: Exit Codes
// ============================================================================

/// Process exit classification of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunExit {
    /// Run published successfully.
    Success,
    /// Unknown plugin, bad argument, or invalid configuration.
    InvalidRequest,
    /// Vertical lock held by another writer.
    LockNotAcquired,
    /// Execution failed (including quality gate rejection).
    ExecutionFailed,
}

impl RunExit {
    /// Returns the process exit code.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::InvalidRequest => 2,
            Self::LockNotAcquired => 3,
            Self::ExecutionFailed => 4,
        }
    }
}

/// Result of one orchestrated run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    /// Exit classification.
    pub exit: RunExit,
    /// Requested plugin name (trimmed).
    pub plugin: String,
    /// Run identifier when a run row was opened.
    pub run_id: Option<RunId>,
    /// Plugin counters on success.
    pub outcome: Option<PluginOutcome>,
    /// Anomalies detected on success.
    pub anomalies: Vec<Anomaly>,
    /// Error message on failure.
    pub error: Option<String>,
}

impl RunReport {
    /// Builds a report for a run that never opened a ledger row.
    fn without_run(exit: RunExit, plugin: &str, error: Option<String>) -> Self {
        Self {
            exit,
            plugin: plugin.to_string(),
            run_id: None,
            outcome: None,
            anomalies: Vec::new(),
            error,
        }
    }

    /// Builds a report for a run that closed as failed.
    fn failed(plugin: &str, run_id: RunId, error: String) -> Self {
        Self {
            exit: RunExit::ExecutionFailed,
            plugin: plugin.to_string(),
            run_id: Some(run_id),
            outcome: None,
            anomalies: Vec::new(),
            error: Some(error),
        }
    }
}

// ============================================================================
// SECTION: Orchestrator
// ============================================================================

/// Drives plugin runs against one store.
pub struct Orchestrator {
    /// Read-only plugin catalog.
    registry: PluginRegistry,
    /// Process-lifetime lock manager.
    lock: RunLock,
    /// Run ledger.
    ledger: RunLedger,
    /// Post-run anomaly detector.
    detector: AnomalyDetector,
    /// Event sink shared with plugins.
    events: Arc<dyn RunEventSink>,
}

impl Orchestrator {
    /// Creates an orchestrator over a populated registry.
    #[must_use]
    pub fn new(
        registry: PluginRegistry,
        anomaly: AnomalyConfig,
        events: Arc<dyn RunEventSink>,
    ) -> Self {
        Self {
            registry,
            lock: RunLock::new(Arc::clone(&events)),
            ledger: RunLedger::new(Arc::clone(&events)),
            detector: AnomalyDetector::new(anomaly, Arc::clone(&events)),
            events,
        }
    }

    /// Returns the plugin registry.
    #[must_use]
    pub const fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Returns the lock manager (for diagnostics such as release failures).
    #[must_use]
    pub const fn lock(&self) -> &RunLock {
        &self.lock
    }

    /// Returns the run ledger.
    #[must_use]
    pub const fn ledger(&self) -> &RunLedger {
        &self.ledger
    }

    /// Executes one run of `plugin_name`.
    pub fn run(&self, session: &StoreSession, plugin_name: &str) -> RunReport {
        let name = plugin_name.trim();
        let Some(registered) = self.registry.resolve(name) else {
            self.events.record(&RunEvent::error("plugin_unknown").with("plugin", name));
            return RunReport::without_run(
                RunExit::InvalidRequest,
                name,
                Some(format!("unknown plugin: {name:?}")),
            );
        };
        let namespace = registered.namespace();
        let key = LockKey::for_plugin(registered.plugin().name());

        let guard = match self.lock.acquire_guard(session, namespace, &key) {
            Ok(Some(guard)) => guard,
            Ok(None) => {
                return RunReport::without_run(
                    RunExit::LockNotAcquired,
                    name,
                    Some(format!("lock not acquired: {key}")),
                );
            }
            Err(err) => {
                return RunReport::without_run(RunExit::ExecutionFailed, name, Some(err.to_string()));
            }
        };

        let report = self.run_locked(session, registered, name);
        drop(guard);
        report
    }

    /// Runs the ledger and plugin steps while the lock is held.
    fn run_locked(
        &self,
        session: &StoreSession,
        registered: &RegisteredPlugin,
        name: &str,
    ) -> RunReport {
        let plugin = registered.plugin();
        let namespace = registered.namespace();
        let identity = format!("{}@{}", plugin.name(), plugin.version());
        let run = match self.ledger.start(session, namespace, &identity, ENGINE_VERSION) {
            Ok(run) => run,
            Err(err) => {
                self.events.record(
                    &RunEvent::error("run_error")
                        .with("namespace", namespace.as_str())
                        .with("plugin", identity.as_str())
                        .with("error", err.to_string()),
                );
                return RunReport::without_run(RunExit::ExecutionFailed, name, Some(err.to_string()));
            }
        };

        let context = PluginContext {
            session,
            namespace,
            run_id: &run.run_id,
            events: &self.events,
        };
        let outcome = match plugin.materialize(&context) {
            Ok(outcome) => outcome,
            Err(err) => return self.fail(session, namespace, &run, name, &err.to_string()),
        };

        let summary = RunSummary {
            run_id: run.run_id.clone(),
            processed: outcome.processed,
            errors: outcome.errors,
        };
        let anomalies = self.detector.detect(session, namespace, &summary);
        let completion =
            RunCompletion::success(outcome.processed, outcome.errors, outcome.notes.clone());
        if let Err(err) = self.ledger.finish(session, namespace, &run.run_id, &completion) {
            return self.fail(session, namespace, &run, name, &err.to_string());
        }
        RunReport {
            exit: RunExit::Success,
            plugin: name.to_string(),
            run_id: Some(run.run_id),
            outcome: Some(outcome),
            anomalies,
            error: None,
        }
    }

    /// Closes a run as failed; secondary failures are reported and swallowed.
    fn fail(
        &self,
        session: &StoreSession,
        namespace: &MetaNamespace,
        run: &Run,
        name: &str,
        message: &str,
    ) -> RunReport {
        self.events.record(
            &RunEvent::error("run_error")
                .with("namespace", namespace.as_str())
                .with("run_id", run.run_id.as_str())
                .with("error", message),
        );
        if let Err(err) =
            self.ledger.finish(session, namespace, &run.run_id, &RunCompletion::failed(message))
        {
            self.events.record(
                &RunEvent::error("run_finish_error")
                    .with("namespace", namespace.as_str())
                    .with("run_id", run.run_id.as_str())
                    .with("error", err.to_string()),
            );
        }
        RunReport::failed(name, run.run_id.clone(), message.to_string())
    }
}
