// crates/analyst-runtime/tests/common/mod.rs
// =============================================================================
// Module: Runtime Test Helpers
// Description: Scripted plugins and store helpers for orchestration tests.
// Purpose: Reduce duplication across integration tests for analyst-runtime.
// =============================================================================

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]

use std::path::Path;
use std::sync::Arc;

use analyst_core::QualityRules;
use analyst_runtime::PluginContext;
use analyst_runtime::PluginError;
use analyst_runtime::PluginOutcome;
use analyst_runtime::PluginRegistry;
use analyst_runtime::VerticalPlugin;
use analyst_store_sqlite::QualityGate;
use analyst_store_sqlite::SqliteStoreConfig;
use analyst_store_sqlite::StoreError;
use analyst_store_sqlite::StoreSession;
use serde_json::Value;

/// Behavior of a [`ScriptedPlugin`].
#[derive(Debug, Clone, Copy)]
pub enum Script {
    /// Returns the given counters.
    Succeed { processed: u64, errors: u64 },
    /// Fails with a source error.
    Fail(&'static str),
    /// Runs the quality gate on an empty batch.
    RejectEmptyBatch,
    /// Drops the lock table mid-run, then succeeds.
    DropLockTable,
}

/// Plugin whose behavior is fixed by a [`Script`].
pub struct ScriptedPlugin {
    pub name: &'static str,
    pub namespace: &'static str,
    pub script: Script,
}

impl ScriptedPlugin {
    pub fn new(name: &'static str, script: Script) -> Self {
        Self {
            name,
            namespace: "scripted_meta",
            script,
        }
    }
}

impl VerticalPlugin for ScriptedPlugin {
    fn name(&self) -> &str {
        self.name
    }

    fn version(&self) -> &str {
        "9.9.9"
    }

    fn meta_namespace(&self) -> &str {
        self.namespace
    }

    fn materialize(&self, context: &PluginContext<'_>) -> Result<PluginOutcome, PluginError> {
        match self.script {
            Script::Succeed {
                processed,
                errors,
            } => Ok(PluginOutcome {
                processed,
                errors,
                notes: Some("scripted".to_string()),
            }),
            Script::Fail(message) => Err(PluginError::Source(message.to_string())),
            Script::RejectEmptyBatch => {
                let rules = QualityRules {
                    required_non_null: &["name"],
                    non_negative: &[],
                };
                let records: Vec<Value> = Vec::new();
                QualityGate::new(Arc::clone(context.events)).evaluate(
                    context.session,
                    context.namespace,
                    context.run_id,
                    &records,
                    &rules,
                )?;
                Ok(PluginOutcome::default())
            }
            Script::DropLockTable => {
                context.session.with_connection(|connection| {
                    connection
                        .execute_batch("DROP TABLE job_locks")
                        .map_err(|err| StoreError::Db(err.to_string()))
                })?;
                Ok(PluginOutcome {
                    processed: 1,
                    errors: 0,
                    notes: None,
                })
            }
        }
    }
}

/// Opens a session on `dir/analyst.sqlite`.
pub fn open_session(dir: &Path) -> StoreSession {
    StoreSession::open(&SqliteStoreConfig::for_path(dir.join("analyst.sqlite"))).expect("store open")
}

/// Builds a registry holding the given plugins.
pub fn registry_with(plugins: Vec<ScriptedPlugin>) -> PluginRegistry {
    let mut registry = PluginRegistry::new();
    for plugin in plugins {
        registry.register(Arc::new(plugin)).expect("register plugin");
    }
    registry
}

/// Counts every run row regardless of namespace.
pub fn count_runs(session: &StoreSession) -> i64 {
    session
        .with_connection(|connection| {
            connection
                .query_row("SELECT COUNT(1) FROM analyst_runs", [], |row| row.get(0))
                .map_err(|err| StoreError::Db(err.to_string()))
        })
        .expect("count runs")
}
