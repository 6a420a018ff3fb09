// crates/analyst-runtime/src/lib.rs
// ============================================================================
// Module: Analyst Runtime Library
// Description: Public API surface for plugin orchestration.
// Purpose: Expose the plugin contract, registry, and run orchestrator.
// Dependencies: crate::{orchestrator, plugin, registry}
// ============================================================================

//! ## Overview
//! The runtime ties the store components into one run path per vertical and
//! maps its outcome onto process exit codes.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod orchestrator;
pub mod plugin;
pub mod registry;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use orchestrator::ENGINE_VERSION;
pub use orchestrator::Orchestrator;
pub use orchestrator::RunExit;
pub use orchestrator::RunReport;
pub use plugin::PluginContext;
pub use plugin::PluginError;
pub use plugin::PluginOutcome;
pub use plugin::VerticalPlugin;
pub use registry::PluginRegistry;
pub use registry::RegisteredPlugin;
pub use registry::RegistryError;
