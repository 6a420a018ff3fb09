// crates/analyst-config/src/lib.rs
// ============================================================================
// Module: Analyst Config Library
// Description: Canonical config model and validation for the refresh engine.
// Purpose: Single source of truth for analyst.toml semantics.
// Dependencies: analyst-core, analyst-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! `analyst-config` defines the configuration model for the refresh engine:
//! store location and pragmas, anomaly thresholds, and the run event sink.
//! Validation is fail-closed; invalid values are fatal before any run.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
