// crates/analyst-cli/src/lib.rs
// ============================================================================
// Module: Analyst CLI Library
// Description: Command model and dispatcher behind the analyst binary.
// Purpose: Let the binary and integration tests share one dispatch path.
// Dependencies: clap, analyst-config, analyst-runtime, analyst-verticals
// ============================================================================

//! ## Overview
//! The binary entry point (`src/main.rs`) forwards process arguments, the
//! process environment, and the standard streams to [`run_with`]. Tests call
//! the same function with in-memory buffers and a fixed environment.
//!
//! Commands:
//! - `run --plugin NAME` executes one refresh and prints the run report.
//! - `runs --plugin NAME [--limit N]` lists recent runs, newest first.
//! - `plugins` lists the registered verticals.
//! - `config validate` loads and validates the configuration.

// ============================================================================
// SECTION: Modules
// ============================================================================

/// Argument model and command dispatcher.
pub mod commands;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use commands::Cli;
pub use commands::Commands;
pub use commands::run_with;
