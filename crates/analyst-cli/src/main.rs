// crates/analyst-cli/src/main.rs
// ============================================================================
// Module: Analyst CLI Entry Point
// Description: Process entry point for the analyst binary.
// Purpose: Bind process arguments, environment, and streams to the dispatcher.
// Dependencies: analyst-cli
// ============================================================================

//! ## Overview
//! Thin wrapper over [`analyst_cli::run_with`]; the exit code it returns is
//! the process exit status.

use std::process::ExitCode;

/// Runs the dispatcher against the real process environment.
fn main() -> ExitCode {
    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();
    let code = analyst_cli::run_with(
        std::env::args_os(),
        |key| std::env::var(key).ok(),
        &mut stdout,
        &mut stderr,
    );
    ExitCode::from(code)
}
