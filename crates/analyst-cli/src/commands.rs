// crates/analyst-cli/src/commands.rs
// ============================================================================
// Module: Analyst CLI Commands
// Description: Argument model and command dispatcher for the analyst binary.
// Purpose: Map CLI invocations onto config, store, and orchestrator calls.
// Dependencies: analyst-config, analyst-runtime, analyst-verticals, clap, serde_json
// ============================================================================

//! ## Overview
//! The dispatcher is written against injected output streams and an
//! injected environment lookup so the binary and the tests share one path.
//! Exit codes follow the run contract: `0` success, `2` bad argument, unknown
//! plugin, or invalid configuration, `3` lock not acquired, `4` execution
//! failure (including a store that cannot be opened).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::ffi::OsString;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use analyst_config::AnalystConfig;
use analyst_runtime::Orchestrator;
use analyst_runtime::PluginRegistry;
use analyst_runtime::RegisteredPlugin;
use analyst_runtime::RunExit;
use analyst_store_sqlite::RunLedger;
use analyst_store_sqlite::StoreSession;
use analyst_verticals::register_all;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default number of runs listed by `runs`.
const DEFAULT_RUNS_LIMIT: u32 = 20;
/// Maximum number of runs listed by `runs`.
const MAX_RUNS_LIMIT: i64 = 1_000;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "analyst", version, disable_help_subcommand = true)]
pub struct Cli {
    /// Config file path (overrides `ANALYST_CONFIG`).
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute one refresh of a vertical.
    Run(RunCommand),
    /// List recent runs of a vertical, newest first.
    Runs(RunsCommand),
    /// List registered verticals.
    Plugins,
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Arguments for `run`.
#[derive(Args, Debug)]
pub struct RunCommand {
    /// Vertical to refresh.
    #[arg(long, value_name = "NAME")]
    pub plugin: String,
}

/// Arguments for `runs`.
#[derive(Args, Debug)]
pub struct RunsCommand {
    /// Vertical whose runs are listed.
    #[arg(long, value_name = "NAME")]
    pub plugin: String,
    /// Maximum number of runs to list.
    #[arg(
        long,
        default_value_t = DEFAULT_RUNS_LIMIT,
        value_parser = clap::value_parser!(u32).range(1 ..= MAX_RUNS_LIMIT)
    )]
    pub limit: u32,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Load and validate the configuration.
    Validate,
}

/// Line emitted per plugin by `plugins`.
#[derive(Debug, Serialize)]
struct PluginListing<'a> {
    /// Plugin name.
    name: &'a str,
    /// Plugin version.
    version: &'a str,
    /// Metadata namespace.
    namespace: &'a str,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Failures surfaced by the dispatcher.
#[derive(Debug, Error)]
enum CliError {
    /// Bad argument, unknown plugin, or invalid configuration.
    #[error("{0}")]
    Invalid(String),
    /// Store or registry failure.
    #[error("{0}")]
    Execution(String),
    /// Output stream could not be written.
    #[error("failed to write {stream}: {error}")]
    Output {
        /// Stream label.
        stream: &'static str,
        /// Underlying I/O error.
        error: std::io::Error,
    },
}

impl CliError {
    /// Returns the exit classification.
    const fn exit(&self) -> RunExit {
        match self {
            Self::Invalid(_) => RunExit::InvalidRequest,
            Self::Execution(_) | Self::Output { .. } => RunExit::ExecutionFailed,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// Parses `args` and executes the selected command.
///
/// Returns the process exit code. Usage errors exit with `2`; `--help` and
/// `--version` print to `stdout` and exit with `0`.
pub fn run_with<I, T>(
    args: I,
    env: impl Fn(&str) -> Option<String>,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> u8
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(err) => {
            let rendered = err.render();
            if err.use_stderr() {
                let _ = write!(stderr, "{rendered}");
                return RunExit::InvalidRequest.code();
            }
            let _ = write!(stdout, "{rendered}");
            return RunExit::Success.code();
        }
    };
    match dispatch(cli, &env, stdout) {
        Ok(code) => code,
        Err(err) => {
            let _ = writeln!(stderr, "analyst: {err}");
            err.exit().code()
        }
    }
}

/// Executes the parsed command.
fn dispatch(
    cli: Cli,
    env: &impl Fn(&str) -> Option<String>,
    out: &mut dyn Write,
) -> CliResult<u8> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Run(command) => command_run(config_path, env, &command, out),
        Commands::Runs(command) => command_runs(config_path, env, &command, out),
        Commands::Plugins => command_plugins(out),
        Commands::Config {
            command: ConfigCommand::Validate,
        } => command_config_validate(config_path, env, out),
    }
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Executes one refresh and prints the run report.
fn command_run(
    config_path: Option<&Path>,
    env: &impl Fn(&str) -> Option<String>,
    command: &RunCommand,
    out: &mut dyn Write,
) -> CliResult<u8> {
    let config = load_config(config_path, env)?;
    let events = config.event_sink().map_err(|err| CliError::Invalid(err.to_string()))?;
    let anomaly = config.anomaly_config().map_err(|err| CliError::Invalid(err.to_string()))?;
    let registry = builtin_registry()?;
    ensure_known_plugin(&registry, &command.plugin)?;
    let session = open_store(&config)?;

    let orchestrator = Orchestrator::new(registry, anomaly, events);
    let report = orchestrator.run(&session, &command.plugin);
    write_json_line(out, &report)?;
    Ok(report.exit.code())
}

/// Lists recent runs of one vertical as JSON lines.
fn command_runs(
    config_path: Option<&Path>,
    env: &impl Fn(&str) -> Option<String>,
    command: &RunsCommand,
    out: &mut dyn Write,
) -> CliResult<u8> {
    let config = load_config(config_path, env)?;
    let events = config.event_sink().map_err(|err| CliError::Invalid(err.to_string()))?;
    let registry = builtin_registry()?;
    let namespace = ensure_known_plugin(&registry, &command.plugin)?.namespace().clone();
    let session = open_store(&config)?;

    let limit = usize::try_from(command.limit).unwrap_or(usize::MAX);
    let runs = RunLedger::new(events)
        .recent(&session, &namespace, limit)
        .map_err(|err| CliError::Execution(err.to_string()))?;
    for run in &runs {
        write_json_line(out, run)?;
    }
    Ok(RunExit::Success.code())
}

/// Lists the registered verticals as JSON lines.
fn command_plugins(out: &mut dyn Write) -> CliResult<u8> {
    let registry = builtin_registry()?;
    for entry in registry.iter() {
        let plugin = entry.plugin();
        write_json_line(out, &PluginListing {
            name: plugin.name(),
            version: plugin.version(),
            namespace: entry.namespace().as_str(),
        })?;
    }
    Ok(RunExit::Success.code())
}

/// Loads and validates the configuration.
fn command_config_validate(
    config_path: Option<&Path>,
    env: &impl Fn(&str) -> Option<String>,
    out: &mut dyn Write,
) -> CliResult<u8> {
    let config = load_config(config_path, env)?;
    writeln!(out, "config ok (store: {})", config.store.path.display()).map_err(|error| {
        CliError::Output {
            stream: "stdout",
            error,
        }
    })?;
    Ok(RunExit::Success.code())
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Loads configuration, mapping every failure to an invalid request.
fn load_config(
    path: Option<&Path>,
    env: &impl Fn(&str) -> Option<String>,
) -> CliResult<AnalystConfig> {
    AnalystConfig::load_with(path, env).map_err(|err| CliError::Invalid(err.to_string()))
}

/// Builds the registry of built-in verticals.
fn builtin_registry() -> CliResult<PluginRegistry> {
    let mut registry = PluginRegistry::new();
    register_all(&mut registry).map_err(|err| CliError::Execution(err.to_string()))?;
    Ok(registry)
}

/// Resolves `name`, listing the available plugins when it is unknown.
fn ensure_known_plugin<'a>(
    registry: &'a PluginRegistry,
    name: &str,
) -> CliResult<&'a RegisteredPlugin> {
    registry.resolve(name).ok_or_else(|| {
        let available: Vec<&str> = registry.iter().map(|entry| entry.plugin().name()).collect();
        CliError::Invalid(format!(
            "unknown plugin {:?} (available: {})",
            name.trim(),
            available.join(", ")
        ))
    })
}

/// Opens the configured store.
fn open_store(config: &AnalystConfig) -> CliResult<StoreSession> {
    StoreSession::open(&config.store_config())
        .map_err(|err| CliError::Execution(format!("store open failed: {err}")))
}

/// Writes one JSON document followed by a newline.
fn write_json_line<T: Serialize>(out: &mut dyn Write, value: &T) -> CliResult<()> {
    let payload = serde_json::to_string(value)
        .map_err(|err| CliError::Execution(format!("output serialization failed: {err}")))?;
    writeln!(out, "{payload}").map_err(|error| CliError::Output {
        stream: "stdout",
        error,
    })
}
