// crates/analyst-config/src/config.rs
// ============================================================================
// Module: Analyst Configuration
// Description: Configuration loading and validation for the refresh engine.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: analyst-core, analyst-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! The path comes from the caller, else `ANALYST_CONFIG`, else
//! `analyst.toml` in the working directory. Only the default file may be
//! absent; an explicitly named file that cannot be read is an error.
//!
//! Anomaly thresholds may be overridden from the environment. Overrides are
//! read through an injectable lookup so callers and tests control the source.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use analyst_core::AnomalyConfig;
use analyst_core::DEFAULT_BASELINE_DAYS;
use analyst_core::DEFAULT_DROP_THRESHOLD_PCT;
use analyst_core::FileRunEventSink;
use analyst_core::NoopRunEventSink;
use analyst_core::RunEventSink;
use analyst_core::StderrRunEventSink;
use analyst_store_sqlite::SqliteStoreConfig;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "analyst.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "ANALYST_CONFIG";
/// Environment variable overriding the anomaly baseline window.
pub const BASELINE_DAYS_ENV_VAR: &str = "ANALYST_ANOMALY_BASELINE_DAYS";
/// Environment variable overriding the volume drop threshold.
pub const DROP_THRESHOLD_ENV_VAR: &str = "ANALYST_ANOMALY_DROP_THRESHOLD_PCT";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Default `SQLite` database filename.
const DEFAULT_STORE_PATH: &str = "analyst.sqlite";
/// Default busy timeout for store connections.
const DEFAULT_STORE_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum accepted busy timeout.
pub(crate) const MAX_STORE_BUSY_TIMEOUT_MS: u64 = 600_000;

// ============================================================================
// SECTION: Config Model
// ============================================================================

/// Top-level analyst configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalystConfig {
    /// Store configuration.
    #[serde(default)]
    pub store: StoreConfig,
    /// Anomaly detector thresholds.
    #[serde(default)]
    pub anomaly: AnomalySection,
    /// Run event sink configuration.
    #[serde(default)]
    pub events: EventsConfig,
}

impl AnalystConfig {
    /// Loads configuration using the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading, overrides, or validation fail.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with(path, |key| env::var(key).ok())
    }

    /// Loads configuration with an explicit environment lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading, overrides, or validation fail.
    pub fn load_with(
        path: Option<&Path>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let source = resolve_path(path, &lookup);
        validate_path(source.path())?;
        let mut config = match read_config_file(source.path()) {
            Ok(config) => config,
            Err(ConfigError::Io(_)) if source.is_default() && !source.path().exists() => {
                Self::default()
            }
            Err(err) => return Err(err),
        };
        config.apply_env_overrides(&lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses configuration from a TOML string and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config = parse_config(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies environment overrides for the anomaly thresholds.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when an override is not a positive
    /// integer.
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = lookup(BASELINE_DAYS_ENV_VAR) {
            self.anomaly.baseline_days = parse_positive(BASELINE_DAYS_ENV_VAR, &value)?;
        }
        if let Some(value) = lookup(DROP_THRESHOLD_ENV_VAR) {
            self.anomaly.drop_threshold_pct = parse_positive(DROP_THRESHOLD_ENV_VAR, &value)?;
        }
        Ok(())
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.store.validate()?;
        self.anomaly.anomaly_config()?;
        self.events.validate()?;
        Ok(())
    }

    /// Returns the validated anomaly thresholds.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a threshold is zero.
    pub fn anomaly_config(&self) -> Result<AnomalyConfig, ConfigError> {
        self.anomaly.anomaly_config()
    }

    /// Returns the store session configuration.
    #[must_use]
    pub fn store_config(&self) -> SqliteStoreConfig {
        self.store.to_sqlite()
    }

    /// Builds the configured run event sink.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the sink cannot be opened.
    pub fn event_sink(&self) -> Result<Arc<dyn RunEventSink>, ConfigError> {
        self.events.build()
    }
}

/// Store configuration section.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// `SQLite` database path.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_store_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            busy_timeout_ms: default_store_busy_timeout_ms(),
        }
    }
}

impl StoreConfig {
    /// Validates store configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_path_string("store.path", &self.path.to_string_lossy())?;
        if self.busy_timeout_ms > MAX_STORE_BUSY_TIMEOUT_MS {
            return Err(ConfigError::Invalid(format!(
                "store.busy_timeout_ms must be at most {MAX_STORE_BUSY_TIMEOUT_MS}"
            )));
        }
        Ok(())
    }

    /// Converts the section into a session configuration.
    fn to_sqlite(&self) -> SqliteStoreConfig {
        SqliteStoreConfig {
            path: self.path.clone(),
            busy_timeout_ms: self.busy_timeout_ms,
        }
    }
}

/// Anomaly threshold section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct AnomalySection {
    /// Baseline window in days.
    #[serde(default = "default_baseline_days")]
    pub baseline_days: u32,
    /// Volume drop threshold in percent.
    #[serde(default = "default_drop_threshold_pct")]
    pub drop_threshold_pct: u32,
}

impl Default for AnomalySection {
    fn default() -> Self {
        Self {
            baseline_days: default_baseline_days(),
            drop_threshold_pct: default_drop_threshold_pct(),
        }
    }
}

impl AnomalySection {
    /// Validates the thresholds into an [`AnomalyConfig`].
    fn anomaly_config(&self) -> Result<AnomalyConfig, ConfigError> {
        AnomalyConfig::new(self.baseline_days, self.drop_threshold_pct)
            .map_err(|err| ConfigError::Invalid(err.to_string()))
    }
}

/// Run event sink kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EventSinkKind {
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// JSON lines appended to a file.
    File,
    /// Discard events.
    None,
}

/// Run event sink section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventsConfig {
    /// Sink kind.
    #[serde(default)]
    pub sink: EventSinkKind,
    /// Output path for the file sink.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl EventsConfig {
    /// Validates event sink configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match (self.sink, &self.path) {
            (EventSinkKind::File, None) => {
                Err(ConfigError::Invalid("file events sink requires path".to_string()))
            }
            (EventSinkKind::File, Some(path)) => {
                validate_path_string("events.path", &path.to_string_lossy())
            }
            (_, Some(_)) => {
                Err(ConfigError::Invalid("events.path is only valid for the file sink".to_string()))
            }
            (_, None) => Ok(()),
        }
    }

    /// Builds the sink.
    fn build(&self) -> Result<Arc<dyn RunEventSink>, ConfigError> {
        match (self.sink, &self.path) {
            (EventSinkKind::Stderr, _) => Ok(Arc::new(StderrRunEventSink)),
            (EventSinkKind::None, _) => Ok(Arc::new(NoopRunEventSink)),
            (EventSinkKind::File, Some(path)) => {
                let sink = FileRunEventSink::new(path)
                    .map_err(|err| ConfigError::Io(format!("events sink: {err}")))?;
                Ok(Arc::new(sink))
            }
            (EventSinkKind::File, None) => {
                Err(ConfigError::Invalid("file events sink requires path".to_string()))
            }
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Where the config path came from.
enum ConfigSource {
    /// Supplied by the caller or the environment.
    Explicit(PathBuf),
    /// Default filename in the working directory.
    Default(PathBuf),
}

impl ConfigSource {
    /// Returns the resolved path.
    fn path(&self) -> &Path {
        match self {
            Self::Explicit(path) | Self::Default(path) => path,
        }
    }

    /// Returns true for the default filename.
    const fn is_default(&self) -> bool {
        matches!(self, Self::Default(_))
    }
}

/// Resolves the config path from the caller or environment defaults.
fn resolve_path(
    path: Option<&Path>,
    lookup: &impl Fn(&str) -> Option<String>,
) -> ConfigSource {
    if let Some(path) = path {
        return ConfigSource::Explicit(path.to_path_buf());
    }
    if let Some(env_path) = lookup(CONFIG_ENV_VAR) {
        return ConfigSource::Explicit(PathBuf::from(env_path));
    }
    ConfigSource::Default(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved config path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    check_path_limits("config path", path)
}

/// Validates a configured path value: non-empty and within length limits.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    check_path_limits(field, Path::new(trimmed))
}

/// Enforces total and per-component length limits on `path`.
fn check_path_limits(label: &str, path: &Path) -> Result<(), ConfigError> {
    if path.as_os_str().len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!(
            "{label} is longer than {MAX_TOTAL_PATH_LENGTH} bytes"
        )));
    }
    let overlong = path
        .components()
        .any(|component| component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH);
    if overlong {
        return Err(ConfigError::Invalid(format!("{label} path component too long")));
    }
    Ok(())
}

/// Reads and parses a config file with the size limit applied.
fn read_config_file(path: &Path) -> Result<AnalystConfig, ConfigError> {
    let bytes = fs::read(path).map_err(|err| io_error(path, &err))?;
    if bytes.len() > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
    }
    let content = std::str::from_utf8(&bytes)
        .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
    parse_config(content)
}

/// Parses TOML content without validation.
fn parse_config(content: &str) -> Result<AnalystConfig, ConfigError> {
    if content.len() > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
    }
    toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))
}

/// Formats an I/O error with the offending path.
fn io_error(path: &Path, err: &io::Error) -> ConfigError {
    ConfigError::Io(format!("{}: {err}", path.display()))
}

/// Parses a positive integer override.
fn parse_positive(name: &str, value: &str) -> Result<u32, ConfigError> {
    match value.trim().parse::<u32>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        _ => Err(ConfigError::Invalid(format!("{name} must be a positive integer"))),
    }
}

/// Default store path.
fn default_store_path() -> PathBuf {
    PathBuf::from(DEFAULT_STORE_PATH)
}

/// Default store busy timeout.
const fn default_store_busy_timeout_ms() -> u64 {
    DEFAULT_STORE_BUSY_TIMEOUT_MS
}

/// Default anomaly baseline window.
const fn default_baseline_days() -> u32 {
    DEFAULT_BASELINE_DAYS
}

/// Default volume drop threshold.
const fn default_drop_threshold_pct() -> u32 {
    DEFAULT_DROP_THRESHOLD_PCT
}
