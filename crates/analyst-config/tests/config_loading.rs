//! Config loading tests for analyst-config.
// crates/analyst-config/tests/config_loading.rs
// =============================================================================
// Module: Config Loading Tests
// Description: Validate path resolution, defaults, and environment overrides.
// Purpose: Ensure configuration fails closed on bad input.
// =============================================================================

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::fs;
use std::path::Path;

use analyst_config::AnalystConfig;
use analyst_config::BASELINE_DAYS_ENV_VAR;
use analyst_config::CONFIG_ENV_VAR;
use analyst_config::ConfigError;
use analyst_config::DROP_THRESHOLD_ENV_VAR;
use analyst_config::EventSinkKind;
use tempfile::TempDir;

mod common;

type TestResult = Result<(), String>;

fn write_config(dir: &Path, content: &str) -> Result<std::path::PathBuf, String> {
    let path = dir.join("analyst.toml");
    fs::write(&path, content).map_err(|err| err.to_string())?;
    Ok(path)
}

#[test]
fn empty_document_yields_defaults() -> TestResult {
    let config = AnalystConfig::from_toml_str("").map_err(|err| err.to_string())?;
    let anomaly = config.anomaly_config().map_err(|err| err.to_string())?;
    if anomaly.baseline_days() != 14 || anomaly.drop_threshold_pct() != 80 {
        return Err(format!("unexpected anomaly defaults: {anomaly:?}"));
    }
    let store = config.store_config();
    if store.path != Path::new("analyst.sqlite") || store.busy_timeout_ms != 5_000 {
        return Err(format!("unexpected store defaults: {store:?}"));
    }
    if config.events.sink != EventSinkKind::Stderr {
        return Err("default sink should be stderr".to_string());
    }
    Ok(())
}

#[test]
fn explicit_file_is_loaded() -> TestResult {
    let temp = TempDir::new().map_err(|err| err.to_string())?;
    let path = write_config(
        temp.path(),
        r#"
[store]
path = "data/refresh.sqlite"
busy_timeout_ms = 750

[anomaly]
baseline_days = 30
drop_threshold_pct = 50

[events]
sink = "none"
"#,
    )?;
    let config = AnalystConfig::load_with(Some(&path), common::empty_env())
        .map_err(|err| err.to_string())?;
    if config.store.path != Path::new("data/refresh.sqlite") {
        return Err("store path not loaded".to_string());
    }
    if config.store.busy_timeout_ms != 750 {
        return Err("busy timeout not loaded".to_string());
    }
    let anomaly = config.anomaly_config().map_err(|err| err.to_string())?;
    if (anomaly.baseline_days(), anomaly.drop_threshold_pct()) != (30, 50) {
        return Err(format!("unexpected anomaly config: {anomaly:?}"));
    }
    Ok(())
}

#[test]
fn missing_explicit_file_is_an_io_error() -> TestResult {
    let temp = TempDir::new().map_err(|err| err.to_string())?;
    let missing = temp.path().join("absent.toml");
    match AnalystConfig::load_with(Some(&missing), common::empty_env()) {
        Err(ConfigError::Io(_)) => Ok(()),
        other => Err(format!("expected io error, got {other:?}")),
    }
}

#[test]
fn config_path_env_var_is_honored() -> TestResult {
    let temp = TempDir::new().map_err(|err| err.to_string())?;
    let path = write_config(temp.path(), "[anomaly]\nbaseline_days = 3\n")?;
    let path_text = path.to_string_lossy().into_owned();
    let config = AnalystConfig::load_with(None, common::env_of(&[(CONFIG_ENV_VAR, &path_text)]))
        .map_err(|err| err.to_string())?;
    if config.anomaly.baseline_days != 3 {
        return Err("env config path not honored".to_string());
    }
    Ok(())
}

#[test]
fn env_overrides_replace_file_thresholds() -> TestResult {
    let temp = TempDir::new().map_err(|err| err.to_string())?;
    let path = write_config(temp.path(), "[anomaly]\nbaseline_days = 3\ndrop_threshold_pct = 10\n")?;
    let env = common::env_of(&[(BASELINE_DAYS_ENV_VAR, "21"), (DROP_THRESHOLD_ENV_VAR, "65")]);
    let config = AnalystConfig::load_with(Some(&path), env).map_err(|err| err.to_string())?;
    if (config.anomaly.baseline_days, config.anomaly.drop_threshold_pct) != (21, 65) {
        return Err(format!("overrides not applied: {:?}", config.anomaly));
    }
    Ok(())
}

#[test]
fn non_positive_env_override_is_fatal() -> TestResult {
    let temp = TempDir::new().map_err(|err| err.to_string())?;
    let path = write_config(temp.path(), "")?;
    common::assert_invalid(
        AnalystConfig::load_with(Some(&path), common::env_of(&[(BASELINE_DAYS_ENV_VAR, "0")])),
        "ANALYST_ANOMALY_BASELINE_DAYS must be a positive integer",
    )?;
    common::assert_invalid(
        AnalystConfig::load_with(Some(&path), common::env_of(&[(DROP_THRESHOLD_ENV_VAR, "lots")])),
        "ANALYST_ANOMALY_DROP_THRESHOLD_PCT must be a positive integer",
    )
}

#[test]
fn oversized_file_is_rejected() -> TestResult {
    let temp = TempDir::new().map_err(|err| err.to_string())?;
    let padding = "#".repeat(1024 * 1024 + 1);
    let path = write_config(temp.path(), &padding)?;
    common::assert_invalid(
        AnalystConfig::load_with(Some(&path), common::empty_env()),
        "config file exceeds size limit",
    )
}

#[test]
fn malformed_toml_is_a_parse_error() -> TestResult {
    match AnalystConfig::from_toml_str("[anomaly\nbaseline_days = 3") {
        Err(ConfigError::Parse(_)) => Ok(()),
        other => Err(format!("expected parse error, got {other:?}")),
    }
}
