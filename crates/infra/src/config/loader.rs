//! Configuration loader
//!
//! Loads the engine configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. Reads a `.env` file into the environment when one exists
//! 2. If any `TABLESYNC_*` variable is set, layers the variables over the
//!    defaults
//! 3. Otherwise probes for a config file (JSON or TOML)
//! 4. Falls back to the defaults when no file exists
//!
//! ## Environment Variables
//! - `TABLESYNC_HTTP_TIMEOUT_MS`: Per-request timeout in milliseconds
//! - `TABLESYNC_BREAKER_THRESHOLD`: Consecutive failures before a breaker opens
//! - `TABLESYNC_BREAKER_COOLDOWN_MS`: Breaker cool-down in milliseconds
//! - `TABLESYNC_NATIVE_BATCH_THRESHOLD`: Record count above which native
//!   batch endpoints are used
//! - `TABLESYNC_LOG_LEVEL`: Filter directive used when `RUST_LOG` is unset
//! - `TABLESYNC_LOG_JSON`: Emit JSON log lines (true/false)
//!
//! ## File Locations
//! The loader probes `tablesync.{json,toml}` and `config.{json,toml}` in the
//! current directory, its parent and grandparent, then the same names
//! relative to the executable.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use tablesync_domain::{EngineConfig, Result, SyncError};

const ENV_VARS: &[&str] = &[
    "TABLESYNC_HTTP_TIMEOUT_MS",
    "TABLESYNC_BREAKER_THRESHOLD",
    "TABLESYNC_BREAKER_COOLDOWN_MS",
    "TABLESYNC_NATIVE_BATCH_THRESHOLD",
    "TABLESYNC_LOG_LEVEL",
    "TABLESYNC_LOG_JSON",
];

const FILE_NAMES: &[&str] = &["tablesync.json", "tablesync.toml", "config.json", "config.toml"];

/// Load configuration with automatic fallback strategy
///
/// # Errors
/// Returns `SyncError::InvalidInput` if a variable or file holds an invalid
/// value.
pub fn load() -> Result<EngineConfig> {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "Loaded .env file");
    }

    if env_present() {
        let config = load_from_env()?;
        tracing::info!("Configuration loaded from environment variables");
        return Ok(config);
    }

    tracing::debug!("No TABLESYNC_ variables set, trying file");
    match probe_config_paths() {
        Some(path) => load_from_file(Some(path)),
        None => {
            tracing::info!("No config file found, using defaults");
            Ok(EngineConfig::default())
        }
    }
}

/// Load configuration from environment variables
///
/// Every variable is optional, but at least one must be set; unset ones keep
/// their defaults.
///
/// # Errors
/// Returns `SyncError::InvalidInput` if no variable is set or a value does
/// not parse.
pub fn load_from_env() -> Result<EngineConfig> {
    if !env_present() {
        return Err(SyncError::InvalidInput("No TABLESYNC_ environment variables set".into()));
    }

    let mut config = EngineConfig::default();
    if let Some(timeout) = env_parse("TABLESYNC_HTTP_TIMEOUT_MS")? {
        config.http.timeout_ms = timeout;
    }
    if let Some(threshold) = env_parse("TABLESYNC_BREAKER_THRESHOLD")? {
        config.breaker.failure_threshold = threshold;
    }
    if let Some(cooldown) = env_parse("TABLESYNC_BREAKER_COOLDOWN_MS")? {
        config.breaker.cooldown_ms = cooldown;
    }
    if let Some(threshold) = env_parse("TABLESYNC_NATIVE_BATCH_THRESHOLD")? {
        config.native_batch_threshold = threshold;
    }
    if let Ok(level) = std::env::var("TABLESYNC_LOG_LEVEL") {
        config.logging.level = level;
    }
    config.logging.json = env_bool("TABLESYNC_LOG_JSON", config.logging.json);

    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes the standard locations. Format is detected by
/// file extension.
///
/// # Errors
/// Returns `SyncError::InvalidInput` if the file is missing, unreadable or
/// malformed.
pub fn load_from_file(path: Option<PathBuf>) -> Result<EngineConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(SyncError::InvalidInput(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            SyncError::InvalidInput("No config file found in any of the standard locations".into())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| SyncError::InvalidInput(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

fn parse_config(contents: &str, path: &Path) -> Result<EngineConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| SyncError::InvalidInput(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| SyncError::InvalidInput(format!("Invalid JSON format: {e}"))),
        _ => Err(SyncError::InvalidInput(format!("Unsupported config format: {extension}"))),
    }
}

/// First existing config file among the standard locations
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut roots = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        roots.extend([cwd.clone(), cwd.join(".."), cwd.join("../..")]);
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            roots.extend([exe_dir.to_path_buf(), exe_dir.join(".."), exe_dir.join("../..")]);
        }
    }

    roots
        .iter()
        .flat_map(|root| FILE_NAMES.iter().map(move |name| root.join(name)))
        .find(|path| path.exists())
}

fn env_present() -> bool {
    ENV_VARS.iter().any(|key| std::env::var(key).is_ok())
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| SyncError::InvalidInput(format!("Invalid value for {key}: {e}"))),
        Err(_) => Ok(None),
    }
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
