//! Engine configuration structures
//!
//! Every field has a serde default, so a partial TOML or JSON file only needs
//! to name the values it overrides. Durations are plain millisecond counts.

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_COOLDOWN_MS, DEFAULT_FAILURE_THRESHOLD, DEFAULT_REQUEST_TIMEOUT_MS,
    DEFAULT_USER_AGENT, JOB_HISTORY_LIMIT, NATIVE_BATCH_THRESHOLD,
};
use crate::types::StrategyTable;

/// Top-level configuration for the sync subsystem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub http: HttpConfig,
    pub breaker: BreakerConfig,
    pub strategies: StrategyTable,
    /// Record count above which native batch endpoints are used
    pub native_batch_threshold: usize,
    /// Number of finished jobs retained in history
    pub history_limit: usize,
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            breaker: BreakerConfig::default(),
            strategies: StrategyTable::default(),
            native_batch_threshold: NATIVE_BATCH_THRESHOLD,
            history_limit: JOB_HISTORY_LIMIT,
            logging: LoggingConfig::default(),
        }
    }
}

/// HTTP client settings shared by every adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_ms: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS, user_agent: DEFAULT_USER_AGENT.to_string() }
    }
}

/// Per-platform circuit breaker settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub cooldown_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: DEFAULT_FAILURE_THRESHOLD, cooldown_ms: DEFAULT_COOLDOWN_MS }
    }
}

/// Tracing subscriber settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}
