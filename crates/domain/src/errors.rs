//! Error types used throughout the sync subsystem
//!
//! Adapters classify every platform failure into [`SyncError`] exactly once,
//! at the HTTP boundary. The sync engine reads [`SyncError::is_retryable`]
//! and never inspects messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::impl_domain_status_conversions;

/// Server-side failure subtype
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "subtype", content = "status", rename_all = "snake_case")]
pub enum ServerErrorKind {
    /// HTTP 5xx response
    Status(u16),
    /// Platform reported "service unavailable"
    Unavailable,
    /// Platform reported an internal timeout
    Timeout,
    /// Server refused the request for a reason that will not change on retry
    Rejected,
}

impl ServerErrorKind {
    /// Whether this subtype is transient
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        match self {
            Self::Status(status) => status >= 500 && status <= 599,
            Self::Unavailable | Self::Timeout => true,
            Self::Rejected => false,
        }
    }
}

impl std::fmt::Display for ServerErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Status(status) => write!(f, "http {status}"),
            Self::Unavailable => write!(f, "unavailable"),
            Self::Timeout => write!(f, "timeout"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// Main error type for sync operations
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail", rename_all = "snake_case")]
pub enum SyncError {
    #[error("[{platform}] configuration incomplete, missing: {}", missing.join(", "))]
    Configuration { platform: String, missing: Vec<String> },

    #[error("[{platform}] authentication failed: {message}")]
    Auth { platform: String, message: String },

    #[error("[{platform}] permission denied: {message}")]
    Permission { platform: String, message: String },

    #[error("[{platform}] rate limited: {message}")]
    RateLimit { platform: String, message: String, retry_after_ms: Option<u64> },

    #[error("[{platform}] request timed out after {timeout_ms} ms")]
    Timeout { platform: String, timeout_ms: u64 },

    #[error("[{platform}] server error ({kind}): {message}")]
    Server { platform: String, kind: ServerErrorKind, message: String },

    #[error("[{platform}] not found: {message}")]
    NotFound { platform: String, message: String },

    #[error("[{platform}] network failure: {message}")]
    Network { platform: String, message: String },

    #[error("[{platform}] unexpected response{}: {message}", code_suffix(.code))]
    Unknown { platform: String, code: Option<String>, message: String },

    #[error("[{platform}] circuit open, retry in {retry_after_ms} ms")]
    CircuitOpen { platform: String, retry_after_ms: u64 },

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Flat classification of [`SyncError`] variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Auth,
    Permission,
    RateLimit,
    Timeout,
    Server,
    NotFound,
    Network,
    Unknown,
    CircuitOpen,
    Deserialization,
    Migration,
    UnsupportedPlatform,
    Storage,
    InvalidInput,
}

impl_domain_status_conversions!(ErrorKind {
    Configuration => "configuration",
    Auth => "auth",
    Permission => "permission",
    RateLimit => "rate_limit",
    Timeout => "timeout",
    Server => "server",
    NotFound => "not_found",
    Network => "network",
    Unknown => "unknown",
    CircuitOpen => "circuit_open",
    Deserialization => "deserialization",
    Migration => "migration",
    UnsupportedPlatform => "unsupported_platform",
    Storage => "storage",
    InvalidInput => "invalid_input",
});

impl SyncError {
    /// Classification of this error
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::Auth { .. } => ErrorKind::Auth,
            Self::Permission { .. } => ErrorKind::Permission,
            Self::RateLimit { .. } => ErrorKind::RateLimit,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Server { .. } => ErrorKind::Server,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Network { .. } => ErrorKind::Network,
            Self::Unknown { .. } => ErrorKind::Unknown,
            Self::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            Self::Deserialization(_) => ErrorKind::Deserialization,
            Self::Migration(_) => ErrorKind::Migration,
            Self::UnsupportedPlatform(_) => ErrorKind::UnsupportedPlatform,
            Self::Storage(_) => ErrorKind::Storage,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
        }
    }

    /// Whether a retry may succeed
    ///
    /// Only rate limits, timeouts, network failures and transient server
    /// subtypes qualify.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimit { .. } | Self::Timeout { .. } | Self::Network { .. } => true,
            Self::Server { kind, .. } => kind.is_retryable(),
            _ => false,
        }
    }

    /// Delay the platform asked for before the next call
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimit { retry_after_ms, .. } => retry_after_ms.map(Duration::from_millis),
            Self::CircuitOpen { retry_after_ms, .. } => {
                Some(Duration::from_millis(*retry_after_ms))
            }
            _ => None,
        }
    }

    /// Platform the error originated from, if any
    #[must_use]
    pub fn platform(&self) -> Option<&str> {
        match self {
            Self::Configuration { platform, .. }
            | Self::Auth { platform, .. }
            | Self::Permission { platform, .. }
            | Self::RateLimit { platform, .. }
            | Self::Timeout { platform, .. }
            | Self::Server { platform, .. }
            | Self::NotFound { platform, .. }
            | Self::Network { platform, .. }
            | Self::Unknown { platform, .. }
            | Self::CircuitOpen { platform, .. } => Some(platform),
            _ => None,
        }
    }
}

/// Result type alias for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

fn code_suffix(code: &Option<String>) -> String {
    code.as_ref().map(|c| format!(" (code {c})")).unwrap_or_default()
}
