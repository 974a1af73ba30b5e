//! Per-call sync options and results

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tablesync_common::duration_millis;
use tablesync_domain::{
    JobStatus, Platform, RemoteRecord, StrategyTable, SyncError, SyncProgress, SyncStrategy,
};
use thiserror::Error;

use super::ports::ProgressSink;

/// Caller overrides; unset fields inherit the active strategy
#[derive(Clone, Default)]
pub struct SyncOptions {
    pub strategy: Option<SyncStrategy>,
    pub batch_size: Option<usize>,
    pub concurrent_limit: Option<usize>,
    pub max_retries: Option<u32>,
    pub base_delay: Option<Duration>,
    pub batch_delay: Option<Duration>,
    pub progress: Option<Arc<dyn ProgressSink>>,
}

impl SyncOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn strategy(mut self, strategy: SyncStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    #[must_use]
    pub const fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    #[must_use]
    pub const fn concurrent_limit(mut self, limit: usize) -> Self {
        self.concurrent_limit = Some(limit);
        self
    }

    #[must_use]
    pub const fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    #[must_use]
    pub const fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = Some(delay);
        self
    }

    #[must_use]
    pub const fn batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = Some(delay);
        self
    }

    #[must_use]
    pub fn progress(mut self, sink: impl ProgressSink + 'static) -> Self {
        self.progress = Some(Arc::new(sink));
        self
    }

    /// Fill unset fields from `fallback` unless a strategy was named
    pub(crate) fn resolve(&self, table: &StrategyTable, fallback: SyncStrategy) -> ResolvedOptions {
        let strategy = self.strategy.unwrap_or(fallback);
        let params = table.params(strategy);
        ResolvedOptions {
            strategy,
            batch_size: self.batch_size.unwrap_or(params.batch_size).max(1),
            concurrent_limit: self.concurrent_limit.unwrap_or(params.concurrent_limit).max(1),
            max_retries: self.max_retries.unwrap_or(params.max_retries),
            base_delay: self.base_delay.unwrap_or(Duration::from_millis(params.base_delay_ms)),
            batch_delay: self.batch_delay.unwrap_or(Duration::from_millis(params.batch_delay_ms)),
        }
    }

    pub(crate) fn report(&self, progress: SyncProgress) {
        if let Some(sink) = &self.progress {
            sink.on_progress(&progress);
        }
    }
}

impl std::fmt::Debug for SyncOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOptions")
            .field("strategy", &self.strategy)
            .field("batch_size", &self.batch_size)
            .field("concurrent_limit", &self.concurrent_limit)
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("batch_delay", &self.batch_delay)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// Options with every field decided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedOptions {
    pub strategy: SyncStrategy,
    pub batch_size: usize,
    pub concurrent_limit: usize,
    pub max_retries: u32,
    #[serde(with = "duration_millis")]
    pub base_delay: Duration,
    #[serde(with = "duration_millis")]
    pub batch_delay: Duration,
}

/// Successful single-record sync
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReceipt {
    pub sync_id: String,
    pub record_id: String,
    pub status: JobStatus,
    pub result: RemoteRecord,
    pub attempts: u32,
    #[serde(rename = "duration_ms", with = "duration_millis")]
    pub duration: Duration,
}

/// Final failure of one record
#[derive(Debug, Clone, PartialEq, Error)]
#[error("[{platform}] record {record_id} failed after {attempts} attempt(s): {error}")]
pub struct SyncFailure {
    pub platform: String,
    pub record_id: String,
    pub attempts: u32,
    #[source]
    pub error: SyncError,
}

impl SyncFailure {
    pub(crate) fn before_attempt(
        platform: impl Into<String>,
        record_id: &str,
        error: SyncError,
    ) -> Self {
        Self { platform: platform.into(), record_id: record_id.to_string(), attempts: 0, error }
    }

    pub(crate) fn after(
        platform: Platform,
        record_id: &str,
        attempts: u32,
        error: SyncError,
    ) -> Self {
        Self { platform: platform.to_string(), record_id: record_id.to_string(), attempts, error }
    }
}
