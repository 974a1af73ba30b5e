//! Sync job records
//!
//! A job moves `pending -> syncing -> success | failed` and never leaves a
//! terminal state. It fails if and only if at least one item failed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::errors::SyncError;
use crate::impl_domain_status_conversions;
use crate::types::platform::Platform;
use crate::types::strategy::SyncStrategy;

/// Kind of sync operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Single,
    Batch,
    All,
    Smart,
}

impl_domain_status_conversions!(JobKind {
    Single => "single",
    Batch => "batch",
    All => "all",
    Smart => "smart",
});

/// Job lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Syncing,
    Success,
    Failed,
}

impl_domain_status_conversions!(JobStatus {
    Pending => "pending",
    Syncing => "syncing",
    Success => "success",
    Failed => "failed",
});

impl JobStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

/// Rejected status change
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("job cannot move from {from} to {to}")]
pub struct InvalidTransition {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// Outcome of one record within a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemResult {
    pub record_id: String,
    pub success: bool,
    pub remote_id: Option<String>,
    pub error: Option<SyncError>,
    pub attempts: u32,
    pub duration_ms: u64,
}

impl ItemResult {
    pub fn succeeded(
        record_id: impl Into<String>,
        remote_id: Option<String>,
        attempts: u32,
        duration_ms: u64,
    ) -> Self {
        Self {
            record_id: record_id.into(),
            success: true,
            remote_id,
            error: None,
            attempts,
            duration_ms,
        }
    }

    pub fn failed(
        record_id: impl Into<String>,
        error: SyncError,
        attempts: u32,
        duration_ms: u64,
    ) -> Self {
        Self {
            record_id: record_id.into(),
            success: false,
            remote_id: None,
            error: Some(error),
            attempts,
            duration_ms,
        }
    }
}

/// Progress event delivered after each chunk
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncProgress {
    pub processed: usize,
    pub total: usize,
    pub percentage: f64,
    pub current_batch: usize,
    pub total_batches: usize,
}

impl SyncProgress {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn new(processed: usize, total: usize, current_batch: usize, total_batches: usize) -> Self {
        let percentage = if total == 0 {
            100.0
        } else {
            ((processed as f64 / total as f64) * 10_000.0).round() / 100.0
        };
        Self { processed, total, percentage, current_batch, total_batches }
    }
}

/// One sync operation and its per-item outcomes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncJob {
    pub id: String,
    pub kind: JobKind,
    pub platform: Platform,
    pub config_id: String,
    pub status: JobStatus,
    pub strategy: Option<SyncStrategy>,
    pub total: usize,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub results: Vec<ItemResult>,
    pub success_count: usize,
    pub failure_count: usize,
}

impl SyncJob {
    pub fn new(
        kind: JobKind,
        platform: Platform,
        config_id: impl Into<String>,
        total: usize,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            kind,
            platform,
            config_id: config_id.into(),
            status: JobStatus::Pending,
            strategy: None,
            total,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            results: Vec::with_capacity(total),
            success_count: 0,
            failure_count: 0,
        }
    }

    /// Move `pending -> syncing`
    ///
    /// # Errors
    /// Returns `InvalidTransition` unless the job is pending.
    pub fn start(&mut self) -> Result<(), InvalidTransition> {
        if self.status != JobStatus::Pending {
            return Err(InvalidTransition { from: self.status, to: JobStatus::Syncing });
        }
        self.status = JobStatus::Syncing;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    pub fn record(&mut self, result: ItemResult) {
        if result.success {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
        self.results.push(result);
    }

    /// Move `syncing -> success | failed`
    ///
    /// # Errors
    /// Returns `InvalidTransition` unless the job is syncing.
    pub fn finish(&mut self) -> Result<JobStatus, InvalidTransition> {
        let to = if self.failure_count > 0 { JobStatus::Failed } else { JobStatus::Success };
        if self.status != JobStatus::Syncing {
            return Err(InvalidTransition { from: self.status, to });
        }
        self.status = to;
        self.finished_at = Some(Utc::now());
        Ok(to)
    }

    #[must_use]
    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }
}
