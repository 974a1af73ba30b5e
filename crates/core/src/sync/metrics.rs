//! Per-(platform, operation) call statistics
//!
//! Every completed adapter attempt is recorded, successful or not. Updates
//! happen under the map's entry lock, so concurrent tasks never lose counts.

use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tablesync_domain::{impl_domain_status_conversions, Platform};

/// Adapter operation measured by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Update,
    BatchCreate,
    BatchUpdate,
}

impl_domain_status_conversions!(Operation {
    Create => "create",
    Update => "update",
    BatchCreate => "batch_create",
    BatchUpdate => "batch_update",
});

/// Running statistics for one key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct OperationStats {
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    pub min_ms: u64,
    pub max_ms: u64,
    pub avg_ms: u64,
    #[serde(skip)]
    sum_ms: u64,
}

impl OperationStats {
    fn observe(&mut self, elapsed_ms: u64, success: bool) {
        if self.total == 0 {
            self.min_ms = elapsed_ms;
            self.max_ms = elapsed_ms;
        } else {
            self.min_ms = self.min_ms.min(elapsed_ms);
            self.max_ms = self.max_ms.max(elapsed_ms);
        }
        self.total += 1;
        if success {
            self.success += 1;
        } else {
            self.failed += 1;
        }
        self.sum_ms = self.sum_ms.saturating_add(elapsed_ms);
        self.avg_ms = self.sum_ms / self.total;
    }
}

/// One row of a metrics snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsEntry {
    pub platform: Platform,
    pub operation: Operation,
    pub stats: OperationStats,
}

#[derive(Debug, Default)]
pub struct PerformanceMetrics {
    entries: DashMap<(Platform, Operation), OperationStats>,
}

impl PerformanceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &self,
        platform: Platform,
        operation: Operation,
        elapsed: Duration,
        success: bool,
    ) {
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self.entries.entry((platform, operation)).or_default().observe(elapsed_ms, success);
    }

    pub fn get(&self, platform: Platform, operation: Operation) -> Option<OperationStats> {
        self.entries.get(&(platform, operation)).map(|stats| *stats)
    }

    /// All entries ordered by platform then operation
    pub fn snapshot(&self) -> Vec<MetricsEntry> {
        let mut rows: Vec<MetricsEntry> = self
            .entries
            .iter()
            .map(|entry| {
                let (platform, operation) = *entry.key();
                MetricsEntry { platform, operation, stats: *entry.value() }
            })
            .collect();
        rows.sort_by_key(|row| (row.platform, row.operation));
        rows
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
