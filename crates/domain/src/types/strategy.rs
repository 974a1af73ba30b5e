//! Sync strategies
//!
//! A strategy bundles batch size, concurrency and pacing. `sync_all` picks one
//! from the size of the local corpus unless the caller names one.

use serde::{Deserialize, Serialize};

use crate::constants::{BALANCED_MAX_RECORDS, CONSERVATIVE_MAX_RECORDS, DEFAULT_BASE_DELAY_MS};
use crate::impl_domain_status_conversions;

/// Named strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStrategy {
    Conservative,
    Balanced,
    Aggressive,
}

impl_domain_status_conversions!(SyncStrategy {
    Conservative => "conservative",
    Balanced => "balanced",
    Aggressive => "aggressive",
});

/// Parameters of one strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyParams {
    pub batch_size: usize,
    pub concurrent_limit: usize,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub batch_delay_ms: u64,
}

/// Strategy parameters plus the record-count thresholds that select them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyTable {
    pub conservative_max_records: usize,
    pub balanced_max_records: usize,
    pub conservative: StrategyParams,
    pub balanced: StrategyParams,
    pub aggressive: StrategyParams,
}

impl Default for StrategyTable {
    fn default() -> Self {
        Self {
            conservative_max_records: CONSERVATIVE_MAX_RECORDS,
            balanced_max_records: BALANCED_MAX_RECORDS,
            conservative: StrategyParams {
                batch_size: 5,
                concurrent_limit: 1,
                max_retries: 5,
                base_delay_ms: DEFAULT_BASE_DELAY_MS,
                batch_delay_ms: 2_000,
            },
            balanced: StrategyParams {
                batch_size: 10,
                concurrent_limit: 3,
                max_retries: 3,
                base_delay_ms: DEFAULT_BASE_DELAY_MS,
                batch_delay_ms: 1_000,
            },
            aggressive: StrategyParams {
                batch_size: 20,
                concurrent_limit: 5,
                max_retries: 2,
                base_delay_ms: DEFAULT_BASE_DELAY_MS,
                batch_delay_ms: 500,
            },
        }
    }
}

impl StrategyTable {
    /// Strategy for a corpus of `record_count` records
    #[must_use]
    pub const fn select(&self, record_count: usize) -> SyncStrategy {
        if record_count <= self.conservative_max_records {
            SyncStrategy::Conservative
        } else if record_count <= self.balanced_max_records {
            SyncStrategy::Balanced
        } else {
            SyncStrategy::Aggressive
        }
    }

    #[must_use]
    pub const fn params(&self, strategy: SyncStrategy) -> StrategyParams {
        match strategy {
            SyncStrategy::Conservative => self.conservative,
            SyncStrategy::Balanced => self.balanced,
            SyncStrategy::Aggressive => self.aggressive,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_by_record_count() {
        let table = StrategyTable::default();
        assert_eq!(table.select(0), SyncStrategy::Conservative);
        assert_eq!(table.select(10), SyncStrategy::Conservative);
        assert_eq!(table.select(11), SyncStrategy::Balanced);
        assert_eq!(table.select(100), SyncStrategy::Balanced);
        assert_eq!(table.select(101), SyncStrategy::Aggressive);
    }

    #[test]
    fn default_params() {
        let table = StrategyTable::default();
        let conservative = table.params(SyncStrategy::Conservative);
        assert_eq!((conservative.batch_size, conservative.concurrent_limit), (5, 1));
        assert_eq!(conservative.max_retries, 5);

        let aggressive = table.params(SyncStrategy::Aggressive);
        assert_eq!((aggressive.batch_size, aggressive.concurrent_limit), (20, 5));
        assert_eq!(aggressive.max_retries, 2);
        assert_eq!(aggressive.batch_delay_ms, 500);
    }

    #[test]
    fn overridden_thresholds() {
        let table = StrategyTable { conservative_max_records: 2, ..StrategyTable::default() };
        assert_eq!(table.select(3), SyncStrategy::Balanced);
        assert_eq!("Aggressive".parse::<SyncStrategy>(), Ok(SyncStrategy::Aggressive));
    }
}
