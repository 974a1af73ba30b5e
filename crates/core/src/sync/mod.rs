//! Sync orchestration: strategies, retries, breakers and job bookkeeping

pub mod breakers;
pub mod engine;
pub mod history;
pub mod metrics;
pub mod options;
pub mod policy;
pub mod ports;

pub use breakers::{BreakerRegistry, SharedClock};
pub use engine::SyncEngine;
pub use history::JobHistory;
pub use metrics::{MetricsEntry, Operation, OperationStats, PerformanceMetrics};
pub use options::{ResolvedOptions, SyncFailure, SyncOptions, SyncReceipt};
pub use policy::ClassifiedRetryPolicy;
pub use ports::ProgressSink;
