//! # TableSync Core
//!
//! Pure sync logic - no infrastructure dependencies.
//!
//! This crate contains:
//! - Port interfaces for table platforms and local storage (traits)
//! - Record mapping, schema validation and migration
//! - The sync engine and the table service facade
//!
//! ## Architecture Principles
//! - Only depends on `tablesync-common` and `tablesync-domain`
//! - No database, HTTP, or platform code
//! - All external dependencies via traits
//! - Pure, testable business logic

pub mod adapter;
pub mod mapping;
pub mod service;
pub mod storage;
pub mod sync;

pub use adapter::{AdapterFactory, ItemOutcome, TableAdapter};
pub use mapping::DataMapper;
pub use service::{AdapterRegistry, TableService};
pub use storage::{load_collection, save_collection, KeyValueStore};
pub use sync::{
    BreakerRegistry, ClassifiedRetryPolicy, JobHistory, MetricsEntry, Operation, OperationStats,
    PerformanceMetrics, ProgressSink, ResolvedOptions, SharedClock, SyncEngine, SyncFailure,
    SyncOptions, SyncReceipt,
};
