//! Domain data types

pub mod envelope;
pub mod job;
pub mod platform;
pub mod record;
pub mod remote;
pub mod strategy;

pub use envelope::PlatformEnvelope;
pub use job::{InvalidTransition, ItemResult, JobKind, JobStatus, SyncJob, SyncProgress};
pub use platform::{
    require_fields, Credentials, Destination, Platform, PlatformCapabilities, PlatformConfig,
};
pub use record::{
    target_key, LocalRecord, RecordSyncStatus, RecordType, RoutingFields, SyncErrorEntry,
    SyncMetadata,
};
pub use remote::{DeleteResult, FieldInfo, RecordPage, RecordQuery, RemoteRecord, TableInfo};
pub use strategy::{StrategyParams, StrategyTable, SyncStrategy};
