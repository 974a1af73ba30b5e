//! Port interfaces for table platforms

use std::sync::Arc;

use async_trait::async_trait;
use tablesync_domain::{
    DeleteResult, Platform, PlatformCapabilities, PlatformConfig, PlatformEnvelope, RecordPage,
    RecordQuery, RemoteRecord, Result, SyncError, TableInfo,
};

/// Per-item outcome of a batch call, in input order
pub type ItemOutcome<T> = std::result::Result<T, SyncError>;

/// Generic CRUD contract over one platform's table API
///
/// Implementations classify every failure into [`SyncError`] and never retry;
/// retry decisions belong to the sync engine.
#[async_trait]
pub trait TableAdapter: Send + Sync {
    /// Platform this adapter speaks to
    fn platform(&self) -> Platform;

    /// Batch and rate characteristics
    fn capabilities(&self) -> PlatformCapabilities {
        self.platform().capabilities()
    }

    /// Create one row
    async fn create_record(&self, envelope: &PlatformEnvelope) -> Result<RemoteRecord>;

    /// Overwrite the row named by `envelope.remote_id`
    async fn update_record(&self, envelope: &PlatformEnvelope) -> Result<RemoteRecord>;

    /// Delete one row
    async fn delete_record(&self, record_id: &str) -> Result<DeleteResult>;

    /// Read one page of rows
    async fn get_records(&self, query: &RecordQuery) -> Result<RecordPage>;

    /// Create many rows
    ///
    /// The outer error aborts the whole call (for example a token failure);
    /// otherwise one outcome is returned per envelope.
    async fn batch_create(
        &self,
        envelopes: &[PlatformEnvelope],
    ) -> Result<Vec<ItemOutcome<RemoteRecord>>>;

    /// Update many rows, each named by its `remote_id`
    async fn batch_update(
        &self,
        envelopes: &[PlatformEnvelope],
    ) -> Result<Vec<ItemOutcome<RemoteRecord>>>;

    /// Delete many rows
    async fn batch_delete(&self, record_ids: &[String]) -> Result<DeleteResult>;

    /// Check credentials and destination
    async fn test_connection(&self) -> Result<()>;

    /// Describe the destination table
    async fn get_table_info(&self) -> Result<TableInfo>;

    /// Drop any cached access token
    async fn invalidate_token(&self);
}

/// Builds adapters from connection profiles
pub trait AdapterFactory: Send + Sync {
    /// Construct an adapter, validating required configuration
    ///
    /// # Errors
    /// Returns `SyncError::Configuration` listing every missing field.
    fn create(&self, platform: Platform, config: &PlatformConfig) -> Result<Arc<dyn TableAdapter>>;
}
