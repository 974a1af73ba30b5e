//! Table service facade
//!
//! Resolves a connection profile to its adapter and forwards the uniform
//! CRUD surface. Used by the sync engine and directly by UI code.

use std::sync::Arc;

use tablesync_domain::constants::PLATFORM_CONFIGS_KEY;
use tablesync_domain::{
    DeleteResult, Platform, PlatformConfig, PlatformEnvelope, RecordPage, RecordQuery,
    RemoteRecord, Result, SyncError, TableInfo,
};
use tracing::{info, instrument};

use super::registry::AdapterRegistry;
use crate::adapter::{AdapterFactory, ItemOutcome, TableAdapter};
use crate::storage::{load_collection, KeyValueStore};

/// Dispatches CRUD calls to per-profile adapters
pub struct TableService {
    factory: Arc<dyn AdapterFactory>,
    store: Option<Arc<dyn KeyValueStore>>,
    registry: AdapterRegistry,
}

impl TableService {
    pub fn new(factory: Arc<dyn AdapterFactory>) -> Self {
        Self { factory, store: None, registry: AdapterRegistry::new() }
    }

    /// Attach the store holding saved connection profiles
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Adapter for a profile, reused across calls
    ///
    /// # Errors
    /// Returns `SyncError::UnsupportedPlatform` for unknown platform
    /// identifiers and `SyncError::Configuration` for incomplete profiles.
    pub fn adapter(&self, config: &PlatformConfig) -> Result<Arc<dyn TableAdapter>> {
        let platform: Platform = config.platform.parse()?;
        self.registry.get_or_create(platform, config, self.factory.as_ref())
    }

    /// Drop the cached adapter of one profile
    pub fn invalidate(&self, platform: Platform, config_id: &str) {
        if self.registry.invalidate(platform, config_id) {
            info!(platform = %platform, config_id, "adapter invalidated");
        }
    }

    pub fn invalidate_all(&self) {
        self.registry.invalidate_all();
    }

    pub fn cached_adapters(&self) -> usize {
        self.registry.len()
    }

    /// Saved connection profiles
    ///
    /// # Errors
    /// Returns `SyncError::Storage` when no store is attached or the stored
    /// collection is malformed.
    pub async fn load_configs(&self) -> Result<Vec<PlatformConfig>> {
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| SyncError::Storage("no configuration store attached".to_string()))?;
        load_collection(store.as_ref(), PLATFORM_CONFIGS_KEY).await
    }

    /// Saved profile by id
    pub async fn find_config(&self, config_id: &str) -> Result<Option<PlatformConfig>> {
        Ok(self.load_configs().await?.into_iter().find(|config| config.id == config_id))
    }

    #[instrument(
        skip(self, config, envelope),
        fields(platform = %config.platform, envelope_id = %envelope.id)
    )]
    pub async fn create_record(
        &self,
        config: &PlatformConfig,
        envelope: &PlatformEnvelope,
    ) -> Result<RemoteRecord> {
        self.adapter(config)?.create_record(envelope).await
    }

    #[instrument(
        skip(self, config, envelope),
        fields(platform = %config.platform, envelope_id = %envelope.id)
    )]
    pub async fn update_record(
        &self,
        config: &PlatformConfig,
        envelope: &PlatformEnvelope,
    ) -> Result<RemoteRecord> {
        self.adapter(config)?.update_record(envelope).await
    }

    #[instrument(skip(self, config), fields(platform = %config.platform))]
    pub async fn delete_record(
        &self,
        config: &PlatformConfig,
        record_id: &str,
    ) -> Result<DeleteResult> {
        self.adapter(config)?.delete_record(record_id).await
    }

    pub async fn get_records(
        &self,
        config: &PlatformConfig,
        query: &RecordQuery,
    ) -> Result<RecordPage> {
        self.adapter(config)?.get_records(query).await
    }

    #[instrument(
        skip(self, config, envelopes),
        fields(platform = %config.platform, count = envelopes.len())
    )]
    pub async fn batch_create(
        &self,
        config: &PlatformConfig,
        envelopes: &[PlatformEnvelope],
    ) -> Result<Vec<ItemOutcome<RemoteRecord>>> {
        self.adapter(config)?.batch_create(envelopes).await
    }

    #[instrument(
        skip(self, config, envelopes),
        fields(platform = %config.platform, count = envelopes.len())
    )]
    pub async fn batch_update(
        &self,
        config: &PlatformConfig,
        envelopes: &[PlatformEnvelope],
    ) -> Result<Vec<ItemOutcome<RemoteRecord>>> {
        self.adapter(config)?.batch_update(envelopes).await
    }

    #[instrument(
        skip(self, config, record_ids),
        fields(platform = %config.platform, count = record_ids.len())
    )]
    pub async fn batch_delete(
        &self,
        config: &PlatformConfig,
        record_ids: &[String],
    ) -> Result<DeleteResult> {
        self.adapter(config)?.batch_delete(record_ids).await
    }

    pub async fn test_connection(&self, config: &PlatformConfig) -> Result<()> {
        self.adapter(config)?.test_connection().await
    }

    pub async fn get_table_info(&self, config: &PlatformConfig) -> Result<TableInfo> {
        self.adapter(config)?.get_table_info().await
    }
}

impl std::fmt::Debug for TableService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableService")
            .field("registry", &self.registry)
            .field("has_store", &self.store.is_some())
            .finish_non_exhaustive()
    }
}
