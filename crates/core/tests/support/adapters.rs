//! Scripted `TableAdapter` and factory

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Map;
use tablesync_core::{AdapterFactory, ItemOutcome, TableAdapter};
use tablesync_domain::{
    require_fields, DeleteResult, FieldInfo, Platform, PlatformCapabilities, PlatformConfig,
    PlatformEnvelope, RecordPage, RecordQuery, RemoteRecord, Result as DomainResult, SyncError,
    TableInfo,
};
use tokio::time::Instant;

type Responder = dyn Fn(&PlatformEnvelope) -> DomainResult<RemoteRecord> + Send + Sync;

/// One adapter call as seen by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub operation: &'static str,
    pub record_ids: Vec<String>,
    pub remote_id: Option<String>,
}

/// Adapter whose answers are decided by the test
///
/// Queued failures are consumed first, one per call. Afterwards every
/// envelope goes through the responder, which by default succeeds with
/// remote id `rec_<record id>`. Create and update calls can be given a
/// latency, or made to hang until the caller gives up.
pub struct ScriptedAdapter {
    platform: Platform,
    capabilities: PlatformCapabilities,
    responder: Box<Responder>,
    queued: Mutex<VecDeque<SyncError>>,
    calls: Mutex<Vec<Call>>,
    call_times: Mutex<Vec<Instant>>,
    invalidations: AtomicU32,
    latency: Duration,
    hanging: AtomicBool,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// Counts one call as in flight until dropped
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedAdapter {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            capabilities: platform.capabilities(),
            responder: Box::new(|envelope| {
                Ok(RemoteRecord::new(format!("rec_{}", envelope.id), Map::new()))
            }),
            queued: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            call_times: Mutex::new(Vec::new()),
            invalidations: AtomicU32::new(0),
            latency: Duration::ZERO,
            hanging: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Make every create and update take `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// While set, create and update calls never answer
    pub fn hang(&self, hanging: bool) {
        self.hanging.store(hanging, Ordering::SeqCst);
    }

    /// Most create/update calls ever running at once
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn with_responder(
        mut self,
        responder: impl Fn(&PlatformEnvelope) -> DomainResult<RemoteRecord> + Send + Sync + 'static,
    ) -> Self {
        self.responder = Box::new(responder);
        self
    }

    pub fn with_capabilities(mut self, capabilities: PlatformCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Fail the next calls with these errors, in order
    pub fn fail_next(&self, errors: impl IntoIterator<Item = SyncError>) {
        self.queued.lock().extend(errors);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls_for(&self, record_id: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.record_ids.iter().any(|id| id == record_id))
            .count()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.call_times.lock().clone()
    }

    pub fn invalidations(&self) -> u32 {
        self.invalidations.load(Ordering::SeqCst)
    }

    fn log(&self, operation: &'static str, envelopes: &[PlatformEnvelope]) -> DomainResult<()> {
        self.calls.lock().push(Call {
            operation,
            record_ids: envelopes.iter().map(|envelope| envelope.id.clone()).collect(),
            remote_id: envelopes.first().and_then(|envelope| envelope.remote_id.clone()),
        });
        self.call_times.lock().push(Instant::now());
        match self.queued.lock().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        InFlight(&self.in_flight)
    }

    async fn settle(&self) {
        if self.hanging.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn respond_all(&self, envelopes: &[PlatformEnvelope]) -> Vec<ItemOutcome<RemoteRecord>> {
        envelopes.iter().map(|envelope| (self.responder)(envelope)).collect()
    }
}

#[async_trait]
impl TableAdapter for ScriptedAdapter {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn capabilities(&self) -> PlatformCapabilities {
        self.capabilities
    }

    async fn create_record(&self, envelope: &PlatformEnvelope) -> DomainResult<RemoteRecord> {
        let _flight = self.enter();
        self.log("create", std::slice::from_ref(envelope))?;
        self.settle().await;
        (self.responder)(envelope)
    }

    async fn update_record(&self, envelope: &PlatformEnvelope) -> DomainResult<RemoteRecord> {
        let _flight = self.enter();
        self.log("update", std::slice::from_ref(envelope))?;
        self.settle().await;
        (self.responder)(envelope)
    }

    async fn delete_record(&self, _record_id: &str) -> DomainResult<DeleteResult> {
        Ok(DeleteResult { success: true, deleted_count: 1 })
    }

    async fn get_records(&self, _query: &RecordQuery) -> DomainResult<RecordPage> {
        Ok(RecordPage { records: Vec::new(), has_more: false, page_token: None, total: Some(0) })
    }

    async fn batch_create(
        &self,
        envelopes: &[PlatformEnvelope],
    ) -> DomainResult<Vec<ItemOutcome<RemoteRecord>>> {
        self.log("batch_create", envelopes)?;
        Ok(self.respond_all(envelopes))
    }

    async fn batch_update(
        &self,
        envelopes: &[PlatformEnvelope],
    ) -> DomainResult<Vec<ItemOutcome<RemoteRecord>>> {
        self.log("batch_update", envelopes)?;
        Ok(self.respond_all(envelopes))
    }

    async fn batch_delete(&self, record_ids: &[String]) -> DomainResult<DeleteResult> {
        Ok(DeleteResult { success: true, deleted_count: record_ids.len() })
    }

    async fn test_connection(&self) -> DomainResult<()> {
        Ok(())
    }

    async fn get_table_info(&self) -> DomainResult<TableInfo> {
        Ok(TableInfo {
            table_id: "tbl".to_string(),
            name: Some("Mock".to_string()),
            fields: vec![FieldInfo {
                id: "fld1".to_string(),
                name: "名称".to_string(),
                field_type: "text".to_string(),
            }],
        })
    }

    async fn invalidate_token(&self) {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
    }
}

/// Factory handing out one shared scripted adapter
///
/// Profiles without credentials are rejected the way real adapters do.
pub struct MockFactory {
    adapter: Arc<ScriptedAdapter>,
    created: AtomicUsize,
}

impl MockFactory {
    pub fn new(adapter: Arc<ScriptedAdapter>) -> Self {
        Self { adapter, created: AtomicUsize::new(0) }
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl AdapterFactory for MockFactory {
    fn create(
        &self,
        platform: Platform,
        config: &PlatformConfig,
    ) -> DomainResult<Arc<dyn TableAdapter>> {
        require_fields(
            platform,
            &[
                ("app_id", config.credentials.app_id.as_str()),
                ("app_secret", config.credentials.app_secret.as_str()),
            ],
        )?;
        self.created.fetch_add(1, Ordering::SeqCst);
        let adapter: Arc<dyn TableAdapter> = self.adapter.clone();
        Ok(adapter)
    }
}
