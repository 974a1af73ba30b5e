//! Sync engine: retry, circuit breaking, batching and metadata writeback
//!
//! Every adapter attempt passes through one guard that consults the
//! platform's breaker, times the call and records the outcome. Retries wrap
//! the guard, so an open breaker ends a retry loop immediately.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tablesync_common::{
    BreakerError, CircuitBreakerMetrics, CircuitState, RetryConfig, RetryError, RetryExecutor,
};
use tablesync_domain::constants::{ERROR_HISTORY_LIMIT, MAX_RETRY_DELAY_MS, RECORDS_KEY};
use tablesync_domain::{
    target_key, EngineConfig, ErrorKind, ItemResult, JobKind, LocalRecord, Platform,
    PlatformCapabilities, PlatformConfig, PlatformEnvelope, RemoteRecord, Result, SyncError,
    SyncErrorEntry, SyncJob, SyncProgress, SyncStrategy,
};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::breakers::{BreakerRegistry, SharedClock};
use super::history::JobHistory;
use super::metrics::{MetricsEntry, Operation, PerformanceMetrics};
use super::options::{ResolvedOptions, SyncFailure, SyncOptions, SyncReceipt};
use super::policy::ClassifiedRetryPolicy;
use crate::adapter::{ItemOutcome, TableAdapter};
use crate::mapping::DataMapper;
use crate::service::TableService;
use crate::storage::{load_collection, save_collection, KeyValueStore};

/// Type alias for task list to avoid complexity warnings
type TaskList = Vec<(String, PendingItem)>;

enum PendingItem {
    Ready(ItemResult),
    Running(JoinHandle<Attempted<RemoteRecord>>),
}

/// Result of one retried operation
struct Attempted<T> {
    result: Result<T>,
    attempts: u32,
    elapsed: Duration,
}

impl Attempted<RemoteRecord> {
    fn item(&self, record_id: &str) -> ItemResult {
        let duration_ms = millis(self.elapsed);
        match &self.result {
            Ok(remote) => ItemResult::succeeded(
                record_id,
                Some(remote.id.clone()),
                self.attempts,
                duration_ms,
            ),
            Err(error) => ItemResult::failed(record_id, error.clone(), self.attempts, duration_ms),
        }
    }
}

/// Shared per-attempt machinery, cloned into spawned tasks
#[derive(Clone)]
struct Dispatcher {
    breakers: Arc<BreakerRegistry>,
    metrics: Arc<PerformanceMetrics>,
}

impl Dispatcher {
    /// Run one adapter call behind the platform's breaker
    async fn guarded<T, Fut>(
        &self,
        platform: Platform,
        operation: Operation,
        adapter: &dyn TableAdapter,
        call: Fut,
    ) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        let breaker = self.breakers.get(platform);
        let started = Instant::now();
        match breaker.execute(|| call).await {
            Ok(value) => {
                self.metrics.record(platform, operation, started.elapsed(), true);
                Ok(value)
            }
            Err(BreakerError::Open(rejection)) => {
                debug!(
                    platform = %platform,
                    operation = %operation,
                    "call rejected by open circuit"
                );
                Err(SyncError::CircuitOpen {
                    platform: platform.to_string(),
                    retry_after_ms: millis(rejection.retry_after),
                })
            }
            Err(BreakerError::Failed(error)) => {
                self.metrics.record(platform, operation, started.elapsed(), false);
                if error.kind() == ErrorKind::Auth {
                    debug!(platform = %platform, "auth failure, dropping cached token");
                    adapter.invalidate_token().await;
                }
                Err(error)
            }
        }
    }

    /// Create or update one envelope with retries
    async fn push(
        self,
        platform: Platform,
        adapter: Arc<dyn TableAdapter>,
        envelope: PlatformEnvelope,
        options: ResolvedOptions,
    ) -> Attempted<RemoteRecord> {
        let started = Instant::now();
        let executor = retry_executor(&options);
        let operation =
            if envelope.remote_id.is_some() { Operation::Update } else { Operation::Create };

        let dispatcher = &self;
        let target = adapter.as_ref();
        let envelope = &envelope;
        let outcome = executor
            .execute_with_outcome(move || async move {
                let call = async {
                    match operation {
                        Operation::Update => target.update_record(envelope).await,
                        _ => target.create_record(envelope).await,
                    }
                };
                dispatcher.guarded(platform, operation, target, call).await
            })
            .await;
        if outcome.attempts > 1 {
            debug!(
                platform = %platform,
                attempts = outcome.attempts,
                backoff_ms = millis(outcome.total_delay()),
                "record push needed retries"
            );
        }

        Attempted {
            result: outcome.result.map_err(RetryError::into_source),
            attempts: outcome.attempts,
            elapsed: started.elapsed(),
        }
    }

    /// Send one native batch call, retried as a unit
    async fn push_batch(
        &self,
        platform: Platform,
        adapter: &dyn TableAdapter,
        operation: Operation,
        envelopes: &[PlatformEnvelope],
        options: ResolvedOptions,
    ) -> Vec<ItemResult> {
        let started = Instant::now();
        let executor = retry_executor(&options);

        let dispatcher = self;
        let outcome = executor
            .execute_with_outcome(move || async move {
                let call = async {
                    let outcomes = match operation {
                        Operation::BatchUpdate => adapter.batch_update(envelopes).await?,
                        _ => adapter.batch_create(envelopes).await?,
                    };
                    reject_whole_batch(outcomes)
                };
                dispatcher.guarded(platform, operation, adapter, call).await
            })
            .await;

        let attempts = outcome.attempts;
        let duration_ms = millis(started.elapsed());
        if attempts > 1 {
            debug!(
                platform = %platform,
                operation = %operation,
                attempts,
                backoff_ms = millis(outcome.total_delay()),
                "batch call needed retries"
            );
        }
        match outcome.result {
            Ok(outcomes) => envelopes
                .iter()
                .enumerate()
                .map(|(index, envelope)| match outcomes.get(index) {
                    Some(Ok(remote)) => ItemResult::succeeded(
                        &envelope.id,
                        Some(remote.id.clone()),
                        attempts,
                        duration_ms,
                    ),
                    Some(Err(error)) => {
                        ItemResult::failed(&envelope.id, error.clone(), attempts, duration_ms)
                    }
                    None => ItemResult::failed(
                        &envelope.id,
                        SyncError::Unknown {
                            platform: platform.to_string(),
                            code: None,
                            message: "batch response omitted this record".to_string(),
                        },
                        attempts,
                        duration_ms,
                    ),
                })
                .collect(),
            Err(error) => {
                let error = error.into_source();
                envelopes
                    .iter()
                    .map(|envelope| {
                        ItemResult::failed(&envelope.id, error.clone(), attempts, duration_ms)
                    })
                    .collect()
            }
        }
    }
}

/// Orchestrates pushes of local records to remote tables
pub struct SyncEngine {
    service: Arc<TableService>,
    store: Arc<dyn KeyValueStore>,
    mapper: DataMapper,
    dispatcher: Dispatcher,
    history: JobHistory,
    config: EngineConfig,
}

impl SyncEngine {
    /// # Errors
    /// Returns `SyncError::InvalidInput` when the breaker settings are invalid.
    pub fn new(
        service: Arc<TableService>,
        store: Arc<dyn KeyValueStore>,
        config: EngineConfig,
    ) -> Result<Self> {
        Self::with_clock(service, store, config, SharedClock::default())
    }

    /// Engine whose breakers read time from `clock`
    ///
    /// # Errors
    /// Returns `SyncError::InvalidInput` when the breaker settings are invalid.
    pub fn with_clock(
        service: Arc<TableService>,
        store: Arc<dyn KeyValueStore>,
        config: EngineConfig,
        clock: SharedClock,
    ) -> Result<Self> {
        let breakers = BreakerRegistry::new(&config.breaker, clock)?;
        let history = JobHistory::new(Arc::clone(&store), config.history_limit);
        Ok(Self {
            service,
            store,
            mapper: DataMapper::new(),
            dispatcher: Dispatcher {
                breakers: Arc::new(breakers),
                metrics: Arc::new(PerformanceMetrics::new()),
            },
            history,
            config,
        })
    }

    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn service(&self) -> &TableService {
        &self.service
    }

    pub const fn history(&self) -> &JobHistory {
        &self.history
    }

    /// Push one record, creating or updating the remote row
    ///
    /// Unset options fall back to the balanced strategy.
    ///
    /// # Errors
    /// Returns a [`SyncFailure`] carrying the classified error and the number
    /// of attempts made.
    #[instrument(skip_all, fields(record_id = %record.id, platform = %config.platform))]
    pub async fn sync_single(
        &self,
        record: &LocalRecord,
        config: &PlatformConfig,
        options: &SyncOptions,
    ) -> std::result::Result<SyncReceipt, SyncFailure> {
        let platform = config
            .resolve_platform()
            .map_err(|e| SyncFailure::before_attempt(config.platform.as_str(), &record.id, e))?;
        let adapter = self
            .service
            .adapter(config)
            .map_err(|e| SyncFailure::before_attempt(platform.as_str(), &record.id, e))?;
        let target = target_key(platform.as_str(), &config.id);
        let envelope = self
            .envelope_for(record, &target)
            .map_err(|e| SyncFailure::before_attempt(platform.as_str(), &record.id, e))?;
        let resolved = options.resolve(&self.config.strategies, SyncStrategy::Balanced);

        let mut job = SyncJob::new(JobKind::Single, platform, &config.id, 1);
        job.strategy = Some(resolved.strategy);
        begin(&mut job);

        let attempted = self.dispatcher.clone().push(platform, adapter, envelope, resolved).await;
        job.record(attempted.item(&record.id));
        self.finish(&mut job).await;

        match attempted.result {
            Ok(remote) => Ok(SyncReceipt {
                sync_id: job.id,
                record_id: record.id.clone(),
                status: job.status,
                result: remote,
                attempts: attempted.attempts,
                duration: attempted.elapsed,
            }),
            Err(error) => Err(SyncFailure::after(platform, &record.id, attempted.attempts, error)),
        }
    }

    /// Push many records; item failures never abort the job
    ///
    /// Unset options fall back to the balanced strategy.
    ///
    /// # Errors
    /// Fails only when the target profile cannot produce an adapter.
    #[instrument(skip_all, fields(platform = %config.platform, count = records.len()))]
    pub async fn sync_batch(
        &self,
        records: &[LocalRecord],
        config: &PlatformConfig,
        options: &SyncOptions,
    ) -> Result<SyncJob> {
        let resolved = options.resolve(&self.config.strategies, SyncStrategy::Balanced);
        self.run_per_item(JobKind::Batch, records, config, resolved, options).await
    }

    /// Push every stored record and write sync metadata back
    ///
    /// The strategy is chosen from the record count unless one is given.
    ///
    /// # Errors
    /// Fails when the records cannot be loaded or saved, or when the target
    /// profile cannot produce an adapter.
    #[instrument(skip_all, fields(platform = %config.platform, config_id = %config.id))]
    pub async fn sync_all(
        &self,
        config: &PlatformConfig,
        options: &SyncOptions,
    ) -> Result<SyncJob> {
        let records: Vec<LocalRecord> = load_collection(self.store.as_ref(), RECORDS_KEY).await?;
        let strategy = self.pick_strategy(options, records.len());
        let resolved = options.resolve(&self.config.strategies, strategy);
        info!(count = records.len(), strategy = %strategy, "syncing all records");

        let job = self.run_per_item(JobKind::All, &records, config, resolved, options).await?;
        self.write_back(&job, &target_key(job.platform.as_str(), &config.id)).await?;
        Ok(job)
    }

    /// Push many records using the platform's strongest safe path
    ///
    /// Platforms with native batch endpoints receive whole chunks once the
    /// record count exceeds the configured threshold. Chunk size, concurrency
    /// and pacing are clamped to the platform's published limits.
    ///
    /// # Errors
    /// Fails only when the target profile cannot produce an adapter.
    #[instrument(skip_all, fields(platform = %config.platform, count = records.len()))]
    pub async fn smart_sync(
        &self,
        records: &[LocalRecord],
        config: &PlatformConfig,
        options: &SyncOptions,
    ) -> Result<SyncJob> {
        let adapter = self.service.adapter(config)?;
        let capabilities = adapter.capabilities();
        let strategy = self.pick_strategy(options, records.len());
        let mut resolved = options.resolve(&self.config.strategies, strategy);
        resolved.concurrent_limit =
            resolved.concurrent_limit.min(capabilities.max_concurrency.max(1));
        resolved.batch_size = resolved.batch_size.min(capabilities.max_batch_size.max(1));

        if capabilities.native_batch && records.len() > self.config.native_batch_threshold {
            resolved.batch_delay = resolved.batch_delay.max(pacing_floor(2, capabilities));
            debug!(batch_size = resolved.batch_size, "using native batch endpoint");
            return self.run_native(records, config, adapter, resolved, options).await;
        }

        resolved.batch_delay =
            resolved.batch_delay.max(pacing_floor(resolved.batch_size, capabilities));
        self.run_per_item(JobKind::Smart, records, config, resolved, options).await
    }

    fn pick_strategy(&self, options: &SyncOptions, record_count: usize) -> SyncStrategy {
        options.strategy.unwrap_or_else(|| self.config.strategies.select(record_count))
    }

    pub fn metrics_snapshot(&self) -> Vec<MetricsEntry> {
        self.dispatcher.metrics.snapshot()
    }

    pub fn metrics(&self) -> &PerformanceMetrics {
        &self.dispatcher.metrics
    }

    pub fn breaker_state(&self, platform: Platform) -> CircuitState {
        self.dispatcher.breakers.state(platform)
    }

    pub fn breaker_metrics(&self, platform: Platform) -> Option<CircuitBreakerMetrics> {
        self.dispatcher.breakers.metrics(platform)
    }

    /// Close a platform's breaker without waiting for the cooldown
    pub fn reset_breaker(&self, platform: Platform) {
        info!(platform = %platform, "circuit breaker reset");
        self.dispatcher.breakers.reset(platform);
    }

    async fn run_per_item(
        &self,
        kind: JobKind,
        records: &[LocalRecord],
        config: &PlatformConfig,
        resolved: ResolvedOptions,
        options: &SyncOptions,
    ) -> Result<SyncJob> {
        let platform = config.resolve_platform()?;
        let adapter = self.service.adapter(config)?;
        let target = target_key(platform.as_str(), &config.id);

        let mut job = SyncJob::new(kind, platform, &config.id, records.len());
        job.strategy = Some(resolved.strategy);
        begin(&mut job);

        let total_batches = records.len().div_ceil(resolved.batch_size);
        for (batch_index, chunk) in records.chunks(resolved.batch_size).enumerate() {
            let mut tasks: TaskList = Vec::with_capacity(chunk.len());

            for record in chunk {
                let pending = match self.envelope_for(record, &target) {
                    Ok(envelope) => {
                        let dispatcher = self.dispatcher.clone();
                        let adapter = Arc::clone(&adapter);
                        PendingItem::Running(tokio::spawn(async move {
                            dispatcher.push(platform, adapter, envelope, resolved).await
                        }))
                    }
                    Err(error) => {
                        debug!(record_id = %record.id, error = %error, "record cannot be mapped");
                        PendingItem::Ready(ItemResult::failed(&record.id, error, 0, 0))
                    }
                };
                tasks.push((record.id.clone(), pending));

                if running(&tasks) >= resolved.concurrent_limit {
                    drain_tasks(platform, &mut tasks, &mut job).await;
                }
            }
            drain_tasks(platform, &mut tasks, &mut job).await;

            self.after_chunk(&job, batch_index, total_batches, resolved, options).await;
        }

        self.finish(&mut job).await;
        Ok(job)
    }

    async fn run_native(
        &self,
        records: &[LocalRecord],
        config: &PlatformConfig,
        adapter: Arc<dyn TableAdapter>,
        resolved: ResolvedOptions,
        options: &SyncOptions,
    ) -> Result<SyncJob> {
        let platform = config.resolve_platform()?;
        let target = target_key(platform.as_str(), &config.id);

        let mut job = SyncJob::new(JobKind::Smart, platform, &config.id, records.len());
        job.strategy = Some(resolved.strategy);
        begin(&mut job);

        let total_batches = records.len().div_ceil(resolved.batch_size);
        for (batch_index, chunk) in records.chunks(resolved.batch_size).enumerate() {
            let mut creates = Vec::new();
            let mut updates = Vec::new();
            for record in chunk {
                match self.envelope_for(record, &target) {
                    Ok(envelope) if envelope.remote_id.is_some() => updates.push(envelope),
                    Ok(envelope) => creates.push(envelope),
                    Err(error) => job.record(ItemResult::failed(&record.id, error, 0, 0)),
                }
            }

            for (operation, envelopes) in
                [(Operation::BatchCreate, creates), (Operation::BatchUpdate, updates)]
            {
                if envelopes.is_empty() {
                    continue;
                }
                let items = self
                    .dispatcher
                    .push_batch(platform, adapter.as_ref(), operation, &envelopes, resolved)
                    .await;
                for item in items {
                    job.record(item);
                }
            }

            self.after_chunk(&job, batch_index, total_batches, resolved, options).await;
        }

        self.finish(&mut job).await;
        Ok(job)
    }

    /// Report progress and pause before the next chunk
    async fn after_chunk(
        &self,
        job: &SyncJob,
        batch_index: usize,
        total_batches: usize,
        resolved: ResolvedOptions,
        options: &SyncOptions,
    ) {
        let progress =
            SyncProgress::new(job.results.len(), job.total, batch_index + 1, total_batches);
        debug!(
            processed = progress.processed,
            total = progress.total,
            batch = progress.current_batch,
            "chunk complete"
        );
        options.report(progress);

        if batch_index + 1 < total_batches && !resolved.batch_delay.is_zero() {
            tokio::time::sleep(resolved.batch_delay).await;
        }
    }

    fn envelope_for(&self, record: &LocalRecord, target: &str) -> Result<PlatformEnvelope> {
        let mut envelope = self.mapper.serialize(record, record.record_type)?;
        envelope.remote_id = record.sync.remote_ids.get(target).cloned();
        Ok(envelope)
    }

    async fn finish(&self, job: &mut SyncJob) {
        if let Err(e) = job.finish() {
            warn!(job_id = %job.id, error = %e, "job finished out of order");
        }
        info!(
            job_id = %job.id,
            kind = %job.kind,
            status = %job.status,
            succeeded = job.success_count,
            failed = job.failure_count,
            "sync job finished"
        );
        if let Err(e) = self.history.record(job).await {
            warn!(job_id = %job.id, error = %e, "failed to persist job history");
        }
    }

    /// Apply job outcomes to the stored records
    ///
    /// Records are re-read so rows added during the job survive.
    async fn write_back(&self, job: &SyncJob, target: &str) -> Result<()> {
        let outcomes: HashMap<&str, &ItemResult> =
            job.results.iter().map(|item| (item.record_id.as_str(), item)).collect();
        let at = job.finished_at.unwrap_or_else(Utc::now);

        let mut records: Vec<LocalRecord> =
            load_collection(self.store.as_ref(), RECORDS_KEY).await?;
        for record in &mut records {
            let Some(item) = outcomes.get(record.id.as_str()) else {
                continue;
            };
            match &item.error {
                None => record.sync.record_success(target, item.remote_id.as_deref(), at),
                Some(error) => record.sync.record_failure(
                    target,
                    SyncErrorEntry {
                        at,
                        kind: error.kind(),
                        message: error.to_string(),
                        attempts: item.attempts,
                    },
                    ERROR_HISTORY_LIMIT,
                ),
            }
        }
        save_collection(self.store.as_ref(), RECORDS_KEY, &records).await
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("config", &self.config)
            .field("history", &self.history)
            .finish_non_exhaustive()
    }
}

fn begin(job: &mut SyncJob) {
    if let Err(e) = job.start() {
        warn!(job_id = %job.id, error = %e, "job started out of order");
    }
    info!(job_id = %job.id, kind = %job.kind, total = job.total, "sync job started");
}

fn running(tasks: &TaskList) -> usize {
    tasks.iter().filter(|(_, pending)| matches!(pending, PendingItem::Running(_))).count()
}

/// Await queued tasks in submission order
async fn drain_tasks(platform: Platform, tasks: &mut TaskList, job: &mut SyncJob) {
    for (record_id, pending) in std::mem::take(tasks) {
        let item = match pending {
            PendingItem::Ready(item) => item,
            PendingItem::Running(handle) => match handle.await {
                Ok(attempted) => attempted.item(&record_id),
                Err(e) => {
                    warn!(record_id = %record_id, error = %e, "sync task aborted");
                    ItemResult::failed(
                        record_id,
                        SyncError::Unknown {
                            platform: platform.to_string(),
                            code: None,
                            message: format!("task failed: {e}"),
                        },
                        0,
                        0,
                    )
                }
            },
        };
        job.record(item);
    }
}

fn retry_executor(options: &ResolvedOptions) -> RetryExecutor<ClassifiedRetryPolicy> {
    let config = RetryConfig::doubling(
        options.max_retries,
        options.base_delay,
        Duration::from_millis(MAX_RETRY_DELAY_MS),
    );
    RetryExecutor::new(config, ClassifiedRetryPolicy)
}

/// A batch where every row failed is retried as one failure
fn reject_whole_batch(
    outcomes: Vec<ItemOutcome<RemoteRecord>>,
) -> Result<Vec<ItemOutcome<RemoteRecord>>> {
    if outcomes.iter().any(std::result::Result::is_ok) {
        return Ok(outcomes);
    }
    match outcomes.into_iter().find_map(std::result::Result::err) {
        Some(error) => Err(error),
        None => Ok(Vec::new()),
    }
}

/// Minimum gap between chunks that keeps `requests` under the rate limit
fn pacing_floor(requests: usize, capabilities: PlatformCapabilities) -> Duration {
    if capabilities.requests_per_second == 0 {
        return Duration::ZERO;
    }
    let requests = u64::try_from(requests).unwrap_or(u64::MAX);
    Duration::from_millis(
        requests.saturating_mul(1_000) / u64::from(capabilities.requests_per_second),
    )
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
