//! Persisted history of finished sync jobs

use std::sync::Arc;

use tablesync_domain::constants::SYNC_HISTORY_KEY;
use tablesync_domain::{Result, SyncJob};
use tokio::sync::Mutex;

use crate::storage::{load_collection, save_collection, KeyValueStore};

/// Most recent jobs, oldest first, capped at `limit`
pub struct JobHistory {
    store: Arc<dyn KeyValueStore>,
    limit: usize,
    write_lock: Mutex<()>,
}

impl JobHistory {
    pub fn new(store: Arc<dyn KeyValueStore>, limit: usize) -> Self {
        Self { store, limit: limit.max(1), write_lock: Mutex::new(()) }
    }

    /// Append a job, dropping the oldest beyond the cap
    pub async fn record(&self, job: &SyncJob) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut jobs: Vec<SyncJob> = load_collection(self.store.as_ref(), SYNC_HISTORY_KEY).await?;
        jobs.push(job.clone());
        if jobs.len() > self.limit {
            let excess = jobs.len() - self.limit;
            jobs.drain(..excess);
        }
        save_collection(self.store.as_ref(), SYNC_HISTORY_KEY, &jobs).await
    }

    pub async fn list(&self) -> Result<Vec<SyncJob>> {
        load_collection(self.store.as_ref(), SYNC_HISTORY_KEY).await
    }

    pub async fn find(&self, job_id: &str) -> Result<Option<SyncJob>> {
        Ok(self.list().await?.into_iter().find(|job| job.id == job_id))
    }

    pub async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.store.remove(SYNC_HISTORY_KEY).await
    }
}

impl std::fmt::Debug for JobHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHistory").field("limit", &self.limit).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use parking_lot::Mutex as SyncMutex;
    use serde_json::Value;
    use tablesync_domain::{JobKind, Platform};

    use super::*;

    #[derive(Default)]
    struct MapStore(SyncMutex<HashMap<String, Value>>);

    #[async_trait]
    impl KeyValueStore for MapStore {
        async fn get(&self, key: &str) -> Result<Option<Value>> {
            Ok(self.0.lock().get(key).cloned())
        }

        async fn set(&self, key: &str, value: Value) -> Result<()> {
            self.0.lock().insert(key.to_string(), value);
            Ok(())
        }

        async fn remove(&self, key: &str) -> Result<()> {
            self.0.lock().remove(key);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_history_is_capped_oldest_first() {
        let history = JobHistory::new(Arc::new(MapStore::default()), 3);
        let mut ids = Vec::new();
        for _ in 0..5 {
            let job = SyncJob::new(JobKind::Single, Platform::Feishu, "cfg", 1);
            ids.push(job.id.clone());
            history.record(&job).await.unwrap();
        }

        let kept: Vec<String> =
            history.list().await.unwrap().into_iter().map(|job| job.id).collect();
        assert_eq!(kept, ids[2..].to_vec());
        assert!(history.find(&ids[4]).await.unwrap().is_some());
        assert!(history.find(&ids[0]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clear_removes_everything() {
        let history = JobHistory::new(Arc::new(MapStore::default()), 10);
        history.record(&SyncJob::new(JobKind::All, Platform::Wecom, "cfg", 0)).await.unwrap();
        history.clear().await.unwrap();
        assert!(history.list().await.unwrap().is_empty());
    }
}
