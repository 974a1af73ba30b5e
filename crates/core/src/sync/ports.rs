//! Port interfaces for sync progress reporting

use tablesync_domain::SyncProgress;

/// Receives progress events after each chunk
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, progress: &SyncProgress);
}

impl<F> ProgressSink for F
where
    F: Fn(&SyncProgress) + Send + Sync,
{
    fn on_progress(&self, progress: &SyncProgress) {
        self(progress);
    }
}
