//! Local persistence contract and typed collection helpers

pub mod ports;

pub use ports::KeyValueStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tablesync_domain::{Result, SyncError};

/// Load a JSON array collection, empty when absent
///
/// # Errors
/// Returns `SyncError::Storage` when the stored value has the wrong shape.
pub async fn load_collection<T>(store: &dyn KeyValueStore, key: &str) -> Result<Vec<T>>
where
    T: DeserializeOwned,
{
    match store.get(key).await? {
        None | Some(serde_json::Value::Null) => Ok(Vec::new()),
        Some(value) => serde_json::from_value(value)
            .map_err(|e| SyncError::Storage(format!("collection '{key}' is malformed: {e}"))),
    }
}

/// Replace a JSON array collection
///
/// # Errors
/// Returns `SyncError::Storage` when serialization or the write fails.
pub async fn save_collection<T>(store: &dyn KeyValueStore, key: &str, items: &[T]) -> Result<()>
where
    T: Serialize + Sync,
{
    let value = serde_json::to_value(items)
        .map_err(|e| SyncError::Storage(format!("collection '{key}' cannot be encoded: {e}")))?;
    store.set(key, value).await
}
