//! In-process store for tests and ephemeral sessions

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tablesync_core::KeyValueStore;
use tablesync_domain::Result;
use tokio::sync::RwLock;

/// Volatile [`KeyValueStore`]; contents are lost when dropped
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tablesync_core::{load_collection, save_collection};

    use super::*;

    #[tokio::test]
    async fn set_get_remove() {
        let store = MemoryStore::new();
        assert_eq!(store.get("records").await.unwrap(), None);

        store.set("records", json!([1, 2])).await.unwrap();
        assert_eq!(store.get("records").await.unwrap(), Some(json!([1, 2])));
        assert_eq!(store.len().await, 1);

        store.remove("records").await.unwrap();
        store.remove("records").await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn typed_collections_round_trip() {
        let store = MemoryStore::new();
        save_collection(&store, "names", &["a".to_string(), "b".to_string()]).await.unwrap();

        let names: Vec<String> = load_collection(&store, "names").await.unwrap();
        assert_eq!(names, vec!["a", "b"]);
    }
}
