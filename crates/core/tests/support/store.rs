//! In-memory `KeyValueStore`

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tablesync_core::KeyValueStore;
use tablesync_domain::Result as DomainResult;

#[derive(Default)]
pub struct InMemoryStore {
    values: Mutex<HashMap<String, Value>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw value under `key`, bypassing the async API
    pub fn peek(&self, key: &str) -> Option<Value> {
        self.values.lock().get(key).cloned()
    }

    pub fn put(&self, key: &str, value: Value) {
        self.values.lock().insert(key.to_string(), value);
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> DomainResult<Option<Value>> {
        Ok(self.peek(key))
    }

    async fn set(&self, key: &str, value: Value) -> DomainResult<()> {
        self.put(key, value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> DomainResult<()> {
        self.values.lock().remove(key);
        Ok(())
    }
}
