//! SQLite-backed key-value store.
//!
//! One `kv` table holds every collection as a JSON document. All database
//! operations run in `spawn_blocking` to avoid blocking the async runtime.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tablesync_core::KeyValueStore;
use tablesync_domain::{Result as DomainResult, SyncError};
use tokio::task;
use tracing::debug;

use crate::errors::InfraError;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL,
    updated_at INTEGER NOT NULL
)";

/// Durable [`KeyValueStore`] over a single SQLite connection
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open (or create) a database file and ensure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> DomainResult<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "opening sqlite store");
        let conn = Connection::open(path).map_err(to_domain)?;
        Self::with_connection(conn)
    }

    /// Private in-memory database.
    pub fn open_in_memory() -> DomainResult<Self> {
        Self::with_connection(Connection::open_in_memory().map_err(to_domain)?)
    }

    fn with_connection(conn: Connection) -> DomainResult<Self> {
        conn.busy_timeout(BUSY_TIMEOUT).map_err(to_domain)?;
        conn.execute(SCHEMA, []).map_err(to_domain)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    /// Keys currently stored, sorted.
    pub async fn keys(&self) -> DomainResult<Vec<String>> {
        let conn = Arc::clone(&self.conn);

        task::spawn_blocking(move || -> DomainResult<Vec<String>> {
            let conn = conn.lock();
            query_keys(&conn).map_err(to_domain)
        })
        .await
        .map_err(map_join_error)?
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> DomainResult<Option<Value>> {
        let conn = Arc::clone(&self.conn);
        let key = key.to_string();

        let raw = task::spawn_blocking(move || -> DomainResult<Option<String>> {
            let conn = conn.lock();
            query_value(&conn, &key).map_err(to_domain)
        })
        .await
        .map_err(map_join_error)??;

        raw.map(|text| {
            serde_json::from_str(&text).map_err(|e| SyncError::from(InfraError::from(e)))
        })
        .transpose()
    }

    async fn set(&self, key: &str, value: Value) -> DomainResult<()> {
        let conn = Arc::clone(&self.conn);
        let key = key.to_string();
        let text = serde_json::to_string(&value).map_err(|e| SyncError::from(InfraError::from(e)))?;

        task::spawn_blocking(move || -> DomainResult<()> {
            let conn = conn.lock();
            upsert_value(&conn, &key, &text).map_err(to_domain)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn remove(&self, key: &str) -> DomainResult<()> {
        let conn = Arc::clone(&self.conn);
        let key = key.to_string();

        task::spawn_blocking(move || -> DomainResult<()> {
            let conn = conn.lock();
            conn.execute("DELETE FROM kv WHERE key = ?1", params![key]).map_err(to_domain)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }
}

// ============================================================================
// Synchronous SQL Operations (called inside spawn_blocking)
// ============================================================================

fn query_value(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| row.get(0))
        .optional()
}

fn upsert_value(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    let now = chrono::Utc::now().timestamp();
    conn.execute(
        "INSERT INTO kv (key, value, updated_at)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET
            value = excluded.value,
            updated_at = excluded.updated_at",
        params![key, value, now],
    )?;
    Ok(())
}

fn query_keys(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT key FROM kv ORDER BY key")?;
    let keys = stmt.query_map([], |row| row.get(0))?.collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(keys)
}

fn to_domain(err: rusqlite::Error) -> SyncError {
    InfraError::from(err).into()
}

fn map_join_error(err: task::JoinError) -> SyncError {
    if err.is_cancelled() {
        SyncError::Storage("blocking task cancelled".into())
    } else {
        SyncError::Storage(format!("blocking task panicked: {err}"))
    }
}
