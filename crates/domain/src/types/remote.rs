//! Normalized adapter results

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One row as returned by a platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub id: String,
    pub fields: Map<String, Value>,
    #[serde(default)]
    pub created_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_modified_time: Option<DateTime<Utc>>,
}

impl RemoteRecord {
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self { id: id.into(), fields, created_time: None, last_modified_time: None }
    }

    /// Set timestamps from epoch milliseconds as reported by the platforms
    #[must_use]
    pub fn with_times_millis(mut self, created: Option<i64>, modified: Option<i64>) -> Self {
        self.created_time = created.and_then(|ms| Utc.timestamp_millis_opt(ms).single());
        self.last_modified_time = modified.and_then(|ms| Utc.timestamp_millis_opt(ms).single());
        self
    }
}

/// Outcome of a delete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    pub success: bool,
    pub deleted_count: usize,
}

/// Paged read parameters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordQuery {
    pub page_size: Option<u32>,
    pub page_token: Option<String>,
    /// Platform-native filter expression
    pub filter: Option<String>,
}

impl RecordQuery {
    #[must_use]
    pub const fn page_size(mut self, size: u32) -> Self {
        self.page_size = Some(size);
        self
    }

    #[must_use]
    pub fn page_token(mut self, token: impl Into<String>) -> Self {
        self.page_token = Some(token.into());
        self
    }
}

/// One page of rows
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordPage {
    pub records: Vec<RemoteRecord>,
    pub has_more: bool,
    pub page_token: Option<String>,
    pub total: Option<u64>,
}

/// Column description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub id: String,
    pub name: String,
    /// Platform-native type label
    pub field_type: String,
}

/// Table schema summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    pub table_id: String,
    pub name: Option<String>,
    pub fields: Vec<FieldInfo>,
}
