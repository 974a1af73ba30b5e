//! Local records and their sync metadata

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::constants::MAX_RECORD_NAME_CHARS;
use crate::errors::ErrorKind;
use crate::impl_domain_status_conversions;

/// Logical record type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    /// Rewritten text produced by an LLM provider
    Rewrite,
    /// Model provider configuration
    Config,
}

impl_domain_status_conversions!(RecordType {
    Rewrite => "rewrite",
    Config => "config",
});

impl RecordType {
    pub const ALL: [Self; 2] = [Self::Rewrite, Self::Config];

    /// Schema version written by this build
    #[must_use]
    pub const fn current_schema_version(self) -> u32 {
        match self {
            Self::Rewrite => 3,
            Self::Config => 2,
        }
    }
}

/// Destination identifiers carried by a record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_id: Option<String>,
}

impl RoutingFields {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.workspace_id.is_none() && self.table_id.is_none()
    }
}

/// Sync status of a local record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordSyncStatus {
    #[default]
    NeverSynced,
    Pending,
    Synced,
    Failed,
}

impl_domain_status_conversions!(RecordSyncStatus {
    NeverSynced => "never_synced",
    Pending => "pending",
    Synced => "synced",
    Failed => "failed",
});

/// One failed push to one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncErrorEntry {
    pub at: DateTime<Utc>,
    pub kind: ErrorKind,
    pub message: String,
    pub attempts: u32,
}

/// Key identifying one sync target in record metadata
#[must_use]
pub fn target_key(platform: &str, config_id: &str) -> String {
    format!("{platform}:{config_id}")
}

/// Sync bookkeeping attached to a record
///
/// Only the sync subsystem writes here; business fields are never touched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncMetadata {
    pub status: RecordSyncStatus,
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Envelope id this record was read back from
    pub sync_id: Option<String>,
    /// When this record was read back from an envelope
    pub synced_at: Option<DateTime<Utc>>,
    /// Platform name, or `"local"`
    pub source: Option<String>,
    /// Remote record id per target key
    pub remote_ids: BTreeMap<String, String>,
    /// Most recent failures per target key, oldest first
    pub errors: BTreeMap<String, Vec<SyncErrorEntry>>,
}

impl SyncMetadata {
    pub fn record_success(&mut self, target: &str, remote_id: Option<&str>, at: DateTime<Utc>) {
        self.status = RecordSyncStatus::Synced;
        self.last_synced_at = Some(at);
        if let Some(remote_id) = remote_id {
            self.remote_ids.insert(target.to_string(), remote_id.to_string());
        }
    }

    /// Append a failure, keeping at most `limit` entries for the target
    pub fn record_failure(&mut self, target: &str, entry: SyncErrorEntry, limit: usize) {
        self.status = RecordSyncStatus::Failed;
        let history = self.errors.entry(target.to_string()).or_default();
        history.push(entry);
        if history.len() > limit {
            let excess = history.len() - limit;
            history.drain(..excess);
        }
    }
}

/// One unit of user-visible data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    /// Business payload
    pub fields: Map<String, Value>,
    #[serde(default, skip_serializing_if = "RoutingFields::is_empty")]
    pub routing: RoutingFields,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub sync: SyncMetadata,
}

impl LocalRecord {
    pub fn new(record_type: RecordType, fields: Map<String, Value>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7().to_string(),
            record_type,
            fields,
            routing: RoutingFields::default(),
            created_at: now,
            updated_at: now,
            sync: SyncMetadata::default(),
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    #[must_use]
    pub fn with_routing(mut self, routing: RoutingFields) -> Self {
        self.routing = routing;
        self
    }

    /// Equality ignoring sync metadata
    #[must_use]
    pub fn same_business_fields(&self, other: &Self) -> bool {
        self.id == other.id
            && self.record_type == other.record_type
            && self.fields == other.fields
            && self.routing == other.routing
            && self.created_at == other.created_at
            && self.updated_at == other.updated_at
    }

    /// Human-readable name for table rows
    #[must_use]
    pub fn display_name(&self) -> String {
        let source = match self.record_type {
            RecordType::Config => self.fields.get("name"),
            RecordType::Rewrite => self.fields.get("original_text"),
        };

        match source.and_then(Value::as_str).map(str::trim) {
            Some(text) if !text.is_empty() => {
                let mut name: String = text.chars().take(MAX_RECORD_NAME_CHARS).collect();
                if text.chars().count() > MAX_RECORD_NAME_CHARS {
                    name.push_str("...");
                }
                name
            }
            _ => format!("{}-{}", self.record_type, self.id),
        }
    }
}
