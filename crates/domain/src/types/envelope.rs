//! Transport-ready record views

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{Result, SyncError};
use crate::types::record::{RecordType, RoutingFields};

/// Platform-agnostic envelope for one sync attempt
///
/// Built fresh by the data mapper on every attempt and never persisted.
/// `payload` is the full JSON serialization of the source record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformEnvelope {
    pub id: String,
    pub record_type: RecordType,
    pub name: String,
    pub payload: String,
    pub schema_version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub routing: RoutingFields,
    /// Remote row id when updating an existing row
    #[serde(default)]
    pub remote_id: Option<String>,
}

impl PlatformEnvelope {
    /// Logical columns written to the remote table
    #[must_use]
    pub fn logical_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("id".into(), Value::String(self.id.clone()));
        fields.insert("record_type".into(), Value::String(self.record_type.to_string()));
        fields.insert("name".into(), Value::String(self.name.clone()));
        fields.insert("payload".into(), Value::String(self.payload.clone()));
        fields.insert("schema_version".into(), Value::from(self.schema_version));
        fields.insert("created_at".into(), Value::String(self.created_at.to_rfc3339()));
        fields.insert("updated_at".into(), Value::String(self.updated_at.to_rfc3339()));
        fields
    }

    /// Rebuild an envelope from logical columns read back from a table
    ///
    /// Cells may arrive as strings even when written as numbers.
    ///
    /// # Errors
    /// Returns `SyncError::Deserialization` when a column is missing or
    /// malformed.
    pub fn from_logical_fields(fields: &Map<String, Value>) -> Result<Self> {
        let text = |key: &str| -> Result<String> {
            match fields.get(key) {
                Some(Value::String(s)) => Ok(s.clone()),
                Some(Value::Number(n)) => Ok(n.to_string()),
                _ => Err(SyncError::Deserialization(format!("missing column '{key}'"))),
            }
        };
        let timestamp = |key: &str| -> Result<DateTime<Utc>> {
            let raw = text(key)?;
            DateTime::parse_from_rfc3339(&raw).map(|dt| dt.with_timezone(&Utc)).map_err(|e| {
                SyncError::Deserialization(format!("column '{key}' is not a timestamp: {e}"))
            })
        };

        let record_type = text("record_type")?
            .parse::<RecordType>()
            .map_err(SyncError::Deserialization)?;
        let schema_version = text("schema_version")?.parse::<u32>().map_err(|e| {
            SyncError::Deserialization(format!("column 'schema_version' is not a version: {e}"))
        })?;

        Ok(Self {
            id: text("id")?,
            record_type,
            name: text("name").unwrap_or_default(),
            payload: text("payload")?,
            schema_version,
            created_at: timestamp("created_at")?,
            updated_at: timestamp("updated_at")?,
            routing: RoutingFields::default(),
            remote_id: None,
        })
    }
}
