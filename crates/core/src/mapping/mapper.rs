//! Local record <-> platform envelope conversion
//!
//! Pure and stateless. The envelope payload is the full JSON form of the
//! record, so reading it back reproduces every business field.

use chrono::Utc;
use serde_json::{Map, Value};
use tablesync_domain::constants::LOCAL_SOURCE;
use tablesync_domain::{
    LocalRecord, Platform, PlatformEnvelope, RecordType, RemoteRecord, Result, SyncError,
};
use uuid::Uuid;

use super::fields::FieldCodec;
use super::migration::migrate;
use super::schema::RecordSchema;

/// Converts between local records and envelopes
#[derive(Debug, Clone, Copy, Default)]
pub struct DataMapper;

impl DataMapper {
    pub const fn new() -> Self {
        Self
    }

    /// Build the envelope for one sync attempt
    ///
    /// A blank record id is replaced with a generated one, in both the
    /// envelope and the payload.
    ///
    /// # Errors
    /// Returns `SyncError::InvalidInput` when `record_type` disagrees with the
    /// record's own type.
    pub fn serialize(
        &self,
        record: &LocalRecord,
        record_type: RecordType,
    ) -> Result<PlatformEnvelope> {
        if record.record_type != record_type {
            return Err(SyncError::InvalidInput(format!(
                "record {} is {}, not {record_type}",
                record.id, record.record_type
            )));
        }

        let mut record = record.clone();
        if record.id.trim().is_empty() {
            record.id = Uuid::now_v7().to_string();
        }

        let payload = serde_json::to_string(&record).map_err(|e| {
            SyncError::InvalidInput(format!("record {} cannot be encoded: {e}", record.id))
        })?;

        Ok(PlatformEnvelope {
            name: record.display_name(),
            id: record.id,
            record_type,
            payload,
            schema_version: record_type.current_schema_version(),
            created_at: record.created_at,
            updated_at: record.updated_at,
            routing: record.routing,
            remote_id: None,
        })
    }

    /// Read an envelope produced locally
    ///
    /// # Errors
    /// See [`DataMapper::deserialize_from`].
    pub fn deserialize(&self, envelope: &PlatformEnvelope) -> Result<LocalRecord> {
        self.read_envelope(envelope, LOCAL_SOURCE)
    }

    /// Read an envelope fetched from `platform`
    ///
    /// Older payloads are migrated to the current schema first. Sync id,
    /// sync time and source are attached; business fields are untouched.
    ///
    /// # Errors
    /// Returns `SyncError::Deserialization` when the payload is not JSON or
    /// fails validation, and `SyncError::Migration` when its version cannot
    /// be migrated.
    pub fn deserialize_from(
        &self,
        envelope: &PlatformEnvelope,
        platform: Platform,
    ) -> Result<LocalRecord> {
        self.read_envelope(envelope, platform.as_str())
    }

    /// Decode a row read back from a platform table
    ///
    /// # Errors
    /// Fails like [`DataMapper::deserialize_from`], or when the row lacks
    /// envelope columns.
    pub fn from_remote(&self, remote: &RemoteRecord, platform: Platform) -> Result<LocalRecord> {
        let logical = FieldCodec::for_platform(platform).decode(&remote.fields);
        let mut envelope = PlatformEnvelope::from_logical_fields(&logical)?;
        envelope.remote_id = Some(remote.id.clone());
        self.deserialize_from(&envelope, platform)
    }

    fn read_envelope(&self, envelope: &PlatformEnvelope, source: &str) -> Result<LocalRecord> {
        let mut payload: Map<String, Value> =
            serde_json::from_str(&envelope.payload).map_err(|e| {
                SyncError::Deserialization(format!(
                    "envelope {} payload is not a JSON object: {e}",
                    envelope.id
                ))
            })?;

        let declared = payload.get("type").and_then(Value::as_str).unwrap_or_default();
        if declared != envelope.record_type.to_string() {
            return Err(SyncError::Deserialization(format!(
                "envelope {} is {} but payload declares '{declared}'",
                envelope.id, envelope.record_type
            )));
        }

        let fields = match payload.remove("fields") {
            Some(Value::Object(fields)) => fields,
            _ => {
                return Err(SyncError::Deserialization(format!(
                    "envelope {} payload has no fields object",
                    envelope.id
                )))
            }
        };
        let fields = migrate(
            envelope.record_type,
            fields,
            envelope.schema_version,
            envelope.record_type.current_schema_version(),
        )?;
        RecordSchema::current(envelope.record_type).validate(&fields)?;
        payload.insert("fields".into(), Value::Object(fields));

        let mut record: LocalRecord =
            serde_json::from_value(Value::Object(payload)).map_err(|e| {
                SyncError::Deserialization(format!(
                    "envelope {} payload is not a record: {e}",
                    envelope.id
                ))
            })?;

        record.sync.sync_id = Some(envelope.id.clone());
        record.sync.synced_at = Some(Utc::now());
        record.sync.source = Some(source.to_string());
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use serde_json::json;
    use tablesync_common::testing::fixtures::{random_fields, random_text};
    use tablesync_domain::RoutingFields;

    use super::*;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn rewrite_record() -> LocalRecord {
        let fields = map(json!({
            "original_text": "今天天气不错",
            "rewritten_text": "Nice day",
            "model_id": "qwen"
        }));
        LocalRecord::new(RecordType::Rewrite, fields).with_id("r-1")
    }

    fn random_record(rng: &mut StdRng) -> LocalRecord {
        let record_type = if rng.gen_bool(0.5) { RecordType::Rewrite } else { RecordType::Config };
        let count = rng.gen_range(0..6);
        let mut fields = random_fields(rng, count);
        match record_type {
            RecordType::Rewrite => {
                fields.insert("original_text".into(), Value::String(random_text(rng, 40)));
                fields.insert("rewritten_text".into(), Value::String(random_text(rng, 40)));
                fields.insert("model_id".into(), Value::String(random_text(rng, 10)));
                fields.insert("tags".into(), json!([random_text(rng, 5)]));
            }
            RecordType::Config => {
                fields.insert("name".into(), Value::String(random_text(rng, 12)));
                fields.insert("provider".into(), Value::String(random_text(rng, 8)));
                fields.insert("base_url".into(), Value::String(random_text(rng, 20)));
                let temperature = f64::from(rng.gen_range(0_u8..=20)) / 10.0;
                fields.insert("temperature".into(), json!(temperature));
                fields.insert("enabled".into(), Value::Bool(rng.gen_bool(0.5)));
            }
        }

        let mut record = LocalRecord::new(record_type, fields);
        if rng.gen_bool(0.3) {
            record.routing = RoutingFields {
                workspace_id: Some(random_text(rng, 8)),
                table_id: Some(random_text(rng, 8)),
            };
        }
        record
    }

    #[test]
    fn test_serialize_populates_envelope() {
        let record = rewrite_record().with_routing(RoutingFields {
            workspace_id: Some("app".into()),
            table_id: Some("tbl".into()),
        });

        let envelope = DataMapper::new().serialize(&record, RecordType::Rewrite).unwrap();

        assert_eq!(envelope.id, "r-1");
        assert_eq!(envelope.schema_version, 3);
        assert_eq!(envelope.name, "今天天气不错");
        assert_eq!(envelope.routing.table_id.as_deref(), Some("tbl"));
        assert_eq!(serde_json::from_str::<Value>(&envelope.payload).unwrap()["id"], "r-1");
    }

    #[test]
    fn test_serialize_generates_missing_id() {
        let record = rewrite_record().with_id("");
        let envelope = DataMapper::new().serialize(&record, RecordType::Rewrite).unwrap();

        assert!(!envelope.id.is_empty());
        let restored = DataMapper::new().deserialize(&envelope).unwrap();
        assert_eq!(restored.id, envelope.id);
    }

    #[test]
    fn test_serialize_rejects_type_mismatch() {
        let result = DataMapper::new().serialize(&rewrite_record(), RecordType::Config);
        assert!(matches!(result, Err(SyncError::InvalidInput(_))));
    }

    #[test]
    fn test_deserialize_attaches_sync_metadata() {
        let mapper = DataMapper::new();
        let envelope = mapper.serialize(&rewrite_record(), RecordType::Rewrite).unwrap();

        let restored = mapper.deserialize_from(&envelope, Platform::Feishu).unwrap();
        assert_eq!(restored.sync.sync_id.as_deref(), Some("r-1"));
        assert_eq!(restored.sync.source.as_deref(), Some("feishu"));
        assert!(restored.sync.synced_at.is_some());

        assert_eq!(mapper.deserialize(&envelope).unwrap().sync.source.as_deref(), Some("local"));
    }

    #[test]
    fn test_deserialize_rejects_bad_payloads() {
        let mapper = DataMapper::new();
        let mut envelope = mapper.serialize(&rewrite_record(), RecordType::Rewrite).unwrap();

        envelope.payload = "not json".into();
        assert!(matches!(mapper.deserialize(&envelope), Err(SyncError::Deserialization(_))));

        let mut broken = rewrite_record();
        broken.fields.remove("model_id");
        let envelope = mapper.serialize(&broken, RecordType::Rewrite).unwrap();
        let err = mapper.deserialize(&envelope).unwrap_err();
        assert!(matches!(err, SyncError::Deserialization(msg) if msg.contains("model_id")));
    }

    #[test]
    fn test_deserialize_migrates_old_payload() {
        let mapper = DataMapper::new();
        let fields = map(json!({"text": "a", "result": "b", "model": "m"}));
        let legacy = LocalRecord::new(RecordType::Rewrite, fields).with_id("old");
        let mut envelope = mapper.serialize(&legacy, RecordType::Rewrite).unwrap();
        envelope.schema_version = 1;

        let restored = mapper.deserialize(&envelope).unwrap();
        assert_eq!(restored.fields["original_text"], "a");
        assert_eq!(restored.fields["model_id"], "m");
        assert_eq!(restored.fields["tags"], json!([]));
    }

    #[test]
    fn test_deserialize_rejects_future_version() {
        let mapper = DataMapper::new();
        let mut envelope = mapper.serialize(&rewrite_record(), RecordType::Rewrite).unwrap();
        envelope.schema_version = 4;
        assert!(matches!(mapper.deserialize(&envelope), Err(SyncError::Migration(_))));
    }

    #[test]
    fn test_from_remote_reads_platform_row() {
        let mapper = DataMapper::new();
        let envelope = mapper.serialize(&rewrite_record(), RecordType::Rewrite).unwrap();
        let codec = FieldCodec::for_platform(Platform::Dingtalk);
        let remote = RemoteRecord::new("recX", codec.encode(&envelope.logical_fields()));

        let restored = mapper.from_remote(&remote, Platform::Dingtalk).unwrap();
        assert!(restored.same_business_fields(&rewrite_record_with_times(&envelope)));
        assert_eq!(restored.sync.source.as_deref(), Some("dingtalk"));
    }

    fn rewrite_record_with_times(envelope: &PlatformEnvelope) -> LocalRecord {
        let mut record = rewrite_record();
        record.created_at = envelope.created_at;
        record.updated_at = envelope.updated_at;
        record
    }

    #[test]
    fn test_round_trip_preserves_business_fields() {
        let mapper = DataMapper::new();
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..500 {
            let record = random_record(&mut rng);
            let envelope = mapper.serialize(&record, record.record_type).unwrap();
            let restored = mapper.deserialize(&envelope).unwrap();

            assert!(
                restored.same_business_fields(&record),
                "round trip changed record {}",
                record.id
            );
        }
    }
}
