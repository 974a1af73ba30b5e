//! Schema migrations
//!
//! Each step moves one record type forward by exactly one version. Steps only
//! rename or fill fields that are still in their old shape, so running a step
//! on already-migrated data changes nothing.

use serde_json::{Map, Value};
use tablesync_domain::{RecordType, Result, SyncError};
use tracing::debug;

type Transform = fn(Map<String, Value>) -> Map<String, Value>;

/// One version step
#[derive(Debug, Clone, Copy)]
pub struct MigrationStep {
    pub record_type: RecordType,
    pub from: u32,
    pub transform: Transform,
}

const STEPS: &[MigrationStep] = &[
    MigrationStep { record_type: RecordType::Rewrite, from: 1, transform: rewrite_v1_to_v2 },
    MigrationStep { record_type: RecordType::Rewrite, from: 2, transform: rewrite_v2_to_v3 },
    MigrationStep { record_type: RecordType::Config, from: 1, transform: config_v1_to_v2 },
];

fn rename(fields: &mut Map<String, Value>, old: &str, new: &str) {
    if fields.contains_key(new) {
        return;
    }
    if let Some(value) = fields.remove(old) {
        fields.insert(new.to_string(), value);
    }
}

fn rewrite_v1_to_v2(mut fields: Map<String, Value>) -> Map<String, Value> {
    rename(&mut fields, "text", "original_text");
    rename(&mut fields, "result", "rewritten_text");
    fields
}

fn rewrite_v2_to_v3(mut fields: Map<String, Value>) -> Map<String, Value> {
    rename(&mut fields, "model", "model_id");
    fields.entry("tags").or_insert_with(|| Value::Array(Vec::new()));
    fields
}

fn config_v1_to_v2(mut fields: Map<String, Value>) -> Map<String, Value> {
    rename(&mut fields, "endpoint", "base_url");
    fields.entry("enabled").or_insert(Value::Bool(true));
    fields
}

/// Move `data` from schema version `from` to `to`
///
/// `from == to` returns the data unchanged.
///
/// # Errors
/// Returns `SyncError::Migration` for versions outside `1..=current`, for
/// downgrades, and for any missing step.
pub fn migrate(
    record_type: RecordType,
    data: Map<String, Value>,
    from: u32,
    to: u32,
) -> Result<Map<String, Value>> {
    let current = record_type.current_schema_version();
    for version in [from, to] {
        if version == 0 || version > current {
            return Err(SyncError::Migration(format!(
                "{record_type} schema version {version} is not supported (current is {current})"
            )));
        }
    }
    if from > to {
        return Err(SyncError::Migration(format!(
            "cannot downgrade {record_type} from v{from} to v{to}"
        )));
    }

    let mut data = data;
    for version in from..to {
        let step = STEPS
            .iter()
            .find(|step| step.record_type == record_type && step.from == version)
            .ok_or_else(|| {
                SyncError::Migration(format!("no {record_type} migration from v{version}"))
            })?;
        debug!(%record_type, from = version, to = version + 1, "applying migration step");
        data = (step.transform)(data);
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;
    use tablesync_common::testing::fixtures::{random_fields, random_text};

    use super::*;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_rewrite_v1_to_v3() {
        let migrated = migrate(
            RecordType::Rewrite,
            map(json!({"text": "src", "result": "out", "model": "m1"})),
            1,
            3,
        )
        .unwrap();

        assert_eq!(
            Value::Object(migrated),
            json!({"original_text": "src", "rewritten_text": "out", "model_id": "m1", "tags": []})
        );
    }

    #[test]
    fn test_existing_tags_are_kept() {
        let migrated =
            migrate(RecordType::Rewrite, map(json!({"model": "m", "tags": ["x"]})), 2, 3).unwrap();
        assert_eq!(migrated["tags"], json!(["x"]));
    }

    #[test]
    fn test_config_v1_to_v2_defaults_enabled() {
        let migrated =
            migrate(RecordType::Config, map(json!({"endpoint": "https://api"})), 1, 2).unwrap();
        assert_eq!(migrated["base_url"], "https://api");
        assert_eq!(migrated["enabled"], true);

        let legacy = map(json!({"base_url": "u", "enabled": false}));
        let disabled = migrate(RecordType::Config, legacy, 1, 2).unwrap();
        assert_eq!(disabled["enabled"], false);
    }

    #[test]
    fn test_same_version_is_identity() {
        let data = map(json!({"anything": 1}));
        assert_eq!(migrate(RecordType::Config, data.clone(), 2, 2).unwrap(), data);
    }

    #[test]
    fn test_unknown_and_backward_versions_fail() {
        assert!(matches!(
            migrate(RecordType::Rewrite, Map::new(), 3, 1),
            Err(SyncError::Migration(_))
        ));
        assert!(matches!(
            migrate(RecordType::Rewrite, Map::new(), 0, 3),
            Err(SyncError::Migration(_))
        ));
        assert!(matches!(
            migrate(RecordType::Config, Map::new(), 1, 3),
            Err(SyncError::Migration(_))
        ));
    }

    #[test]
    fn test_migration_is_idempotent_on_random_payloads() {
        let mut rng = StdRng::seed_from_u64(0x5eed);

        for _ in 0..200 {
            for record_type in RecordType::ALL {
                let current = record_type.current_schema_version();
                let mut data = random_fields(&mut rng, 4);
                // Seed legacy keys so the steps have work to do
                data.insert("text".into(), Value::String(random_text(&mut rng, 12)));
                data.insert("model".into(), Value::String(random_text(&mut rng, 6)));
                data.insert("endpoint".into(), Value::String(random_text(&mut rng, 8)));

                for from in 1..=current {
                    for to in from..=current {
                        let once = migrate(record_type, data.clone(), from, to).unwrap();
                        let again = migrate(record_type, once.clone(), to, to).unwrap();
                        assert_eq!(again, once);

                        // Re-running every step over migrated data is also a no-op
                        let rerun = migrate(record_type, once.clone(), from, to).unwrap();
                        assert_eq!(rerun, once);
                    }
                }
            }
        }
    }
}
