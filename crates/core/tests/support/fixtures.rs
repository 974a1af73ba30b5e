//! Record and profile fixtures

use serde_json::{json, Map, Value};
use tablesync_domain::{LocalRecord, Platform, PlatformConfig, RecordType};

/// Valid rewrite record with a fixed id
pub fn rewrite_record(id: &str) -> LocalRecord {
    let fields: Map<String, Value> = match json!({
        "original_text": format!("original {id}"),
        "rewritten_text": format!("rewritten {id}"),
        "model_id": "gpt-4o-mini",
        "tags": ["demo"],
    }) {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    LocalRecord::new(RecordType::Rewrite, fields).with_id(id)
}

/// `count` rewrite records with ids `r0..r{count-1}`
pub fn rewrite_records(count: usize) -> Vec<LocalRecord> {
    (0..count).map(|index| rewrite_record(&format!("r{index}"))).collect()
}

pub fn feishu_config() -> PlatformConfig {
    PlatformConfig::new("team-base", Platform::Feishu)
        .with_credentials("cli_app", "secret")
        .with_destination("bascn123", "tbl456")
}
