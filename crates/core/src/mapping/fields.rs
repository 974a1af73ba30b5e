//! Field naming and value coercion for table writes
//!
//! Every platform stores text cells. A [`FieldCodec`] renames logical keys to
//! the platform's column titles and flattens values to strings:
//! objects become JSON, arrays are joined with `", "`, booleans become
//! `是` / `否`, null becomes the empty string.

use serde_json::{Map, Value};
use tablesync_domain::constants::{ARRAY_DELIMITER, BOOL_FALSE_TOKEN, BOOL_TRUE_TOKEN};
use tablesync_domain::Platform;

const FEISHU_FIELDS: &[(&str, &str)] = &[
    ("id", "记录ID"),
    ("record_type", "类型"),
    ("name", "名称"),
    ("payload", "数据"),
    ("schema_version", "版本"),
    ("created_at", "创建时间"),
    ("updated_at", "更新时间"),
];

const DINGTALK_FIELDS: &[(&str, &str)] = &[
    ("id", "Record ID"),
    ("record_type", "Type"),
    ("name", "Name"),
    ("payload", "Payload"),
    ("schema_version", "Version"),
    ("created_at", "Created At"),
    ("updated_at", "Updated At"),
];

const WECOM_FIELDS: &[(&str, &str)] = &[
    ("id", "编号"),
    ("record_type", "记录类型"),
    ("name", "标题"),
    ("payload", "内容"),
    ("schema_version", "版本号"),
    ("created_at", "创建时间"),
    ("updated_at", "更新时间"),
];

/// Logical key to column title table plus value coercion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldCodec {
    names: &'static [(&'static str, &'static str)],
}

impl FieldCodec {
    pub const fn new(names: &'static [(&'static str, &'static str)]) -> Self {
        Self { names }
    }

    /// Column titles used by a platform's default table template
    pub const fn for_platform(platform: Platform) -> Self {
        match platform {
            Platform::Feishu => Self::new(FEISHU_FIELDS),
            Platform::Dingtalk => Self::new(DINGTALK_FIELDS),
            Platform::Wecom => Self::new(WECOM_FIELDS),
        }
    }

    /// Column title for a logical key; unmapped keys pass through
    pub fn platform_name<'a>(&self, key: &'a str) -> &'a str {
        self.names.iter().find(|(logical, _)| *logical == key).map_or(key, |&(_, title)| title)
    }

    /// Logical key for a column title; unmapped titles pass through
    pub fn logical_name<'a>(&self, title: &'a str) -> &'a str {
        self.names.iter().find(|(_, t)| *t == title).map_or(title, |&(logical, _)| logical)
    }

    /// Rename keys and coerce every value to a string cell
    pub fn encode(&self, fields: &Map<String, Value>) -> Map<String, Value> {
        fields
            .iter()
            .map(|(key, value)| {
                (self.platform_name(key).to_string(), Value::String(coerce(value)))
            })
            .collect()
    }

    /// Rename column titles back to logical keys; values are kept
    pub fn decode(&self, fields: &Map<String, Value>) -> Map<String, Value> {
        fields
            .iter()
            .map(|(title, value)| (self.logical_name(title).to_string(), value.clone()))
            .collect()
    }
}

/// String form of a value for a text cell
pub fn coerce(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => BOOL_TRUE_TOKEN.to_string(),
        Value::Bool(false) => BOOL_FALSE_TOKEN.to_string(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(ARRAY_DELIMITER),
        Value::Object(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_feishu_encoding_of_mixed_record() {
        let codec = FieldCodec::for_platform(Platform::Feishu);
        let record =
            fields(json!({"id": "x1", "name": "Test", "tags": ["a", "b"], "active": true}));
        let encoded = codec.encode(&record);

        assert_eq!(encoded["记录ID"], "x1");
        assert_eq!(encoded["名称"], "Test");
        assert_eq!(encoded["tags"], "a, b");
        assert_eq!(encoded["active"], "是");
    }

    #[test]
    fn test_value_coercion_rules() {
        assert_eq!(coerce(&json!(false)), "否");
        assert_eq!(coerce(&Value::Null), "");
        assert_eq!(coerce(&json!(3.5)), "3.5");
        assert_eq!(coerce(&json!({"k": 1})), r#"{"k":1}"#);
        assert_eq!(coerce(&json!([1, "two", {"n": 3}])), r#"1, two, {"n":3}"#);
        assert_eq!(coerce(&json!([])), "");
    }

    #[test]
    fn test_unmapped_keys_pass_through() {
        let codec = FieldCodec::for_platform(Platform::Wecom);
        assert_eq!(codec.platform_name("custom"), "custom");
        assert_eq!(codec.logical_name("custom"), "custom");
    }

    #[test]
    fn test_decode_reverses_titles() {
        let codec = FieldCodec::for_platform(Platform::Dingtalk);
        let decoded = codec.decode(&fields(json!({"Payload": "{}", "Version": "3", "extra": 1})));

        assert_eq!(decoded["payload"], "{}");
        assert_eq!(decoded["schema_version"], "3");
        assert_eq!(decoded["extra"], 1);
    }

    #[test]
    fn test_platform_tables_are_distinct() {
        let titles: Vec<&str> = Platform::ALL
            .iter()
            .map(|p| FieldCodec::for_platform(*p).platform_name("payload"))
            .collect();
        assert_eq!(titles, vec!["数据", "Payload", "内容"]);
    }
}
