//! Moving rows between platforms' native formats
//!
//! A transform decodes the source platform's column titles to logical keys,
//! reshapes cell values the source stores in a structured form, and encodes
//! for the target platform's titles.

use serde_json::{Map, Value};
use tablesync_domain::Platform;

use super::fields::FieldCodec;

type Reshape = fn(Value) -> Value;

/// Inbound value reshaping for rows read from a platform
const RESHAPERS: &[(Platform, Reshape)] = &[(Platform::Wecom, flatten_text_segments)];

/// WeCom returns text cells as `[{"type": "text", "text": "..."}]`
pub fn flatten_text_segments(value: Value) -> Value {
    match value {
        Value::Array(items)
            if !items.is_empty()
                && items.iter().all(|item| item.get("text").is_some_and(Value::is_string)) =>
        {
            let text: String =
                items.iter().filter_map(|item| item.get("text").and_then(Value::as_str)).collect();
            Value::String(text)
        }
        other => other,
    }
}

/// Re-key and reshape `fields` from `from`'s format into `to`'s
///
/// Same-platform transforms return the input unchanged.
pub fn transform_for_platform(
    fields: &Map<String, Value>,
    from: Platform,
    to: Platform,
) -> Map<String, Value> {
    if from == to {
        return fields.clone();
    }

    let source = FieldCodec::for_platform(from);
    let target = FieldCodec::for_platform(to);
    let reshape = RESHAPERS.iter().find(|(platform, _)| *platform == from).map(|(_, f)| *f);

    fields
        .iter()
        .map(|(title, value)| {
            let logical = source.logical_name(title);
            let value = match reshape {
                Some(reshape) => reshape(value.clone()),
                None => value.clone(),
            };
            (target.platform_name(logical).to_string(), value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_same_platform_is_identity() {
        let fields = map(json!({"名称": "n", "custom": [1, 2]}));
        assert_eq!(transform_for_platform(&fields, Platform::Feishu, Platform::Feishu), fields);
    }

    #[test]
    fn test_feishu_to_dingtalk_renames_titles() {
        let fields = map(json!({"名称": "Weekly", "数据": "{}", "notes": "kept"}));
        let moved = transform_for_platform(&fields, Platform::Feishu, Platform::Dingtalk);

        assert_eq!(moved, map(json!({"Name": "Weekly", "Payload": "{}", "notes": "kept"})));
    }

    #[test]
    fn test_wecom_text_segments_are_flattened() {
        let fields = map(json!({
            "标题": [{"type": "text", "text": "Hello "}, {"type": "text", "text": "world"}],
            "版本号": 3,
            "tags": ["a", "b"]
        }));
        let moved = transform_for_platform(&fields, Platform::Wecom, Platform::Feishu);

        assert_eq!(moved["名称"], "Hello world");
        assert_eq!(moved["版本"], 3);
        assert_eq!(moved["tags"], json!(["a", "b"]));
    }
}
