//! Payload schemas per record type
//!
//! Only the current version of each type has a schema. Older payloads are
//! migrated before validation.

use serde_json::{Map, Value};
use tablesync_domain::{RecordType, Result, SyncError};

/// JSON type expected for a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Number,
    Bool,
    Array,
    Object,
}

impl FieldKind {
    fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Bool => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Bool => "bool",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

/// One field rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRule {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

const fn required(name: &'static str, kind: FieldKind) -> FieldRule {
    FieldRule { name, kind, required: true }
}

const fn optional(name: &'static str, kind: FieldKind) -> FieldRule {
    FieldRule { name, kind, required: false }
}

const REWRITE_V3: &[FieldRule] = &[
    required("original_text", FieldKind::String),
    required("rewritten_text", FieldKind::String),
    required("model_id", FieldKind::String),
    optional("prompt", FieldKind::String),
    optional("tags", FieldKind::Array),
    optional("created_at", FieldKind::String),
    optional("source_url", FieldKind::String),
];

const CONFIG_V2: &[FieldRule] = &[
    required("name", FieldKind::String),
    required("provider", FieldKind::String),
    required("base_url", FieldKind::String),
    optional("model_id", FieldKind::String),
    optional("temperature", FieldKind::Number),
    optional("enabled", FieldKind::Bool),
];

/// Field rules of one record type at one version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordSchema {
    pub record_type: RecordType,
    pub version: u32,
    pub fields: &'static [FieldRule],
}

impl RecordSchema {
    /// Schema of the current version of `record_type`
    pub const fn current(record_type: RecordType) -> Self {
        let fields = match record_type {
            RecordType::Rewrite => REWRITE_V3,
            RecordType::Config => CONFIG_V2,
        };
        Self { record_type, version: record_type.current_schema_version(), fields }
    }

    /// Check required presence and per-field types
    ///
    /// Unknown fields are allowed. `null` counts as absent.
    ///
    /// # Errors
    /// Returns `SyncError::Deserialization` naming every violation.
    pub fn validate(&self, fields: &Map<String, Value>) -> Result<()> {
        let mut problems = Vec::new();

        for rule in self.fields {
            match fields.get(rule.name) {
                None | Some(Value::Null) if rule.required => {
                    problems.push(format!("missing required field '{}'", rule.name));
                }
                None | Some(Value::Null) => {}
                Some(value) if !rule.kind.matches(value) => {
                    problems.push(format!("field '{}' must be {}", rule.name, rule.kind.label()));
                }
                Some(_) => {}
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(SyncError::Deserialization(format!(
                "{} v{} payload invalid: {}",
                self.record_type,
                self.version,
                problems.join("; ")
            )))
        }
    }
}
