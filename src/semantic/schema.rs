use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{NormRefError, Result};

/// JSON type a response field must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
            FieldKind::Array => "array",
            FieldKind::Object => "object",
        }
    }

    fn matches(&self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Number => value.is_number(),
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::Array => value.is_array(),
            FieldKind::Object => value.is_object(),
        }
    }
}

/// A single declared field of a response record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
}

/// The record shape a semantic call must return.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseSchema {
    pub fields: Vec<FieldSpec>,
}

impl ResponseSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: &str, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec {
            name: name.to_string(),
            kind,
            required: true,
        });
        self
    }

    pub fn optional(mut self, name: &str, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec {
            name: name.to_string(),
            kind,
            required: false,
        });
        self
    }

    /// Checks that `record` is an object whose required fields are present and
    /// non-null, and whose present fields have the declared kind.
    ///
    /// Undeclared fields are ignored.
    pub fn validate(&self, record: &Value) -> Result<()> {
        let object = record.as_object().ok_or_else(|| NormRefError::SchemaViolation {
            message: format!("expected a JSON object, got {}", json_kind(record)),
            field: "<root>".to_string(),
        })?;

        for spec in &self.fields {
            match object.get(&spec.name) {
                None | Some(Value::Null) if spec.required => {
                    return Err(NormRefError::SchemaViolation {
                        message: "required field is missing".to_string(),
                        field: spec.name.clone(),
                    });
                }
                None | Some(Value::Null) => {}
                Some(value) if !spec.kind.matches(value) => {
                    return Err(NormRefError::SchemaViolation {
                        message: format!(
                            "expected {}, got {}",
                            spec.kind.as_str(),
                            json_kind(value)
                        ),
                        field: spec.name.clone(),
                    });
                }
                Some(_) => {}
            }
        }

        Ok(())
    }
}

/// Returns the string field `name` of a validated record.
pub fn str_field<'a>(record: &'a Value, name: &str) -> Option<&'a str> {
    record.get(name).and_then(Value::as_str)
}

/// Returns the numeric field `name` of a validated record, clamped to `[0, 1]`.
pub fn confidence_field(record: &Value, name: &str) -> Option<f64> {
    record
        .get(name)
        .and_then(Value::as_f64)
        .map(|c| c.clamp(0.0, 1.0))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
