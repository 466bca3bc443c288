//! Value-level type checking of instance field data.
//!
//! Field values are plain JSON. The expected shapes per declared type:
//! - `string`, `html`: JSON string
//! - `number`: JSON number
//! - `boolean`: JSON bool
//! - `date`: RFC 3339 string
//! - `binary`: object (binary metadata; the payload lives elsewhere)
//! - `node`: object with a `uuid` string naming the referenced node
//! - `micronode`: object with a `microschema` name and a `fields` object
//! - `list`: array whose elements each match `list_type`
//!
//! `null` is accepted for every type.
//!
//! Attribute constraints apply to each scalar (or each list element):
//! `allowed_values` to strings, `min`/`max` to numbers, and `allowed_schemas`
//! to the `microschema` name of micronodes. A node value carries only the
//! referenced uuid, so `allowed_schemas` on node fields is not checked here.

use crate::error::TypeCheckError;
use crate::field::{FieldSchema, FieldType};
use serde_json::Value;

/// Short JSON kind name used in mismatch messages.
pub fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Whether a single non-list value conforms to `field_type`.
pub fn matches_type(field_type: FieldType, value: &Value) -> bool {
    match (field_type, value) {
        (_, Value::Null) => true,
        (FieldType::String | FieldType::Html, Value::String(_)) => true,
        (FieldType::Number, Value::Number(_)) => true,
        (FieldType::Boolean, Value::Bool(_)) => true,
        (FieldType::Date, Value::String(s)) => chrono::DateTime::parse_from_rfc3339(s).is_ok(),
        (FieldType::Binary, Value::Object(_)) => true,
        (FieldType::Node, Value::Object(obj)) => obj
            .get("uuid")
            .and_then(Value::as_str)
            .is_some_and(|s| uuid::Uuid::parse_str(s).is_ok()),
        (FieldType::Micronode, Value::Object(obj)) => {
            obj.get("microschema").is_some_and(Value::is_string)
                && obj.get("fields").is_some_and(Value::is_object)
        }
        _ => false,
    }
}

/// Checks one field value against its schema.
pub fn check_value(schema: &FieldSchema, value: &Value) -> Result<(), TypeCheckError> {
    let ok = match (schema.field_type, value) {
        (FieldType::List, Value::Array(items)) => match schema.list_type {
            Some(element) => items.iter().all(|item| matches_type(element, item)),
            None => false,
        },
        (FieldType::List, Value::Null) => true,
        (FieldType::List, _) => false,
        (field_type, value) => matches_type(field_type, value),
    };

    if !ok {
        return Err(TypeCheckError::Mismatch {
            field: schema.name.clone(),
            expected: schema.declared_type(),
            found: json_kind(value).to_string(),
        });
    }

    match value {
        Value::Array(items) => items
            .iter()
            .try_for_each(|item| check_constraints(schema, item)),
        other => check_constraints(schema, other),
    }
}

fn check_constraints(schema: &FieldSchema, value: &Value) -> Result<(), TypeCheckError> {
    let attributes = &schema.attributes;
    let element = match schema.field_type {
        FieldType::List => schema.list_type.unwrap_or(FieldType::List),
        field_type => field_type,
    };
    let not_allowed = |value: &str| TypeCheckError::NotAllowed {
        field: schema.name.clone(),
        value: value.to_string(),
    };

    match value {
        Value::String(s) if element == FieldType::String => {
            if let Some(allowed) = &attributes.allowed_values {
                if !allowed.iter().any(|a| a == s) {
                    return Err(not_allowed(s));
                }
            }
        }
        Value::Number(n) => {
            if let Some(n) = n.as_f64() {
                let below = attributes.min.is_some_and(|min| n < min);
                let above = attributes.max.is_some_and(|max| n > max);
                if below || above {
                    return Err(TypeCheckError::OutOfRange {
                        field: schema.name.clone(),
                        value: n,
                    });
                }
            }
        }
        Value::Object(obj) if element.is_reference() => {
            let name = obj.get("microschema").and_then(Value::as_str);
            if let (Some(name), Some(allowed)) = (name, &attributes.allowed_schemas) {
                if !allowed.iter().any(|a| a == name) {
                    return Err(not_allowed(name));
                }
            }
        }
        _ => {}
    }
    Ok(())
}
