//! Best-effort conversion of stored field values across a type change.
//!
//! `null` always converts to `null`. Lists convert element by element and
//! fail as a whole if any element fails. Scalars wrap into a one-element list
//! when the target is a list.

use crate::error::FieldConversionError;
use chrono::{DateTime, SecondsFormat};
use schemaflow_model::{FieldSchema, FieldType};
use serde_json::{Number, Value, json};
use uuid::Uuid;

/// Converts `value`, stored under the `from` declaration, to the `to`
/// declaration.
pub fn convert(
    value: &Value,
    from: &FieldSchema,
    to: &FieldSchema,
) -> Result<Value, FieldConversionError> {
    convert_value(value, from.field_type, from.list_type, to.field_type, to.list_type).ok_or_else(
        || FieldConversionError {
            field: to.name.clone(),
            from: from.declared_type(),
            to: to.declared_type(),
            value: preview(value),
        },
    )
}

fn convert_value(
    value: &Value,
    from: FieldType,
    from_list: Option<FieldType>,
    to: FieldType,
    to_list: Option<FieldType>,
) -> Option<Value> {
    if value.is_null() {
        return Some(Value::Null);
    }
    if from == to && from_list == to_list {
        return Some(value.clone());
    }

    use FieldType::*;
    match (from, to) {
        (List, List) => {
            let (from_elem, to_elem) = (from_list?, to_list?);
            value
                .as_array()?
                .iter()
                .map(|v| convert_value(v, from_elem, None, to_elem, None))
                .collect::<Option<Vec<_>>>()
                .map(Value::Array)
        }
        (List, String | Html) => {
            let from_elem = from_list?;
            let parts = value
                .as_array()?
                .iter()
                .map(|v| {
                    convert_value(v, from_elem, None, String, None)
                        .and_then(|s| s.as_str().map(str::to_owned))
                })
                .collect::<Option<Vec<_>>>()?;
            Some(Value::String(parts.join(",")))
        }
        (List, _) => None,
        (_, List) => {
            let elem = convert_value(value, from, from_list, to_list?, None)?;
            Some(Value::Array(vec![elem]))
        }

        (String | Html, String | Html) => value.as_str().map(|s| json!(s)),
        (String | Html, Number) => parse_number(value.as_str()?),
        (String | Html, Boolean) => match value.as_str()?.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(Value::Bool(true)),
            "false" | "0" => Some(Value::Bool(false)),
            _ => None,
        },
        (String | Html, Date) => {
            let s = value.as_str()?.trim();
            DateTime::parse_from_rfc3339(s).ok()?;
            Some(json!(s))
        }
        (String | Html, Node) => {
            let s = value.as_str()?.trim();
            let uuid = Uuid::parse_str(s).ok()?;
            Some(json!({ "uuid": uuid.to_string() }))
        }

        (Number, String | Html) => value.is_number().then(|| json!(value.to_string())),
        (Number, Boolean) => {
            let n = value.as_f64()?;
            if n == 0.0 {
                Some(Value::Bool(false))
            } else if n == 1.0 {
                Some(Value::Bool(true))
            } else {
                None
            }
        }
        (Number, Date) => {
            let millis = value.as_i64()?;
            let date = DateTime::from_timestamp_millis(millis)?;
            Some(json!(date.to_rfc3339_opts(SecondsFormat::Millis, true)))
        }

        (Boolean, String | Html) => Some(json!(value.as_bool()?.to_string())),
        (Boolean, Number) => Some(json!(if value.as_bool()? { 1 } else { 0 })),

        (Date, String | Html) => value.as_str().map(|s| json!(s)),
        (Date, Number) => {
            let date = DateTime::parse_from_rfc3339(value.as_str()?.trim()).ok()?;
            Some(json!(date.timestamp_millis()))
        }

        _ => None,
    }
}

fn parse_number(s: &str) -> Option<Value> {
    let trimmed = s.trim();
    if let Ok(i) = trimmed.parse::<i64>() {
        return Some(json!(i));
    }
    let f = trimmed.parse::<f64>().ok()?;
    Number::from_f64(f).map(Value::Number)
}

fn preview(value: &Value) -> String {
    let text = value.to_string();
    if text.chars().count() > 64 {
        let cut: String = text.chars().take(61).collect();
        format!("{cut}...")
    } else {
        text
    }
}
