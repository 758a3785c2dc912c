use crate::errors::{Error, Result};
use crate::model::ReadingPayload;
use serde_json::Value;

pub const REQUIRED_FIELDS: [&str; 2] = ["device_number", "free_space"];

/// Checks `required_fields` in order and fails on the first one that is
/// absent or empty. A payload that is not a JSON object has no fields.
pub fn validate(required_fields: &[&str], payload: &Value) -> Result<()> {
    for field in required_fields {
        match payload.get(field) {
            Some(value) if !is_empty_value(value) => {}
            _ => {
                return Err(Error::Validation(format!(
                    "Missing required field: {}",
                    field
                )))
            }
        }
    }
    Ok(())
}

/// `null`, `false`, `0`, `""`, `"0"`, `[]` and `{}` count as empty.
fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty() || s == "0",
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

/// Parses and validates a raw ingestion body.
pub fn parse_reading(body: &[u8]) -> Result<ReadingPayload> {
    let payload: Value =
        serde_json::from_slice(body).map_err(|e| Error::InvalidPayload(e.to_string()))?;
    if payload.is_null() {
        return Err(Error::InvalidPayload("body is JSON null".to_string()));
    }

    validate(&REQUIRED_FIELDS, &payload)?;

    let device_number = integer_field(&payload, "device_number")?;
    let free_space = integer_field(&payload, "free_space")?;

    if free_space < 0 {
        return Err(Error::Validation("free_space must not be negative".to_string()));
    }

    Ok(ReadingPayload {
        device_number,
        free_space,
    })
}

/// Accepts JSON integers, integral floats and integer strings.
fn integer_field(payload: &Value, field: &str) -> Result<i64> {
    let value = &payload[field];
    let parsed = match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| Error::Validation(format!("{} must be an integer", field)))
}
