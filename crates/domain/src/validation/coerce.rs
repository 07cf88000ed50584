use serde_json::{Number, Value};

use super::schema::FieldType;

/// Converts a raw value to the declared field type where a rule exists.
/// Values that cannot be converted come back unchanged.
pub fn coerce(kind: FieldType, value: Value) -> Value {
    match (kind, value) {
        (FieldType::Integer | FieldType::Number, Value::String(raw)) => {
            parse_number(&raw).unwrap_or(Value::String(raw))
        }
        (FieldType::Boolean, Value::String(raw)) => match raw.as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::String(raw),
        },
        (_, other) => other,
    }
}

fn parse_number(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(int) = trimmed.parse::<i64>() {
        return Some(Value::from(int));
    }

    let float = trimmed.parse::<f64>().ok().filter(|f| f.is_finite())?;
    if float.fract() == 0.0 && float >= i64::MIN as f64 && float < i64::MAX as f64 {
        Some(Value::from(float as i64))
    } else {
        Number::from_f64(float).map(Value::Number)
    }
}
