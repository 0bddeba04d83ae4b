//! Loose value coercion for device payloads.
//!
//! Field devices are inconsistent about types: numbers arrive as strings,
//! flags as booleans, labels as numbers. These helpers accept whatever JSON
//! value is present and produce the number or label the reading needs.

use serde_json::Value;

/// Coerce a value to a number, yielding NaN when it has no numeric meaning.
///
/// Strings are trimmed; an empty string is `0`. Booleans are `1`/`0` and
/// `null` is `0`. Arrays and objects are NaN.
pub fn to_number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                0.0
            } else {
                s.parse::<f64>().unwrap_or(f64::NAN)
            }
        }
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Null => 0.0,
        Value::Array(_) | Value::Object(_) => f64::NAN,
    }
}

/// Coerce an optional value to a number, replacing NaN with `0`.
pub fn number_or_zero(value: Option<&Value>) -> f64 {
    match value.map(to_number) {
        Some(n) if !n.is_nan() => n,
        _ => 0.0,
    }
}

/// Coerce an optional value to a label, falling back to `default` for
/// missing or falsy values (`null`, `false`, `0`, `""`).
pub fn label_or(value: Option<&Value>, default: &str) -> String {
    let label = match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(Value::Number(n)) if n.as_f64().map_or(true, |f| f == 0.0 || f.is_nan()) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(other) => Some(other.to_string()),
    };
    label.unwrap_or_else(|| default.to_string())
}
