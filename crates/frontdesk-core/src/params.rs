//! Parameter bag helpers.
//!
//! Inbound function calls carry an untyped JSON object. It stays a sorted map
//! (`serde_json::Map` without `preserve_order`) until validation succeeds, so
//! resolving the same inputs twice serializes to identical bytes.

use serde_json::{Map, Value};

/// Caller-supplied or resolved parameters, keyed by wire field name.
pub type Params = Map<String, Value>;

/// Returns true when a parameter value counts as supplied.
///
/// `null`, blank strings and empty arrays/objects are treated as absent.
pub fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
        Some(_) => true,
    }
}

/// Renders a scalar value as text, for comparisons and slot storage.
pub fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Integral floats at or beyond this magnitude do not fit an `i64`.
const I64_FLOAT_LIMIT: f64 = 9_223_372_036_854_775_808.0;

/// Reads an integer from a number or a numeric string.
///
/// Floats must be integral and inside the `i64` range; `as` would saturate.
pub fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < I64_FLOAT_LIMIT)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}
