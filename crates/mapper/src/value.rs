//! Scalar values and rows as exchanged with the query executor

use std::collections::HashMap;

pub use serde_json::Value;

/// A flat mapping from column name to scalar (or null)
pub type Row = HashMap<String, Value>;

/// Normalize a join key so that numeric and string forms of the same key
/// collide (`1`, `1.0` and `"1"` all map to `"1"`). Null has no key.
pub fn key_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else if let Some(u) = n.as_u64() {
                Some(u.to_string())
            } else {
                let f = n.as_f64()?;
                if f.fract() == 0.0 && f.abs() < 9.0e15 {
                    Some(format!("{}", f as i64))
                } else {
                    Some(f.to_string())
                }
            }
        }
        other => Some(other.to_string()),
    }
}

/// Loose equality used when matching keys across sources
pub fn keys_match(left: &Value, right: &Value) -> bool {
    match (key_string(left), key_string(right)) {
        (Some(l), Some(r)) => l == r,
        _ => false,
    }
}

/// Build a row from `(column, value)` pairs
pub fn row<I, K, V>(pairs: I) -> Row
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
