//! Response validation
//!
//! The expected value mirrors the shape of the response:
//! - a mapping checks only the keys it names; extra keys in the response
//!   are ignored
//! - a sequence is checked position by position
//! - a scalar matches when both sides have the same string form, so `1`
//!   and `"1"` are equal
//! - `null` matches a null or missing value
//!
//! The first mismatch, in the order the expected keys were written, is
//! reported with its path, e.g. `items[1]/id`.

use serde_json::Value;

/// First leaf where the response differed from what was expected
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Key: {path} Expected: {expected} Actual: {actual}")]
pub struct ValidationError {
    pub path: String,
    pub expected: String,
    pub actual: String,
}

const ROOT: &str = "response";
const MISSING: &str = "<missing>";

/// Check `actual` against `expected`
pub fn validate(expected: &Value, actual: &Value) -> Result<(), ValidationError> {
    check(expected, Some(actual), "")
}

fn check(expected: &Value, actual: Option<&Value>, path: &str) -> Result<(), ValidationError> {
    match expected {
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                let child = actual.and_then(|a| a.get(index));
                check(item, child, &format!("{}[{}]", path, index))?;
            }
            Ok(())
        }
        Value::Object(fields) => {
            for (key, item) in fields {
                let child = actual.and_then(|a| a.get(key.as_str()));
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{}/{}", path, key)
                };
                check(item, child, &child_path)?;
            }
            Ok(())
        }
        Value::Null => match actual {
            None | Some(Value::Null) => Ok(()),
            Some(_) => Err(mismatch(path, expected, actual)),
        },
        scalar => match actual {
            Some(value) if normalized(value) == normalized(scalar) => Ok(()),
            _ => Err(mismatch(path, expected, actual)),
        },
    }
}

fn mismatch(path: &str, expected: &Value, actual: Option<&Value>) -> ValidationError {
    ValidationError {
        path: if path.is_empty() { ROOT } else { path }.to_string(),
        expected: normalized(expected),
        actual: actual.map(normalized).unwrap_or_else(|| MISSING.to_string()),
    }
}

/// String form used for leaf comparison
pub fn normalized(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            // 1.0 and 1 print the same
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e15 => {
                format!("{}", f as i64)
            }
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}
