//! Placeholder resolution for `<<key>>` syntax
//!
//! Supports:
//! - `<<key>>` as the whole string: replaced by the stored value, type preserved
//! - `prefix-<<key>>-suffix`: each token replaced by the value's string form
//! - `increment(key)` / `increment[key]`: the stored value parsed as an
//!   integer plus one

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

use super::context::ParamStore;
use super::step::{flag, RawStep, Step};

static PLACEHOLDER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<<(.+?)>>").unwrap());

static INCREMENT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"increment\s*[\(\[]\s*([^\)\]]+?)\s*[\)\]]").unwrap());

/// Errors that can occur during placeholder resolution
#[derive(Debug, thiserror::Error)]
pub enum ExpressionError {
    #[error("Cannot increment '{reference}': {value} is not an integer")]
    InvalidIncrement { reference: String, value: String },

    #[error("Invalid step after placeholder resolution: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Resolve every string leaf of `value` against the store
pub fn resolve(value: &Value, store: &ParamStore) -> Result<Value, ExpressionError> {
    match value {
        Value::String(s) => resolve_str(s, store),
        Value::Array(items) => items
            .iter()
            .map(|item| resolve(item, store))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut resolved = Map::with_capacity(map.len());
            for (key, item) in map {
                resolved.insert(key.clone(), resolve(item, store)?);
            }
            Ok(Value::Object(resolved))
        }
        other => Ok(other.clone()),
    }
}

/// Resolve a single string
pub fn resolve_str(input: &str, store: &ParamStore) -> Result<Value, ExpressionError> {
    if input.contains("increment") {
        if let Some(value) = resolve_increment(input, store)? {
            return Ok(value);
        }
    }

    if let Some(key) = whole_placeholder(input) {
        return Ok(store.get(key).cloned().unwrap_or(Value::Null));
    }

    let substituted = PLACEHOLDER_REGEX.replace_all(input, |caps: &regex::Captures| {
        render(store.get(&caps[1]))
    });
    Ok(Value::String(substituted.into_owned()))
}

/// Resolve the store against itself, using a snapshot so the result does not
/// depend on key order
pub fn resolve_store(store: &ParamStore) -> Result<ParamStore, ExpressionError> {
    let mut resolved = ParamStore::new();
    for (key, value) in store.iter() {
        resolved.insert(key.clone(), resolve(value, store)?);
    }
    Ok(resolved)
}

/// Resolve a raw step and interpret the result as a typed [`Step`]; the
/// workflow's own copy is never touched
pub fn resolve_step(raw: &RawStep, store: &ParamStore) -> Result<Step, ExpressionError> {
    let resolved = resolve(&Value::Object(raw.clone()), store)?;
    Ok(Step::from_value(resolved)?)
}

/// Whether a raw step asks to be skipped. Only `skip_step` is resolved, so
/// the rest of a skipped step never has to be valid.
pub fn skip_requested(raw: &RawStep, store: &ParamStore) -> Result<bool, ExpressionError> {
    match raw.get("skip_step") {
        Some(value) => Ok(flag(&resolve(value, store)?).unwrap_or(false)),
        None => Ok(false),
    }
}

/// Returns the key when the whole string is exactly one `<<key>>` token
fn whole_placeholder(input: &str) -> Option<&str> {
    let inner = input.strip_prefix("<<")?.strip_suffix(">>")?;
    if inner.is_empty() || inner.contains("<<") || inner.contains(">>") {
        return None;
    }
    Some(inner)
}

fn resolve_increment(input: &str, store: &ParamStore) -> Result<Option<Value>, ExpressionError> {
    let Some(caps) = INCREMENT_REGEX.captures(input) else {
        return Ok(None);
    };
    let reference = caps[1].trim();
    let key = whole_placeholder(reference).unwrap_or(reference);

    let base = match store.get(key) {
        Some(value) => as_integer(value),
        // Not a stored key: treat the bracketed text as the number itself
        None => leading_integer(key),
    };

    match base {
        Some(n) => match n.checked_add(1) {
            Some(next) => Ok(Some(Value::from(next))),
            None => Err(ExpressionError::InvalidIncrement {
                reference: key.to_string(),
                value: n.to_string(),
            }),
        },
        None => Err(ExpressionError::InvalidIncrement {
            reference: key.to_string(),
            value: store
                .get(key)
                .map(|v| render(Some(v)))
                .unwrap_or_else(|| key.to_string()),
        }),
    }
}

fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => leading_integer(s),
        _ => None,
    }
}

/// Parse the leading integer of a string, ignoring trailing garbage
pub(crate) fn leading_integer(s: &str) -> Option<i64> {
    let s = s.trim();
    let end = s
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+'))))
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    s[..end].parse().ok()
}

/// String form of a stored value for embedding in a larger string
pub fn render(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
