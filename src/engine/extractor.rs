//! Value extraction into the parameter store
//!
//! A step's `value_map` names what to keep from its result:
//!
//! ```yaml
//! value_map:
//!   user_id: data/users[0]/id|int   # path with optional coercion
//!   whole: true                     # non-string: the whole result
//! ```
//!
//! or, as a list, top-level fields copied under their own names. A result
//! that is a sequence is reduced to its first element first. Paths that
//! lead nowhere leave the destination key absent; they never fail the run.

use serde_json::Value;
use tracing::debug;

use crate::workflow::expressions::leading_integer;
use crate::workflow::{ParamStore, ValueMap};

static NULL: Value = Value::Null;

/// Write the values named by `value_map` into `store`; returns how many keys
/// received a value
pub fn extract(result: &Value, value_map: &ValueMap, store: &mut ParamStore) -> usize {
    let source = match result {
        Value::Array(items) => items.first().unwrap_or(&NULL),
        other => other,
    };

    let mut written = 0;
    let mut write = |key: &str, value: Option<Value>| match value {
        Some(value) => {
            store.insert(key, value);
            written += 1;
        }
        None => {
            debug!("value_map: nothing found for {}", key);
            store.remove(key);
        }
    };

    match value_map {
        ValueMap::Fields(fields) => {
            for field in fields {
                write(field, source.get(field.as_str()).cloned());
            }
        }
        ValueMap::Paths(paths) => {
            for (key, path) in paths {
                match path {
                    Value::String(expr) => write(key, lookup(source, expr)),
                    _ => write(key, Some(source.clone())),
                }
            }
        }
    }

    written
}

/// Follow a `a/b[0]/c|int` path through `source`
pub fn lookup(source: &Value, expr: &str) -> Option<Value> {
    let (path, coercion) = match expr.split_once('|') {
        Some((path, coercion)) => (path, Some(coercion.trim())),
        None => (expr, None),
    };

    let mut current = source;
    for segment in path.split('/').map(str::trim).filter(|s| !s.is_empty()) {
        current = step_into(current, segment)?;
    }

    coerce(current, coercion)
}

/// One path segment: `name`, `name[1]`, `name[1][0]` or `[1]`
fn step_into<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
    let (name, rest) = match segment.find('[') {
        Some(open) => segment.split_at(open),
        None => (segment, ""),
    };

    let mut current = if name.is_empty() {
        value
    } else {
        field(value, name)?
    };

    let mut rest = rest;
    while let Some(stripped) = rest.strip_prefix('[') {
        let close = stripped.find(']')?;
        let index: usize = stripped[..close].trim().parse().ok()?;
        current = current.get(index)?;
        rest = &stripped[close + 1..];
    }

    Some(current)
}

fn field<'a>(value: &'a Value, name: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(name),
        Value::Array(items) => name.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

fn coerce(value: &Value, coercion: Option<&str>) -> Option<Value> {
    match coercion {
        Some("int") => match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
                .map(Value::from),
            Value::String(s) => leading_integer(s).map(Value::from),
            Value::Bool(_) | Value::Null | Value::Array(_) | Value::Object(_) => None,
        },
        Some("float") => match value {
            Value::Number(n) => n.as_f64().map(Value::from),
            Value::String(s) => s.trim().parse::<f64>().ok().map(Value::from),
            _ => None,
        },
        Some("str") => Some(Value::String(match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })),
        _ => Some(value.clone()),
    }
}
