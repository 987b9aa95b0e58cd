//! Workflow and Step definitions
//!
//! A workflow is a flat, ordered list of steps plus a seed for the
//! parameter store. Steps are kept raw until the executor has substituted
//! their placeholders, so control fields such as `delay` or `skip_step` may
//! themselves be `<<key>>` references. A resolved step becomes a typed
//! [`Step`]; everything it carries beyond the control fields (endpoints,
//! table names, bucket keys, ...) stays in `payload`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// A step exactly as written in the workflow file
pub type RawStep = Map<String, Value>;

// ============================================================================
// Workflow
// ============================================================================

/// A complete workflow definition
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Workflow {
    /// Flow name (for logging)
    #[serde(rename = "flow name", alias = "name", default)]
    pub name: Option<String>,

    /// Initial parameter store
    #[serde(default)]
    pub param_store: Map<String, Value>,

    /// Steps to execute, in order
    #[serde(default)]
    pub steps: Vec<RawStep>,
}

impl Workflow {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("unnamed flow")
    }
}

// ============================================================================
// Step
// ============================================================================

/// A single declarative step
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Step {
    /// Ordinal used in logs and error labels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<Value>,

    /// Human label
    #[serde(
        rename = "step name",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub name: Option<String>,

    /// Label of a nested flow; used when there is no `step name`
    #[serde(
        rename = "flow name",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub flow_name: Option<String>,

    /// Verb to invoke (lower-cased before dispatch)
    pub action: String,

    /// Explicit operation family, overriding the verb table
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,

    /// Number of retries after the first attempt
    #[serde(default, deserialize_with = "lenient_u32")]
    pub retry: u32,

    /// Post-step delay; also used between attempts unless `retry_delay` is set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<Seconds>,

    /// Delay between attempts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_delay: Option<Seconds>,

    #[serde(default, deserialize_with = "lenient_bool")]
    pub skip_step: bool,

    /// Expected response; `Some(Value::Null)` requires a null result,
    /// `None` means no validation
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub validate_response: Option<Value>,

    /// Values to copy from the result into the parameter store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_map: Option<ValueMap>,

    /// End the run with this step's result
    #[serde(rename = "return", default, deserialize_with = "lenient_bool")]
    pub return_result: bool,

    /// Log the raw dispatch result
    #[serde(default, deserialize_with = "lenient_bool")]
    pub log: bool,

    /// Family-specific fields
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Step {
    /// Interpret an already-resolved step
    pub fn from_raw(raw: &RawStep) -> Result<Self, serde_json::Error> {
        Self::from_value(Value::Object(raw.clone()))
    }

    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Label used in logs and surfaced errors, e.g. `step 3 create user`
    pub fn label(&self, index: usize) -> String {
        let name = self.name.as_deref().or(self.flow_name.as_deref());
        format_label(self.step.as_ref(), name, index)
    }

    /// Verb as dispatched
    pub fn verb(&self) -> String {
        self.action.trim().to_lowercase()
    }

    /// Sleep between attempts
    pub fn retry_wait(&self) -> Duration {
        self.retry_delay
            .or(self.delay)
            .map(Seconds::as_duration)
            .unwrap_or(Duration::ZERO)
    }

    /// Sleep after the step completes
    pub fn post_delay(&self) -> Option<Duration> {
        self.delay
            .map(Seconds::as_duration)
            .filter(|d| !d.is_zero())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key).filter(|v| !v.is_null())
    }

    /// Payload field as a string; numbers and booleans are rendered
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        match self.get(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: &str) -> bool {
        match self.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }

    /// Payload field as a list; a scalar becomes a single item
    pub fn get_list(&self, key: &str) -> Vec<Value> {
        match self.get(key) {
            Some(Value::Array(items)) => items.clone(),
            Some(other) => vec![other.clone()],
            None => Vec::new(),
        }
    }
}

/// Label of a step that has not been resolved yet
pub fn raw_label(raw: &RawStep, index: usize) -> String {
    let name = ["step name", "flow name"]
        .iter()
        .find_map(|key| raw.get(*key).and_then(Value::as_str));
    format_label(raw.get("step"), name, index)
}

fn format_label(ordinal: Option<&Value>, name: Option<&str>, index: usize) -> String {
    let ordinal = match ordinal {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => (index + 1).to_string(),
        Some(other) => other.to_string(),
    };
    match name {
        Some(name) if !name.is_empty() => format!("step {} {}", ordinal, name),
        _ => format!("step {}", ordinal),
    }
}

/// Boolean reading of a control flag: `true`, or the string `"true"` in any
/// case. `None` for values that are not flags at all.
pub fn flag(value: &Value) -> Option<bool> {
    match value {
        Value::Null => Some(false),
        Value::Bool(b) => Some(*b),
        Value::String(s) => Some(s.trim().eq_ignore_ascii_case("true")),
        _ => None,
    }
}

// ============================================================================
// Value map
// ============================================================================

/// Extraction instructions for a step result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValueMap {
    /// Top-level field names copied verbatim
    Fields(Vec<String>),
    /// Destination key -> path expression (`a/b[0]/c|int`)
    Paths(Map<String, Value>),
}

// ============================================================================
// Seconds
// ============================================================================

/// A delay in seconds, written as a number or a numeric string
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Seconds(pub f64);

impl Seconds {
    pub fn as_duration(self) -> Duration {
        if self.0.is_finite() && self.0 > 0.0 {
            Duration::from_secs_f64(self.0)
        } else {
            Duration::ZERO
        }
    }
}

impl<'de> Deserialize<'de> for Seconds {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum SecondsHelper {
            Number(f64),
            Text(String),
        }

        match SecondsHelper::deserialize(deserializer)? {
            SecondsHelper::Number(n) => Ok(Seconds(n)),
            SecondsHelper::Text(s) if s.trim().is_empty() => Ok(Seconds(0.0)),
            SecondsHelper::Text(s) => s
                .trim()
                .parse()
                .map(Seconds)
                .map_err(|_| serde::de::Error::custom(format!("invalid delay '{}'", s))),
        }
    }
}

/// Distinguishes an explicit `null` from an absent field
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

fn lenient_u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(0),
        Value::Number(n) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| serde::de::Error::custom(format!("invalid retry count {}", n))),
        Value::String(s) if s.trim().is_empty() => Ok(0),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid retry count '{}'", s))),
        other => Err(serde::de::Error::custom(format!(
            "invalid retry count {}",
            other
        ))),
    }
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    flag(&value)
        .ok_or_else(|| serde::de::Error::custom(format!("expected a boolean, got {}", value)))
}
