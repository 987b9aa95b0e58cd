//! Execution result types

use serde::Serialize;
use serde_json::Value;

use crate::workflow::ParamStore;

/// What a completed run yields
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "value", rename_all = "snake_case")]
pub enum FlowOutcome {
    /// Every step ran; the final parameter store
    Completed(ParamStore),
    /// A step with `return: true` ended the run with its dispatch result
    Returned(Value),
}

impl FlowOutcome {
    pub fn is_returned(&self) -> bool {
        matches!(self, FlowOutcome::Returned(_))
    }

    pub fn params(&self) -> Option<&ParamStore> {
        match self {
            FlowOutcome::Completed(store) => Some(store),
            FlowOutcome::Returned(_) => None,
        }
    }

    /// The outcome as a plain JSON value: the store's mapping or the
    /// returned result
    pub fn into_value(self) -> Value {
        match self {
            FlowOutcome::Completed(store) => Value::Object(store.into_inner()),
            FlowOutcome::Returned(value) => value,
        }
    }
}
