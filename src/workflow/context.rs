//! Parameter store for workflow runtime
//!
//! The store is the single piece of mutable state shared across a run. It is
//! seeded from the workflow's `param_store`, overlaid with external
//! overrides, and written to only by the executor after a step's
//! `value_map` has been extracted.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Run-scoped key/value store threaded through every step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamStore {
    values: Map<String, Value>,
}

impl ParamStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a seed mapping, overlaying overrides (override wins)
    pub fn seeded(seed: &Map<String, Value>, overrides: Option<&ParamStore>) -> Self {
        let mut store = Self {
            values: seed.clone(),
        };
        if let Some(overrides) = overrides {
            store.merge(overrides);
        }
        store
    }

    /// Get a value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Set a value; last writer wins
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Remove a value, leaving the key absent
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Merge another store over this one
    pub fn merge(&mut self, other: &ParamStore) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.values
    }
}

impl From<Map<String, Value>> for ParamStore {
    fn from(values: Map<String, Value>) -> Self {
        Self { values }
    }
}

impl FromIterator<(String, Value)> for ParamStore {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}
