//! Stage output: the keys a stage adds to the job context.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The writes produced by one successful stage execution.
///
/// The orchestrator merges these into the job context under the stage's
/// name, so the context a later stage sees is always a superset of the one
/// an earlier stage saw.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageOutput {
    writes: BTreeMap<String, serde_json::Value>,
}

impl StageOutput {
    /// Creates an output with no writes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an output with a single value.
    #[must_use]
    pub fn value(key: impl Into<String>, value: serde_json::Value) -> Self {
        Self::new().with(key, value)
    }

    /// Adds a write.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.insert(key, value);
        self
    }

    /// Adds a write in place.
    pub fn insert(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.writes.insert(key.into(), value);
    }

    /// Gets a written value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.writes.get(key)
    }

    /// Returns the number of writes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Returns true if the stage wrote nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Consumes the output, yielding its writes.
    #[must_use]
    pub fn into_writes(self) -> BTreeMap<String, serde_json::Value> {
        self.writes
    }
}

impl FromIterator<(String, serde_json::Value)> for StageOutput {
    fn from_iter<I: IntoIterator<Item = (String, serde_json::Value)>>(iter: I) -> Self {
        Self {
            writes: iter.into_iter().collect(),
        }
    }
}
