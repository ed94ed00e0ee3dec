//! Accumulating job context.
//!
//! Each key is owned by whichever stage wrote it first. A stage may update
//! its own keys but never another stage's.

use crate::errors::StageError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use super::StageOutput;

/// Owner name for keys seeded from the submitted request.
pub const REQUEST_OWNER: &str = "request";

/// A single context value with its owning stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    /// The stage (or [`REQUEST_OWNER`]) that wrote the key.
    pub owner: String,
    /// The stored value.
    pub value: serde_json::Value,
}

/// Raised when a stage writes a key owned by someone else.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Stage '{writer}' attempted to overwrite key '{key}' owned by '{owner}'")]
pub struct ContextOwnershipError {
    /// The contested key.
    pub key: String,
    /// The current owner.
    pub owner: String,
    /// The stage that attempted the write.
    pub writer: String,
}

/// The accumulated outputs of a job's stages.
///
/// Cheap to read, grows only. Merges produce a new context so that a failed
/// stage can never leave a half-written one behind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobContext {
    entries: BTreeMap<String, ContextEntry>,
}

impl JobContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets a value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.entries.get(key).map(|entry| &entry.value)
    }

    /// Gets a value and deserializes it.
    #[must_use]
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Gets a value a stage cannot run without.
    ///
    /// # Errors
    ///
    /// Returns an invalid-input [`StageError`] naming `stage` if the key is
    /// missing.
    pub fn require(&self, stage: &str, key: &str) -> Result<&serde_json::Value, StageError> {
        self.get(key).ok_or_else(|| {
            StageError::invalid_input(stage, format!("required context key '{key}' is missing"))
        })
    }

    /// Gets and deserializes a required value.
    ///
    /// # Errors
    ///
    /// Returns an invalid-input [`StageError`] if the key is missing or has
    /// the wrong shape.
    pub fn require_as<T: DeserializeOwned>(&self, stage: &str, key: &str) -> Result<T, StageError> {
        let value = self.require(stage, key)?;
        serde_json::from_value(value.clone()).map_err(|e| {
            StageError::invalid_input(stage, format!("context key '{key}' has unexpected shape: {e}"))
        })
    }

    /// Returns the owner of a key.
    #[must_use]
    pub fn owner(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|entry| entry.owner.as_str())
    }

    /// Checks if a key exists.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Returns all keys in sorted order.
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// Returns the keys owned by `owner`.
    #[must_use]
    pub fn keys_owned_by(&self, owner: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.owner == owner)
            .map(|(key, _)| key.as_str())
            .collect()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the context is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns a plain key/value view.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect();
        serde_json::Value::Object(map)
    }

    /// Returns a new context with `output`'s writes applied under `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`ContextOwnershipError`] if any write targets a key owned by
    /// a different writer; `self` is left untouched.
    pub fn merged(&self, owner: &str, output: StageOutput) -> Result<Self, ContextOwnershipError> {
        let mut next = self.clone();
        for (key, value) in output.into_writes() {
            if let Some(existing) = next.entries.get_mut(&key) {
                if existing.owner != owner {
                    return Err(ContextOwnershipError {
                        key,
                        owner: existing.owner.clone(),
                        writer: owner.to_string(),
                    });
                }
                existing.value = value;
            } else {
                next.entries.insert(
                    key,
                    ContextEntry {
                        owner: owner.to_string(),
                        value,
                    },
                );
            }
        }
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn seeded() -> JobContext {
        JobContext::new()
            .merged(REQUEST_OWNER, StageOutput::new().with("request.title", json!("Photosynthesis")))
            .unwrap()
    }

    #[test]
    fn test_merge_appends_with_owner() {
        let ctx = seeded()
            .merged("analyze", StageOutput::new().with("concepts", json!(["light", "chlorophyll"])))
            .unwrap();

        assert_eq!(ctx.len(), 2);
        assert_eq!(ctx.owner("concepts"), Some("analyze"));
        assert_eq!(ctx.owner("request.title"), Some(REQUEST_OWNER));
        assert_eq!(ctx.keys_owned_by("analyze"), vec!["concepts"]);
    }

    #[test]
    fn test_owner_may_update_own_key() {
        let ctx = seeded()
            .merged("script", StageOutput::new().with("script", json!("draft")))
            .unwrap()
            .merged("script", StageOutput::new().with("script", json!("final")))
            .unwrap();

        assert_eq!(ctx.get("script"), Some(&json!("final")));
    }

    #[test]
    fn test_foreign_overwrite_rejected_and_original_untouched() {
        let ctx = seeded();
        let err = ctx
            .merged(
                "script",
                StageOutput::new()
                    .with("script", json!("text"))
                    .with("request.title", json!("Hijacked")),
            )
            .unwrap_err();

        assert_eq!(err.key, "request.title");
        assert_eq!(err.owner, REQUEST_OWNER);
        assert_eq!(err.writer, "script");
        assert_eq!(ctx.len(), 1);
        assert_eq!(ctx.get("request.title"), Some(&json!("Photosynthesis")));
    }

    #[test]
    fn test_require_missing_is_invalid_input() {
        let ctx = seeded();
        let err = ctx.require("script", "concepts").unwrap_err();
        assert_eq!(err.cause, crate::errors::StageErrorCause::InvalidInput);
        assert_eq!(err.stage_name, "script");
        assert!(!err.retryable);
    }

    #[test]
    fn test_require_as_shape_mismatch() {
        let ctx = seeded();
        let title: String = ctx.require_as("script", "request.title").unwrap();
        assert_eq!(title, "Photosynthesis");
        assert!(ctx.require_as::<u32>("script", "request.title").is_err());
    }

    #[test]
    fn test_get_as_deserializes_or_yields_none() {
        let ctx = seeded()
            .merged("analyze", StageOutput::new().with("concepts", json!(["light", "chlorophyll"])))
            .unwrap();

        let concepts: Option<Vec<String>> = ctx.get_as("concepts");
        assert_eq!(concepts, Some(vec!["light".to_string(), "chlorophyll".to_string()]));
        assert_eq!(ctx.get_as::<u32>("concepts"), None);
        assert_eq!(ctx.get_as::<String>("script"), None);
    }

    #[test]
    fn test_to_json_drops_ownership() {
        let ctx = seeded();
        assert_eq!(ctx.to_json(), json!({"request.title": "Photosynthesis"}));
    }
}
