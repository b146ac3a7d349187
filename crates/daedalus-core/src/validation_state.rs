//! Per-object validation overrides recorded during binding.

use crate::metadata::ModelMetadata;
use crate::value::ObjectId;
use std::collections::HashMap;
use std::sync::Arc;

/// How the validation visitor enumerates the children of a node.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ValidationStrategy {
    /// Properties as `key.name`, list items as `key[i]`, dictionary entries
    /// as `key[i].Key` / `key[i].Value`.
    #[default]
    Default,
    /// List items keyed by the explicit indexes the client posted.
    ExplicitIndexCollection(Arc<[String]>),
    /// Dictionary values keyed as `key[k]` with the posted keys.
    ShortFormDictionary(Arc<[String]>),
    /// Children are not validated.
    SuppressChildren,
}

/// Overrides for one object instance.
#[derive(Debug, Clone, Default)]
pub struct ValidationStateEntry {
    /// Model-state key to validate under.
    pub key: Option<String>,
    /// Metadata to validate with.
    pub metadata: Option<Arc<ModelMetadata>>,
    /// Child enumeration strategy.
    pub strategy: Option<ValidationStrategy>,
    /// Skip the node and its children.
    pub suppress_validation: bool,
    visited: bool,
}

impl ValidationStateEntry {
    /// Entry that validates the object under `key` with `strategy`.
    pub fn new(key: impl Into<String>, metadata: Arc<ModelMetadata>, strategy: ValidationStrategy) -> Self {
        Self {
            key: Some(key.into()),
            metadata: Some(metadata),
            strategy: Some(strategy),
            suppress_validation: false,
            visited: false,
        }
    }

    /// Entry that suppresses validation of the object.
    #[must_use]
    pub fn suppressed() -> Self {
        Self {
            suppress_validation: true,
            ..Self::default()
        }
    }

    /// Whether the visitor has already entered this object.
    #[must_use]
    pub const fn is_visited(&self) -> bool {
        self.visited
    }
}

/// Validation overrides keyed by object identity.
///
/// The visitor also records here which objects it has entered, so each
/// object is validated at most once per request even when the graph is cyclic.
#[derive(Debug, Clone, Default)]
pub struct ValidationStateDictionary {
    entries: HashMap<ObjectId, ValidationStateEntry>,
}

impl ValidationStateDictionary {
    /// Creates an empty dictionary.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records overrides for an object, keeping any visit mark.
    pub fn insert(&mut self, id: ObjectId, entry: ValidationStateEntry) {
        let visited = self.entries.get(&id).is_some_and(|e| e.visited);
        self.entries
            .insert(id, ValidationStateEntry { visited, ..entry });
    }

    /// Returns the overrides for an object.
    #[must_use]
    pub fn get(&self, id: ObjectId) -> Option<&ValidationStateEntry> {
        self.entries.get(&id)
    }

    /// Marks an object visited. Returns false if it already was.
    pub fn mark_visited(&mut self, id: ObjectId) -> bool {
        let entry = self.entries.entry(id).or_default();
        !std::mem::replace(&mut entry.visited, true)
    }

    /// Whether an object has been visited.
    #[must_use]
    pub fn is_visited(&self, id: ObjectId) -> bool {
        self.entries.get(&id).is_some_and(|e| e.visited)
    }

    /// Clears all visit marks so the graph can be validated again.
    pub fn reset_visits(&mut self) {
        for entry in self.entries.values_mut() {
            entry.visited = false;
        }
    }

    /// Number of tracked objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no object is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
