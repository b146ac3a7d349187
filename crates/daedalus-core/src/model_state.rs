//! Model state: per-key attempted values, errors and validation state.

use crate::error::FieldErrors;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ops::Bound;

/// Default cap on recorded errors.
pub const DEFAULT_MAX_ALLOWED_ERRORS: usize = 200;

/// Validation state of one model-state entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelValidationState {
    /// Not validated yet.
    #[default]
    Unvalidated,
    /// At least one error was recorded.
    Invalid,
    /// Validated without errors.
    Valid,
    /// Validation was suppressed.
    Skipped,
}

/// Where a model error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelErrorKind {
    /// Binder or validator message.
    Message,
    /// No input formatter accepted the request content type.
    UnsupportedContentType,
    /// An input formatter rejected the body.
    InputFormatter,
    /// The error cap was reached.
    TooManyErrors,
}

/// One recorded error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelError {
    /// Error origin.
    pub kind: ModelErrorKind,
    /// Human-readable message.
    pub message: String,
}

/// State recorded for one key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelStateEntry {
    /// Raw values supplied by the value provider.
    pub raw_value: Option<Vec<String>>,
    /// Attempted value as displayed back to the user.
    pub attempted_value: Option<String>,
    /// Recorded errors.
    pub errors: Vec<ModelError>,
    /// Validation state.
    pub validation_state: ModelValidationState,
}

/// Per-request record of binding and validation outcomes, keyed by model name.
///
/// Once [`error_count`](Self::error_count) reaches the cap, one
/// [`ModelErrorKind::TooManyErrors`] error is recorded under the empty key and
/// further errors are dropped.
///
/// # Example
///
/// ```
/// use daedalus_core::{ModelStateDictionary, ModelValidationState};
///
/// let mut state = ModelStateDictionary::new();
/// state.set_model_value("age", vec!["abc".into()], "abc");
/// assert!(state.try_add_model_error("age", "The value 'abc' is not valid for age."));
/// assert!(!state.is_valid());
/// assert_eq!(state.field_validation_state("age"), ModelValidationState::Invalid);
/// ```
#[derive(Debug, Clone)]
pub struct ModelStateDictionary {
    entries: IndexMap<String, ModelStateEntry>,
    // (lowercased key, key), sorted for prefix queries.
    index: BTreeSet<(String, String)>,
    max_allowed_errors: usize,
    error_count: usize,
    has_recorded_max_error: bool,
}

impl Default for ModelStateDictionary {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelStateDictionary {
    /// Creates an empty dictionary with the default error cap.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_allowed_errors(DEFAULT_MAX_ALLOWED_ERRORS)
    }

    /// Creates an empty dictionary with an error cap.
    #[must_use]
    pub fn with_max_allowed_errors(max_allowed_errors: usize) -> Self {
        Self {
            entries: IndexMap::new(),
            index: BTreeSet::new(),
            max_allowed_errors: max_allowed_errors.max(1),
            error_count: 0,
            has_recorded_max_error: false,
        }
    }

    /// Returns the error cap.
    #[must_use]
    pub const fn max_allowed_errors(&self) -> usize {
        self.max_allowed_errors
    }

    /// Changes the error cap.
    pub fn set_max_allowed_errors(&mut self, max: usize) {
        self.max_allowed_errors = max.max(1);
    }

    /// Number of errors recorded, including the cap marker.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.error_count
    }

    /// Whether the cap has been reached.
    #[must_use]
    pub const fn has_reached_max_errors(&self) -> bool {
        self.error_count >= self.max_allowed_errors
    }

    /// Records an error under `key`. Returns false once the cap is reached.
    pub fn try_add_model_error(&mut self, key: &str, message: impl Into<String>) -> bool {
        self.try_add_model_error_kind(key, ModelErrorKind::Message, message)
    }

    /// Records an error of a given kind under `key`.
    pub fn try_add_model_error_kind(
        &mut self,
        key: &str,
        kind: ModelErrorKind,
        message: impl Into<String>,
    ) -> bool {
        if self.error_count >= self.max_allowed_errors.saturating_sub(1) {
            self.record_max_errors_reached();
            return false;
        }
        self.push_error(key, kind, message.into());
        true
    }

    fn record_max_errors_reached(&mut self) {
        if !self.has_recorded_max_error {
            self.push_error(
                "",
                ModelErrorKind::TooManyErrors,
                format!(
                    "The maximum number of allowed model errors ({}) has been reached.",
                    self.max_allowed_errors
                ),
            );
            self.has_recorded_max_error = true;
        }
    }

    fn entry_mut(&mut self, key: &str) -> &mut ModelStateEntry {
        if !self.entries.contains_key(key) {
            self.index.insert((key.to_ascii_lowercase(), key.to_string()));
        }
        self.entries.entry(key.to_string()).or_default()
    }

    // Keys equal to `prefix` or below it, read from the sorted index.
    fn keys_under(&self, prefix: &str) -> Vec<String> {
        if prefix.is_empty() {
            return self.entries.keys().cloned().collect();
        }
        let lowered = prefix.to_ascii_lowercase();
        let mut keys = Vec::new();
        for start in [lowered.clone(), format!("{lowered}."), format!("{lowered}[")] {
            let exact = start.len() == lowered.len();
            let from = (start.clone(), String::new());
            keys.extend(
                self.index
                    .range((Bound::Included(from), Bound::Unbounded))
                    .take_while(|(k, _)| if exact { *k == start } else { k.starts_with(&start) })
                    .map(|(_, original)| original.clone()),
            );
        }
        keys
    }

    fn push_error(&mut self, key: &str, kind: ModelErrorKind, message: String) {
        let entry = self.entry_mut(key);
        entry.errors.push(ModelError { kind, message });
        entry.validation_state = ModelValidationState::Invalid;
        self.error_count += 1;
    }

    /// Records the raw and attempted values for `key`.
    pub fn set_model_value(&mut self, key: &str, raw_value: Vec<String>, attempted_value: impl Into<String>) {
        let entry = self.entry_mut(key);
        entry.raw_value = Some(raw_value);
        entry.attempted_value = Some(attempted_value.into());
    }

    /// Marks `key` valid unless it already has errors.
    pub fn mark_field_valid(&mut self, key: &str) {
        let entry = self.entry_mut(key);
        if entry.validation_state != ModelValidationState::Invalid {
            entry.validation_state = ModelValidationState::Valid;
        }
    }

    /// Marks `key` skipped unless it already has errors.
    pub fn mark_field_skipped(&mut self, key: &str) {
        let entry = self.entry_mut(key);
        if entry.validation_state != ModelValidationState::Invalid {
            entry.validation_state = ModelValidationState::Skipped;
        }
    }

    /// Marks `key` and every unvalidated entry below it skipped.
    pub fn suppress_validation(&mut self, key: &str) {
        for entry_key in self.keys_under(key) {
            if let Some(entry) = self.entries.get_mut(&entry_key) {
                if entry.validation_state == ModelValidationState::Unvalidated {
                    entry.validation_state = ModelValidationState::Skipped;
                }
            }
        }
        self.mark_field_skipped(key);
    }

    /// State of the exact entry for `key`.
    #[must_use]
    pub fn validation_state(&self, key: &str) -> ModelValidationState {
        self.entries
            .get(key)
            .map_or(ModelValidationState::Unvalidated, |e| e.validation_state)
    }

    /// Aggregate state of `key` and every entry below it.
    ///
    /// Invalid wins over unvalidated, which wins over valid and skipped. A key
    /// with no entries is unvalidated.
    #[must_use]
    pub fn field_validation_state(&self, key: &str) -> ModelValidationState {
        let mut seen = false;
        let mut unvalidated = false;
        let mut all_skipped = true;
        for entry_key in self.keys_under(key) {
            let Some(entry) = self.entries.get(&entry_key) else {
                continue;
            };
            seen = true;
            match entry.validation_state {
                ModelValidationState::Invalid => return ModelValidationState::Invalid,
                ModelValidationState::Unvalidated => unvalidated = true,
                ModelValidationState::Valid => all_skipped = false,
                ModelValidationState::Skipped => {}
            }
        }
        if !seen || unvalidated {
            ModelValidationState::Unvalidated
        } else if all_skipped {
            ModelValidationState::Skipped
        } else {
            ModelValidationState::Valid
        }
    }

    /// Whether every entry is valid or skipped. An empty dictionary is valid.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.entries.values().all(|e| {
            matches!(
                e.validation_state,
                ModelValidationState::Valid | ModelValidationState::Skipped
            )
        })
    }

    /// Returns the entry for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ModelStateEntry> {
        self.entries.get(key)
    }

    /// Error messages recorded under `key`.
    #[must_use]
    pub fn errors(&self, key: &str) -> Vec<&str> {
        self.entries
            .get(key)
            .map(|e| e.errors.iter().map(|err| err.message.as_str()).collect())
            .unwrap_or_default()
    }

    /// Whether any entry has an error of `kind`.
    #[must_use]
    pub fn has_error_kind(&self, kind: ModelErrorKind) -> bool {
        self.entries
            .values()
            .any(|e| e.errors.iter().any(|err| err.kind == kind))
    }

    /// Removes the entry for `key`, adjusting the error count.
    pub fn remove(&mut self, key: &str) -> Option<ModelStateEntry> {
        let removed = self.entries.shift_remove(key)?;
        self.index.remove(&(key.to_ascii_lowercase(), key.to_string()));
        self.error_count = self.error_count.saturating_sub(removed.errors.len());
        Some(removed)
    }

    /// Resets `key` and everything below it to unvalidated, dropping errors.
    pub fn clear_validation_state(&mut self, key: &str) {
        let mut cleared = 0;
        for entry_key in self.keys_under(key) {
            if let Some(entry) = self.entries.get_mut(&entry_key) {
                cleared += entry.errors.len();
                entry.errors.clear();
                entry.validation_state = ModelValidationState::Unvalidated;
            }
        }
        self.error_count = self.error_count.saturating_sub(cleared);
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ModelStateEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Collects every error message by key.
    #[must_use]
    pub fn to_field_errors(&self) -> FieldErrors {
        let mut fields = FieldErrors::new();
        for (key, entry) in &self.entries {
            for error in &entry.errors {
                fields.add(key.clone(), error.message.clone());
            }
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_cap_records_marker_once() {
        let mut state = ModelStateDictionary::with_max_allowed_errors(3);
        assert!(state.try_add_model_error("a", "1"));
        assert!(state.try_add_model_error("b", "2"));
        assert!(!state.try_add_model_error("c", "3"));
        assert!(!state.try_add_model_error("d", "4"));

        assert_eq!(state.error_count(), 3);
        assert!(state.has_reached_max_errors());
        assert!(state.get("c").is_none());
        let marker = state.get("").expect("marker");
        assert_eq!(marker.errors.len(), 1);
        assert_eq!(marker.errors[0].kind, ModelErrorKind::TooManyErrors);
    }

    #[test]
    fn test_field_validation_state_aggregates_children() {
        let mut state = ModelStateDictionary::new();
        state.mark_field_valid("person.name");
        state.mark_field_valid("person.address.city");
        assert_eq!(state.field_validation_state("person"), ModelValidationState::Valid);

        state.set_model_value("person.age", vec!["x".into()], "x");
        assert_eq!(
            state.field_validation_state("person"),
            ModelValidationState::Unvalidated
        );

        state.try_add_model_error("person.address.city", "bad");
        assert_eq!(state.field_validation_state("person"), ModelValidationState::Invalid);
        assert_eq!(
            state.field_validation_state("personal"),
            ModelValidationState::Unvalidated
        );
    }

    #[test]
    fn test_mark_valid_does_not_clear_invalid() {
        let mut state = ModelStateDictionary::new();
        state.try_add_model_error("name", "required");
        state.mark_field_valid("name");
        state.mark_field_skipped("name");
        assert_eq!(state.validation_state("name"), ModelValidationState::Invalid);
    }

    #[test]
    fn test_suppress_validation_marks_subtree() {
        let mut state = ModelStateDictionary::new();
        state.set_model_value("blob.data", vec![], "");
        state.set_model_value("blob.size", vec![], "");
        state.suppress_validation("blob");
        assert_eq!(state.field_validation_state("blob"), ModelValidationState::Skipped);
        assert!(state.is_valid());
    }

    #[test]
    fn test_clear_and_remove_adjust_count() {
        let mut state = ModelStateDictionary::new();
        state.try_add_model_error("a.x", "1");
        state.try_add_model_error("a.y", "2");
        state.try_add_model_error("b", "3");
        state.clear_validation_state("a");
        assert_eq!(state.error_count(), 1);
        state.remove("b");
        assert_eq!(state.error_count(), 0);
    }

    #[test]
    fn test_to_field_errors() {
        let mut state = ModelStateDictionary::new();
        state.try_add_model_error("name", "required");
        state.mark_field_valid("age");
        let fields = state.to_field_errors();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields.fields["name"], vec!["required".to_string()]);
    }

    #[test]
    fn test_prefix_lookup_ignores_siblings_and_case() {
        let mut state = ModelStateDictionary::new();
        state.mark_field_valid("Items[1].name");
        state.try_add_model_error("items[10].name", "bad");
        state.try_add_model_error("items1", "bad");
        state.set_model_value("items[1]x", vec![], "");

        assert_eq!(state.field_validation_state("items[1]"), ModelValidationState::Valid);
        assert_eq!(state.field_validation_state("ITEMS[10]"), ModelValidationState::Invalid);

        state.suppress_validation("items[1]");
        assert_eq!(state.validation_state("items[1]x"), ModelValidationState::Unvalidated);

        state.clear_validation_state("items[10]");
        assert_eq!(state.error_count(), 1);
        state.remove("items1");
        assert_eq!(state.field_validation_state("items1"), ModelValidationState::Unvalidated);
    }

    #[test]
    fn test_subtree_queries_scale_with_entries() {
        let mut state = ModelStateDictionary::new();
        let count = 20_000;
        for i in 0..count {
            state.mark_field_valid(&format!("items[{i}].name"));
        }
        let started = std::time::Instant::now();
        for i in 0..count {
            assert_eq!(
                state.field_validation_state(&format!("items[{i}]")),
                ModelValidationState::Valid
            );
        }
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }
}
