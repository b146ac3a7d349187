//! Framework options shared by binding, validation and the invoker.

use crate::messages::ModelBindingMessages;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Options consulted by binders, the validation visitor and the invoker.
///
/// # Example
///
/// ```
/// use daedalus_core::MvcOptions;
///
/// let options = MvcOptions::default();
/// assert_eq!(options.max_model_validation_errors, 200);
/// assert_eq!(options.max_validation_depth, Some(32));
/// assert!(options.request_timeout().is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MvcOptions {
    /// Cap on errors recorded in model state.
    pub max_model_validation_errors: usize,

    /// Maximum validation depth. `None` disables the guard.
    pub max_validation_depth: Option<usize>,

    /// Maximum nesting of complex and collection binders.
    pub max_model_binding_recursion_depth: usize,

    /// Maximum number of elements a collection binder reads.
    pub max_model_binding_collection_size: usize,

    /// Maximum number of elements the visitor enumerates in one collection.
    pub max_validation_collection_size: usize,

    /// Run type-level validators even when a child is invalid.
    pub validate_complex_types_if_child_validation_fails: bool,

    /// Treat an empty request body as a missing value instead of an error.
    pub allow_empty_input_in_body_model_binding: bool,

    /// Per-request timeout in milliseconds.
    pub request_timeout_ms: Option<u64>,

    /// Binding error messages.
    pub messages: ModelBindingMessages,
}

impl Default for MvcOptions {
    fn default() -> Self {
        Self {
            max_model_validation_errors: 200,
            max_validation_depth: Some(32),
            max_model_binding_recursion_depth: 32,
            max_model_binding_collection_size: 1024,
            max_validation_collection_size: 1024,
            validate_complex_types_if_child_validation_fails: false,
            allow_empty_input_in_body_model_binding: false,
            request_timeout_ms: None,
            messages: ModelBindingMessages::default(),
        }
    }
}

impl MvcOptions {
    /// Per-request timeout, if configured.
    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}
