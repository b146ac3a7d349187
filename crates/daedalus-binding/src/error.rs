//! Binding error types.
//!
//! Conversion failures and missing values are recorded in the
//! [`ModelStateDictionary`](daedalus_core::ModelStateDictionary) and never
//! surface here. A [`BindingError`] means binding itself could not continue:
//! a guard tripped, a service is missing or a binder could not be built.

use daedalus_core::di::InjectionError;
use daedalus_core::{MvcError, ModelType};
use daedalus_validation::ValidationError;
use thiserror::Error;

/// Result alias for binding operations.
pub type BindingResult<T> = Result<T, BindingError>;

/// Errors that abort model binding.
#[derive(Debug, Clone, Error)]
pub enum BindingError {
    /// Nested binding scopes went deeper than the configured maximum.
    #[error("model binding exceeded the maximum recursion depth of {max} at '{model_name}'")]
    MaxRecursionDepthExceeded {
        /// Configured maximum.
        max: usize,
        /// Key being bound when the guard tripped.
        model_name: String,
    },

    /// A collection bound more elements than the configured maximum.
    #[error("collection '{model_name}' exceeded the maximum of {max} elements")]
    CollectionTooLarge {
        /// Configured maximum.
        max: usize,
        /// Key of the collection.
        model_name: String,
    },

    /// No binder provider accepted the metadata.
    #[error("no model binder is available for type {model_type}")]
    NoBinder {
        /// The unbindable type.
        model_type: String,
    },

    /// A binder was used before the binder it stands in for was built.
    #[error("binder for {model_type} was used before construction finished")]
    IncompleteBinder {
        /// Type whose construction did not finish.
        model_type: String,
    },

    /// A service parameter could not be resolved.
    #[error(transparent)]
    Service(#[from] InjectionError),

    /// The request form could not be parsed.
    #[error("invalid form data: {0}")]
    InvalidForm(String),

    /// Validation of the bound model aborted.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl BindingError {
    /// Creates a recursion-depth error.
    pub fn max_depth(max: usize, model_name: impl Into<String>) -> Self {
        Self::MaxRecursionDepthExceeded {
            max,
            model_name: model_name.into(),
        }
    }

    /// Creates a collection-size error.
    pub fn collection_too_large(max: usize, model_name: impl Into<String>) -> Self {
        Self::CollectionTooLarge {
            max,
            model_name: model_name.into(),
        }
    }

    /// Creates a missing-binder error.
    pub fn no_binder(model_type: &ModelType) -> Self {
        Self::NoBinder {
            model_type: model_type.to_string(),
        }
    }

    /// Returns true for recursion and size guard violations.
    #[must_use]
    pub const fn is_guard(&self) -> bool {
        matches!(
            self,
            Self::MaxRecursionDepthExceeded { .. } | Self::CollectionTooLarge { .. }
        )
    }
}

impl From<BindingError> for MvcError {
    fn from(err: BindingError) -> Self {
        match err {
            BindingError::InvalidForm(message) => Self::validation(message),
            other => Self::internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daedalus_core::ErrorCategory;

    #[test]
    fn test_guard_errors() {
        assert!(BindingError::max_depth(32, "node.next").is_guard());
        assert!(BindingError::collection_too_large(8, "ids").is_guard());
        assert!(!BindingError::no_binder(&ModelType::int()).is_guard());
    }

    #[test]
    fn test_display() {
        let err = BindingError::max_depth(2, "a.b.c");
        assert_eq!(
            err.to_string(),
            "model binding exceeded the maximum recursion depth of 2 at 'a.b.c'"
        );
    }

    #[test]
    fn test_into_mvc_error() {
        let err: MvcError = BindingError::InvalidForm("bad".into()).into();
        assert_eq!(err.category(), ErrorCategory::Validation);
        let err: MvcError = BindingError::collection_too_large(1, "ids").into();
        assert_eq!(err.category(), ErrorCategory::Internal);
    }
}
