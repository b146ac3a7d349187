//! Validation error types.
//!
//! Failed validation rules are recorded in model state. The errors here are
//! the exceptional cases that abort a validation pass.

use thiserror::Error;

/// Result type for validation passes.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Errors that abort a validation pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The model graph is nested deeper than the configured limit.
    #[error(
        "validation exceeded the maximum depth of {max} at '{key}'; the model may be \
         too deeply nested or contain a cycle that is not tracked by identity"
    )]
    MaxDepthExceeded {
        /// Configured limit.
        max: usize,
        /// Model-state key of the node that crossed the limit.
        key: String,
    },

    /// A collection has more elements than the visitor may enumerate.
    #[error("collection at '{key}' has {len} elements, more than the allowed {max}")]
    CollectionTooLarge {
        /// Configured limit.
        max: usize,
        /// Number of elements found.
        len: usize,
        /// Model-state key of the collection.
        key: String,
    },

    /// A regular expression rule could not be compiled.
    #[error("invalid regular expression '{pattern}': {reason}")]
    InvalidPattern {
        /// The pattern as declared.
        pattern: String,
        /// Compiler message.
        reason: String,
    },
}

impl ValidationError {
    /// Creates a depth error.
    pub fn max_depth(max: usize, key: impl Into<String>) -> Self {
        Self::MaxDepthExceeded {
            max,
            key: key.into(),
        }
    }

    /// Creates a collection-size error.
    pub fn collection_too_large(max: usize, len: usize, key: impl Into<String>) -> Self {
        Self::CollectionTooLarge {
            max,
            len,
            key: key.into(),
        }
    }

    /// Whether the error is one of the traversal guards.
    #[must_use]
    pub const fn is_guard(&self) -> bool {
        matches!(
            self,
            Self::MaxDepthExceeded { .. } | Self::CollectionTooLarge { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_key() {
        let err = ValidationError::max_depth(4, "order.lines[0].product");
        assert!(err.to_string().contains("order.lines[0].product"));
        assert!(err.is_guard());

        let err = ValidationError::collection_too_large(10, 11, "ids");
        assert!(err.to_string().contains("11 elements"));
    }
}
