//! Pipeline error types.
//!
//! A [`PipelineError`] is what the Exception stage sees. Action methods and
//! filters fail with `anyhow::Error`; if that error wraps an
//! [`MvcError`], the conversion to `MvcError` keeps its category.

use daedalus_binding::BindingError;
use daedalus_core::{ErrorCategory, MvcError};
use http::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Result alias for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors raised while invoking an action.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The action method failed.
    #[error("action '{action}' failed: {source}")]
    Action {
        /// Display name of the action.
        action: String,
        /// The error returned by the action.
        #[source]
        source: anyhow::Error,
    },

    /// A filter failed.
    #[error("filter {filter} failed: {source}")]
    Filter {
        /// Filter type name.
        filter: String,
        /// The error returned by the filter.
        #[source]
        source: anyhow::Error,
    },

    /// Model binding aborted.
    #[error(transparent)]
    Binding(#[from] BindingError),

    /// A result could not be written.
    #[error("result execution failed: {0}")]
    Result(String),

    /// The action did not complete in time.
    #[error("action timed out after {after_ms}ms")]
    Timeout {
        /// Configured limit in milliseconds.
        after_ms: u64,
    },

    /// The request was canceled.
    #[error("request canceled")]
    Canceled,

    /// More than one action accepted the request.
    #[error("request matched multiple actions: {}", candidates.join(", "))]
    AmbiguousMatch {
        /// Display names of the matching actions.
        candidates: Vec<String>,
    },
}

impl PipelineError {
    /// Wraps an action failure.
    pub fn action(action: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Action {
            action: action.into(),
            source: source.into(),
        }
    }

    /// Wraps a filter failure.
    pub fn filter(filter: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Filter {
            filter: filter.into(),
            source: source.into(),
        }
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(after: Duration) -> Self {
        Self::Timeout {
            after_ms: u64::try_from(after.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Creates a result-writing error.
    pub fn result(message: impl Into<String>) -> Self {
        Self::Result(message.into())
    }

    /// Whether the request timed out or was canceled.
    #[must_use]
    pub const fn is_aborted(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Canceled)
    }

    /// Status the error renders with.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Action { source, .. } | Self::Filter { source, .. } => source
                .downcast_ref::<MvcError>()
                .map_or(StatusCode::INTERNAL_SERVER_ERROR, MvcError::status_code),
            Self::Binding(BindingError::InvalidForm(_)) => ErrorCategory::Validation.default_status_code(),
            Self::Timeout { .. } => ErrorCategory::Timeout.default_status_code(),
            Self::Canceled => ErrorCategory::Canceled.default_status_code(),
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<PipelineError> for MvcError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Action { action, source } => match source.downcast::<MvcError>() {
                Ok(mvc) => mvc,
                Err(source) => Self::internal_with_source(format!("action '{action}' failed"), source),
            },
            PipelineError::Filter { filter, source } => match source.downcast::<MvcError>() {
                Ok(mvc) => mvc,
                Err(source) => Self::internal_with_source(format!("filter {filter} failed"), source),
            },
            PipelineError::Binding(err) => err.into(),
            PipelineError::Timeout { after_ms } => {
                Self::timeout(format!("action did not complete within {after_ms}ms"))
            }
            PipelineError::Canceled => Self::Canceled,
            other => Self::internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_error_keeps_mvc_category() {
        let err = PipelineError::action("Orders.Get", MvcError::not_found("order 7"));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        let mvc: MvcError = err.into();
        assert_eq!(mvc.category(), ErrorCategory::NotFound);
    }

    #[test]
    fn test_opaque_action_error_is_internal() {
        let err = PipelineError::action("Orders.Get", anyhow::anyhow!("db down"));
        assert_eq!(err.to_string(), "action 'Orders.Get' failed: db down");
        let mvc: MvcError = err.into();
        assert_eq!(mvc.category(), ErrorCategory::Internal);
    }

    #[test]
    fn test_timeout() {
        let err = PipelineError::timeout(Duration::from_millis(250));
        assert!(err.is_aborted());
        assert_eq!(err.to_string(), "action timed out after 250ms");
        assert_eq!(err.status_code(), StatusCode::GATEWAY_TIMEOUT);
        let mvc: MvcError = err.into();
        assert_eq!(mvc.category(), ErrorCategory::Timeout);
    }

    #[test]
    fn test_ambiguous_display() {
        let err = PipelineError::AmbiguousMatch {
            candidates: vec!["A".into(), "B".into()],
        };
        assert_eq!(err.to_string(), "request matched multiple actions: A, B");
    }
}
