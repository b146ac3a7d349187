//! Error types for Daedalus.
//!
//! [`MvcError`] is the client-facing error shape. Pipeline crates keep their own
//! detailed error enums and convert into `MvcError` when a failure escapes the
//! action pipeline unhandled and has to be rendered as a response.

use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Result type alias using [`MvcError`].
pub type MvcResult<T> = Result<T, MvcError>;

/// Categories of errors for classification and handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Request data failed binding or validation.
    Validation,
    /// Caller is not authenticated.
    Authentication,
    /// Caller is authenticated but not permitted.
    Authorization,
    /// Resource not found.
    NotFound,
    /// Request body has a content type no input formatter accepts.
    UnsupportedMediaType,
    /// Internal server errors.
    Internal,
    /// The action did not complete within its time budget.
    Timeout,
    /// The request was aborted before it completed.
    Canceled,
}

impl ErrorCategory {
    /// Returns the default HTTP status code for this error category.
    #[must_use]
    pub const fn default_status_code(&self) -> StatusCode {
        match self {
            Self::Validation => StatusCode::BAD_REQUEST,
            Self::Authentication => StatusCode::UNAUTHORIZED,
            Self::Authorization => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Canceled => StatusCode::BAD_REQUEST,
        }
    }
}

/// Standard error type for Daedalus.
///
/// # Example
///
/// ```
/// use daedalus_core::{ErrorCategory, MvcError};
///
/// let err = MvcError::validation("Body cannot be empty");
/// assert_eq!(err.category(), ErrorCategory::Validation);
/// assert_eq!(err.status_code().as_u16(), 400);
/// ```
#[derive(Error, Debug)]
pub enum MvcError {
    /// Request binding or validation failed.
    #[error("Validation error: {message}")]
    Validation {
        /// Human-readable error message.
        message: String,
        /// Field-specific validation errors.
        #[source]
        field_errors: Option<FieldErrors>,
    },

    /// Authentication failed.
    #[error("Authentication error: {message}")]
    Authentication {
        /// Human-readable error message.
        message: String,
    },

    /// Authorization denied.
    #[error("Authorization denied: {message}")]
    Authorization {
        /// Human-readable error message.
        message: String,
        /// Display name of the action that was denied.
        action: Option<String>,
    },

    /// Resource not found.
    #[error("Not found: {message}")]
    NotFound {
        /// Human-readable error message.
        message: String,
    },

    /// Unsupported request content type.
    #[error("Unsupported media type: {content_type}")]
    UnsupportedMediaType {
        /// The content type the client sent.
        content_type: String,
    },

    /// Internal server error.
    #[error("Internal error: {message}")]
    Internal {
        /// Human-readable error message.
        message: String,
        /// The underlying error (not exposed to clients).
        #[source]
        source: Option<anyhow::Error>,
    },

    /// Request timeout.
    #[error("Timeout: {message}")]
    Timeout {
        /// Human-readable error message.
        message: String,
    },

    /// Request canceled by the caller or the host.
    #[error("Request canceled")]
    Canceled,
}

impl MvcError {
    /// Creates a validation error with a message.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field_errors: None,
        }
    }

    /// Creates a validation error with field-specific errors.
    #[must_use]
    pub fn validation_with_fields(message: impl Into<String>, field_errors: FieldErrors) -> Self {
        Self::Validation {
            message: message.into(),
            field_errors: Some(field_errors),
        }
    }

    /// Creates an authentication error.
    #[must_use]
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Creates an authorization error.
    #[must_use]
    pub fn authorization(message: impl Into<String>) -> Self {
        Self::Authorization {
            message: message.into(),
            action: None,
        }
    }

    /// Creates an authorization error naming the denied action.
    #[must_use]
    pub fn authorization_for_action(message: impl Into<String>, action: impl Into<String>) -> Self {
        Self::Authorization {
            message: message.into(),
            action: Some(action.into()),
        }
    }

    /// Creates a not found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates an unsupported media type error.
    #[must_use]
    pub fn unsupported_media_type(content_type: impl Into<String>) -> Self {
        Self::UnsupportedMediaType {
            content_type: content_type.into(),
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an internal error with a source error.
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation { .. } => ErrorCategory::Validation,
            Self::Authentication { .. } => ErrorCategory::Authentication,
            Self::Authorization { .. } => ErrorCategory::Authorization,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::UnsupportedMediaType { .. } => ErrorCategory::UnsupportedMediaType,
            Self::Internal { .. } => ErrorCategory::Internal,
            Self::Timeout { .. } => ErrorCategory::Timeout,
            Self::Canceled => ErrorCategory::Canceled,
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        self.category().default_status_code()
    }

    /// Converts this error to a serializable error envelope.
    #[must_use]
    pub fn to_envelope(&self, request_id: Option<&str>) -> ErrorEnvelope {
        ErrorEnvelope {
            error: ErrorDetail {
                code: self.error_code().to_string(),
                message: self.client_message(),
                category: self.category(),
                details: self.error_details(),
            },
            request_id: request_id.map(ToString::to_string),
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Authentication { .. } => "AUTHENTICATION_ERROR",
            Self::Authorization { .. } => "AUTHORIZATION_DENIED",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::UnsupportedMediaType { .. } => "UNSUPPORTED_MEDIA_TYPE",
            Self::Internal { .. } => "INTERNAL_ERROR",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Canceled => "CANCELED",
        }
    }

    // Internal errors never leak their source chain to clients.
    fn client_message(&self) -> String {
        match self {
            Self::Internal { message, .. } => format!("Internal error: {message}"),
            other => other.to_string(),
        }
    }

    fn error_details(&self) -> Option<serde_json::Value> {
        match self {
            Self::Validation {
                field_errors: Some(errors),
                ..
            } => serde_json::to_value(errors).ok(),
            Self::Authorization {
                action: Some(action),
                ..
            } => Some(serde_json::json!({ "action": action })),
            Self::UnsupportedMediaType { content_type } => {
                Some(serde_json::json!({ "content_type": content_type }))
            }
            _ => None,
        }
    }
}

/// Field-specific validation errors keyed by model-state key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("Field validation errors")]
pub struct FieldErrors {
    /// Map of field path to list of error messages.
    pub fields: BTreeMap<String, Vec<String>>,
}

impl FieldErrors {
    /// Creates a new empty `FieldErrors`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an error for a field.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    /// Returns true if there are no field errors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns the number of fields with errors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }
}

/// Serializable error envelope for HTTP responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// The error details.
    pub error: ErrorDetail,
    /// The request ID for correlation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Error details within an envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Error category.
    pub category: ErrorCategory,
    /// Additional error details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_status_codes() {
        assert_eq!(
            ErrorCategory::Validation.default_status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ErrorCategory::UnsupportedMediaType.default_status_code(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(
            ErrorCategory::Timeout.default_status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn test_validation_envelope_carries_fields() {
        let mut fields = FieldErrors::new();
        fields.add("name", "The Name field is required.");
        fields.add("name", "too short");
        let err = MvcError::validation_with_fields("Invalid model", fields);

        let envelope = err.to_envelope(Some("req-1"));
        assert_eq!(envelope.error.code, "VALIDATION_ERROR");
        assert_eq!(envelope.request_id.as_deref(), Some("req-1"));
        let details = envelope.error.details.expect("details");
        assert_eq!(details["fields"]["name"].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn test_internal_hides_source() {
        let err = MvcError::internal_with_source("boom", anyhow::anyhow!("secret db password"));
        let envelope = err.to_envelope(None);
        assert!(!envelope.error.message.contains("secret"));
        assert!(envelope.error.details.is_none());
    }

    #[test]
    fn test_envelope_serialization() {
        let envelope = MvcError::unsupported_media_type("text/xml").to_envelope(None);
        let json = serde_json::to_value(&envelope).expect("serialize");
        assert_eq!(json["error"]["category"], "unsupported_media_type");
        assert_eq!(json["error"]["details"]["content_type"], "text/xml");
        assert!(json.get("request_id").is_none());
    }
}
