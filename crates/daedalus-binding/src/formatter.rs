//! Input formatters.
//!
//! The body binder picks the first formatter that can read the request's
//! content type and delegates deserialization to it.

use async_trait::async_trait;
use daedalus_core::convert::convert_from_json;
use daedalus_core::{ModelMetadata, ModelMetadataProvider, ModelValue, RequestContext};
use mime::Mime;
use std::fmt;
use tracing::debug;

use crate::error::BindingResult;

/// What a formatter reads.
#[derive(Debug, Clone, Copy)]
pub struct InputFormatterContext<'a> {
    /// The request whose body is read.
    pub request: &'a RequestContext,
    /// Metadata of the model to produce.
    pub metadata: &'a ModelMetadata,
    /// Metadata for nested types.
    pub metadata_provider: &'a ModelMetadataProvider,
    /// Key errors are recorded under.
    pub model_name: &'a str,
    /// Whether an empty body binds the default value.
    pub treat_empty_input_as_default_value: bool,
}

impl InputFormatterContext<'_> {
    /// Parsed request content type.
    #[must_use]
    pub fn content_type(&self) -> Option<Mime> {
        self.request.content_type().and_then(|ct| ct.parse().ok())
    }
}

/// A problem found in the body, relative to the model name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFormatterError {
    /// Key below the model name (`lines[1].qty`); empty for the whole body.
    pub path: String,
    /// Error message.
    pub message: String,
}

/// Outcome of reading the body.
#[derive(Debug, Clone)]
pub enum InputFormatterResult {
    /// The body was deserialized.
    Success(ModelValue),
    /// The body was empty.
    NoValue,
    /// The body could not be deserialized.
    Failure(Vec<InputFormatterError>),
}

/// Reads a request body into a model.
#[async_trait]
pub trait InputFormatter: Send + Sync + fmt::Debug {
    /// Whether the formatter understands the request content type.
    fn can_read(&self, ctx: &InputFormatterContext<'_>) -> bool;

    /// Reads the body.
    async fn read(&self, ctx: &InputFormatterContext<'_>) -> BindingResult<InputFormatterResult>;
}

/// JSON input for `application/json` and `application/*+json`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonInputFormatter;

#[async_trait]
impl InputFormatter for JsonInputFormatter {
    fn can_read(&self, ctx: &InputFormatterContext<'_>) -> bool {
        ctx.content_type().is_some_and(|mt| {
            mt.type_() == mime::APPLICATION
                && (mt.subtype() == mime::JSON || mt.suffix() == Some(mime::JSON))
        })
    }

    async fn read(&self, ctx: &InputFormatterContext<'_>) -> BindingResult<InputFormatterResult> {
        let body = ctx.request.body();
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(InputFormatterResult::NoValue);
        }

        let json = match serde_json::from_slice::<serde_json::Value>(body) {
            Ok(json) => json,
            Err(err) => {
                debug!(error = %err, "request body is not valid JSON");
                return Ok(InputFormatterResult::Failure(vec![InputFormatterError {
                    path: String::new(),
                    message: format!("The request body is not valid JSON: {err}."),
                }]));
            }
        };

        match convert_from_json(&json, ctx.metadata.model_type(), ctx.metadata_provider) {
            Ok(model) => Ok(InputFormatterResult::Success(model)),
            Err(err) => {
                debug!(error = %err, "request body does not match the model");
                let path = relative_path(err.path.as_deref().unwrap_or("$"));
                Ok(InputFormatterResult::Failure(vec![InputFormatterError {
                    path,
                    message: format!("The JSON value could not be converted to {}.", err.expected),
                }]))
            }
        }
    }
}

// `$.lines[1].qty` -> `lines[1].qty`, `$[0]` -> `[0]`, `$` -> ``.
fn relative_path(json_path: &str) -> String {
    let rest = json_path.strip_prefix('$').unwrap_or(json_path);
    rest.strip_prefix('.').unwrap_or(rest).to_string()
}
