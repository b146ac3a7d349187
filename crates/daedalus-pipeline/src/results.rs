//! Action results: the deferred response an action or filter produces.

use async_trait::async_trait;
use bytes::Bytes;
use daedalus_core::{ModelStateDictionary, MvcError, RequestContext};
use http::header::{ACCEPT, CONTENT_TYPE, WWW_AUTHENTICATE};
use http::{HeaderValue, Response, StatusCode};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::descriptor::ActionDescriptor;
use crate::error::{PipelineError, PipelineResult};
use crate::formatters::OutputFormatterSelector;

/// Shared handle to an action result.
pub type BoxedActionResult = Arc<dyn ActionResult>;

/// What a result needs to render itself.
#[derive(Debug, Clone, Copy)]
pub struct ResultContext<'a> {
    /// The request.
    pub request: &'a RequestContext,
    /// The action being executed.
    pub action: &'a ActionDescriptor,
    /// Model state after binding and validation.
    pub model_state: &'a ModelStateDictionary,
    /// Output formatters.
    pub formatters: &'a OutputFormatterSelector,
}

/// A response-producing result.
#[async_trait]
pub trait ActionResult: Send + Sync + fmt::Debug {
    /// Renders the response.
    async fn execute(&self, ctx: &ResultContext<'_>) -> PipelineResult<Response<Bytes>>;
}

fn response(status: StatusCode, body: Bytes) -> Response<Bytes> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
}

fn with_content_type(mut response: Response<Bytes>, content_type: &str) -> PipelineResult<Response<Bytes>> {
    let value = HeaderValue::from_str(content_type)
        .map_err(|e| PipelineError::result(format!("invalid content type '{content_type}': {e}")))?;
    response.headers_mut().insert(CONTENT_TYPE, value);
    Ok(response)
}

/// An empty 200 response.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyResult;

#[async_trait]
impl ActionResult for EmptyResult {
    async fn execute(&self, _ctx: &ResultContext<'_>) -> PipelineResult<Response<Bytes>> {
        Ok(response(StatusCode::OK, Bytes::new()))
    }
}

/// An empty response with a status code.
#[derive(Debug, Clone, Copy)]
pub struct StatusCodeResult(pub StatusCode);

#[async_trait]
impl ActionResult for StatusCodeResult {
    async fn execute(&self, _ctx: &ResultContext<'_>) -> PipelineResult<Response<Bytes>> {
        Ok(response(self.0, Bytes::new()))
    }
}

/// Literal content.
#[derive(Debug, Clone)]
pub struct ContentResult {
    content: String,
    content_type: String,
    status: StatusCode,
}

impl ContentResult {
    /// `text/plain` content with status 200.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            content_type: mime::TEXT_PLAIN_UTF_8.to_string(),
            status: StatusCode::OK,
        }
    }

    /// Overrides the content type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Overrides the status.
    #[must_use]
    pub const fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }
}

#[async_trait]
impl ActionResult for ContentResult {
    async fn execute(&self, _ctx: &ResultContext<'_>) -> PipelineResult<Response<Bytes>> {
        with_content_type(
            response(self.status, Bytes::from(self.content.clone())),
            &self.content_type,
        )
    }
}

/// A value written by the output formatter negotiated from `Accept`.
#[derive(Debug, Clone)]
pub struct ObjectResult {
    value: serde_json::Value,
    status: StatusCode,
    content_type: Option<String>,
}

impl ObjectResult {
    /// Status 200.
    #[must_use]
    pub const fn new(value: serde_json::Value) -> Self {
        Self {
            value,
            status: StatusCode::OK,
            content_type: None,
        }
    }

    /// Serializes `value`.
    pub fn from_serialize<T: Serialize>(value: &T) -> PipelineResult<Self> {
        serde_json::to_value(value)
            .map(Self::new)
            .map_err(|e| PipelineError::result(format!("value is not serializable: {e}")))
    }

    /// Overrides the status.
    #[must_use]
    pub const fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Overrides the response content type while keeping the negotiated writer.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// The value.
    #[must_use]
    pub const fn value(&self) -> &serde_json::Value {
        &self.value
    }

    /// The status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }
}

#[async_trait]
impl ActionResult for ObjectResult {
    async fn execute(&self, ctx: &ResultContext<'_>) -> PipelineResult<Response<Bytes>> {
        let accept = ctx.request.headers().get(ACCEPT).and_then(|v| v.to_str().ok());
        let Some(formatter) = ctx.formatters.select(accept, &self.value) else {
            return Ok(response(StatusCode::NOT_ACCEPTABLE, Bytes::new()));
        };
        let body = formatter.write(&self.value)?;
        let content_type = self
            .content_type
            .clone()
            .unwrap_or_else(|| formatter.content_type().to_string());
        with_content_type(response(self.status, body), &content_type)
    }
}

/// A 400 response, usually carrying validation problem details.
#[derive(Debug, Clone)]
pub struct BadRequestObjectResult(ObjectResult);

impl BadRequestObjectResult {
    /// A 400 with an arbitrary body.
    #[must_use]
    pub fn new(value: serde_json::Value) -> Self {
        Self(ObjectResult::new(value).with_status(StatusCode::BAD_REQUEST))
    }

    /// A 400 `application/problem+json` body listing every model-state error.
    #[must_use]
    pub fn from_model_state(model_state: &ModelStateDictionary) -> Self {
        let body = serde_json::json!({
            "type": "https://tools.ietf.org/html/rfc9110#section-15.5.1",
            "title": "One or more validation errors occurred.",
            "status": StatusCode::BAD_REQUEST.as_u16(),
            "errors": model_state.to_field_errors().fields,
        });
        Self(
            ObjectResult::new(body)
                .with_status(StatusCode::BAD_REQUEST)
                .with_content_type("application/problem+json"),
        )
    }

    /// The body.
    #[must_use]
    pub const fn value(&self) -> &serde_json::Value {
        self.0.value()
    }
}

#[async_trait]
impl ActionResult for BadRequestObjectResult {
    async fn execute(&self, ctx: &ResultContext<'_>) -> PipelineResult<Response<Bytes>> {
        self.0.execute(ctx).await
    }
}

/// 415 Unsupported Media Type.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedMediaTypeResult;

#[async_trait]
impl ActionResult for UnsupportedMediaTypeResult {
    async fn execute(&self, _ctx: &ResultContext<'_>) -> PipelineResult<Response<Bytes>> {
        Ok(response(StatusCode::UNSUPPORTED_MEDIA_TYPE, Bytes::new()))
    }
}

/// 401 asking the caller to authenticate.
#[derive(Debug, Clone, Default)]
pub struct ChallengeResult {
    scheme: Option<String>,
}

impl ChallengeResult {
    /// Challenges with an authentication scheme (`Bearer`, ...).
    pub fn with_scheme(scheme: impl Into<String>) -> Self {
        Self {
            scheme: Some(scheme.into()),
        }
    }
}

#[async_trait]
impl ActionResult for ChallengeResult {
    async fn execute(&self, _ctx: &ResultContext<'_>) -> PipelineResult<Response<Bytes>> {
        let mut response = response(StatusCode::UNAUTHORIZED, Bytes::new());
        if let Some(scheme) = &self.scheme {
            let value = HeaderValue::from_str(scheme)
                .map_err(|e| PipelineError::result(format!("invalid scheme '{scheme}': {e}")))?;
            response.headers_mut().insert(WWW_AUTHENTICATE, value);
        }
        Ok(response)
    }
}

/// 403 Forbidden.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForbidResult;

#[async_trait]
impl ActionResult for ForbidResult {
    async fn execute(&self, _ctx: &ResultContext<'_>) -> PipelineResult<Response<Bytes>> {
        Ok(response(StatusCode::FORBIDDEN, Bytes::new()))
    }
}

/// Renders an unhandled error as a JSON error envelope.
#[must_use]
pub fn error_response(error: &MvcError, request_id: Option<&str>) -> Response<Bytes> {
    let envelope = error.to_envelope(request_id);
    let body = serde_json::to_vec(&envelope).map(Bytes::from).unwrap_or_default();
    let mut response = response(error.status_code(), body);
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
