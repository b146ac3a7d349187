//! Request builders for tests.
//!
//! # Example
//!
//! ```
//! use daedalus_core::testing::RequestBuilder;
//!
//! let ctx = RequestBuilder::post("/orders?draft=true")
//!     .route_value("tenant", "acme")
//!     .json(r#"{"id": 1}"#)
//!     .build();
//!
//! assert_eq!(ctx.content_type(), Some("application/json"));
//! assert_eq!(ctx.route_values().get("tenant").map(String::as_str), Some("acme"));
//! ```

use crate::context::{Principal, RequestContext, RouteValues};
use crate::di::ServiceProvider;
use crate::value::FormFile;
use bytes::Bytes;
use http::header::{HeaderName, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, Method, Uri};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Builder for [`RequestContext`]s used in tests.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    route_values: RouteValues,
    files: Vec<FormFile>,
    user: Principal,
    services: Option<Arc<dyn ServiceProvider>>,
    cancellation: Option<CancellationToken>,
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new(Method::GET, "/")
    }
}

impl RequestBuilder {
    /// Creates a builder. An unparseable `uri` falls back to `/`.
    #[must_use]
    pub fn new(method: Method, uri: &str) -> Self {
        Self {
            method,
            uri: Uri::try_from(uri).unwrap_or_else(|_| Uri::from_static("/")),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            route_values: RouteValues::new(),
            files: Vec::new(),
            user: Principal::anonymous(),
            services: None,
            cancellation: None,
        }
    }

    /// A `GET` request.
    #[must_use]
    pub fn get(uri: &str) -> Self {
        Self::new(Method::GET, uri)
    }

    /// A `POST` request.
    #[must_use]
    pub fn post(uri: &str) -> Self {
        Self::new(Method::POST, uri)
    }

    /// Adds a header. Invalid names or values are ignored.
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name),
            HeaderValue::try_from(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets a JSON body and content type.
    #[must_use]
    pub fn json(self, body: impl Into<Bytes>) -> Self {
        self.header(CONTENT_TYPE.as_str(), "application/json").body(body)
    }

    /// Sets a url-encoded form body and content type.
    #[must_use]
    pub fn form(self, body: impl Into<Bytes>) -> Self {
        self.header(CONTENT_TYPE.as_str(), "application/x-www-form-urlencoded")
            .body(body)
    }

    /// Adds a route value.
    #[must_use]
    pub fn route_value(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.route_values.insert(name.into(), value.into());
        self
    }

    /// Adds an uploaded file.
    #[must_use]
    pub fn file(mut self, file: FormFile) -> Self {
        self.files.push(file);
        self
    }

    /// Sets the principal.
    #[must_use]
    pub fn user(mut self, user: Principal) -> Self {
        self.user = user;
        self
    }

    /// Sets the service provider.
    #[must_use]
    pub fn services(mut self, services: Arc<dyn ServiceProvider>) -> Self {
        self.services = Some(services);
        self
    }

    /// Sets the cancellation token.
    #[must_use]
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Builds the context.
    #[must_use]
    pub fn build(self) -> RequestContext {
        let mut ctx = RequestContext::new(self.method, self.uri)
            .with_headers(self.headers)
            .with_body(self.body)
            .with_route_values(self.route_values)
            .with_files(self.files)
            .with_user(self.user);
        if let Some(services) = self.services {
            ctx = ctx.with_services(services);
        }
        if let Some(token) = self.cancellation {
            ctx = ctx.with_cancellation(token);
        }
        ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let ctx = RequestBuilder::default().build();
        assert_eq!(ctx.method(), &Method::GET);
        assert_eq!(ctx.uri().path(), "/");
        assert!(ctx.body().is_empty());
    }

    #[test]
    fn test_form_builder() {
        let ctx = RequestBuilder::post("/")
            .form("a=1")
            .file(FormFile::new("doc", "a.txt", "hello"))
            .build();
        let form = ctx.form().expect("form").expect("parsed");
        assert_eq!(form.fields, vec![("a".to_string(), "1".to_string())]);
        assert_eq!(form.files.len(), 1);
    }
}
