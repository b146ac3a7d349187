//! Request context types.
//!
//! The [`RequestContext`] carries the HTTP request data, route values,
//! authenticated principal, services and cancellation token through the
//! action pipeline.

use crate::di::{Container, ServiceProvider};
use crate::value::{FormCollection, FormFile};
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, Method, Uri};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// A unique identifier for each request, using UUID v7.
///
/// UUID v7 is time-ordered, which makes it ideal for request tracking
/// and log correlation.
///
/// # Example
///
/// ```
/// use daedalus_core::RequestId;
///
/// let id = RequestId::new();
/// println!("Request ID: {}", id);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new unique request ID using UUID v7.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `RequestId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Route values matched by the router, in match order.
pub type RouteValues = IndexMap<String, String>;

/// The authenticated caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// User name, if authenticated.
    pub name: Option<String>,
    /// Granted roles.
    pub roles: Vec<String>,
}

impl Principal {
    /// An unauthenticated caller.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// An authenticated user with roles.
    pub fn user<I, S>(name: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: Some(name.into()),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether the caller is authenticated.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.name.is_some()
    }

    /// Whether the caller holds `role`.
    #[must_use]
    pub fn is_in_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Per-request context that flows through the action pipeline.
///
/// # Example
///
/// ```
/// use daedalus_core::RequestContext;
/// use http::Method;
///
/// let ctx = RequestContext::new(Method::GET, "/users?id=7".parse().unwrap());
/// assert_eq!(ctx.query(), Some("id=7"));
/// assert!(!ctx.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: RequestId,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    route_values: RouteValues,
    files: Vec<FormFile>,
    user: Principal,
    services: Arc<dyn ServiceProvider>,
    cancellation: CancellationToken,
    started_at: Instant,
}

impl RequestContext {
    /// Creates a context with no headers, body, route values or services.
    #[must_use]
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            request_id: RequestId::new(),
            method,
            uri,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            route_values: RouteValues::new(),
            files: Vec::new(),
            user: Principal::anonymous(),
            services: Arc::new(Container::new()),
            cancellation: CancellationToken::new(),
            started_at: Instant::now(),
        }
    }

    /// Creates a context from an HTTP request with a buffered body.
    #[must_use]
    pub fn from_http(request: http::Request<Bytes>) -> Self {
        let (parts, body) = request.into_parts();
        Self::new(parts.method, parts.uri)
            .with_headers(parts.headers)
            .with_body(body)
    }

    /// Sets the headers.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets the route values.
    #[must_use]
    pub fn with_route_values(mut self, route_values: RouteValues) -> Self {
        self.route_values = route_values;
        self
    }

    /// Sets the uploaded files.
    #[must_use]
    pub fn with_files(mut self, files: Vec<FormFile>) -> Self {
        self.files = files;
        self
    }

    /// Sets the authenticated principal.
    #[must_use]
    pub fn with_user(mut self, user: Principal) -> Self {
        self.user = user;
        self
    }

    /// Sets the service provider.
    #[must_use]
    pub fn with_services(mut self, services: Arc<dyn ServiceProvider>) -> Self {
        self.services = services;
        self
    }

    /// Sets the cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Returns the request ID.
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns the HTTP method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request URI.
    #[must_use]
    pub const fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Returns the raw query string.
    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    /// Returns the headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the first value of a header as text.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the `Content-Type` header.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    /// Returns the buffered body.
    #[must_use]
    pub const fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns the route values.
    #[must_use]
    pub const fn route_values(&self) -> &RouteValues {
        &self.route_values
    }

    /// Returns the uploaded files.
    #[must_use]
    pub fn files(&self) -> &[FormFile] {
        &self.files
    }

    /// Returns the principal.
    #[must_use]
    pub const fn user(&self) -> &Principal {
        &self.user
    }

    /// Returns the service provider.
    #[must_use]
    pub fn services(&self) -> &Arc<dyn ServiceProvider> {
        &self.services
    }

    /// Returns the cancellation token.
    #[must_use]
    pub const fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Whether the request has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Time since the context was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Whether the body is url-encoded or multipart form data.
    #[must_use]
    pub fn has_form_content_type(&self) -> bool {
        self.content_type()
            .and_then(|ct| ct.parse::<mime::Mime>().ok())
            .is_some_and(|mt| {
                mt.essence_str() == mime::APPLICATION_WWW_FORM_URLENCODED.essence_str()
                    || mt.essence_str() == mime::MULTIPART_FORM_DATA.essence_str()
            })
    }

    /// Parses the form.
    ///
    /// Url-encoded bodies are decoded; multipart fields are expected to have
    /// been split out by the host, which supplies the files. Returns `None`
    /// for non-form requests.
    pub fn form(&self) -> Option<Result<FormCollection, serde_urlencoded::de::Error>> {
        if !self.has_form_content_type() {
            return None;
        }
        let is_urlencoded = self
            .content_type()
            .is_some_and(|ct| ct.starts_with(mime::APPLICATION_WWW_FORM_URLENCODED.essence_str()));
        let fields = if is_urlencoded {
            match serde_urlencoded::from_bytes::<Vec<(String, String)>>(&self.body) {
                Ok(fields) => fields,
                Err(err) => return Some(Err(err)),
            }
        } else {
            Vec::new()
        };
        Some(Ok(FormCollection {
            fields,
            files: self.files.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_request_id_uniqueness() {
        assert_ne!(RequestId::new(), RequestId::new());
    }

    #[test]
    fn test_from_http_request() {
        let request = http::Request::builder()
            .method(Method::POST)
            .uri("/orders?draft=true")
            .header(CONTENT_TYPE, "application/json")
            .body(Bytes::from_static(b"{}"))
            .expect("request");
        let ctx = RequestContext::from_http(request);
        assert_eq!(ctx.method(), &Method::POST);
        assert_eq!(ctx.query(), Some("draft=true"));
        assert_eq!(ctx.content_type(), Some("application/json"));
        assert_eq!(ctx.body().as_ref(), b"{}");
        assert!(!ctx.has_form_content_type());
        assert!(ctx.form().is_none());
    }

    #[test]
    fn test_urlencoded_form() {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded; charset=utf-8"),
        );
        let ctx = RequestContext::new(Method::POST, Uri::from_static("/"))
            .with_headers(headers)
            .with_body("name=Ada+Lovelace&tags=a&tags=b");
        let form = ctx.form().expect("form").expect("parsed");
        assert_eq!(form.get_all("name").collect::<Vec<_>>(), vec!["Ada Lovelace"]);
        assert_eq!(form.get_all("TAGS").count(), 2);
    }

    #[test]
    fn test_cancellation_is_shared() {
        let token = CancellationToken::new();
        let ctx = RequestContext::new(Method::GET, Uri::from_static("/")).with_cancellation(token.clone());
        token.cancel();
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn test_principal_roles() {
        let user = Principal::user("ada", ["admin"]);
        assert!(user.is_authenticated());
        assert!(user.is_in_role("admin"));
        assert!(!Principal::anonymous().is_authenticated());
    }
}
