// Route - the per-request interception hook
//
// A Route packages one intercepted request with its required terminal
// action. The driven page hands a Route to the session for every request
// it observes; whoever ends up owning the Route must continue, fulfill,
// or abort it. The terminal methods consume the Route, so "resolved
// exactly once" is enforced by the type system rather than by runtime
// bookkeeping.

use crate::error::{Error, Result};
use bytes::Bytes;
use std::collections::HashMap;
use tokio::sync::oneshot;

/// One intercepted network request plus its one-shot terminal action.
///
/// Created by the page-driver wiring via [`Route::new`]; the driver keeps
/// the paired [`RouteAction`] receiver and applies whatever action arrives
/// to its real network stack.
pub struct Route {
    url: String,
    method: String,
    headers: HashMap<String, String>,
    post_data: Option<Bytes>,
    resource_type: String,
    action_tx: oneshot::Sender<RouteAction>,
}

/// The terminal action taken for one intercepted request.
///
/// Delivered to the driver side exactly once per [`Route`].
#[derive(Debug)]
pub enum RouteAction {
    /// Forward the request, optionally modified.
    Continue(Option<ContinueOverrides>),
    /// Answer the request with a synthesized response.
    Fulfill(FulfilledResponse),
    /// Fail the request with the given error code.
    Abort(String),
}

impl Route {
    /// Creates a route for an observed request.
    ///
    /// Returns the route plus the receiver on which the terminal action
    /// will arrive. The receiver belongs to the page-driver side.
    pub fn new(info: RequestInfo) -> (Self, oneshot::Receiver<RouteAction>) {
        let (action_tx, action_rx) = oneshot::channel();
        let route = Self {
            url: info.url,
            method: info.method,
            headers: info.headers,
            post_data: info.post_data,
            resource_type: info.resource_type,
            action_tx,
        };
        (route, action_rx)
    }

    /// Returns the URL of the intercepted request.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the HTTP method of the intercepted request (GET, POST, etc.).
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Returns the request headers.
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Returns the request body, if any.
    pub fn post_data(&self) -> Option<&Bytes> {
        self.post_data.as_ref()
    }

    /// Returns the resource type ("document", "fetch", "image", ...).
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// Continues the request with optional modifications.
    pub fn continue_(self, overrides: Option<ContinueOverrides>) -> Result<()> {
        self.send(RouteAction::Continue(overrides))
    }

    /// Fulfills the request with a synthesized response.
    ///
    /// Normalizes the spec into its wire form: a `content-length` header
    /// is injected for the body and the content type becomes a
    /// `content-type` header.
    pub fn fulfill(self, spec: ResponseSpec) -> Result<()> {
        self.send(RouteAction::Fulfill(spec.into_fulfilled()))
    }

    /// Aborts the request.
    ///
    /// # Arguments
    ///
    /// * `error_code` - Optional error code (default: "failed"); e.g.
    ///   "aborted", "accessdenied", "connectionrefused", "timedout".
    pub fn abort(self, error_code: Option<&str>) -> Result<()> {
        self.send(RouteAction::Abort(
            error_code.unwrap_or("failed").to_string(),
        ))
    }

    fn send(self, action: RouteAction) -> Result<()> {
        self.action_tx
            .send(action)
            .map_err(|_| Error::Fatal("route receiver dropped; the page is gone".to_string()))
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("url", &self.url)
            .field("method", &self.method)
            .finish()
    }
}

/// The observable parts of one intercepted request.
///
/// What the page-driver wiring hands over when constructing a [`Route`].
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub url: String,
    pub method: String,
    pub headers: HashMap<String, String>,
    pub post_data: Option<Bytes>,
    pub resource_type: String,
}

impl RequestInfo {
    pub fn new(url: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: method.into(),
            headers: HashMap::new(),
            post_data: None,
            resource_type: "fetch".to_string(),
        }
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_post_data(mut self, post_data: impl Into<Bytes>) -> Self {
        self.post_data = Some(post_data.into());
        self
    }

    pub fn with_resource_type(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_type = resource_type.into();
        self
    }
}

/// Options for continuing a request with modifications.
#[derive(Debug, Clone, Default)]
pub struct ContinueOverrides {
    /// Modified request headers
    pub headers: Option<HashMap<String, String>>,
    /// Modified request method (GET, POST, etc.)
    pub method: Option<String>,
    /// Modified request body
    pub post_data: Option<Bytes>,
    /// Modified request URL (must keep the original protocol)
    pub url: Option<String>,
}

impl ContinueOverrides {
    /// Creates a new builder for ContinueOverrides
    pub fn builder() -> ContinueOverridesBuilder {
        ContinueOverridesBuilder::default()
    }
}

/// Builder for ContinueOverrides
#[derive(Debug, Clone, Default)]
pub struct ContinueOverridesBuilder {
    headers: Option<HashMap<String, String>>,
    method: Option<String>,
    post_data: Option<Bytes>,
    url: Option<String>,
}

impl ContinueOverridesBuilder {
    /// Sets the request headers
    pub fn headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = Some(headers);
        self
    }

    /// Sets the request method
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Sets the request body
    pub fn post_data(mut self, post_data: impl Into<Bytes>) -> Self {
        self.post_data = Some(post_data.into());
        self
    }

    /// Sets the request URL (must keep the original protocol)
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Builds the ContinueOverrides
    pub fn build(self) -> ContinueOverrides {
        ContinueOverrides {
            headers: self.headers,
            method: self.method,
            post_data: self.post_data,
            url: self.url,
        }
    }
}

/// A mock response specification: status, headers, content type, body.
///
/// Used both as a rule's default response and as a per-trigger override.
#[derive(Debug, Clone)]
pub struct ResponseSpec {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: HashMap<String, String>,
    /// Content-Type header value
    pub content_type: Option<String>,
    /// Response body
    pub body: Option<Bytes>,
}

impl Default for ResponseSpec {
    fn default() -> Self {
        Self {
            status: 200,
            headers: HashMap::new(),
            content_type: None,
            body: None,
        }
    }
}

impl ResponseSpec {
    /// Creates a new ResponseSpec builder
    pub fn builder() -> ResponseSpecBuilder {
        ResponseSpecBuilder::default()
    }

    /// Normalizes the spec into its wire form.
    ///
    /// Injects `content-length` for the body and folds the content type
    /// into the header map.
    pub(crate) fn into_fulfilled(self) -> FulfilledResponse {
        let mut headers = self.headers;
        if let Some(ref body) = self.body {
            headers.insert("content-length".to_string(), body.len().to_string());
        }
        if let Some(ct) = self.content_type {
            headers.insert("content-type".to_string(), ct);
        }
        FulfilledResponse {
            status: self.status,
            headers,
            body: self.body,
        }
    }
}

/// Builder for ResponseSpec
#[derive(Debug, Clone, Default)]
pub struct ResponseSpecBuilder {
    status: Option<u16>,
    headers: Option<HashMap<String, String>>,
    content_type: Option<String>,
    body: Option<Bytes>,
}

impl ResponseSpecBuilder {
    /// Sets the HTTP status code (default: 200)
    pub fn status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Sets the response headers
    pub fn headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = Some(headers);
        self
    }

    /// Sets the response body from bytes
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Sets the response body from a string
    pub fn body_string(mut self, body: impl Into<String>) -> Self {
        self.body = Some(Bytes::from(body.into()));
        self
    }

    /// Sets the response body from JSON (and content-type to application/json)
    pub fn json(mut self, value: &impl serde::Serialize) -> Result<Self> {
        let json_str = serde_json::to_string(value)?;
        self.body = Some(Bytes::from(json_str));
        self.content_type = Some("application/json".to_string());
        Ok(self)
    }

    /// Sets the Content-Type header
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Builds the ResponseSpec
    pub fn build(self) -> ResponseSpec {
        ResponseSpec {
            status: self.status.unwrap_or(200),
            headers: self.headers.unwrap_or_default(),
            content_type: self.content_type,
            body: self.body,
        }
    }
}

/// The wire form of a mock response, as delivered to the page driver.
#[derive(Debug, Clone)]
pub struct FulfilledResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Option<Bytes>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fulfill_injects_content_headers() {
        let spec = ResponseSpec::builder()
            .status(201)
            .body_string("hello")
            .content_type("text/plain")
            .build();
        let fulfilled = spec.into_fulfilled();
        assert_eq!(fulfilled.status, 201);
        assert_eq!(fulfilled.headers.get("content-length").unwrap(), "5");
        assert_eq!(fulfilled.headers.get("content-type").unwrap(), "text/plain");
    }

    #[tokio::test]
    async fn terminal_action_is_delivered_once() {
        let (route, rx) = Route::new(RequestInfo::new("https://example.com/api", "GET"));
        route.abort(None).unwrap();
        match rx.await.unwrap() {
            RouteAction::Abort(code) => assert_eq!(code, "failed"),
            other => panic!("unexpected action: {:?}", other),
        }
    }
}
