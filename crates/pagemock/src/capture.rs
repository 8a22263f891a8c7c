// Captured request history
//
// CapturedRequest is the immutable record of one observed request,
// annotated exactly once with its response when the response event
// arrives. The underlying transport body is a single-consumption stream,
// so response bodies go through a take-once source plus a byte cache.

use crate::error::{Error, Result};
use bytes::Bytes;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::OnceCell;

/// A one-shot async producer of response body bytes.
pub type BodySource = BoxFuture<'static, Result<Bytes>>;

/// Immutable record of one observed network request.
///
/// Created when the session observes a request; the response annotation
/// is attached later, when (and if) the response event arrives. Shared
/// as `Arc<CapturedRequest>` between the history, rule call logs, and
/// filter results.
pub struct CapturedRequest {
    id: u64,
    url: String,
    method: String,
    query: BTreeMap<String, String>,
    post_data: Option<Bytes>,
    resource_type: String,
    timestamp: SystemTime,
    response: Mutex<Option<Arc<CapturedResponse>>>,
}

impl CapturedRequest {
    pub(crate) fn new(
        id: u64,
        url: impl Into<String>,
        method: impl Into<String>,
        post_data: Option<Bytes>,
        resource_type: impl Into<String>,
    ) -> Self {
        let url = url.into();
        let query = parse_query(&url);
        Self {
            id,
            url,
            method: method.into(),
            query,
            post_data,
            resource_type: resource_type.into(),
            timestamp: SystemTime::now(),
            response: Mutex::new(None),
        }
    }

    /// Session-scoped sequence id; the identity used to correlate the
    /// response event back to this record.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the request URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the HTTP method.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Returns the query parameters parsed from the URL.
    pub fn query(&self) -> &BTreeMap<String, String> {
        &self.query
    }

    /// Returns the request body, if any.
    pub fn post_data(&self) -> Option<&Bytes> {
        self.post_data.as_ref()
    }

    /// Returns the request body decoded as UTF-8, if any.
    pub fn post_data_string(&self) -> Option<String> {
        self.post_data
            .as_ref()
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    /// Returns the resource type ("document", "fetch", "image", ...).
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// Returns the instant the request was observed.
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    /// Returns the response annotation, if it has arrived.
    pub fn response(&self) -> Option<Arc<CapturedResponse>> {
        self.response.lock().clone()
    }

    /// True while no response has been observed for this request.
    pub fn is_pending(&self) -> bool {
        self.response.lock().is_none()
    }

    /// Attaches the response annotation. The first annotation wins;
    /// a duplicate is dropped with a warning.
    pub(crate) fn attach_response(&self, response: Arc<CapturedResponse>) {
        let mut slot = self.response.lock();
        if slot.is_some() {
            tracing::warn!(url = %self.url, "duplicate response event for captured request");
            return;
        }
        *slot = Some(response);
    }
}

impl std::fmt::Debug for CapturedRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturedRequest")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("url", &self.url)
            .field("pending", &self.is_pending())
            .finish()
    }
}

/// The response half of a captured request.
pub struct CapturedResponse {
    status: u16,
    headers: HashMap<String, String>,
    from_cache: bool,
    source: Mutex<Option<BodySource>>,
    cached_body: OnceCell<Bytes>,
}

impl CapturedResponse {
    pub(crate) fn new(
        status: u16,
        headers: HashMap<String, String>,
        from_cache: bool,
        source: Option<BodySource>,
    ) -> Self {
        Self {
            status,
            headers,
            from_cache,
            source: Mutex::new(source),
            cached_body: OnceCell::new(),
        }
    }

    /// Returns the HTTP status code.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Returns the response headers.
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// True for 2xx status codes.
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// True when the response was served from the browser cache.
    pub fn from_cache(&self) -> bool {
        self.from_cache
    }

    /// Reads the response body.
    ///
    /// The underlying source is consumed at most once; subsequent reads
    /// are served from the cache, so body predicates can be re-applied
    /// without touching the transport again.
    pub async fn body(&self) -> Result<Bytes> {
        self.cached_body
            .get_or_try_init(|| {
                let source = self.source.lock().take();
                async move {
                    match source {
                        Some(fut) => fut.await,
                        None => Ok(Bytes::new()),
                    }
                }
            })
            .await
            .cloned()
    }

    /// Returns the body decoded as UTF-8.
    pub async fn body_string(&self) -> Result<String> {
        let bytes = self.body().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Returns the body parsed as JSON.
    pub async fn body_json(&self) -> Result<serde_json::Value> {
        let bytes = self.body().await?;
        serde_json::from_slice(&bytes).map_err(Error::from)
    }
}

impl std::fmt::Debug for CapturedResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturedResponse")
            .field("status", &self.status)
            .field("from_cache", &self.from_cache)
            .finish()
    }
}

/// A response event from the page driver.
///
/// Carries status, headers, cache flag, and the single-consumption body
/// source. Constructed by the driver wiring (or a test harness) and fed
/// to [`PageSession::handle_response`](crate::PageSession::handle_response).
pub struct ResponseEvent {
    pub(crate) status: u16,
    pub(crate) headers: HashMap<String, String>,
    pub(crate) from_cache: bool,
    pub(crate) body: Option<BodySource>,
}

impl ResponseEvent {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            from_cache: false,
            body: None,
        }
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_from_cache(mut self, from_cache: bool) -> Self {
        self.from_cache = from_cache;
        self
    }

    /// Sets an immediately-available body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        let bytes = body.into();
        self.body = Some(Box::pin(async move { Ok(bytes) }));
        self
    }

    /// Sets a deferred body source; it will be polled at most once.
    pub fn with_body_source(mut self, source: BodySource) -> Self {
        self.body = Some(source);
        self
    }

    pub(crate) fn into_captured(self) -> CapturedResponse {
        CapturedResponse::new(self.status, self.headers, self.from_cache, self.body)
    }
}

/// The session-owned, shareable capture history.
///
/// FilterViews clone this handle; many independent views over the same
/// upstream are safe because the log is append-only between clears.
#[derive(Clone, Default)]
pub(crate) struct CaptureLog {
    entries: Arc<Mutex<Vec<Arc<CapturedRequest>>>>,
}

impl CaptureLog {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, request: Arc<CapturedRequest>) {
        self.entries.lock().push(request);
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<CapturedRequest>> {
        self.entries.lock().clone()
    }

    pub(crate) fn find(&self, id: u64) -> Option<Arc<CapturedRequest>> {
        self.entries.lock().iter().find(|r| r.id() == id).cloned()
    }

    pub(crate) fn clear(&self) {
        self.entries.lock().clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

/// Parses the query string of a URL into an unordered key→value map.
///
/// Tolerates both absolute and path-only URLs.
pub(crate) fn parse_query(url: &str) -> BTreeMap<String, String> {
    let Some((_, qs)) = url.split_once('?') else {
        return BTreeMap::new();
    };
    let qs = qs.split_once('#').map_or(qs, |(q, _)| q);
    url::form_urlencoded::parse(qs.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}
