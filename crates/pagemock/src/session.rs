// PageSession - interception wiring for one driven page
//
// Owns the mock registry, the capture history, and the session event
// channel; nothing here is process-global, so two sessions never share
// mock state. The page-driver wiring feeds `handle_request` /
// `handle_response`; test code registers mocks and reads history.

use crate::assertions::AssertionChain;
use crate::capture::{CaptureLog, CapturedRequest, ResponseEvent};
use crate::error::{Error, Result};
use crate::filter::FilterView;
use crate::matcher::{Matcher, UrlPattern};
use crate::registry::MockRegistry;
use crate::rule::{MockHandle, MockOptions, MockRule};
use crate::route::Route;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;

/// Default timeout for wait-style operations (30 seconds).
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
enum SessionEvent {
    Request(Arc<CapturedRequest>),
    Response(Arc<CapturedRequest>),
}

/// What survives a page navigation. Default: nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NavigationOptions {
    /// Keep registered mocks across the navigation.
    pub retain_mocks: bool,
    /// Keep the capture history across the navigation.
    pub retain_history: bool,
}

/// The mocking/interception engine for one driven page.
///
/// Cheap to clone; clones share the same registry and history. The
/// session guarantees every intercepted request is resolved exactly
/// once: a matched rule fulfills on every reachable path, and anything
/// unmatched is continued immediately.
#[derive(Clone)]
pub struct PageSession {
    enabled: Arc<AtomicBool>,
    verbose: Arc<AtomicBool>,
    registry: Arc<Mutex<MockRegistry>>,
    log: CaptureLog,
    next_id: Arc<AtomicU64>,
    events: broadcast::Sender<SessionEvent>,
}

impl Default for PageSession {
    fn default() -> Self {
        Self::new()
    }
}

impl PageSession {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            enabled: Arc::new(AtomicBool::new(false)),
            verbose: Arc::new(AtomicBool::new(false)),
            registry: Arc::new(Mutex::new(MockRegistry::new())),
            log: CaptureLog::new(),
            next_id: Arc::new(AtomicU64::new(1)),
            events,
        }
    }

    /// Turns on interception for the page. Idempotent.
    pub fn enable(&self) {
        if !self.enabled.swap(true, Ordering::SeqCst) {
            tracing::debug!("interception enabled");
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Emits a one-line log for every completed request.
    pub fn set_verbose(&self, verbose: bool) {
        self.verbose.store(verbose, Ordering::SeqCst);
    }

    fn ensure_enabled(&self) -> Result<()> {
        if self.is_enabled() {
            Ok(())
        } else {
            Err(Error::Fatal(
                "interception is not enabled; call enable() first".to_string(),
            ))
        }
    }

    /// Registers a mock rule.
    ///
    /// An existing rule with an identical matcher+method+queryString is
    /// replaced, keeping the registry bounded under repeated test setup.
    /// Matcher validation errors surface synchronously here.
    pub fn mock(&self, url: impl Into<UrlPattern>, options: MockOptions) -> Result<MockHandle> {
        self.ensure_enabled()?;
        let matcher = Matcher::new(url.into(), options.method.clone(), options.query.clone())?;
        tracing::debug!(matcher = %matcher, "registering mock rule");
        let rule = MockRule::new(matcher, options);
        self.registry.lock().register(Arc::clone(&rule));
        Ok(MockHandle::new(rule))
    }

    /// Removes every rule compatible with the given partial matcher.
    ///
    /// Returns how many rules were removed.
    pub fn remove_mock(
        &self,
        url: impl Into<UrlPattern>,
        options: Option<MockOptions>,
    ) -> Result<usize> {
        let (method, query) = options.map_or((None, None), |o| (o.method, o.query));
        let partial = Matcher::new(url.into(), method, query)?;
        Ok(self.registry.lock().remove(&partial))
    }

    /// Empties the mock registry.
    pub fn clear_mocks(&self) {
        self.registry.lock().clear();
    }

    /// Number of registered mock rules.
    pub fn mock_count(&self) -> usize {
        self.registry.lock().len()
    }

    /// Driver wiring: handles one intercepted request.
    ///
    /// Appends a CapturedRequest to history, resolves the registry, and
    /// either delegates to the matching rule or continues the request
    /// immediately. Returns the captured record; its id correlates the
    /// later response event.
    pub fn handle_request(&self, route: Route) -> Result<Arc<CapturedRequest>> {
        self.ensure_enabled()?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let captured = Arc::new(CapturedRequest::new(
            id,
            route.url(),
            route.method(),
            route.post_data().cloned(),
            route.resource_type(),
        ));
        self.log.push(Arc::clone(&captured));
        let _ = self.events.send(SessionEvent::Request(Arc::clone(&captured)));

        let resolved = self
            .registry
            .lock()
            .resolve(route.url(), route.method(), captured.query());
        match resolved {
            Some(rule) => {
                tracing::debug!(
                    matcher = %rule.matcher(),
                    url = route.url(),
                    "mock rule matched"
                );
                rule.on_request(Arc::clone(&captured), route)?;
            }
            None => {
                tracing::debug!(url = route.url(), "no mock rule matched; continuing");
                route.continue_(None)?;
            }
        }
        Ok(captured)
    }

    /// Driver wiring: annotates a captured request with its response.
    ///
    /// A response for an unknown request id is logged and dropped; the
    /// page may complete requests captured before a history clear.
    pub fn handle_response(&self, request_id: u64, event: ResponseEvent) -> Result<()> {
        self.ensure_enabled()?;
        let Some(captured) = self.log.find(request_id) else {
            tracing::warn!(request_id, "response event with no matching captured request");
            return Ok(());
        };
        let status = event.status;
        captured.attach_response(Arc::new(event.into_captured()));
        if self.verbose.load(Ordering::SeqCst) {
            tracing::info!(
                "{} {} -> {}",
                captured.method(),
                captured.url(),
                status
            );
        }
        let _ = self.events.send(SessionEvent::Response(captured));
        Ok(())
    }

    /// The full capture history, in arrival order.
    pub fn all(&self) -> Vec<Arc<CapturedRequest>> {
        self.log.snapshot()
    }

    /// Root filter view over the capture history.
    pub fn filter(&self) -> FilterView {
        FilterView::new(self.log.clone())
    }

    /// Root assertion chain over the capture history.
    pub fn assert_requests(&self) -> AssertionChain {
        AssertionChain::new(self.filter())
    }

    /// Waits for a request matching the pattern.
    ///
    /// Resolves immediately if one was already captured; otherwise waits
    /// for the next occurrence, racing the timeout. The event listener
    /// is detached on both branches.
    pub async fn wait_for_request(
        &self,
        pattern: impl Into<UrlPattern>,
        timeout: Option<Duration>,
    ) -> Result<Arc<CapturedRequest>> {
        self.ensure_enabled()?;
        let pattern = pattern.into();
        let timeout = timeout.unwrap_or(DEFAULT_WAIT_TIMEOUT);
        // Subscribe before checking history so an event landing between
        // the check and the wait cannot be missed.
        let rx = self.events.subscribe();
        if let Some(found) = self
            .all()
            .into_iter()
            .find(|r| pattern.matches(r.url()))
        {
            return Ok(found);
        }
        self.wait_event(rx, &pattern, false, timeout, "waitForRequest")
            .await
    }

    /// Waits for a completed response matching the pattern.
    pub async fn wait_for_response(
        &self,
        pattern: impl Into<UrlPattern>,
        timeout: Option<Duration>,
    ) -> Result<Arc<CapturedRequest>> {
        self.ensure_enabled()?;
        let pattern = pattern.into();
        let timeout = timeout.unwrap_or(DEFAULT_WAIT_TIMEOUT);
        let rx = self.events.subscribe();
        if let Some(found) = self
            .all()
            .into_iter()
            .find(|r| pattern.matches(r.url()) && !r.is_pending())
        {
            return Ok(found);
        }
        self.wait_event(rx, &pattern, true, timeout, "waitForResponse")
            .await
    }

    /// Waits for the next request matching the pattern, ignoring any
    /// already captured.
    pub async fn wait_for_next_request(
        &self,
        pattern: impl Into<UrlPattern>,
        timeout: Option<Duration>,
    ) -> Result<Arc<CapturedRequest>> {
        self.ensure_enabled()?;
        let pattern = pattern.into();
        let timeout = timeout.unwrap_or(DEFAULT_WAIT_TIMEOUT);
        let rx = self.events.subscribe();
        self.wait_event(rx, &pattern, false, timeout, "waitForNextRequest")
            .await
    }

    /// Waits for the next completed response matching the pattern,
    /// ignoring any already captured.
    pub async fn wait_for_next_response(
        &self,
        pattern: impl Into<UrlPattern>,
        timeout: Option<Duration>,
    ) -> Result<Arc<CapturedRequest>> {
        self.ensure_enabled()?;
        let pattern = pattern.into();
        let timeout = timeout.unwrap_or(DEFAULT_WAIT_TIMEOUT);
        let rx = self.events.subscribe();
        self.wait_event(rx, &pattern, true, timeout, "waitForNextResponse")
            .await
    }

    async fn wait_event(
        &self,
        mut rx: broadcast::Receiver<SessionEvent>,
        pattern: &UrlPattern,
        want_response: bool,
        timeout: Duration,
        operation: &str,
    ) -> Result<Arc<CapturedRequest>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Err(_) => {
                    return Err(Error::timeout(
                        format!("{} [{}]", operation, pattern),
                        timeout,
                    ));
                }
                Ok(Err(broadcast::error::RecvError::Closed)) => {
                    return Err(Error::Fatal("session event channel closed".to_string()));
                }
                Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
                Ok(Ok(SessionEvent::Request(req))) => {
                    if !want_response && pattern.matches(req.url()) {
                        return Ok(req);
                    }
                }
                Ok(Ok(SessionEvent::Response(req))) => {
                    if want_response && pattern.matches(req.url()) {
                        return Ok(req);
                    }
                }
            }
        }
    }

    /// Driver wiring: the page navigated.
    ///
    /// Clears mocks and history unless retention was requested; the
    /// default keeps tests isolated from each other.
    pub fn handle_navigation(&self, options: Option<NavigationOptions>) {
        let options = options.unwrap_or_default();
        if !options.retain_mocks {
            self.registry.lock().clear();
        }
        if !options.retain_history {
            self.log.clear();
        }
        tracing::debug!(
            retain_mocks = options.retain_mocks,
            retain_history = options.retain_history,
            "navigation: session state cycled"
        );
    }

    /// Teardown: detaches interception and drops all session state.
    ///
    /// Idempotent; safe on a session whose interception was never
    /// enabled.
    pub fn before_close(&self) {
        self.enabled.store(false, Ordering::SeqCst);
        self.registry.lock().clear();
        self.log.clear();
    }
}

impl std::fmt::Debug for PageSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageSession")
            .field("enabled", &self.is_enabled())
            .field("mocks", &self.mock_count())
            .field("captured", &self.log.len())
            .finish()
    }
}
