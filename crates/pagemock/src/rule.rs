// Mock rules - matcher + response behavior + call history
//
// A MockRule cycles Armed -> Fulfilling -> Armed; every fulfillment
// appends to its call history and emits a "fulfilled" event. Fulfillment
// precedence is passthrough > redirect > literal response, so at most
// one behavior applies per request.

use crate::capture::CapturedRequest;
use crate::error::{Error, Result};
use crate::filter::BodyMatcher;
use crate::matcher::Matcher;
use crate::route::{ContinueOverrides, ResponseSpec, Route};
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Grace delay applied after a fulfillment is observed, giving the page
/// time to consume the response before the test continues.
const FULFILL_GRACE: Duration = Duration::from_millis(50);

/// Lifecycle phase of a mock rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RulePhase {
    /// Waiting for a matching request (or a manual trigger).
    Armed,
    /// Actively delivering a response.
    Fulfilling,
}

/// Registration options for a mock rule.
///
/// `method` and `query` narrow the matcher; the rest configures the
/// response behavior. Defaults: automatic response, no delay, literal
/// response from `response`.
#[derive(Debug, Clone)]
pub struct MockOptions {
    /// Restrict the matcher to this HTTP method.
    pub method: Option<String>,
    /// Restrict the matcher to this exact query string.
    pub query: Option<BTreeMap<String, String>>,
    /// The literal response served when neither passthrough nor redirect applies.
    pub response: ResponseSpec,
    /// Respond without an explicit `trigger()` call.
    pub auto_respond: bool,
    /// Delay before an automatic response is delivered.
    pub delay: Duration,
    /// Forward the real request unmodified instead of mocking.
    pub passthrough: bool,
    /// Reissue the request against this origin+path, preserving the
    /// original query string.
    pub redirect: Option<String>,
}

impl Default for MockOptions {
    fn default() -> Self {
        Self {
            method: None,
            query: None,
            response: ResponseSpec::default(),
            auto_respond: true,
            delay: Duration::ZERO,
            passthrough: false,
            redirect: None,
        }
    }
}

impl MockOptions {
    /// Creates a new MockOptions builder
    pub fn builder() -> MockOptionsBuilder {
        MockOptionsBuilder::default()
    }
}

/// Builder for MockOptions
#[derive(Debug, Clone, Default)]
pub struct MockOptionsBuilder {
    method: Option<String>,
    query: Option<BTreeMap<String, String>>,
    response: Option<ResponseSpec>,
    auto_respond: Option<bool>,
    delay: Option<Duration>,
    passthrough: bool,
    redirect: Option<String>,
}

impl MockOptionsBuilder {
    /// Restricts the matcher to an HTTP method
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Restricts the matcher to an exact query string
    pub fn query(mut self, query: BTreeMap<String, String>) -> Self {
        self.query = Some(query);
        self
    }

    /// Sets the literal response
    pub fn response(mut self, response: ResponseSpec) -> Self {
        self.response = Some(response);
        self
    }

    /// Makes the rule manual: it stays pending until `trigger()` is called
    pub fn manual(mut self) -> Self {
        self.auto_respond = Some(false);
        self
    }

    /// Delays the automatic response
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Forwards the real request unmodified
    pub fn passthrough(mut self) -> Self {
        self.passthrough = true;
        self
    }

    /// Reissues matching requests against another origin+path
    pub fn redirect(mut self, target: impl Into<String>) -> Self {
        self.redirect = Some(target.into());
        self
    }

    /// Builds the MockOptions
    pub fn build(self) -> MockOptions {
        MockOptions {
            method: self.method,
            query: self.query,
            response: self.response.unwrap_or_default(),
            auto_respond: self.auto_respond.unwrap_or(true),
            delay: self.delay.unwrap_or(Duration::ZERO),
            passthrough: self.passthrough,
            redirect: self.redirect,
        }
    }
}

struct RuleState {
    phase: RulePhase,
    requests_received: Vec<Arc<CapturedRequest>>,
    pending: VecDeque<Route>,
}

/// One registered mock rule.
///
/// Owned by the registry; test code interacts through [`MockHandle`].
pub struct MockRule {
    matcher: Matcher,
    response: ResponseSpec,
    auto_respond: bool,
    delay: Duration,
    passthrough: bool,
    redirect: Option<String>,
    state: Mutex<RuleState>,
    fulfilled_tx: broadcast::Sender<()>,
}

impl MockRule {
    pub(crate) fn new(matcher: Matcher, options: MockOptions) -> Arc<Self> {
        let (fulfilled_tx, _) = broadcast::channel(16);
        Arc::new(Self {
            matcher,
            response: options.response,
            auto_respond: options.auto_respond,
            delay: options.delay,
            passthrough: options.passthrough,
            redirect: options.redirect,
            state: Mutex::new(RuleState {
                phase: RulePhase::Armed,
                requests_received: Vec::new(),
                pending: VecDeque::new(),
            }),
            fulfilled_tx,
        })
    }

    pub(crate) fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> RulePhase {
        self.state.lock().phase
    }

    /// True once at least one request has matched this rule.
    pub fn called(&self) -> bool {
        !self.state.lock().requests_received.is_empty()
    }

    /// Number of requests that have matched this rule.
    pub fn call_count(&self) -> usize {
        self.state.lock().requests_received.len()
    }

    /// The rule's call history, in arrival order.
    pub fn requests_received(&self) -> Vec<Arc<CapturedRequest>> {
        self.state.lock().requests_received.clone()
    }

    /// Handles one matched request.
    ///
    /// Appends to the call history, then either fulfills (immediately or
    /// after the configured delay) or parks the route for a later
    /// `trigger()`. Every path ends in a terminal route action, so a
    /// matched request can never stall the page's network stack.
    pub(crate) fn on_request(self: &Arc<Self>, captured: Arc<CapturedRequest>, route: Route) -> Result<()> {
        self.state.lock().requests_received.push(captured);

        if !self.auto_respond {
            self.state.lock().pending.push_back(route);
            tracing::debug!(matcher = %self.matcher, "manual mock parked pending request");
            return Ok(());
        }

        if self.delay.is_zero() {
            return self.fulfill_route(route, None);
        }

        let rule = Arc::clone(self);
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = rule.fulfill_route(route, None) {
                tracing::warn!(matcher = %rule.matcher, error = %e, "delayed mock fulfillment failed");
            }
        });
        Ok(())
    }

    /// Manually fulfills one pending request.
    ///
    /// Fails with [`Error::Fatal`] on an auto-respond rule. With no
    /// pending request this is a no-op; the rule stays armed until a
    /// matching request next arrives.
    pub fn trigger(&self, override_response: Option<ResponseSpec>) -> Result<()> {
        if self.auto_respond {
            return Err(Error::Fatal("cannot trigger an automatic mock".to_string()));
        }
        let route = self.state.lock().pending.pop_front();
        match route {
            Some(route) => self.fulfill_route(route, override_response),
            None => Ok(()),
        }
    }

    fn fulfill_route(&self, route: Route, override_response: Option<ResponseSpec>) -> Result<()> {
        self.state.lock().phase = RulePhase::Fulfilling;
        let result = if self.passthrough {
            tracing::debug!(matcher = %self.matcher, "passthrough: forwarding request");
            route.continue_(None)
        } else if let Some(target) = &self.redirect {
            let url = redirect_url(target, route.url());
            tracing::debug!(matcher = %self.matcher, %url, "redirecting request");
            route.continue_(Some(ContinueOverrides::builder().url(url).build()))
        } else {
            let spec = override_response.unwrap_or_else(|| self.response.clone());
            tracing::debug!(matcher = %self.matcher, status = spec.status, "fulfilling with mock response");
            route.fulfill(spec)
        };
        self.state.lock().phase = RulePhase::Armed;
        // No receivers is fine: nobody is waiting on this rule.
        let _ = self.fulfilled_tx.send(());
        result
    }

    /// Waits until this rule has been called.
    ///
    /// Resolves immediately (after a short grace delay that lets the page
    /// consume the response) if the call history is already non-empty;
    /// otherwise races a one-shot fulfilled listener against the timeout.
    /// The listener is detached on both branches.
    pub async fn wait_until_called(&self, timeout: Duration) -> Result<()> {
        // Subscribe before checking the call history so a fulfillment
        // landing in between cannot be missed.
        let mut fulfilled = self.fulfilled_tx.subscribe();
        if self.called() {
            tokio::time::sleep(FULFILL_GRACE).await;
            return Ok(());
        }
        match tokio::time::timeout(timeout, fulfilled.recv()).await {
            Ok(Ok(())) | Ok(Err(broadcast::error::RecvError::Lagged(_))) => {
                tokio::time::sleep(FULFILL_GRACE).await;
                Ok(())
            }
            Ok(Err(broadcast::error::RecvError::Closed)) => {
                Err(Error::Fatal("mock rule dropped while waiting".to_string()))
            }
            Err(_) => Err(Error::timeout(
                format!("waitUntilCalled [{}]", self.matcher),
                timeout,
            )),
        }
    }
}

impl std::fmt::Debug for MockRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockRule")
            .field("matcher", &self.matcher)
            .field("auto_respond", &self.auto_respond)
            .field("call_count", &self.call_count())
            .finish()
    }
}

/// Builds the redirect URL: the target supplies origin and path, the
/// original request supplies the query string.
fn redirect_url(target: &str, original_url: &str) -> String {
    let base = target.split_once('?').map_or(target, |(b, _)| b);
    match original_url.split_once('?') {
        Some((_, query)) => format!("{}?{}", base, query),
        None => base.to_string(),
    }
}

/// Handle to a registered mock rule.
///
/// Returned by [`PageSession::mock`](crate::PageSession::mock); cheap to
/// clone, remains valid after the rule is removed from the registry
/// (the history stays readable).
#[derive(Clone, Debug)]
pub struct MockHandle {
    rule: Arc<MockRule>,
}

impl MockHandle {
    pub(crate) fn new(rule: Arc<MockRule>) -> Self {
        Self { rule }
    }

    /// True once at least one request has matched this mock.
    pub fn called(&self) -> bool {
        self.rule.called()
    }

    /// Number of requests that have matched this mock.
    pub fn call_count(&self) -> usize {
        self.rule.call_count()
    }

    /// The mock's call history, in arrival order.
    pub fn requests_received(&self) -> Vec<Arc<CapturedRequest>> {
        self.rule.requests_received()
    }

    /// Current lifecycle phase of the underlying rule.
    pub fn phase(&self) -> RulePhase {
        self.rule.phase()
    }

    /// Manually fulfills one pending request (manual mocks only).
    pub fn trigger(&self, override_response: Option<ResponseSpec>) -> Result<()> {
        self.rule.trigger(override_response)
    }

    /// Waits until this mock has been called.
    pub async fn wait_until_called(&self, timeout: Duration) -> Result<()> {
        self.rule.wait_until_called(timeout).await
    }

    /// Mock-scoped assertions over the call history.
    pub fn assert(&self) -> MockAssert {
        MockAssert {
            rule: Arc::clone(&self.rule),
        }
    }
}

/// Assertions scoped to one mock rule's call history.
pub struct MockAssert {
    rule: Arc<MockRule>,
}

impl MockAssert {
    /// Asserts the mock was called; with `times`, exactly that often.
    ///
    /// A custom message fully replaces the default text.
    pub fn called(&self, times: Option<usize>, msg: Option<&str>) -> Result<()> {
        let actual = self.rule.call_count();
        match times {
            Some(expected) if actual != expected => Err(Error::assertion(
                format!(
                    "expected mock [{}] to have been called {} times",
                    self.rule.matcher, expected
                ),
                msg,
                expected.to_string(),
                actual.to_string(),
            )),
            None if actual == 0 => Err(Error::assertion(
                format!("expected mock [{}] to have been called", self.rule.matcher),
                msg,
                "at least 1 call".to_string(),
                "0".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Asserts the most recent matched request carried the expected body.
    pub fn post_body(&self, expected: impl Into<BodyMatcher>, msg: Option<&str>) -> Result<()> {
        let expected = expected.into();
        let last = self.rule.requests_received().into_iter().next_back();
        let Some(request) = last else {
            return Err(Error::assertion(
                format!(
                    "expected mock [{}] to have received a request with body {}",
                    self.rule.matcher, expected
                ),
                msg,
                expected.to_string(),
                "no requests received".to_string(),
            ));
        };
        let actual = request.post_data_string().unwrap_or_default();
        if expected.matches_str(&actual) {
            Ok(())
        } else {
            Err(Error::assertion(
                format!(
                    "expected mock [{}] post body to match {}",
                    self.rule.matcher, expected
                ),
                msg,
                expected.to_string(),
                actual,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_preserves_original_query() {
        assert_eq!(
            redirect_url("https://mock.local/api", "https://real.host/api?page=2&q=x"),
            "https://mock.local/api?page=2&q=x"
        );
        assert_eq!(
            redirect_url("https://mock.local/api?stale=1", "https://real.host/api"),
            "https://mock.local/api"
        );
    }
}
