// FilterView - lazy, composable predicate pipeline over captured requests
//
// A view is just a clone of the shared history handle plus the
// predicates applied so far; nothing is evaluated until `resolve()`.
// Every predicate method returns a brand-new view, so independent views
// over the same upstream never interfere. Predicates are pure filters,
// which is what makes them commute.

use crate::capture::{CaptureLog, CapturedRequest};
use crate::error::Result;
use crate::matcher::UrlPattern;
use bytes::Bytes;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;

/// Matches a request or response body: literal text, structural JSON
/// (value equality after normalization), or a regex pattern.
#[derive(Debug, Clone)]
pub enum BodyMatcher {
    Text(String),
    Json(Value),
    Pattern(Regex),
}

impl BodyMatcher {
    pub(crate) fn matches_str(&self, body: &str) -> bool {
        match self {
            BodyMatcher::Text(expected) => expected == body,
            BodyMatcher::Json(expected) => {
                // Normalize through serde_json so key order and
                // whitespace differences do not matter.
                serde_json::from_str::<Value>(body)
                    .map(|actual| &actual == expected)
                    .unwrap_or(false)
            }
            BodyMatcher::Pattern(re) => re.is_match(body),
        }
    }

    pub(crate) fn matches_bytes(&self, body: &Bytes) -> bool {
        self.matches_str(&String::from_utf8_lossy(body))
    }
}

impl From<&str> for BodyMatcher {
    fn from(text: &str) -> Self {
        BodyMatcher::Text(text.to_string())
    }
}

impl From<String> for BodyMatcher {
    fn from(text: String) -> Self {
        BodyMatcher::Text(text)
    }
}

impl From<Value> for BodyMatcher {
    fn from(value: Value) -> Self {
        BodyMatcher::Json(value)
    }
}

impl From<Regex> for BodyMatcher {
    fn from(re: Regex) -> Self {
        BodyMatcher::Pattern(re)
    }
}

impl std::fmt::Display for BodyMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BodyMatcher::Text(t) => write!(f, "\"{}\"", t),
            BodyMatcher::Json(v) => write!(f, "{}", v),
            BodyMatcher::Pattern(re) => write!(f, "/{}/", re.as_str()),
        }
    }
}

/// One applied filter predicate.
#[derive(Debug, Clone)]
pub(crate) enum Predicate {
    Url(UrlPattern),
    Method(String),
    Status(u16),
    Header(String, String),
    RequestBody(BodyMatcher),
    ResponseBody(BodyMatcher),
    Ok(bool),
    FromCache(bool),
    ResourceType(String),
    Pending(bool),
}

impl Predicate {
    /// Evaluates the predicate against one captured request.
    ///
    /// Only `ResponseBody` touches the transport, and that read goes
    /// through the per-request body cache, so it happens at most once
    /// per CapturedRequest no matter how many views evaluate it.
    async fn eval(&self, request: &Arc<CapturedRequest>) -> Result<bool> {
        Ok(match self {
            Predicate::Url(pattern) => pattern.matches(request.url()),
            Predicate::Method(method) => request.method().eq_ignore_ascii_case(method),
            Predicate::Status(status) => {
                request.response().is_some_and(|r| r.status() == *status)
            }
            Predicate::Header(name, value) => request.response().is_some_and(|r| {
                r.headers()
                    .iter()
                    .any(|(k, v)| k.eq_ignore_ascii_case(name) && v == value)
            }),
            Predicate::RequestBody(matcher) => request
                .post_data()
                .is_some_and(|body| matcher.matches_bytes(body)),
            Predicate::ResponseBody(matcher) => match request.response() {
                Some(response) => matcher.matches_bytes(&response.body().await?),
                None => false,
            },
            Predicate::Ok(expected) => {
                request.response().is_some_and(|r| r.ok() == *expected)
            }
            Predicate::FromCache(expected) => request
                .response()
                .is_some_and(|r| r.from_cache() == *expected),
            Predicate::ResourceType(rt) => request.resource_type() == rt,
            Predicate::Pending(expected) => request.is_pending() == *expected,
        })
    }

    /// Echoes the criterion for assertion messages.
    pub(crate) fn describe(&self) -> String {
        match self {
            Predicate::Url(p) => format!("url={}", p),
            Predicate::Method(m) => format!("method={}", m),
            Predicate::Status(s) => format!("status={}", s),
            Predicate::Header(k, v) => format!("header {}={}", k, v),
            Predicate::RequestBody(m) => format!("request body={}", m),
            Predicate::ResponseBody(m) => format!("response body={}", m),
            Predicate::Ok(v) => format!("ok={}", v),
            Predicate::FromCache(v) => format!("from_cache={}", v),
            Predicate::ResourceType(rt) => format!("resource_type={}", rt),
            Predicate::Pending(v) => format!("pending={}", v),
        }
    }
}

/// A lazy, read-only predicate pipeline over the capture history.
///
/// Obtained from [`PageSession::filter`](crate::PageSession::filter).
/// Each predicate method returns a new view; [`FilterView::resolve`]
/// forces evaluation against the current history snapshot.
#[derive(Clone)]
pub struct FilterView {
    log: CaptureLog,
    predicates: Vec<Predicate>,
}

impl FilterView {
    pub(crate) fn new(log: CaptureLog) -> Self {
        Self {
            log,
            predicates: Vec::new(),
        }
    }

    pub(crate) fn with(&self, predicate: Predicate) -> Self {
        let mut predicates = self.predicates.clone();
        predicates.push(predicate);
        Self {
            log: self.log.clone(),
            predicates,
        }
    }

    /// Narrows to requests whose URL matches the pattern.
    pub fn url(&self, pattern: impl Into<UrlPattern>) -> Self {
        self.with(Predicate::Url(pattern.into()))
    }

    /// Narrows to requests with the given HTTP method.
    pub fn method(&self, method: impl Into<String>) -> Self {
        self.with(Predicate::Method(method.into()))
    }

    /// Narrows to requests whose response has the given status.
    pub fn status(&self, status: u16) -> Self {
        self.with(Predicate::Status(status))
    }

    /// Narrows to requests whose response carries the given header.
    pub fn header(&self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.with(Predicate::Header(name.into(), value.into()))
    }

    /// Narrows to requests whose body matches.
    pub fn request_body(&self, matcher: impl Into<BodyMatcher>) -> Self {
        self.with(Predicate::RequestBody(matcher.into()))
    }

    /// Narrows to requests whose response body matches.
    pub fn response_body(&self, matcher: impl Into<BodyMatcher>) -> Self {
        self.with(Predicate::ResponseBody(matcher.into()))
    }

    /// Narrows by response ok-ness (2xx status).
    pub fn ok(&self, expected: bool) -> Self {
        self.with(Predicate::Ok(expected))
    }

    /// Narrows by whether the response came from the browser cache.
    pub fn from_cache(&self, expected: bool) -> Self {
        self.with(Predicate::FromCache(expected))
    }

    /// Narrows by resource type ("document", "fetch", "image", ...).
    pub fn resource_type(&self, resource_type: impl Into<String>) -> Self {
        self.with(Predicate::ResourceType(resource_type.into()))
    }

    /// Narrows by whether the request is still awaiting its response.
    pub fn pending(&self, expected: bool) -> Self {
        self.with(Predicate::Pending(expected))
    }

    /// Forces evaluation: returns the ordered subset of the current
    /// history satisfying every applied predicate.
    pub async fn resolve(&self) -> Result<Vec<Arc<CapturedRequest>>> {
        let snapshot = self.log.snapshot();
        let mut out = Vec::new();
        'requests: for request in snapshot {
            for predicate in &self.predicates {
                if !predicate.eval(&request).await? {
                    continue 'requests;
                }
            }
            out.push(request);
        }
        Ok(out)
    }

    /// Echoes the applied criteria for assertion messages.
    pub(crate) fn describe(&self) -> String {
        if self.predicates.is_empty() {
            "any request".to_string()
        } else {
            self.predicates
                .iter()
                .map(Predicate::describe)
                .collect::<Vec<_>>()
                .join(", ")
        }
    }
}

impl std::fmt::Debug for FilterView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterView")
            .field("criteria", &self.describe())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_body_matcher_normalizes_structure() {
        let matcher = BodyMatcher::from(serde_json::json!({"result": "MOCK", "n": 1}));
        assert!(matcher.matches_str("{\"n\":1,\"result\":\"MOCK\"}"));
        assert!(!matcher.matches_str("{\"result\":\"OTHER\",\"n\":1}"));
        assert!(!matcher.matches_str("not json"));
    }

    #[test]
    fn text_and_pattern_body_matchers() {
        assert!(BodyMatcher::from("abc").matches_str("abc"));
        assert!(!BodyMatcher::from("abc").matches_str("abcd"));
        assert!(BodyMatcher::from(Regex::new("^ab").unwrap()).matches_str("abcd"));
    }
}
