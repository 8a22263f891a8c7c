// AssertionChain - a FilterView with deferred pass/fail semantics
//
// The chain is an explicit two-part value: the predicate-narrowed
// FilterView (data) plus the first failure encountered (deferred
// result). Each predicate method narrows the view and, on an empty
// result, records an assertion failure; once failed, later predicates
// still narrow but never evaluate, so no further body reads happen.
// Awaiting the chain (or calling `check()`) yields the final result.

use crate::capture::CapturedRequest;
use crate::error::{Error, Result};
use crate::filter::{BodyMatcher, FilterView, Predicate};
use crate::matcher::UrlPattern;
use futures_util::future::BoxFuture;
use std::sync::Arc;

/// An awaitable assertion over the capture history.
///
/// Obtained from [`PageSession::assert_requests`](crate::PageSession::assert_requests).
/// Every predicate method asserts "at least one captured request
/// satisfies the chain so far" and returns a new chain for further
/// narrowing. A custom message fully replaces the default text.
pub struct AssertionChain {
    view: FilterView,
    failure: Option<Error>,
}

impl AssertionChain {
    pub(crate) fn new(view: FilterView) -> Self {
        Self {
            view,
            failure: None,
        }
    }

    /// Asserts at least one request matches the URL pattern.
    pub async fn url(self, pattern: impl Into<UrlPattern>, msg: Option<&str>) -> Self {
        self.apply(Predicate::Url(pattern.into()), msg).await
    }

    /// Asserts at least one matching request used this HTTP method.
    pub async fn method(self, method: impl Into<String>, msg: Option<&str>) -> Self {
        self.apply(Predicate::Method(method.into()), msg).await
    }

    /// Asserts at least one matching request got this response status.
    pub async fn status(self, status: u16, msg: Option<&str>) -> Self {
        self.apply(Predicate::Status(status), msg).await
    }

    /// Asserts at least one matching response carries this header.
    pub async fn header(
        self,
        name: impl Into<String>,
        value: impl Into<String>,
        msg: Option<&str>,
    ) -> Self {
        self.apply(Predicate::Header(name.into(), value.into()), msg)
            .await
    }

    /// Asserts at least one matching request sent this body.
    pub async fn request_body(self, matcher: impl Into<BodyMatcher>, msg: Option<&str>) -> Self {
        self.apply(Predicate::RequestBody(matcher.into()), msg).await
    }

    /// Asserts at least one matching request received this response body.
    pub async fn response_body(self, matcher: impl Into<BodyMatcher>, msg: Option<&str>) -> Self {
        self.apply(Predicate::ResponseBody(matcher.into()), msg)
            .await
    }

    /// Asserts on response ok-ness (2xx status).
    pub async fn ok(self, expected: bool, msg: Option<&str>) -> Self {
        self.apply(Predicate::Ok(expected), msg).await
    }

    /// Asserts on whether the response came from the browser cache.
    pub async fn from_cache(self, expected: bool, msg: Option<&str>) -> Self {
        self.apply(Predicate::FromCache(expected), msg).await
    }

    /// Asserts on resource type.
    pub async fn resource_type(self, resource_type: impl Into<String>, msg: Option<&str>) -> Self {
        self.apply(Predicate::ResourceType(resource_type.into()), msg)
            .await
    }

    /// Asserts on whether matching requests are still pending.
    pub async fn pending(self, expected: bool, msg: Option<&str>) -> Self {
        self.apply(Predicate::Pending(expected), msg).await
    }

    async fn apply(self, predicate: Predicate, msg: Option<&str>) -> Self {
        let view = self.view.with(predicate);

        // Already failed: narrow without evaluating. Re-raising the
        // stored failure at await time must not trigger further
        // network-body reads.
        if self.failure.is_some() {
            return Self {
                view,
                failure: self.failure,
            };
        }

        let failure = match view.resolve().await {
            Ok(list) if list.is_empty() => Some(Error::assertion(
                format!(
                    "expected at least one captured request matching [{}], found none",
                    view.describe()
                ),
                msg,
                "at least 1 matching request",
                "0",
            )),
            Ok(_) => None,
            // A transport fault is not a failed assertion; surface it as-is.
            Err(e) => Some(e),
        };

        Self { view, failure }
    }

    /// Terminal count assertion.
    ///
    /// Tolerates an upstream empty-result assertion failure: an empty
    /// chain is a legitimate basis for asserting "exactly 0". The count
    /// is recomputed from the predicate-narrowed view, ignoring the
    /// non-emptiness checks along the way. Non-assertion failures
    /// (timeouts, transport faults) still propagate.
    pub async fn exactly(self, n: usize, msg: Option<&str>) -> Result<Vec<Arc<CapturedRequest>>> {
        if let Some(failure) = self.failure {
            if !failure.is_assertion() {
                return Err(failure);
            }
        }
        let list = self.view.resolve().await?;
        if list.len() == n {
            Ok(list)
        } else {
            Err(Error::assertion(
                format!(
                    "expected exactly {} captured requests matching [{}]",
                    n,
                    self.view.describe()
                ),
                msg,
                n.to_string(),
                list.len().to_string(),
            ))
        }
    }

    /// Resolves the chain: the stored failure if any predicate failed,
    /// otherwise the matching requests.
    pub async fn check(self) -> Result<Vec<Arc<CapturedRequest>>> {
        match self.failure {
            Some(failure) => Err(failure),
            None => self.view.resolve().await,
        }
    }
}

impl std::future::IntoFuture for AssertionChain {
    type Output = Result<Vec<Arc<CapturedRequest>>>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.check())
    }
}

impl std::fmt::Debug for AssertionChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssertionChain")
            .field("view", &self.view)
            .field("failed", &self.failure.is_some())
            .finish()
    }
}
