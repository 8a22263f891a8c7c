//! pagemock: network interception and mocking for driven-page tests
//!
//! This crate lets an automated test observe, filter, and selectively
//! replace the network traffic of a driven web page without the real
//! backend. The page driver is an external collaborator: it hands every
//! intercepted request to the session as a [`Route`] (which must be
//! resolved exactly once) and reports completions as
//! [`ResponseEvent`]s. On top of that stream the session offers mock
//! rules with deterministic priority resolution, a lazy composable
//! [`FilterView`], and an awaitable [`AssertionChain`].
//!
//! # Examples
//!
//! ## Mocking an API endpoint
//!
//! ```ignore
//! use pagemock::{MockOptions, PageSession, ResponseSpec};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = PageSession::new();
//!     session.enable();
//!
//!     let api = session.mock(
//!         "/api",
//!         MockOptions::builder()
//!             .method("GET")
//!             .response(ResponseSpec::builder().json(&json!({"result": "MOCK"}))?.build())
//!             .build(),
//!     )?;
//!
//!     // ... drive the page; its wiring feeds handle_request/handle_response ...
//!
//!     api.wait_until_called(std::time::Duration::from_secs(5)).await?;
//!     api.assert().called(Some(1), None)?;
//!
//!     // Lazy filtering over the capture history
//!     let hits = session.filter().url(regex::Regex::new("/api").unwrap()).resolve().await?;
//!     assert_eq!(hits.len(), 1);
//!
//!     // Awaitable assertion chain
//!     session
//!         .assert_requests()
//!         .url("/api", None).await
//!         .response_body(json!({"result": "MOCK"}), None).await
//!         .check().await?;
//!
//!     session.before_close();
//!     Ok(())
//! }
//! ```
//!
//! ## Manually triggered mocks
//!
//! ```ignore
//! use pagemock::{MockOptions, PageSession};
//!
//! # async fn demo(session: &PageSession) -> pagemock::Result<()> {
//! let slow = session.mock("/slow", MockOptions::builder().manual().build())?;
//! // The page request stays pending until the test decides to answer:
//! slow.trigger(None)?;
//! # Ok(())
//! # }
//! ```

mod assertions;
mod capture;
mod error;
mod filter;
mod matcher;
mod registry;
mod rule;
mod route;
mod session;

// Re-export error types
pub use error::{Error, Result};

// Re-export the session API
pub use session::{DEFAULT_WAIT_TIMEOUT, NavigationOptions, PageSession};

// Re-export capture types
pub use capture::{BodySource, CapturedRequest, CapturedResponse, ResponseEvent};

// Re-export matcher types
pub use matcher::{Matcher, UrlPattern};

// Re-export rule types
pub use rule::{MockAssert, MockHandle, MockOptions, MockOptionsBuilder, RulePhase};

// Re-export routing types
pub use route::{
    ContinueOverrides, ContinueOverridesBuilder, FulfilledResponse, RequestInfo, ResponseSpec,
    ResponseSpecBuilder, Route, RouteAction,
};

// Re-export filtering and assertion types
pub use assertions::AssertionChain;
pub use filter::{BodyMatcher, FilterView};
