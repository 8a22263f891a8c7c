// Error types for pagemock

use thiserror::Error;

/// Result type alias for pagemock operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when using pagemock
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed matcher or registration arguments
    ///
    /// Raised synchronously at registration time: empty literal URL,
    /// invalid regex/glob source, empty method string, or empty query key.
    #[error("Invalid matcher: {0}")]
    InvalidMatcher(String),

    /// API misuse or a dead page transport
    ///
    /// Covers triggering an auto-respond rule, operating on a session
    /// before interception is enabled, and a route whose page-side
    /// receiver is gone. Never produced by a failed assertion.
    #[error("Fatal: {0}")]
    Fatal(String),

    /// A wait-style operation exceeded its deadline
    ///
    /// The wait detaches its listener before returning this, so no
    /// subscription leaks across test cases.
    #[error("Timeout: {operation} exceeded {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// A predicate chain found no matching requests, or a count mismatch
    ///
    /// Carries the expected and actual values for diff reporting. The
    /// message echoes the predicate criteria unless the caller supplied
    /// a custom message, which fully replaces the default text.
    #[error("{message} (expected {expected}, actual {actual})")]
    Assertion {
        message: String,
        expected: String,
        actual: String,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn timeout(operation: impl Into<String>, timeout: std::time::Duration) -> Self {
        Error::Timeout {
            operation: operation.into(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    pub(crate) fn assertion(
        default_message: String,
        custom_message: Option<&str>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Error::Assertion {
            message: custom_message.map_or(default_message, str::to_string),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Returns true for assertion failures (as opposed to misuse,
    /// timeouts, or transport faults).
    pub fn is_assertion(&self) -> bool {
        matches!(self, Error::Assertion { .. })
    }
}
