// Matchers - deciding which mock rule applies to a request
//
// A Matcher is the (urlPattern, method?, queryString?) triple a rule
// uses to claim a request. URL patterns are a tagged variant so the
// specificity comparison stays exhaustive and compiler-checked instead
// of sniffing types at runtime.

use crate::error::{Error, Result};
use regex::Regex;
use std::collections::BTreeMap;

/// A URL pattern: a literal string, a regular expression, or a glob.
///
/// Literals compare by exact equality. For resolution priority a literal
/// pattern outranks both non-literal kinds.
#[derive(Debug, Clone)]
pub enum UrlPattern {
    /// Exact string equality against the request URL.
    Literal(String),
    /// Regular expression test against the request URL.
    Regex(Regex),
    /// Glob match against the request URL (e.g. `**/*.png`).
    Glob(glob::Pattern),
}

impl UrlPattern {
    /// Creates a literal pattern. Validated non-empty at registration.
    pub fn literal(url: impl Into<String>) -> Self {
        UrlPattern::Literal(url.into())
    }

    /// Compiles a regex pattern.
    pub fn regex(source: &str) -> Result<Self> {
        Regex::new(source)
            .map(UrlPattern::Regex)
            .map_err(|e| Error::InvalidMatcher(format!("invalid regex '{}': {}", source, e)))
    }

    /// Compiles a glob pattern.
    pub fn glob(source: &str) -> Result<Self> {
        glob::Pattern::new(source)
            .map(UrlPattern::Glob)
            .map_err(|e| Error::InvalidMatcher(format!("invalid glob '{}': {}", source, e)))
    }

    /// Tests the pattern against a URL.
    pub fn matches(&self, url: &str) -> bool {
        match self {
            UrlPattern::Literal(lit) => lit == url,
            UrlPattern::Regex(re) => re.is_match(url),
            UrlPattern::Glob(pat) => pat.matches(url),
        }
    }

    /// True for literal patterns; used by the resolution priority.
    pub fn is_literal(&self) -> bool {
        matches!(self, UrlPattern::Literal(_))
    }

    /// The pattern source text, for equality checks and messages.
    pub fn source(&self) -> &str {
        match self {
            UrlPattern::Literal(lit) => lit,
            UrlPattern::Regex(re) => re.as_str(),
            UrlPattern::Glob(pat) => pat.as_str(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            UrlPattern::Literal(_) => "literal",
            UrlPattern::Regex(_) => "regex",
            UrlPattern::Glob(_) => "glob",
        }
    }
}

impl PartialEq for UrlPattern {
    fn eq(&self, other: &Self) -> bool {
        self.kind() == other.kind() && self.source() == other.source()
    }
}

impl Eq for UrlPattern {}

impl From<&str> for UrlPattern {
    fn from(url: &str) -> Self {
        UrlPattern::Literal(url.to_string())
    }
}

impl From<String> for UrlPattern {
    fn from(url: String) -> Self {
        UrlPattern::Literal(url)
    }
}

impl From<Regex> for UrlPattern {
    fn from(re: Regex) -> Self {
        UrlPattern::Regex(re)
    }
}

impl std::fmt::Display for UrlPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind(), self.source())
    }
}

/// The matcher a mock rule applies to incoming requests.
///
/// A request matches iff the URL pattern matches AND the method, when
/// present, equals the request method (case-insensitive) AND the query,
/// when present, equals the request query as an unordered key→value set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matcher {
    url: UrlPattern,
    method: Option<String>,
    query: Option<BTreeMap<String, String>>,
}

impl Matcher {
    pub fn new(
        url: UrlPattern,
        method: Option<String>,
        query: Option<BTreeMap<String, String>>,
    ) -> Result<Self> {
        if let UrlPattern::Literal(lit) = &url {
            if lit.is_empty() {
                return Err(Error::InvalidMatcher("empty literal URL".to_string()));
            }
        }
        if let Some(m) = &method {
            if m.is_empty() {
                return Err(Error::InvalidMatcher("empty method".to_string()));
            }
        }
        if let Some(q) = &query {
            if q.keys().any(|k| k.is_empty()) {
                return Err(Error::InvalidMatcher("empty query key".to_string()));
            }
        }
        Ok(Self {
            url,
            method: method.map(|m| m.to_ascii_uppercase()),
            query,
        })
    }

    pub fn url(&self) -> &UrlPattern {
        &self.url
    }

    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    pub fn query(&self) -> Option<&BTreeMap<String, String>> {
        self.query.as_ref()
    }

    /// Tests this matcher against a request triple.
    pub fn matches(&self, url: &str, method: &str, query: &BTreeMap<String, String>) -> bool {
        if !self.url.matches(url) {
            return false;
        }
        if let Some(m) = &self.method {
            if !m.eq_ignore_ascii_case(method) {
                return false;
            }
        }
        if let Some(q) = &self.query {
            if q != query {
                return false;
            }
        }
        true
    }

    /// Resolution priority among matching rules, compared
    /// lexicographically: explicit method beats none, then literal URL
    /// beats regex/glob, then explicit query beats none. No further
    /// tie-break is defined; full ties go to the earliest registration.
    pub(crate) fn specificity(&self) -> (bool, bool, bool) {
        (
            self.method.is_some(),
            self.url.is_literal(),
            self.query.is_some(),
        )
    }

    /// Exact equality used for registration-time dedup: same pattern
    /// kind and source, same method, same query.
    pub(crate) fn same_matcher(&self, other: &Matcher) -> bool {
        self == other
    }

    /// Compatibility with a partial matcher, used for removal: the URL
    /// pattern must be identical, but method and query are only compared
    /// when the partial matcher specifies them.
    pub(crate) fn compatible_with(&self, partial: &Matcher) -> bool {
        if self.url != partial.url {
            return false;
        }
        if let Some(m) = &partial.method {
            if self.method.as_deref() != Some(m.as_str()) {
                return false;
            }
        }
        if let Some(q) = &partial.query {
            if self.query.as_ref() != Some(q) {
                return false;
            }
        }
        true
    }
}

impl std::fmt::Display for Matcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.url)?;
        if let Some(m) = &self.method {
            write!(f, " method={}", m)?;
        }
        if let Some(q) = &self.query {
            write!(f, " query={:?}", q)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn literal_matches_exactly() {
        let m = Matcher::new(UrlPattern::literal("/api"), None, None).unwrap();
        assert!(m.matches("/api", "GET", &BTreeMap::new()));
        assert!(!m.matches("/api/items", "GET", &BTreeMap::new()));
    }

    #[test]
    fn regex_and_glob_match_substrings() {
        let re = Matcher::new(UrlPattern::regex("/api").unwrap(), None, None).unwrap();
        assert!(re.matches("https://host/api/items", "GET", &BTreeMap::new()));

        let gl = Matcher::new(UrlPattern::glob("**/*.png").unwrap(), None, None).unwrap();
        assert!(gl.matches("https://host/img/logo.png", "GET", &BTreeMap::new()));
        assert!(!gl.matches("https://host/img/logo.svg", "GET", &BTreeMap::new()));
    }

    #[test]
    fn method_is_case_insensitive() {
        let m = Matcher::new(UrlPattern::literal("/api"), Some("get".to_string()), None).unwrap();
        assert!(m.matches("/api", "GET", &BTreeMap::new()));
        assert!(!m.matches("/api", "POST", &BTreeMap::new()));
    }

    #[test]
    fn query_compares_as_unordered_set() {
        let m = Matcher::new(
            UrlPattern::literal("/api"),
            None,
            Some(query(&[("b", "2"), ("a", "1")])),
        )
        .unwrap();
        assert!(m.matches("/api", "GET", &query(&[("a", "1"), ("b", "2")])));
        assert!(!m.matches("/api", "GET", &query(&[("a", "1")])));
    }

    #[test]
    fn specificity_orders_method_then_literal_then_query() {
        let bare = Matcher::new(UrlPattern::regex("/api").unwrap(), None, None).unwrap();
        let literal = Matcher::new(UrlPattern::literal("/api"), None, None).unwrap();
        let with_query = Matcher::new(
            UrlPattern::literal("/api"),
            None,
            Some(query(&[("a", "1")])),
        )
        .unwrap();
        let with_method =
            Matcher::new(UrlPattern::regex("/api").unwrap(), Some("GET".into()), None).unwrap();

        assert!(literal.specificity() > bare.specificity());
        assert!(with_query.specificity() > literal.specificity());
        // An explicit method outranks literal-ness and query together.
        assert!(with_method.specificity() > with_query.specificity());
    }

    #[test]
    fn validation_rejects_malformed_matchers() {
        assert!(matches!(
            Matcher::new(UrlPattern::literal(""), None, None),
            Err(Error::InvalidMatcher(_))
        ));
        assert!(matches!(
            Matcher::new(UrlPattern::literal("/api"), Some(String::new()), None),
            Err(Error::InvalidMatcher(_))
        ));
        assert!(matches!(UrlPattern::regex("("), Err(Error::InvalidMatcher(_))));
        assert!(matches!(UrlPattern::glob("[a-"), Err(Error::InvalidMatcher(_))));
    }

    #[test]
    fn compatible_with_ignores_unspecified_parts() {
        let rule = Matcher::new(
            UrlPattern::literal("/api"),
            Some("GET".into()),
            Some(query(&[("a", "1")])),
        )
        .unwrap();
        let partial = Matcher::new(UrlPattern::literal("/api"), None, None).unwrap();
        assert!(rule.compatible_with(&partial));
        assert!(!partial.compatible_with(&rule));

        let other_url = Matcher::new(UrlPattern::literal("/other"), None, None).unwrap();
        assert!(!rule.compatible_with(&other_url));
    }
}
