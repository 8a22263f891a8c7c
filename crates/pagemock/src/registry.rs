// Mock registry - ordered rule set with deterministic resolution
//
// Rules are kept in registration order. Registering an identical
// matcher replaces the previous rule, so repeated setup/teardown cannot
// grow the set. Resolution picks the most specific matching rule per
// the documented cascade; full ties go to the earliest registration.

use crate::matcher::Matcher;
use crate::rule::MockRule;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Default)]
pub(crate) struct MockRegistry {
    rules: Vec<Arc<MockRule>>,
}

impl MockRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Inserts a rule, replacing any rule with an identical
    /// matcher+method+queryString first.
    pub(crate) fn register(&mut self, rule: Arc<MockRule>) {
        let matcher = rule.matcher().clone();
        self.rules.retain(|r| !r.matcher().same_matcher(&matcher));
        self.rules.push(rule);
    }

    /// Resolves the single best rule for a request triple.
    ///
    /// Priority, compared in order: any match beats no match; explicit
    /// method beats none; literal URL beats regex/glob; explicit query
    /// beats none. The earliest-registered rule wins a full tie. The
    /// strictly-greater comparison below is what keeps the earliest
    /// registration on ties.
    pub(crate) fn resolve(
        &self,
        url: &str,
        method: &str,
        query: &BTreeMap<String, String>,
    ) -> Option<Arc<MockRule>> {
        let mut best: Option<&Arc<MockRule>> = None;
        for rule in &self.rules {
            if !rule.matcher().matches(url, method, query) {
                continue;
            }
            let more_specific = match best {
                None => true,
                Some(b) => rule.matcher().specificity() > b.matcher().specificity(),
            };
            if more_specific {
                best = Some(rule);
            }
        }
        best.cloned()
    }

    /// Removes every rule compatible with the partial matcher.
    ///
    /// Unlike registration-time dedup, exact equality is not required:
    /// method and query are only compared when the partial matcher
    /// specifies them.
    pub(crate) fn remove(&mut self, partial: &Matcher) -> usize {
        let before = self.rules.len();
        self.rules.retain(|r| !r.matcher().compatible_with(partial));
        before - self.rules.len()
    }

    pub(crate) fn clear(&mut self) {
        self.rules.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.rules.len()
    }
}
