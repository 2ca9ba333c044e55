use crate::matcher::{Match, MatchOptions, Matcher, MatcherError};
use std::collections::HashSet;
use std::sync::Arc;

/// Runs several patterns through several matchers and merges the results.
///
/// Every match is tagged with `metadata.matcher` and `metadata.pattern`.
/// Identical spans found by more than one pair are kept once (first pair
/// wins); the output is ordered by `(byte_start, byte_end)`.
#[derive(Default, Clone)]
pub struct MatcherCombiner {
    matchers: Vec<Arc<dyn Matcher>>,
}

impl MatcherCombiner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, matcher: Arc<dyn Matcher>) -> Self {
        self.matchers.push(matcher);
        self
    }

    pub fn push(&mut self, matcher: Arc<dyn Matcher>) {
        self.matchers.push(matcher);
    }

    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    pub fn find_all(&self, text: &str, patterns: &[&str], opts: &MatchOptions) -> Result<Vec<Match>, MatcherError> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();

        for matcher in &self.matchers {
            for pattern in patterns {
                for m in matcher.find_all(text, pattern, opts)? {
                    if !seen.insert((m.byte_start, m.byte_end)) {
                        continue;
                    }
                    out.push(
                        m.with_meta("matcher", matcher.kind().name())
                            .with_meta("pattern", *pattern),
                    );
                }
            }
        }

        out.sort_by_key(|m| (m.byte_start, m.byte_end));
        Ok(out)
    }
}
