//! Approximate matching over whitespace-normalized line windows.

use crate::capability::{Capability, CapabilitySet};
use crate::matcher::{literal::LiteralMatcher, regexp, LineIndex, Match, MatchOptions, Matcher, MatcherError, PatternKind};
use regex::Regex;
use serde::{Deserialize, Serialize};
use strsim::normalized_levenshtein;

pub const DEFAULT_THRESHOLD: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FuzzyMode {
    /// Byte containment only
    Exact,
    /// Whitespace-tolerant, similarity-thresholded
    #[default]
    Flexible,
}

/// A scored window of the searched text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FuzzyCandidate {
    pub text: String,
    /// 1-based first line of the window
    pub line: usize,
    pub similarity: f64,
    pub byte_start: usize,
    pub byte_end: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct FuzzyMatcher {
    pub threshold: f64,
    pub mode: FuzzyMode,
}

impl Default for FuzzyMatcher {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            mode: FuzzyMode::Flexible,
        }
    }
}

/// Collapse runs of spaces, tabs and newlines to one space and trim.
pub fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl FuzzyMatcher {
    pub fn new(threshold: f64, mode: FuzzyMode) -> Self {
        Self { threshold, mode }
    }

    pub fn exact() -> Self {
        Self::new(DEFAULT_THRESHOLD, FuzzyMode::Exact)
    }

    /// Every line window sized to the pattern, scored, in document order.
    ///
    /// A window containing the pattern yields one candidate per occurrence,
    /// spanning just the occurrence; any other window spans its trimmed text.
    fn score_windows(&self, text: &str, pattern: &str, opts: &MatchOptions) -> Result<Vec<FuzzyCandidate>, MatcherError> {
        let fold = |s: String| if opts.case_sensitive { s } else { s.to_lowercase() };
        let needle = fold(normalize(pattern));
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let occurrence = occurrence_regex(pattern, opts.case_sensitive)?;

        let index = LineIndex::new(text);
        let width = pattern.trim().lines().count().max(1);
        let line_count = index.line_count();
        if line_count < width {
            return Ok(Vec::new());
        }

        let mut out: Vec<FuzzyCandidate> = Vec::new();
        for first in 0..=(line_count - width) {
            let last = first + width - 1;
            let window_start = index.line_start(first);
            let raw = &text[window_start..index.line_end(last)];
            let window = fold(normalize(raw));
            if window.is_empty() {
                continue;
            }

            let contained = window.contains(&needle);
            if contained {
                let mut located = false;
                for found in occurrence.find_iter(raw) {
                    located = true;
                    let byte_start = window_start + found.start();
                    let byte_end = window_start + found.end();
                    // Overlapping windows see the same occurrence.
                    if out.iter().any(|c| c.byte_start == byte_start && c.byte_end == byte_end) {
                        continue;
                    }
                    out.push(FuzzyCandidate {
                        text: found.as_str().to_string(),
                        line: index.line_of(byte_start) + 1,
                        similarity: 1.0,
                        byte_start,
                        byte_end,
                    });
                }
                if located {
                    continue;
                }
            }

            let similarity = if contained {
                1.0
            } else {
                normalized_levenshtein(&window, &needle)
            };

            // Span excludes surrounding indentation and trailing whitespace.
            let lead = raw.len() - raw.trim_start().len();
            let byte_start = window_start + lead;
            let byte_end = byte_start + raw.trim().len();
            out.push(FuzzyCandidate {
                text: text[byte_start..byte_end].to_string(),
                line: first + 1,
                similarity,
                byte_start,
                byte_end,
            });
        }
        Ok(out)
    }

    /// Top `n` windows by similarity, best first.
    pub fn closest(
        &self,
        text: &str,
        pattern: &str,
        n: usize,
        opts: &MatchOptions,
    ) -> Result<Vec<FuzzyCandidate>, MatcherError> {
        let mut candidates = self.score_windows(text, pattern, opts)?;
        candidates.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then(a.byte_start.cmp(&b.byte_start))
        });
        candidates.truncate(n);
        Ok(candidates)
    }

    /// "Did you mean" for a pattern that did not match: the best window that
    /// fell short of the threshold but scored at least half of it.
    pub fn suggest(&self, text: &str, pattern: &str, opts: &MatchOptions) -> Result<Option<FuzzyCandidate>, MatcherError> {
        Ok(self
            .closest(text, pattern, usize::MAX, opts)?
            .into_iter()
            .find(|c| c.similarity < self.threshold)
            .filter(|c| c.similarity >= self.threshold / 2.0))
    }
}

/// The pattern's tokens separated by any run of whitespace, so a hit in the
/// normalized window maps back to raw byte offsets.
fn occurrence_regex(pattern: &str, case_sensitive: bool) -> Result<Regex, MatcherError> {
    let tokens: Vec<String> = pattern.split_whitespace().map(regex::escape).collect();
    regexp::get_or_compile(&tokens.join(r"\s+"), case_sensitive)
}

impl Matcher for FuzzyMatcher {
    fn kind(&self) -> PatternKind {
        PatternKind::Fuzzy
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::from([Capability::LiteralSearch, Capability::MultilinePatterns])
    }

    fn find_all(&self, text: &str, pattern: &str, opts: &MatchOptions) -> Result<Vec<Match>, MatcherError> {
        if self.mode == FuzzyMode::Exact {
            return Ok(LiteralMatcher
                .find_all(text, pattern, opts)?
                .into_iter()
                .map(|m| m.with_meta("similarity", 1.0))
                .collect());
        }

        let mut accepted: Vec<FuzzyCandidate> = self
            .score_windows(text, pattern, opts)?
            .into_iter()
            .filter(|c| c.similarity >= self.threshold)
            .collect();

        // Greedy by score so the best window wins any overlap.
        accepted.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then(a.byte_start.cmp(&b.byte_start))
        });
        let mut chosen: Vec<FuzzyCandidate> = Vec::new();
        for candidate in accepted {
            if chosen
                .iter()
                .all(|c| candidate.byte_end <= c.byte_start || c.byte_end <= candidate.byte_start)
            {
                chosen.push(candidate);
            }
        }
        chosen.sort_by_key(|c| c.byte_start);

        let index = LineIndex::new(text);
        Ok(chosen
            .into_iter()
            .map(|c| index.make_match(c.byte_start, c.byte_end).with_meta("similarity", c.similarity))
            .collect())
    }

    /// The single best-scoring window rather than the first.
    fn find(&self, text: &str, pattern: &str, opts: &MatchOptions) -> Result<Option<Match>, MatcherError> {
        Ok(best_of(self.find_all(text, pattern, opts)?))
    }
}

/// Highest similarity; the earliest wins ties.
pub(crate) fn best_of(matches: impl IntoIterator<Item = Match>) -> Option<Match> {
    matches.into_iter().fold(None, |best: Option<Match>, m| match best {
        Some(b) if similarity_of(&b) >= similarity_of(&m) => Some(b),
        _ => Some(m),
    })
}

pub(crate) fn similarity_of(m: &Match) -> f64 {
    m.metadata
        .get("similarity")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0)
}
