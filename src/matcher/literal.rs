use crate::capability::{Capability, CapabilitySet};
use crate::matcher::{regexp, LineIndex, Match, MatchOptions, Matcher, MatcherError, PatternKind};

/// Plain substring search.
#[derive(Debug, Default, Clone, Copy)]
pub struct LiteralMatcher;

impl Matcher for LiteralMatcher {
    fn kind(&self) -> PatternKind {
        PatternKind::Literal
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::from([Capability::LiteralSearch])
    }

    fn find_all(&self, text: &str, pattern: &str, opts: &MatchOptions) -> Result<Vec<Match>, MatcherError> {
        if pattern.is_empty() {
            return Ok(Vec::new());
        }
        let index = LineIndex::new(text);

        if opts.case_sensitive {
            return Ok(text
                .match_indices(pattern)
                .map(|(start, m)| index.make_match(start, start + m.len()))
                .collect());
        }

        // Case folding can change byte lengths, so let the regex engine keep
        // offsets exact.
        let re = regexp::get_or_compile(&regex::escape(pattern), false)?;
        Ok(re
            .find_iter(text)
            .map(|m| index.make_match(m.start(), m.end()))
            .collect())
    }
}
