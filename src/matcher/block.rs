//! Line-oriented matchers that work without a grammar.

use crate::capability::{Capability, CapabilitySet};
use crate::matcher::{LineIndex, Match, MatchOptions, Matcher, MatcherError, PatternKind};

fn indent_of(line: &str) -> usize {
    line.chars()
        .take_while(|c| *c == ' ' || *c == '\t')
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}

fn eq_folded(a: &str, b: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        a == b
    } else {
        a.to_lowercase() == b.to_lowercase()
    }
}

fn pattern_lines(pattern: &str) -> Vec<&str> {
    let lines: Vec<&str> = pattern.lines().map(str::trim).collect();
    let first = lines.iter().position(|l| !l.is_empty());
    let last = lines.iter().rposition(|l| !l.is_empty());
    match (first, last) {
        (Some(f), Some(l)) => lines[f..=l].to_vec(),
        _ => Vec::new(),
    }
}

/// Consecutive lines equal to the pattern's lines, ignoring indentation.
#[derive(Debug, Default, Clone, Copy)]
pub struct MultilineMatcher;

impl Matcher for MultilineMatcher {
    fn kind(&self) -> PatternKind {
        PatternKind::Multiline
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::from([Capability::LiteralSearch, Capability::MultilinePatterns])
    }

    fn find_all(&self, text: &str, pattern: &str, opts: &MatchOptions) -> Result<Vec<Match>, MatcherError> {
        let wanted = pattern_lines(pattern);
        if wanted.is_empty() {
            return Ok(Vec::new());
        }
        let index = LineIndex::new(text);
        let count = index.line_count();

        let mut out = Vec::new();
        let mut line = 0;
        while line + wanted.len() <= count {
            let hit = wanted
                .iter()
                .enumerate()
                .all(|(k, w)| eq_folded(index.line_text(line + k).trim(), w, opts.case_sensitive));
            if hit {
                let first = index.line_text(line);
                let start = index.line_start(line) + (first.len() - first.trim_start().len());
                let last_line = line + wanted.len() - 1;
                let last = index.line_text(last_line);
                let end = index.line_start(last_line) + last.trim_end().len();
                out.push(index.make_match(start, end));
                line += wanted.len();
            } else {
                line += 1;
            }
        }
        Ok(out)
    }
}

/// A header line plus everything indented beneath it.
///
/// The block runs from the first line containing the pattern's first line
/// until indentation returns to the header's depth. Blank lines inside the
/// block are kept, trailing ones are not. A closing delimiter at the header's
/// depth (`}`, `]`, `)`, `end`) belongs to the block.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlockMatcher;

impl BlockMatcher {
    fn block_end(index: &LineIndex<'_>, header: usize) -> usize {
        let depth = indent_of(index.line_text(header));
        let count = index.line_count();

        let mut last = header;
        let mut line = header + 1;
        while line < count {
            let text = index.line_text(line);
            if text.trim().is_empty() {
                line += 1;
                continue;
            }
            if indent_of(text) <= depth {
                break;
            }
            last = line;
            line += 1;
        }

        if line < count {
            let text = index.line_text(line);
            let trimmed = text.trim();
            let closes = trimmed.starts_with(['}', ']', ')'])
                || trimmed == "end"
                || trimmed.starts_with("end ")
                || trimmed.starts_with("end;");
            if indent_of(text) == depth && closes {
                last = line;
            }
        }
        last
    }
}

impl Matcher for BlockMatcher {
    fn kind(&self) -> PatternKind {
        PatternKind::Block
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::from([
            Capability::LiteralSearch,
            Capability::MultilinePatterns,
            Capability::ContextAware,
        ])
    }

    fn find_all(&self, text: &str, pattern: &str, opts: &MatchOptions) -> Result<Vec<Match>, MatcherError> {
        let Some(header) = pattern_lines(pattern).into_iter().next() else {
            return Ok(Vec::new());
        };
        let header = if opts.case_sensitive {
            header.to_string()
        } else {
            header.to_lowercase()
        };

        let index = LineIndex::new(text);
        let mut out = Vec::new();
        let mut line = 0;
        while line < index.line_count() {
            let candidate = index.line_text(line);
            let hit = if opts.case_sensitive {
                candidate.contains(&header)
            } else {
                candidate.to_lowercase().contains(&header)
            };
            if !hit {
                line += 1;
                continue;
            }
            let last = Self::block_end(&index, line);
            out.push(index.make_match(index.line_start(line), index.line_end(last)));
            line = last + 1;
        }
        Ok(out)
    }
}
