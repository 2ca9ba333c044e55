use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A located pattern occurrence, normalized across matcher algorithms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub text: String,
    pub byte_start: usize,
    pub byte_end: usize,
    /// 1-based
    pub start_line: usize,
    /// 1-based, inclusive
    pub end_line: usize,
    /// 1-based, in characters
    pub start_column: usize,
    /// 1-based, in characters, exclusive
    pub end_column: usize,
    /// Text on the same line before the match
    pub before: String,
    /// Text on the same line after the match
    pub after: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl Match {
    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn span(&self) -> std::ops::Range<usize> {
        self.byte_start..self.byte_end
    }

    pub fn overlaps(&self, other: &Match) -> bool {
        self.byte_start < other.byte_end && other.byte_start < self.byte_end
    }
}

/// Byte offsets of every line start, for offset → (line, column) lookups.
pub struct LineIndex<'a> {
    text: &'a str,
    starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    pub fn new(text: &'a str) -> Self {
        let starts = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self { text, starts }
    }

    /// 0-based line holding `byte`.
    pub fn line_of(&self, byte: usize) -> usize {
        match self.starts.binary_search(&byte) {
            Ok(line) => line,
            Err(next) => next - 1,
        }
    }

    pub fn line_start(&self, line: usize) -> usize {
        self.starts[line]
    }

    /// End of the line's content, excluding the newline.
    pub fn line_end(&self, line: usize) -> usize {
        match self.starts.get(line + 1) {
            Some(next) => next - 1,
            None => self.text.len(),
        }
    }

    /// End of the line including its newline, when it has one.
    pub fn line_end_inclusive(&self, line: usize) -> usize {
        self.starts.get(line + 1).copied().unwrap_or(self.text.len())
    }

    pub fn line_count(&self) -> usize {
        self.starts.len()
    }

    pub fn line_text(&self, line: usize) -> &'a str {
        &self.text[self.line_start(line)..self.line_end(line)]
    }

    /// Build a [`Match`] for `byte_start..byte_end`.
    pub fn make_match(&self, byte_start: usize, byte_end: usize) -> Match {
        let start_line = self.line_of(byte_start);
        // An empty or newline-terminated span ends on the line of its last byte.
        let end_line = if byte_end > byte_start {
            self.line_of(byte_end - 1)
        } else {
            start_line
        };
        let start_ls = self.line_start(start_line);
        let end_ls = self.line_start(end_line);
        let end_le = self.line_end(end_line);

        Match {
            text: self.text[byte_start..byte_end].to_string(),
            byte_start,
            byte_end,
            start_line: start_line + 1,
            end_line: end_line + 1,
            start_column: self.text[start_ls..byte_start].chars().count() + 1,
            end_column: self.text[end_ls..byte_end.max(end_ls)].chars().count() + 1,
            before: self.text[start_ls..byte_start].to_string(),
            after: self.text[byte_end.min(end_le).max(byte_start)..end_le].to_string(),
            metadata: Map::new(),
        }
    }
}

/// Convenience for one-off matches.
pub fn make_match(text: &str, byte_start: usize, byte_end: usize) -> Match {
    LineIndex::new(text).make_match(byte_start, byte_end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_line_match_positions() {
        let m = make_match("let x = 1;\nprint(x)\n", 17, 18);
        assert_eq!(m.text, "x");
        assert_eq!((m.start_line, m.end_line), (2, 2));
        assert_eq!((m.start_column, m.end_column), (7, 8));
        assert_eq!(m.before, "print(");
        assert_eq!(m.after, ")");
    }

    #[test]
    fn columns_count_characters() {
        let m = make_match("héllo wörld", 7, 13);
        assert_eq!(m.text, "wörld");
        assert_eq!(m.start_column, 7);
        assert_eq!(m.end_column, 12);
    }

    #[test]
    fn multiline_span() {
        let text = "a\nbb\nccc\n";
        let m = make_match(text, 2, 8);
        assert_eq!(m.text, "bb\nccc");
        assert_eq!((m.start_line, m.end_line), (2, 3));
        assert_eq!(m.after, "");
    }

    #[test]
    fn line_index_bounds() {
        let idx = LineIndex::new("ab\ncd");
        assert_eq!(idx.line_count(), 2);
        assert_eq!(idx.line_of(3), 1);
        assert_eq!(idx.line_end(0), 2);
        assert_eq!(idx.line_end_inclusive(0), 3);
        assert_eq!(idx.line_text(1), "cd");
    }
}
