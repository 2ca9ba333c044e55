//! Line manipulation behind the default insert and delete operations.

use crate::edit::{self, EditError};
use crate::matcher::{LineIndex, Match};

fn indentation(line: &str) -> &str {
    &line[..line.len() - line.trim_start_matches([' ', '\t']).len()]
}

/// The terminator of `line`, or the file's when `line` has none.
fn line_ending(text: &str, index: &LineIndex<'_>, line: usize) -> &'static str {
    let crlf = if index.line_end_inclusive(line) > index.line_end(line) {
        index.line_text(line).ends_with('\r')
    } else {
        text.contains("\r\n")
    };
    if crlf {
        "\r\n"
    } else {
        "\n"
    }
}

/// Prepare inserted text: every line terminated with `newline`, and
/// unindented lines given `indent` when requested.
fn shape_block(content: &str, indent: &str, preserve_indentation: bool, newline: &str) -> String {
    let mut out = String::with_capacity(content.len() + indent.len() * 4);
    for line in content.lines() {
        if preserve_indentation && !line.is_empty() && indentation(line).is_empty() {
            out.push_str(indent);
        }
        out.push_str(line);
        out.push_str(newline);
    }
    if content.is_empty() {
        out.push_str(newline);
    }
    out
}

/// Insert `content` as whole lines before the line holding `target`'s start.
pub fn insert_before(text: &str, target: &Match, content: &str, preserve_indentation: bool) -> Result<String, EditError> {
    let index = LineIndex::new(text);
    let line = index.line_of(target.byte_start);
    let indent = indentation(index.line_text(line));
    let block = shape_block(content, indent, preserve_indentation, line_ending(text, &index, line));
    let at = index.line_start(line);
    edit::splice(text, vec![(at..at, block)])
}

/// Insert `content` as whole lines after the line holding `target`'s end.
pub fn insert_after(text: &str, target: &Match, content: &str, preserve_indentation: bool) -> Result<String, EditError> {
    let index = LineIndex::new(text);
    let last_byte = target.byte_end.saturating_sub(1).max(target.byte_start);
    let line = index.line_of(last_byte.min(text.len().saturating_sub(1)));
    let indent = indentation(index.line_text(line));
    let newline = line_ending(text, &index, line);
    let mut block = shape_block(content, indent, preserve_indentation, newline);

    let at = index.line_end_inclusive(line);
    // Last line without a trailing newline: start a new line first.
    if at == text.len() && !text.ends_with('\n') && !text.is_empty() {
        block.truncate(block.len() - newline.len());
        block.insert_str(0, newline);
    }
    edit::splice(text, vec![(at..at, block)])
}

/// Remove every match. A match that covers its lines entirely (only
/// whitespace around it) takes the lines and their newline with it.
pub fn delete(text: &str, targets: &[Match]) -> Result<String, EditError> {
    let index = LineIndex::new(text);
    let mut spans: Vec<(std::ops::Range<usize>, String)> = Vec::with_capacity(targets.len());

    for m in targets {
        let start_line = index.line_of(m.byte_start);
        let end_line = index.line_of(m.byte_end.saturating_sub(1).max(m.byte_start).min(text.len().saturating_sub(1)));
        let head = &text[index.line_start(start_line)..m.byte_start];
        let tail = &text[m.byte_end.min(index.line_end(end_line))..index.line_end(end_line)];

        let range = if head.trim().is_empty() && tail.trim().is_empty() {
            index.line_start(start_line)..index.line_end_inclusive(end_line)
        } else {
            m.byte_start..m.byte_end
        };

        // Adjacent whole-line deletions can touch; merge instead of overlapping.
        if let Some((prev, _)) = spans.last_mut() {
            if range.start < prev.end {
                prev.end = prev.end.max(range.end);
                continue;
            }
        }
        spans.push((range, String::new()));
    }
    edit::splice(text, spans)
}
