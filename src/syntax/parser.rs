use crate::syntax::lang;
use ast_grep_language::{LanguageExt, SupportLang};
use serde::Serialize;
use thiserror::Error;
use tree_sitter::{Parser, Tree};

#[derive(Error, Debug)]
pub enum SyntaxError {
    #[error("failed to load the {language} grammar")]
    LanguageSet { language: String },

    #[error("tree-sitter could not parse {language} source")]
    ParseFailed { language: String },
}

/// Tree-sitter parser bound to one language.
pub struct SourceParser {
    parser: Parser,
    lang: SupportLang,
}

impl SourceParser {
    pub fn new(lang: SupportLang) -> Result<Self, SyntaxError> {
        let mut parser = Parser::new();
        let ts_lang = lang.get_ts_language();
        parser
            .set_language(&ts_lang)
            .map_err(|_| SyntaxError::LanguageSet {
                language: lang::name(lang),
            })?;

        Ok(Self { parser, lang })
    }

    pub fn language(&self) -> SupportLang {
        self.lang
    }

    pub fn parse(&mut self, source: &str) -> Result<Tree, SyntaxError> {
        self.parser
            .parse(source, None)
            .ok_or_else(|| SyntaxError::ParseFailed {
                language: lang::name(self.lang),
            })
    }

    pub fn parse_with_source<'a>(&mut self, source: &'a str) -> Result<ParsedSource<'a>, SyntaxError> {
        let tree = self.parse(source)?;
        Ok(ParsedSource { source, tree })
    }
}

/// A parsed source file with its tree-sitter tree.
pub struct ParsedSource<'a> {
    pub source: &'a str,
    pub tree: Tree,
}

impl<'a> ParsedSource<'a> {
    pub fn root_node(&self) -> tree_sitter::Node<'_> {
        self.tree.root_node()
    }

    pub fn has_errors(&self) -> bool {
        self.tree.root_node().has_error()
    }

    /// Every `ERROR` and `MISSING` node, in document order.
    pub fn error_locations(&self) -> Vec<ErrorLocation> {
        let mut errors = Vec::new();
        collect_errors(self.tree.root_node(), self.source, &mut errors);
        errors
    }
}

/// Location of a syntax error in the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorLocation {
    pub byte_start: usize,
    pub byte_end: usize,
    /// 1-based
    pub line: usize,
    /// 1-based
    pub column: usize,
    pub message: String,
    pub context: String,
}

impl ErrorLocation {
    pub fn at(source: &str, byte_start: usize, byte_end: usize, message: impl Into<String>) -> Self {
        let prefix = &source[..byte_start.min(source.len())];
        let line = prefix.matches('\n').count() + 1;
        let line_start = prefix.rfind('\n').map_or(0, |i| i + 1);
        let column = prefix[line_start..].chars().count() + 1;
        Self {
            byte_start,
            byte_end,
            line,
            column,
            message: message.into(),
            context: error_context(source, byte_start, byte_end),
        }
    }
}

/// Up to 20 bytes either side of the error, newlines escaped.
fn error_context(source: &str, byte_start: usize, byte_end: usize) -> String {
    let mut start = byte_start.saturating_sub(20);
    while !source.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = (byte_end + 20).min(source.len());
    while !source.is_char_boundary(end) {
        end += 1;
    }
    source.get(start..end).unwrap_or("").replace('\n', "\\n")
}

fn collect_errors(node: tree_sitter::Node<'_>, source: &str, errors: &mut Vec<ErrorLocation>) {
    if node.is_error() || node.is_missing() {
        let message = if node.is_missing() {
            format!("missing {}", node.kind())
        } else {
            "unexpected syntax".to_string()
        };
        errors.push(ErrorLocation::at(source, node.start_byte(), node.end_byte(), message));
    }

    // Subtrees without errors are skipped entirely.
    if !node.has_error() {
        return;
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_errors(child, source, errors);
    }
}
