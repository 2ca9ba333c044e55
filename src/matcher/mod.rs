//! Pattern location algorithms behind one contract.
//!
//! Every matcher answers `find`, `matches` and `find_all` with the same
//! [`Match`] shape, so engines never care which algorithm produced a span.
//!
//! | kind         | locates                                                |
//! |--------------|--------------------------------------------------------|
//! | `literal`    | substrings, optionally case-insensitive                |
//! | `regex`      | regular expressions, captures in metadata              |
//! | `fuzzy`      | whitespace-normalized edit-distance windows            |
//! | `multiline`  | consecutive lines, indentation-insensitive             |
//! | `block`      | a header line plus its indented body                   |
//! | `structural` | ast-grep metavariable patterns (`$NAME`, `$$$BODY`)    |

pub mod block;
pub mod combiner;
pub mod factory;
pub mod fuzzy;
pub mod literal;
pub mod position;
pub mod regexp;
pub mod structural;

pub use block::{BlockMatcher, MultilineMatcher};
pub use combiner::MatcherCombiner;
pub use factory::{constructor, MatcherConfig, MatcherConstructor, PatternFactory, UseCase};
pub use fuzzy::{FuzzyCandidate, FuzzyMatcher, FuzzyMode};
pub use literal::LiteralMatcher;
pub use position::{make_match, LineIndex, Match};
pub use regexp::RegexMatcher;
pub use structural::StructuralMatcher;

use crate::capability::CapabilitySet;
use ast_grep_language::SupportLang;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MatcherError {
    #[error("invalid regular expression {pattern:?}: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid structural pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("structural pattern {pattern:?} needs a language (set a language hint or use a known extension)")]
    MissingLanguage { pattern: String },

    #[error("unknown matcher kind '{kind}' (available: {})", .available.join(", "))]
    UnknownKind { kind: String, available: Vec<String> },

    #[error("matcher kind '{0}' is already registered")]
    DuplicateKind(String),
}

/// Identifies a matcher algorithm. Custom kinds are registered by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum PatternKind {
    Literal,
    Regex,
    Fuzzy,
    Multiline,
    Block,
    Structural,
    Custom(String),
}

impl PatternKind {
    pub const BUILTIN: [PatternKind; 6] = [
        PatternKind::Literal,
        PatternKind::Regex,
        PatternKind::Fuzzy,
        PatternKind::Multiline,
        PatternKind::Block,
        PatternKind::Structural,
    ];

    pub fn name(&self) -> &str {
        match self {
            PatternKind::Literal => "literal",
            PatternKind::Regex => "regex",
            PatternKind::Fuzzy => "fuzzy",
            PatternKind::Multiline => "multiline",
            PatternKind::Block => "block",
            PatternKind::Structural => "structural",
            PatternKind::Custom(name) => name,
        }
    }

    pub fn from_name(name: &str) -> Self {
        match name {
            "literal" => PatternKind::Literal,
            "regex" => PatternKind::Regex,
            "fuzzy" => PatternKind::Fuzzy,
            "multiline" => PatternKind::Multiline,
            "block" => PatternKind::Block,
            "structural" => PatternKind::Structural,
            other => PatternKind::Custom(other.to_string()),
        }
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<PatternKind> for String {
    fn from(kind: PatternKind) -> Self {
        kind.name().to_string()
    }
}

impl From<String> for PatternKind {
    fn from(name: String) -> Self {
        PatternKind::from_name(&name)
    }
}

/// Per-call matching options.
#[derive(Debug, Clone)]
pub struct MatchOptions {
    pub case_sensitive: bool,
    /// Required by the structural matcher
    pub language: Option<SupportLang>,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            case_sensitive: true,
            language: None,
        }
    }
}

impl MatchOptions {
    pub fn case_insensitive() -> Self {
        Self {
            case_sensitive: false,
            ..Default::default()
        }
    }

    pub fn with_language(language: SupportLang) -> Self {
        Self {
            language: Some(language),
            ..Default::default()
        }
    }
}

/// Uniform pattern-location contract.
///
/// Only malformed patterns are errors; "no match" is `Ok(None)` or an empty
/// list. `find_all` returns non-overlapping matches ordered by position.
pub trait Matcher: Send + Sync {
    fn kind(&self) -> PatternKind;

    fn capabilities(&self) -> CapabilitySet;

    fn find_all(&self, text: &str, pattern: &str, opts: &MatchOptions) -> Result<Vec<Match>, MatcherError>;

    fn find(&self, text: &str, pattern: &str, opts: &MatchOptions) -> Result<Option<Match>, MatcherError> {
        Ok(self.find_all(text, pattern, opts)?.into_iter().next())
    }

    fn matches(&self, text: &str, pattern: &str, opts: &MatchOptions) -> Result<bool, MatcherError> {
        Ok(self.find(text, pattern, opts)?.is_some())
    }
}
