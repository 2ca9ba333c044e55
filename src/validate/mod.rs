//! Syntax and structure validation.
//!
//! # Rules
//!
//! 1. Files with a known grammar are parsed with tree-sitter; every `ERROR`
//!    or `MISSING` node counts as one syntax error.
//! 2. Files without a grammar fall back to a delimiter-balance check.
//! 3. Structure metrics are advisory and never fail a check.

pub mod delimiters;
pub mod structure;

pub use crate::syntax::ErrorLocation;
pub use structure::StructureMetrics;

use crate::syntax::{self, lang, pool};
use serde::Serialize;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckMethod {
    TreeSitter,
    DelimiterBalance,
}

/// Outcome of a syntax check on one source text.
#[derive(Debug, Clone, Serialize)]
pub struct SyntaxReport {
    pub language: Option<String>,
    pub method: CheckMethod,
    pub errors: Vec<ErrorLocation>,
}

impl SyntaxReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }
}

/// Seam for syntax checking, so the integrity validator can be driven by
/// alternative checkers in tests.
pub trait SyntaxCheck: Send + Sync {
    fn check(&self, path: &Path, source: &str, language_hint: Option<&str>) -> SyntaxReport;
}

/// Tree-sitter with delimiter-balance fallback.
#[derive(Debug, Default, Clone, Copy)]
pub struct TreeSitterCheck;

impl SyntaxCheck for TreeSitterCheck {
    fn check(&self, path: &Path, source: &str, language_hint: Option<&str>) -> SyntaxReport {
        check_source(path, source, language_hint)
    }
}

pub fn check_source(path: &Path, source: &str, language_hint: Option<&str>) -> SyntaxReport {
    if let Some(language) = syntax::detect(path, language_hint) {
        let parsed = pool::with_parser(language, |parser| {
            parser
                .parse_with_source(source)
                .map(|parsed| parsed.error_locations())
        });
        match parsed {
            Ok(Ok(errors)) => {
                return SyntaxReport {
                    language: Some(lang::name(language)),
                    method: CheckMethod::TreeSitter,
                    errors,
                }
            }
            Ok(Err(error)) | Err(error) => {
                warn!(
                    target: "safe_patcher::validate",
                    path = %path.display(),
                    %error,
                    "grammar unavailable, falling back to delimiter balance"
                );
            }
        }
    }

    SyntaxReport {
        language: None,
        method: CheckMethod::DelimiterBalance,
        errors: delimiters::check(source),
    }
}
