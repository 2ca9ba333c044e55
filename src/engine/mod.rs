//! Engines turn matches into in-memory mutations.
//!
//! `search` and `replace` are engine specific. `insert_before`,
//! `insert_after`, `delete` and `extract` default to `search` plus line
//! manipulation and may be overridden. Engines never write to disk; the
//! service applies the returned [`Mutation`] through a verified edit.

pub mod baseline;
pub mod lines;
pub mod registry;
pub mod structural;

pub use baseline::BaselineEngine;
pub use registry::{EngineFactory, EngineParams, EngineRegistry};
pub use structural::StructuralEngine;

use crate::capability::{Capability, CapabilitySet};
use crate::error::PatchError;
use crate::matcher::{fuzzy, Match, MatchOptions, PatternKind};
use crate::operation::{OperationKind, OperationOptions};
use ast_grep_language::SupportLang;
use std::path::Path;

/// Everything an engine needs to evaluate one request against content.
#[derive(Debug, Clone, Copy)]
pub struct EngineInput<'a> {
    pub path: &'a Path,
    pub content: &'a str,
    pub pattern: &'a str,
    pub options: &'a OperationOptions,
    pub language: Option<SupportLang>,
}

impl EngineInput<'_> {
    pub fn match_options(&self) -> MatchOptions {
        MatchOptions {
            case_sensitive: self.options.case_sensitive,
            language: self.language,
        }
    }

    /// Matcher kind implied by the options, before any engine degradation.
    pub fn requested_kind(&self) -> PatternKind {
        let o = self.options;
        if o.structural {
            PatternKind::Structural
        } else if o.use_regex {
            PatternKind::Regex
        } else if o.fuzzy {
            PatternKind::Fuzzy
        } else if self.pattern.trim_end_matches('\n').contains('\n') {
            PatternKind::Multiline
        } else {
            PatternKind::Literal
        }
    }

    /// The matches a mutation touches. Fuzzy requests touch the occurrences
    /// found verbatim up to whitespace, or the single best approximate
    /// window when there are none. `first_only` keeps the first.
    pub fn mutation_targets(&self, mut matches: Vec<Match>) -> Result<Vec<Match>, PatchError> {
        if matches.is_empty() {
            return Err(self.not_found());
        }
        if self.requested_kind() == PatternKind::Fuzzy {
            let (verbatim, approximate): (Vec<Match>, Vec<Match>) =
                matches.into_iter().partition(|m| fuzzy::similarity_of(m) >= 1.0);
            matches = if verbatim.is_empty() {
                fuzzy::best_of(approximate).into_iter().collect()
            } else {
                verbatim
            };
        }
        if self.options.first_only {
            matches.truncate(1);
        }
        Ok(matches)
    }

    fn not_found(&self) -> PatchError {
        PatchError::PatternNotFound {
            path: self.path.to_path_buf(),
            pattern: self.pattern.to_string(),
        }
    }
}

/// Capabilities a request needs from whichever engine runs it.
pub fn required_capabilities(options: &OperationOptions, pattern: &str, language: Option<SupportLang>) -> CapabilitySet {
    let mut caps = CapabilitySet::new();
    if options.structural {
        caps.insert(Capability::StructuralSearch);
        caps.insert(Capability::AstAware);
        if language.is_some() {
            caps.insert(Capability::LanguageSpecific);
        }
    } else if options.use_regex {
        caps.insert(Capability::RegexSearch);
    } else {
        caps.insert(Capability::LiteralSearch);
    }
    if pattern.trim_end_matches('\n').contains('\n') {
        caps.insert(Capability::MultilinePatterns);
    }
    caps
}

/// Result of evaluating a request in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub content: String,
    pub matches: Vec<Match>,
    /// Number of individual changes; 0 for read-only operations
    pub applied: usize,
}

pub trait Engine: Send + Sync {
    fn name(&self) -> &str;

    fn capabilities(&self) -> CapabilitySet;

    /// Languages this engine is restricted to; empty means all.
    fn languages(&self) -> Vec<SupportLang> {
        Vec::new()
    }

    fn is_healthy(&self) -> bool {
        true
    }

    fn supports_language(&self, language: Option<SupportLang>) -> bool {
        let languages = self.languages();
        match language {
            _ if languages.is_empty() => true,
            Some(lang) => languages.contains(&lang),
            None => false,
        }
    }

    fn search(&self, input: &EngineInput<'_>) -> Result<Vec<Match>, PatchError>;

    fn replace(&self, input: &EngineInput<'_>, replacement: &str) -> Result<Mutation, PatchError>;

    fn insert_before(&self, input: &EngineInput<'_>, content: &str) -> Result<Mutation, PatchError> {
        let targets = input.mutation_targets(self.search(input)?)?;
        let target = targets.first().ok_or_else(|| input.not_found())?;
        let out = lines::insert_before(input.content, target, content, input.options.preserve_indentation)
            .map_err(|source| PatchError::Edit {
                path: input.path.to_path_buf(),
                source,
            })?;
        Ok(Mutation {
            content: out,
            matches: vec![target.clone()],
            applied: 1,
        })
    }

    fn insert_after(&self, input: &EngineInput<'_>, content: &str) -> Result<Mutation, PatchError> {
        let targets = input.mutation_targets(self.search(input)?)?;
        let target = targets.first().ok_or_else(|| input.not_found())?;
        let out = lines::insert_after(input.content, target, content, input.options.preserve_indentation)
            .map_err(|source| PatchError::Edit {
                path: input.path.to_path_buf(),
                source,
            })?;
        Ok(Mutation {
            content: out,
            matches: vec![target.clone()],
            applied: 1,
        })
    }

    fn delete(&self, input: &EngineInput<'_>) -> Result<Mutation, PatchError> {
        let matches = input.mutation_targets(self.search(input)?)?;
        let out = lines::delete(input.content, &matches).map_err(|source| PatchError::Edit {
            path: input.path.to_path_buf(),
            source,
        })?;
        Ok(Mutation {
            content: out,
            applied: matches.len(),
            matches,
        })
    }

    fn extract(&self, input: &EngineInput<'_>) -> Result<Vec<Match>, PatchError> {
        self.search(input)
    }

    /// Dispatch one operation kind. Read-only kinds return the content
    /// unchanged with `applied == 0`.
    fn execute(&self, kind: OperationKind, input: &EngineInput<'_>, payload: &str) -> Result<Mutation, PatchError> {
        let read_only = |matches: Vec<Match>| Mutation {
            content: input.content.to_string(),
            matches,
            applied: 0,
        };
        match kind {
            OperationKind::Search => self.search(input).map(read_only),
            OperationKind::Extract => self.extract(input).map(read_only),
            OperationKind::Replace => self.replace(input, payload),
            OperationKind::InsertBefore => self.insert_before(input, payload),
            OperationKind::InsertAfter => self.insert_after(input, payload),
            OperationKind::Delete => self.delete(input),
        }
    }
}
