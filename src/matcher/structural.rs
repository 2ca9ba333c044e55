//! Structural matcher using ast-grep's metavariable syntax.
//!
//! # Metavariable Syntax
//!
//! - `$NAME` - Matches a single node and captures it
//! - `$$$NAME` - Matches zero or more nodes (variadic)
//! - `$_` - Matches any single node (anonymous)
//!
//! # Example Patterns
//!
//! ```text
//! fn $NAME($$$PARAMS) { $$$BODY }     // Rust function definition
//! def $NAME($$$ARGS): $$$BODY         // Python function definition
//! $EXPR.clone()                       // Method call on any receiver
//! ```

use crate::capability::{Capability, CapabilitySet};
use crate::matcher::{LineIndex, Match, MatchOptions, Matcher, MatcherError, PatternKind};
use ast_grep_core::{AstGrep, Pattern};
use ast_grep_language::SupportLang;
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::HashMap;

const MAX_CACHE_ENTRIES: usize = 256;

thread_local! {
    // Key is "<lang_debug>:<pattern_str>" so the same pattern string never
    // collides across languages.
    static PATTERN_CACHE: RefCell<HashMap<String, Pattern>> = RefCell::new(HashMap::new());
}

/// Get a compiled pattern from cache, or compile and cache it.
///
/// Capped at 256 entries per thread; the cache is cleared when full.
pub fn get_or_compile_pattern(pattern_str: &str, lang: SupportLang) -> Result<Pattern, MatcherError> {
    let cache_key = format!("{lang:?}:{pattern_str}");

    PATTERN_CACHE.with(|cache| {
        let mut cache = cache.borrow_mut();
        if let Some(p) = cache.get(&cache_key) {
            return Ok(p.clone());
        }

        if cache.len() >= MAX_CACHE_ENTRIES {
            cache.clear();
        }

        let compiled = Pattern::try_new(pattern_str, lang).map_err(|e| MatcherError::InvalidPattern {
            pattern: pattern_str.to_string(),
            message: e.to_string(),
        })?;
        cache.insert(cache_key, compiled.clone());
        Ok(compiled)
    })
}

pub fn pattern_cache_size() -> usize {
    PATTERN_CACHE.with(|cache| cache.borrow().len())
}

/// Matches come back with `metadata.captures` holding every metavariable.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuralMatcher;

impl StructuralMatcher {
    /// Captured metavariables of every match, in match order.
    pub fn captures(
        &self,
        text: &str,
        pattern: &str,
        lang: SupportLang,
    ) -> Result<Vec<(std::ops::Range<usize>, HashMap<String, String>)>, MatcherError> {
        let pat = get_or_compile_pattern(pattern, lang)?;
        let sg = AstGrep::new(text, lang);
        let root = sg.root();

        let mut out: Vec<(std::ops::Range<usize>, HashMap<String, String>)> = root
            .find_all(&pat)
            .map(|m| {
                let range = m.get_node().range();
                let captures: HashMap<String, String> = m.get_env().clone().into();
                (range, captures)
            })
            .collect();
        out.sort_by_key(|(range, _)| (range.start, range.end));
        Ok(out)
    }
}

impl Matcher for StructuralMatcher {
    fn kind(&self) -> PatternKind {
        PatternKind::Structural
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::from([
            Capability::StructuralSearch,
            Capability::AstAware,
            Capability::MultilinePatterns,
            Capability::LanguageSpecific,
        ])
    }

    fn find_all(&self, text: &str, pattern: &str, opts: &MatchOptions) -> Result<Vec<Match>, MatcherError> {
        let lang = opts.language.ok_or_else(|| MatcherError::MissingLanguage {
            pattern: pattern.to_string(),
        })?;

        let index = LineIndex::new(text);
        let mut out: Vec<Match> = Vec::new();
        for (range, captures) in self.captures(text, pattern, lang)? {
            // Nested hits (a call inside a matched call) are dropped.
            if out.last().is_some_and(|prev| range.start < prev.byte_end) {
                continue;
            }
            let captures: Map<String, Value> = captures
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect();
            let mut m = index.make_match(range.start, range.end);
            if !captures.is_empty() {
                m = m.with_meta("captures", captures);
            }
            out.push(m);
        }
        Ok(out)
    }
}
