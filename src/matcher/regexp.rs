//! Regular-expression matcher with a thread-local compilation cache.
//!
//! Compiled regexes are cached per (pattern, case flag), capped at 256
//! entries; the cache is cleared when full.

use crate::capability::{Capability, CapabilitySet};
use crate::matcher::{LineIndex, Match, MatchOptions, Matcher, MatcherError, PatternKind};
use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::HashMap;

const MAX_CACHE_ENTRIES: usize = 256;

thread_local! {
    static REGEX_CACHE: RefCell<HashMap<(String, bool), Regex>> = RefCell::new(HashMap::new());
}

/// Get a compiled regex from cache, or compile and cache it.
pub fn get_or_compile(pattern: &str, case_sensitive: bool) -> Result<Regex, MatcherError> {
    let key = (pattern.to_string(), case_sensitive);

    REGEX_CACHE.with(|cache| {
        let mut cache = cache.borrow_mut();
        if let Some(re) = cache.get(&key) {
            return Ok(re.clone());
        }

        if cache.len() >= MAX_CACHE_ENTRIES {
            cache.clear();
        }

        let compiled = RegexBuilder::new(pattern)
            .case_insensitive(!case_sensitive)
            .multi_line(true)
            .build()
            .map_err(|source| MatcherError::InvalidRegex {
                pattern: pattern.to_string(),
                source,
            })?;
        cache.insert(key, compiled.clone());
        Ok(compiled)
    })
}

pub fn cache_size() -> usize {
    REGEX_CACHE.with(|cache| cache.borrow().len())
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RegexMatcher;

impl Matcher for RegexMatcher {
    fn kind(&self) -> PatternKind {
        PatternKind::Regex
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::from([Capability::RegexSearch, Capability::MultilinePatterns])
    }

    fn find_all(&self, text: &str, pattern: &str, opts: &MatchOptions) -> Result<Vec<Match>, MatcherError> {
        let re = get_or_compile(pattern, opts.case_sensitive)?;
        let index = LineIndex::new(text);
        let names: Vec<Option<&str>> = re.capture_names().collect();

        let mut out = Vec::new();
        for caps in re.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            // Empty matches would make every position a hit.
            if whole.start() == whole.end() {
                continue;
            }

            let mut captures = Map::new();
            for (i, name) in names.iter().enumerate().skip(1) {
                if let Some(group) = caps.get(i) {
                    captures.insert(i.to_string(), Value::String(group.as_str().to_string()));
                    if let Some(name) = name {
                        captures.insert((*name).to_string(), Value::String(group.as_str().to_string()));
                    }
                }
            }

            let mut m = index.make_match(whole.start(), whole.end());
            if !captures.is_empty() {
                m = m.with_meta("captures", captures);
            }
            out.push(m);
        }
        Ok(out)
    }
}
