//! Thread-local parser pooling.
//!
//! Parsers are created on first use per thread and language, then reused.
//! Grammar loading dominates the cost of validating small files.

use crate::syntax::lang;
use crate::syntax::parser::{SourceParser, SyntaxError};
use ast_grep_language::SupportLang;
use std::cell::RefCell;
use std::collections::HashMap;

thread_local! {
    static PARSERS: RefCell<HashMap<String, SourceParser>> = RefCell::new(HashMap::new());
}

/// Execute `f` with the pooled parser for `lang`.
pub fn with_parser<F, R>(lang: SupportLang, f: F) -> Result<R, SyntaxError>
where
    F: FnOnce(&mut SourceParser) -> R,
{
    PARSERS.with(|cell| {
        let mut parsers = cell.borrow_mut();
        let parser = match parsers.entry(lang::name(lang)) {
            std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
            std::collections::hash_map::Entry::Vacant(e) => e.insert(SourceParser::new(lang)?),
        };
        Ok(f(parser))
    })
}

/// Whether the grammar for `lang` loads on this thread.
pub fn grammar_available(lang: SupportLang) -> bool {
    with_parser(lang, |_| ()).is_ok()
}
