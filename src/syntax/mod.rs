//! Syntax layer: language detection and pooled tree-sitter parsing.

pub mod lang;
pub mod parser;
pub mod pool;

pub use lang::{detect, SupportLang};
pub use parser::{ErrorLocation, ParsedSource, SourceParser, SyntaxError};
