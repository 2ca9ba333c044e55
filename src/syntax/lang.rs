//! Language detection via ast-grep-language.
//!
//! Every grammar the crate understands is a `SupportLang` variant, so the
//! structural matcher and the syntax checker agree on what a language is.

pub use ast_grep_language::SupportLang;
use std::path::Path;

/// Resolve the language for a file, preferring an explicit hint.
///
/// An unrecognized hint falls back to extension detection rather than
/// disabling the grammar.
pub fn detect(path: &Path, hint: Option<&str>) -> Option<SupportLang> {
    hint.and_then(from_name).or_else(|| {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(from_extension)
    })
}

pub fn from_extension(ext: &str) -> Option<SupportLang> {
    let lang = match ext.to_ascii_lowercase().as_str() {
        "rs" => SupportLang::Rust,
        "py" | "pyi" => SupportLang::Python,
        "js" | "mjs" | "cjs" | "jsx" => SupportLang::JavaScript,
        "ts" | "mts" | "cts" => SupportLang::TypeScript,
        "tsx" => SupportLang::Tsx,
        "go" => SupportLang::Go,
        "java" => SupportLang::Java,
        "c" | "h" => SupportLang::C,
        "cc" | "cpp" | "cxx" | "hpp" | "hh" | "hxx" => SupportLang::Cpp,
        "cs" => SupportLang::CSharp,
        "rb" => SupportLang::Ruby,
        "kt" | "kts" => SupportLang::Kotlin,
        "swift" => SupportLang::Swift,
        "scala" | "sc" => SupportLang::Scala,
        "lua" => SupportLang::Lua,
        "php" => SupportLang::Php,
        "sh" | "bash" => SupportLang::Bash,
        "json" => SupportLang::Json,
        "yml" | "yaml" => SupportLang::Yaml,
        "html" | "htm" => SupportLang::Html,
        "css" => SupportLang::Css,
        _ => return None,
    };
    Some(lang)
}

/// Parse a language name as accepted by `language_hint`.
pub fn from_name(name: &str) -> Option<SupportLang> {
    let lang = match name.trim().to_ascii_lowercase().as_str() {
        "rust" => SupportLang::Rust,
        "python" => SupportLang::Python,
        "javascript" | "js" => SupportLang::JavaScript,
        "typescript" | "ts" => SupportLang::TypeScript,
        "tsx" => SupportLang::Tsx,
        "go" | "golang" => SupportLang::Go,
        "java" => SupportLang::Java,
        "c" => SupportLang::C,
        "cpp" | "c++" => SupportLang::Cpp,
        "csharp" | "c#" => SupportLang::CSharp,
        "ruby" => SupportLang::Ruby,
        "kotlin" => SupportLang::Kotlin,
        "swift" => SupportLang::Swift,
        "scala" => SupportLang::Scala,
        "lua" => SupportLang::Lua,
        "php" => SupportLang::Php,
        "bash" | "shell" | "sh" => SupportLang::Bash,
        "json" => SupportLang::Json,
        "yaml" | "yml" => SupportLang::Yaml,
        "html" => SupportLang::Html,
        "css" => SupportLang::Css,
        other => return from_extension(other),
    };
    Some(lang)
}

/// Stable lowercase name, used for pool keys and reports.
pub fn name(lang: SupportLang) -> String {
    format!("{lang:?}").to_ascii_lowercase()
}
