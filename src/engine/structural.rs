use crate::capability::{Capability, CapabilitySet};
use crate::edit;
use crate::engine::{Engine, EngineInput, Mutation};
use crate::error::PatchError;
use crate::matcher::{LineIndex, Match, MatcherConfig, PatternFactory, PatternKind, StructuralMatcher};
use crate::syntax::{lang, pool};
use ast_grep_language::SupportLang;
use std::collections::HashMap;
use std::sync::Arc;

pub const NAME: &str = "structural";

/// ast-grep backed engine. Replacement text is a template: `$NAME` and
/// `$$$NAME` are substituted with the captured metavariables of each match.
pub struct StructuralEngine {
    factory: Arc<PatternFactory>,
    config: MatcherConfig,
    languages: Vec<SupportLang>,
}

impl StructuralEngine {
    pub fn new(factory: Arc<PatternFactory>, config: MatcherConfig) -> Self {
        Self {
            factory,
            config,
            languages: Vec::new(),
        }
    }

    /// Restrict the engine to the given languages.
    pub fn for_languages(mut self, languages: Vec<SupportLang>) -> Self {
        self.languages = languages;
        self
    }

    /// Structural matching needs a grammar; without one the request is
    /// outside what this engine serves.
    fn language(input: &EngineInput<'_>) -> Result<SupportLang, PatchError> {
        input.language.ok_or_else(|| PatchError::NotSupported {
            engine: NAME.to_string(),
            operation: "structural matching without a detected language".to_string(),
        })
    }

    /// Structural hits with their captures, nested hits removed.
    fn structural_hits(&self, input: &EngineInput<'_>) -> Result<Vec<(Match, HashMap<String, String>)>, PatchError> {
        let language = Self::language(input)?;
        let index = LineIndex::new(input.content);
        let mut out: Vec<(Match, HashMap<String, String>)> = Vec::new();
        for (range, captures) in StructuralMatcher.captures(input.content, input.pattern, language)? {
            if out.last().is_some_and(|(prev, _)| range.start < prev.byte_end) {
                continue;
            }
            out.push((index.make_match(range.start, range.end), captures));
        }
        Ok(out)
    }
}

/// Substitute captures into a replacement template.
///
/// Variadic placeholders go first so `$$$BODY` is never read as `$` + `$$BODY`.
/// Longer names go first so `$NAME` does not clobber `$NAMES`.
pub fn render_template(template: &str, captures: &HashMap<String, String>) -> String {
    let mut names: Vec<&String> = captures.keys().collect();
    names.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));

    let mut result = template.to_string();
    for name in &names {
        result = result.replace(&format!("$$${name}"), &captures[*name]);
    }
    for name in &names {
        result = result.replace(&format!("${name}"), &captures[*name]);
    }
    result
}

impl Engine for StructuralEngine {
    fn name(&self) -> &str {
        NAME
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::from([
            Capability::StructuralSearch,
            Capability::AstAware,
            Capability::MultilinePatterns,
            Capability::ContextAware,
            Capability::LanguageSpecific,
        ])
    }

    fn languages(&self) -> Vec<SupportLang> {
        self.languages.clone()
    }

    /// Healthy when every grammar it serves loads.
    fn is_healthy(&self) -> bool {
        let checked = if self.languages.is_empty() {
            vec![SupportLang::Rust, SupportLang::Python]
        } else {
            self.languages.clone()
        };
        checked.into_iter().all(|language| {
            let ok = pool::grammar_available(language);
            if !ok {
                tracing::warn!(
                    target: "safe_patcher::engine",
                    language = %lang::name(language),
                    "structural engine grammar failed to load"
                );
            }
            ok
        })
    }

    fn search(&self, input: &EngineInput<'_>) -> Result<Vec<Match>, PatchError> {
        if input.requested_kind() == PatternKind::Structural {
            Self::language(input)?;
        }
        let matcher = self.factory.create(&input.requested_kind(), &self.config)?;
        Ok(matcher.find_all(input.content, input.pattern, &input.match_options())?)
    }

    fn replace(&self, input: &EngineInput<'_>, replacement: &str) -> Result<Mutation, PatchError> {
        if input.requested_kind() != PatternKind::Structural {
            let matches = input.mutation_targets(self.search(input)?)?;
            let spans = matches.iter().map(|m| (m.span(), replacement.to_string())).collect();
            let content = edit::splice(input.content, spans).map_err(|source| PatchError::Edit {
                path: input.path.to_path_buf(),
                source,
            })?;
            return Ok(Mutation {
                content,
                applied: matches.len(),
                matches,
            });
        }

        let mut hits = self.structural_hits(input)?;
        if hits.is_empty() {
            return Err(input.not_found());
        }
        if input.options.first_only {
            hits.truncate(1);
        }

        let spans = hits
            .iter()
            .map(|(m, captures)| (m.span(), render_template(replacement, captures)))
            .collect();
        let content = edit::splice(input.content, spans).map_err(|source| PatchError::Edit {
            path: input.path.to_path_buf(),
            source,
        })?;
        Ok(Mutation {
            content,
            applied: hits.len(),
            matches: hits.into_iter().map(|(m, _)| m).collect(),
        })
    }
}
