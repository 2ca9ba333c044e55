use crate::capability::{Capability, CapabilitySet};
use crate::edit;
use crate::engine::{Engine, EngineInput, Mutation};
use crate::error::PatchError;
use crate::matcher::{regexp, Match, MatcherConfig, PatternFactory, PatternKind};
use std::sync::Arc;

pub const NAME: &str = "baseline";

/// The always-available engine. Executes every operation kind with the
/// text matchers.
///
/// Structural requests reach it only as the registry's fallback and degrade
/// to the block matcher; it does not advertise `StructuralSearch`, `AstAware`
/// or `LanguageSpecific`.
pub struct BaselineEngine {
    factory: Arc<PatternFactory>,
    config: MatcherConfig,
}

impl BaselineEngine {
    pub fn new(factory: Arc<PatternFactory>, config: MatcherConfig) -> Self {
        Self { factory, config }
    }

    fn kind_for(&self, input: &EngineInput<'_>) -> PatternKind {
        match input.requested_kind() {
            PatternKind::Structural => PatternKind::Block,
            other => other,
        }
    }

    fn edit_error(input: &EngineInput<'_>, source: edit::EditError) -> PatchError {
        PatchError::Edit {
            path: input.path.to_path_buf(),
            source,
        }
    }
}

impl Engine for BaselineEngine {
    fn name(&self) -> &str {
        NAME
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::from([
            Capability::LiteralSearch,
            Capability::RegexSearch,
            Capability::MultilinePatterns,
            Capability::ContextAware,
            Capability::BatchOperations,
        ])
    }

    fn search(&self, input: &EngineInput<'_>) -> Result<Vec<Match>, PatchError> {
        let matcher = self.factory.create(&self.kind_for(input), &self.config)?;
        Ok(matcher.find_all(input.content, input.pattern, &input.match_options())?)
    }

    fn replace(&self, input: &EngineInput<'_>, replacement: &str) -> Result<Mutation, PatchError> {
        let matches = input.mutation_targets(self.search(input)?)?;

        let spans = if self.kind_for(input) == PatternKind::Regex {
            // `$1` / `${name}` expansion per match.
            let re = regexp::get_or_compile(input.pattern, input.options.case_sensitive)?;
            matches
                .iter()
                .map(|m| {
                    let mut expanded = String::new();
                    if let Some(caps) = re.captures_at(input.content, m.byte_start) {
                        caps.expand(replacement, &mut expanded);
                    }
                    (m.span(), expanded)
                })
                .collect()
        } else {
            matches
                .iter()
                .map(|m| (m.span(), replacement.to_string()))
                .collect()
        };

        let content = edit::splice(input.content, spans).map_err(|e| Self::edit_error(input, e))?;
        Ok(Mutation {
            content,
            applied: matches.len(),
            matches,
        })
    }
}
