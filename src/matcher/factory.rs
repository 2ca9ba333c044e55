//! Builds matchers by kind and picks the best kind for a use case.

use crate::matcher::{
    BlockMatcher, FuzzyMatcher, FuzzyMode, LiteralMatcher, Matcher, MatcherError, MultilineMatcher,
    PatternKind, RegexMatcher, StructuralMatcher,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

pub const BASELINE_PROFILE: &str = "baseline";
pub const STRUCTURAL_PROFILE: &str = "structural";

/// Construction parameters shared by all matcher kinds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatcherConfig {
    pub fuzzy_threshold: f64,
    pub fuzzy_mode: FuzzyMode,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: super::fuzzy::DEFAULT_THRESHOLD,
            fuzzy_mode: FuzzyMode::Flexible,
        }
    }
}

/// What the caller is trying to locate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UseCase {
    Identifier,
    Signature,
    Block,
    Text,
    Approximate,
}

pub type MatcherConstructor = Arc<dyn Fn(&MatcherConfig) -> Arc<dyn Matcher> + Send + Sync>;

/// Wrap a typed constructor for [`PatternFactory::register`].
pub fn constructor<F, M>(f: F) -> MatcherConstructor
where
    F: Fn(&MatcherConfig) -> M + Send + Sync + 'static,
    M: Matcher + 'static,
{
    Arc::new(move |cfg: &MatcherConfig| -> Arc<dyn Matcher> { Arc::new(f(cfg)) })
}

pub struct PatternFactory {
    constructors: RwLock<HashMap<String, MatcherConstructor>>,
    optimal: RwLock<HashMap<(String, UseCase), PatternKind>>,
}

impl PatternFactory {
    pub fn new() -> Self {
        let mut constructors: HashMap<String, MatcherConstructor> = HashMap::new();
        constructors.insert("literal".into(), constructor(|_| LiteralMatcher));
        constructors.insert("regex".into(), constructor(|_| RegexMatcher));
        constructors.insert(
            "fuzzy".into(),
            constructor(|cfg| FuzzyMatcher::new(cfg.fuzzy_threshold, cfg.fuzzy_mode)),
        );
        constructors.insert("multiline".into(), constructor(|_| MultilineMatcher));
        constructors.insert("block".into(), constructor(|_| BlockMatcher));
        constructors.insert("structural".into(), constructor(|_| StructuralMatcher));

        let mut optimal = HashMap::new();
        for (use_case, kind) in [
            (UseCase::Identifier, PatternKind::Literal),
            (UseCase::Signature, PatternKind::Regex),
            (UseCase::Block, PatternKind::Block),
            (UseCase::Text, PatternKind::Multiline),
            (UseCase::Approximate, PatternKind::Fuzzy),
        ] {
            optimal.insert((BASELINE_PROFILE.to_string(), use_case), kind);
        }
        for (use_case, kind) in [
            (UseCase::Identifier, PatternKind::Literal),
            (UseCase::Signature, PatternKind::Regex),
            (UseCase::Block, PatternKind::Structural),
            (UseCase::Text, PatternKind::Literal),
            (UseCase::Approximate, PatternKind::Fuzzy),
        ] {
            optimal.insert((STRUCTURAL_PROFILE.to_string(), use_case), kind);
        }

        Self {
            constructors: RwLock::new(constructors),
            optimal: RwLock::new(optimal),
        }
    }

    pub fn create(&self, kind: &PatternKind, config: &MatcherConfig) -> Result<Arc<dyn Matcher>, MatcherError> {
        let constructors = self.constructors.read();
        let constructor = constructors
            .get(kind.name())
            .ok_or_else(|| MatcherError::UnknownKind {
                kind: kind.name().to_string(),
                available: sorted_keys(&constructors),
            })?;
        Ok(constructor(config))
    }

    /// Register a new matcher kind. Builtin and previously registered kinds
    /// cannot be replaced.
    pub fn register(&self, kind: &str, constructor: MatcherConstructor) -> Result<(), MatcherError> {
        let mut constructors = self.constructors.write();
        if constructors.contains_key(kind) {
            return Err(MatcherError::DuplicateKind(kind.to_string()));
        }
        constructors.insert(kind.to_string(), constructor);
        Ok(())
    }

    pub fn kinds(&self) -> Vec<String> {
        sorted_keys(&self.constructors.read())
    }

    /// The preferred kind for `(profile, use_case)`. Unknown profiles use the
    /// baseline table.
    pub fn optimal_kind(&self, profile: &str, use_case: UseCase) -> PatternKind {
        let optimal = self.optimal.read();
        optimal
            .get(&(profile.to_string(), use_case))
            .or_else(|| optimal.get(&(BASELINE_PROFILE.to_string(), use_case)))
            .cloned()
            .unwrap_or(PatternKind::Literal)
    }

    pub fn set_optimal(&self, profile: &str, use_case: UseCase, kind: PatternKind) {
        self.optimal.write().insert((profile.to_string(), use_case), kind);
    }

    pub fn create_for(
        &self,
        profile: &str,
        use_case: UseCase,
        config: &MatcherConfig,
    ) -> Result<Arc<dyn Matcher>, MatcherError> {
        self.create(&self.optimal_kind(profile, use_case), config)
    }
}

impl Default for PatternFactory {
    fn default() -> Self {
        Self::new()
    }
}

fn sorted_keys(map: &HashMap<String, MatcherConstructor>) -> Vec<String> {
    let mut keys: Vec<String> = map.keys().cloned().collect();
    keys.sort();
    keys
}
