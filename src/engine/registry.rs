//! Engine registration, instance caching and capability-based selection.

use crate::capability::CapabilitySet;
use crate::engine::{baseline, structural, BaselineEngine, Engine, StructuralEngine};
use crate::error::PatchError;
use crate::matcher::{MatcherConfig, PatternFactory};
use crate::syntax::lang;
use ast_grep_language::SupportLang;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Free-form construction parameters for [`EngineRegistry::create_with`].
pub type EngineParams = Map<String, Value>;

pub type EngineFactory = Arc<dyn Fn(&EngineParams) -> Result<Arc<dyn Engine>, PatchError> + Send + Sync>;

struct Registration {
    name: String,
    priority: i32,
    factory: EngineFactory,
}

/// Registered engines, highest priority first; registration order breaks ties.
pub struct EngineRegistry {
    registrations: RwLock<Vec<Registration>>,
    instances: RwLock<HashMap<String, Arc<dyn Engine>>>,
}

impl EngineRegistry {
    /// An empty registry. Selection needs a `baseline` registration to fall
    /// back on.
    pub fn new() -> Self {
        Self {
            registrations: RwLock::new(Vec::new()),
            instances: RwLock::new(HashMap::new()),
        }
    }

    /// Registry with the builtin `baseline` (priority 0) and `structural`
    /// (priority 10) engines.
    pub fn with_builtin(factory: Arc<PatternFactory>, config: MatcherConfig) -> Self {
        let registry = Self::new();

        let f = factory.clone();
        registry.register(
            baseline::NAME,
            0,
            Arc::new(move |_: &EngineParams| -> Result<Arc<dyn Engine>, PatchError> {
                Ok(Arc::new(BaselineEngine::new(f.clone(), config)))
            }),
        );

        registry.register(
            structural::NAME,
            10,
            Arc::new(move |params: &EngineParams| -> Result<Arc<dyn Engine>, PatchError> {
                let engine = StructuralEngine::new(factory.clone(), config);
                let languages = parse_languages(params)?;
                Ok(Arc::new(engine.for_languages(languages)))
            }),
        );
        registry
    }

    /// Register (or replace) an engine. Replacing drops the cached instance.
    pub fn register(&self, name: &str, priority: i32, factory: EngineFactory) {
        let mut registrations = self.registrations.write();
        if let Some(existing) = registrations.iter_mut().find(|r| r.name == name) {
            existing.priority = priority;
            existing.factory = factory;
        } else {
            registrations.push(Registration {
                name: name.to_string(),
                priority,
                factory,
            });
        }
        // Stable sort keeps registration order among equal priorities.
        registrations.sort_by(|a, b| b.priority.cmp(&a.priority));
        drop(registrations);
        self.instances.write().remove(name);
    }

    /// Names in selection order.
    pub fn names(&self) -> Vec<String> {
        self.registrations.read().iter().map(|r| r.name.clone()).collect()
    }

    /// Lookup and the error's name list share one read guard.
    fn factory_for(&self, name: &str) -> Result<EngineFactory, PatchError> {
        let registrations = self.registrations.read();
        match registrations.iter().find(|r| r.name == name) {
            Some(registration) => Ok(registration.factory.clone()),
            None => Err(PatchError::EngineNotFound {
                name: name.to_string(),
                available: registrations.iter().map(|r| r.name.clone()).collect(),
            }),
        }
    }

    /// The cached instance for `name`, built on first use.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Engine>, PatchError> {
        if let Some(engine) = self.instances.read().get(name) {
            return Ok(engine.clone());
        }
        let engine = (self.factory_for(name)?)(&EngineParams::new())?;
        let mut instances = self.instances.write();
        Ok(instances.entry(name.to_string()).or_insert(engine).clone())
    }

    /// A fresh, uncached instance built with custom parameters.
    pub fn create_with(&self, name: &str, params: &EngineParams) -> Result<Arc<dyn Engine>, PatchError> {
        (self.factory_for(name)?)(params)
    }

    /// The highest-priority healthy engine whose capabilities cover
    /// `required` and whose language set admits `language`, else baseline.
    pub fn select(&self, required: &CapabilitySet, language: Option<SupportLang>) -> Result<Arc<dyn Engine>, PatchError> {
        for name in self.names() {
            let engine = match self.get(&name) {
                Ok(engine) => engine,
                Err(error) => {
                    warn!(target: "safe_patcher::engine", engine = %name, %error, "engine construction failed");
                    continue;
                }
            };
            if !engine.capabilities().is_superset(required) || !engine.supports_language(language) {
                continue;
            }
            if !engine.is_healthy() {
                debug!(target: "safe_patcher::engine", engine = %name, "skipping unhealthy engine");
                continue;
            }
            debug!(
                target: "safe_patcher::engine",
                engine = %name,
                required = %required,
                "engine selected"
            );
            return Ok(engine);
        }

        debug!(
            target: "safe_patcher::engine",
            required = %required,
            "no engine satisfies requirements, falling back to baseline"
        );
        let fallback = self.get(baseline::NAME).map_err(|error| PatchError::EngineUnhealthy {
            name: baseline::NAME.to_string(),
            reason: error.to_string(),
        })?;
        if !fallback.is_healthy() {
            return Err(PatchError::EngineUnhealthy {
                name: baseline::NAME.to_string(),
                reason: "health check failed".to_string(),
            });
        }
        Ok(fallback)
    }
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::with_builtin(Arc::new(PatternFactory::new()), MatcherConfig::default())
    }
}

/// `{"languages": ["python", "rust"]}`
fn parse_languages(params: &EngineParams) -> Result<Vec<SupportLang>, PatchError> {
    let Some(value) = params.get("languages") else {
        return Ok(Vec::new());
    };
    let invalid = |reason: String| PatchError::EngineUnhealthy {
        name: structural::NAME.to_string(),
        reason,
    };
    let items = value
        .as_array()
        .ok_or_else(|| invalid("`languages` must be an array of names".to_string()))?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .and_then(lang::from_name)
                .ok_or_else(|| invalid(format!("unknown language {item}")))
        })
        .collect()
}
