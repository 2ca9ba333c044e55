//! The inbound call: one request in, one result out.
//!
//! Engines compute mutations in memory. Only a mutation that actually changes
//! the file reaches disk, and only inside an integrity guard: checkpoint,
//! verified whole-file edit, re-validation, promotion or rollback. Read-only
//! requests are served through the content cache.

use crate::backup::BackupManager;
use crate::cache::ContentCache;
use crate::config::Settings;
use crate::edit::Edit;
use crate::engine::{required_capabilities, Engine, EngineInput, EngineRegistry};
use crate::error::PatchError;
use crate::integrity::{IntegrityReport, IntegrityValidator};
use crate::matcher::{Match, PatternFactory};
use crate::operation::{OperationOptions, OperationRequest, OperationResult, OperationStatus};
use crate::syntax;
use crate::transaction::TransactionManager;
use crate::validate::{SyntaxCheck, TreeSitterCheck};
use ast_grep_language::SupportLang;
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use walkdir::WalkDir;

pub struct SafePatcher {
    settings: Settings,
    factory: Arc<PatternFactory>,
    registry: Arc<EngineRegistry>,
    cache: ContentCache<Vec<Match>>,
    backups: Arc<BackupManager>,
    validator: IntegrityValidator,
}

/// Failures that leave the file untouched become failed results; integrity
/// violations and unusable snapshots are raised.
fn settle(result: Result<OperationResult, PatchError>) -> Result<OperationResult, PatchError> {
    match result {
        Err(err) if !err.is_fatal() => Ok(OperationResult::failure(&err)),
        other => other,
    }
}

fn engine_input<'a>(request: &'a OperationRequest, content: &'a str, language: Option<SupportLang>) -> EngineInput<'a> {
    EngineInput {
        path: &request.path,
        content,
        pattern: &request.pattern,
        options: &request.options,
        language,
    }
}

impl SafePatcher {
    pub fn new(settings: Settings) -> Self {
        Self::with_checker(settings, Arc::new(TreeSitterCheck))
    }

    /// Use a custom syntax checker for the integrity gate.
    pub fn with_checker(settings: Settings, checker: Arc<dyn SyntaxCheck>) -> Self {
        let factory = Arc::new(PatternFactory::new());
        let registry = Arc::new(EngineRegistry::with_builtin(factory.clone(), settings.matcher_config()));
        let cache = ContentCache::new(settings.cache.capacity, settings.cache_ttl(), settings.cache.max_file_bytes);
        let backups = Arc::new(BackupManager::new(settings.backup.directory.clone()));
        let validator =
            IntegrityValidator::new(backups.clone(), checker).with_retention(settings.provisional_retention());
        Self {
            settings,
            factory,
            registry,
            cache,
            backups,
            validator,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn factory(&self) -> &Arc<PatternFactory> {
        &self.factory
    }

    pub fn registry(&self) -> &Arc<EngineRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &ContentCache<Vec<Match>> {
        &self.cache
    }

    pub fn backups(&self) -> &Arc<BackupManager> {
        &self.backups
    }

    pub fn validator(&self) -> &IntegrityValidator {
        &self.validator
    }

    /// A transaction manager sharing this service's backup store.
    pub fn transaction(&self) -> TransactionManager {
        TransactionManager::new(self.backups.clone())
    }

    pub fn validate_file(&self, path: &Path, language_hint: Option<&str>) -> Result<IntegrityReport, PatchError> {
        self.validator.validate_file(path, language_hint)
    }

    pub fn execute(&self, request: &OperationRequest) -> Result<OperationResult, PatchError> {
        settle(self.dispatch(request))
    }

    /// Register the target with `txn` first, then execute.
    pub fn execute_in(
        &self,
        txn: &mut TransactionManager,
        request: &OperationRequest,
    ) -> Result<OperationResult, PatchError> {
        if let Err(err) = txn.add_file(&request.path) {
            return settle(Err(err.into()));
        }
        self.execute(request)
    }

    /// Execute many requests. Requests on distinct files run in parallel;
    /// requests on the same file run in submission order. Results keep the
    /// input order.
    pub fn execute_batch(&self, requests: &[OperationRequest]) -> Vec<Result<OperationResult, PatchError>> {
        let mut groups: Vec<Vec<usize>> = Vec::new();
        let mut by_path: HashMap<PathBuf, usize> = HashMap::new();
        for (idx, request) in requests.iter().enumerate() {
            let key = fs::canonicalize(&request.path).unwrap_or_else(|_| request.path.clone());
            let group = *by_path.entry(key).or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[group].push(idx);
        }

        let mut results: Vec<(usize, Result<OperationResult, PatchError>)> = groups
            .par_iter()
            .flat_map_iter(|group| {
                group
                    .iter()
                    .map(|&idx| (idx, self.execute(&requests[idx])))
                    .collect::<Vec<_>>()
            })
            .collect();
        results.sort_by_key(|(idx, _)| *idx);
        results.into_iter().map(|(_, result)| result).collect()
    }

    /// Search every non-hidden file under `root` in parallel. Files that are
    /// not UTF-8 or have no match are left out.
    pub fn search_tree(
        &self,
        root: &Path,
        pattern: &str,
        options: &OperationOptions,
    ) -> Result<Vec<(PathBuf, Vec<Match>)>, PatchError> {
        let backup_dir = fs::canonicalize(self.backups.dir()).ok();
        let mut files = Vec::new();
        let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
            let hidden = entry.depth() > 0 && entry.file_name().to_str().is_some_and(|n| n.starts_with('.'));
            let is_backup = backup_dir
                .as_deref()
                .is_some_and(|dir| fs::canonicalize(entry.path()).is_ok_and(|p| p == dir));
            !hidden && !is_backup
        });
        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(root).to_path_buf();
                PatchError::io(path, e.into())
            })?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }

        let mut found: Vec<(PathBuf, Vec<Match>)> = files
            .par_iter()
            .filter_map(|path| {
                let request = OperationRequest::search(path.clone(), pattern).with_options(options.clone());
                match self.execute(&request) {
                    Ok(result) if result.is_success() && !result.matches.is_empty() => {
                        Some((path.clone(), result.matches))
                    }
                    _ => None,
                }
            })
            .collect();
        found.sort_by(|a, b| a.0.cmp(&b.0));
        debug!(target: "safe_patcher::service", root = %root.display(), files = found.len(), "tree search finished");
        Ok(found)
    }

    fn dispatch(&self, request: &OperationRequest) -> Result<OperationResult, PatchError> {
        let options = &request.options;
        let language = syntax::detect(&request.path, options.language_hint.as_deref());
        let required = required_capabilities(options, &request.pattern, language);
        let engine = self.registry.select(&required, language)?;

        if request.kind.is_read_only() {
            let label = format!("{}@{}", request.cache_label(), engine.name());
            let matches = self.cache.read_through(&request.path, &label, |content| {
                let input = engine_input(request, content, language);
                Ok(engine.execute(request.kind, &input, "")?.matches)
            })?;
            if matches.is_empty() {
                return Err(PatchError::PatternNotFound {
                    path: request.path.clone(),
                    pattern: request.pattern.clone(),
                });
            }
            return Ok(OperationResult::success(matches).with_meta("engine", engine.name()));
        }

        self.mutate(request, engine.as_ref(), language)
    }

    fn mutate(
        &self,
        request: &OperationRequest,
        engine: &dyn Engine,
        language: Option<SupportLang>,
    ) -> Result<OperationResult, PatchError> {
        let path = &request.path;
        let content = fs::read_to_string(path).map_err(|e| PatchError::io(path, e))?;
        let mutation = engine.execute(request.kind, &engine_input(request, &content, language), &request.content)?;

        if mutation.content == content {
            return Ok(OperationResult::success(mutation.matches).with_meta("engine", engine.name()));
        }

        let label = request.kind.as_str();
        let new_content = mutation.content.clone();
        let (_, outcome) = self
            .validator
            .run(path, label, request.options.language_hint.as_deref(), |_| {
                Edit::whole_file(path, &content, new_content)
                    .apply()
                    .map_err(|source| PatchError::Edit {
                        path: path.clone(),
                        source,
                    })
            })?;
        self.cache.invalidate_path(path);

        info!(
            target: "safe_patcher::service",
            path = %path.display(),
            kind = %request.kind,
            engine = engine.name(),
            applied = mutation.applied,
            "mutation applied"
        );

        let mut result = OperationResult::success(mutation.matches)
            .with_meta("engine", engine.name())
            .with_meta("snapshot", outcome.valid_snapshot.location.display().to_string());
        // Applied, but the structure regressed.
        if !outcome.warnings.is_empty() {
            result.status = OperationStatus::PartialSuccess;
            result = result.with_meta("warnings", outcome.warnings);
        }
        result.modified_content = Some(mutation.content);
        result.mutations_applied = mutation.applied;
        Ok(result)
    }
}
