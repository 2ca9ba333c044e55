//! Safe Patcher: guarded mutation of source files
//!
//! Automated callers insert, replace, delete and extract fragments of source
//! files with one guarantee: a failed or corrupting mutation never leaves the
//! file worse than before.
//!
//! # Architecture
//!
//! - **Matchers** ([`matcher`]) locate patterns: literal, regex, fuzzy,
//!   multiline, block and ast-grep structural. Built by a [`PatternFactory`].
//! - **Engines** ([`engine`]) turn matches into in-memory mutations and
//!   advertise [`Capability`] sets. The [`EngineRegistry`] picks the best
//!   healthy engine for a request and falls back to the baseline engine.
//! - **Backups** ([`backup`]) keep provisional and confirmed-valid snapshots
//!   on disk; [`TransactionManager`] groups files for reverse-order rollback.
//! - **Integrity** ([`integrity`]) checks syntax before and after every write
//!   and rolls back on corruption.
//!
//! All writes go through [`Edit`], a verified byte-span replacement written
//! atomically (tempfile + fsync + rename).
//!
//! # Example
//!
//! ```no_run
//! use safe_patcher::{OperationRequest, SafePatcher, Settings};
//!
//! let patcher = SafePatcher::new(Settings::default());
//! let request = OperationRequest::replace("src/greeting.py", "Hello World", "Hello API");
//!
//! match patcher.execute(&request) {
//!     Ok(result) if result.is_success() => println!("applied {}", result.mutations_applied),
//!     Ok(result) => eprintln!("failed: {:?}", result.error),
//!     Err(e) => eprintln!("integrity violation: {e}"),
//! }
//! ```

pub mod backup;
pub mod cache;
pub mod capability;
pub mod config;
pub mod edit;
pub mod engine;
pub mod error;
pub mod integrity;
pub mod matcher;
pub mod operation;
pub mod service;
pub mod syntax;
pub mod telemetry;
pub mod transaction;
pub mod validate;

// Re-exports
pub use backup::{BackupError, BackupManager, Snapshot, SnapshotClass};
pub use cache::{CacheStats, ContentCache};
pub use capability::{Capability, CapabilitySet};
pub use config::{load_from_path, load_from_str, ConfigError, Settings};
pub use edit::{Edit, EditError, EditResult, EditVerification};
pub use engine::{Engine, EngineFactory, EngineInput, EngineParams, EngineRegistry, Mutation};
pub use error::{FailureKind, PatchError};
pub use integrity::{IntegrityGuard, IntegrityOutcome, IntegrityReport, IntegrityState, IntegrityValidator};
pub use matcher::{
    Match, MatchOptions, Matcher, MatcherCombiner, MatcherConfig, MatcherError, PatternFactory, PatternKind,
    UseCase,
};
pub use operation::{
    OperationError, OperationKind, OperationOptions, OperationRequest, OperationResult, OperationStatus,
};
pub use service::SafePatcher;
pub use transaction::{Participant, ParticipantKind, RollbackReport, TransactionError, TransactionManager, TransactionState};
pub use validate::{ErrorLocation, StructureMetrics, SyntaxCheck, SyntaxReport, TreeSitterCheck};
