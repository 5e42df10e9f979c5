//! Piton check engine: data-quality checks written as annotated SQL files.
//!
//! A `*.piton.sql` file names a SQL dialect and connection in `-- pn-`
//! comment directives, followed by one or more check blocks. Each check runs
//! a query whose rows are either findings to review (`no_results`) or a
//! dataset to compare against an accepted baseline (`snapshot`). Results are
//! persisted as CSV next to the check file and carry reviewer decisions
//! across runs.
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::atomic::AtomicBool;
//!
//! use piton_check_engine::{discover_check_files, CheckStore, EngineConfig, RunEngine};
//!
//! let root = Path::new("checks");
//! let config = EngineConfig::load_from_project(root).unwrap_or_default();
//!
//! let mut store = CheckStore::new(config.clone());
//! store.parse_all(&discover_check_files(root, &config));
//!
//! let engine = RunEngine::new(config.clone());
//! let outcome = store.run_all(&engine, &AtomicBool::new(false));
//! piton_check_engine::reporter::write_summary(root, &config, &outcome.results).unwrap();
//! ```

pub mod adapter;
pub mod approval;
pub mod config;
pub mod csv_store;
pub mod directive;
pub mod discovery;
pub mod engine;
pub mod merge;
pub mod parser;
pub mod reporter;
pub mod secrets;
pub mod snapshot;
pub mod store;
pub mod types;

pub use adapter::{AdapterError, AdapterRegistry, SqlAdapter};
pub use approval::{approve, deny, ApprovalError};
pub use config::EngineConfig;
pub use discovery::discover_check_files;
pub use engine::{BatchOutcome, RunEngine, RunError};
pub use parser::{parse_file, ParsedFile};
pub use secrets::SecretProvider;
pub use store::CheckStore;
pub use types::{
    CheckFile, CheckPart, CheckResult, CheckStatus, Dialect, Expect, FileResult, PartType, Row,
};
