//! Run engine: executes parsed check files against their backend.
//!
//! Per file the engine connects, runs the count query, runs every check
//! query in order, merges or diffs the rows against persisted state, and
//! aggregates the file status. Connection and count-query failures are fatal
//! for the file and propagated. A failing check query only drops that check
//! from the results. The connection is closed on every exit path.
//!
//! Execution is sequential. Batches check a cancellation flag between files.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;

use crate::adapter::{AdapterError, AdapterRegistry, SqlAdapter};
use crate::config::EngineConfig;
use crate::csv_store::{self, PersistError};
use crate::merge;
use crate::secrets::{self, NoSecrets, SecretProvider};
use crate::snapshot::{self, SnapshotPaths};
use crate::types::{CheckFile, CheckPart, CheckResult, CheckStatus, Dialect, Expect, FileResult, Row};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures that abort a whole file run.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// No adapter is registered for the file's dialect.
    #[error("[R001] No adapter registered for dialect {0}")]
    UnknownAdapter(Dialect),

    /// The backend connection could not be opened.
    #[error("[R002] Connection failed for {file}: {source}")]
    Connection {
        /// Check file name.
        file: String,
        /// Adapter error.
        #[source]
        source: AdapterError,
    },

    /// The `pn-count` query failed.
    #[error("[R003] Count query failed for {file}: {source}")]
    CountQuery {
        /// Check file name.
        file: String,
        /// Adapter error.
        #[source]
        source: AdapterError,
    },

    /// A result or snapshot file could not be written.
    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Outcome of [`RunEngine::run_batch`].
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Results of the files that ran, in run order.
    pub results: Vec<FileResult>,
    /// Files that failed fatally, with the reason.
    pub failures: Vec<(String, RunError)>,
    /// Whether the batch stopped early on request.
    pub cancelled: bool,
}

// ---------------------------------------------------------------------------
// Connection guard
// ---------------------------------------------------------------------------

/// Owns the adapter for one file run and closes it when dropped.
struct OpenConnection<'f> {
    adapter: Box<dyn SqlAdapter>,
    file: &'f str,
}

impl Drop for OpenConnection<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.adapter.close_connection() {
            log::warn!("Failed to close connection for {}: {e}", self.file);
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Executes check files.
pub struct RunEngine {
    config: EngineConfig,
    registry: AdapterRegistry,
    secrets: Box<dyn SecretProvider>,
}

impl RunEngine {
    /// Engine with the built-in adapters and no credentials.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            registry: AdapterRegistry::with_builtin(),
            secrets: Box::new(NoSecrets),
        }
    }

    /// Replace the adapter registry.
    #[must_use]
    pub fn with_registry(mut self, registry: AdapterRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Replace the credential source.
    #[must_use]
    pub fn with_secrets(mut self, secrets: impl SecretProvider + 'static) -> Self {
        self.secrets = Box::new(secrets);
        self
    }

    /// The engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run every check of `file`.
    ///
    /// # Errors
    ///
    /// [`RunError`] when the connection, the count query, or persistence
    /// fails. No partial result is returned in that case.
    pub fn run_file(&self, file: &CheckFile) -> Result<FileResult, RunError> {
        let dialect = match file.sql_dialect {
            Some(d) if !file.skip => d,
            _ => {
                log::info!("Skipping check file {}", file.name);
                return Ok(FileResult::skipped(file));
            }
        };

        log::info!("Running check file {}", file.name);
        let adapter = self
            .registry
            .create(dialect)
            .ok_or(RunError::UnknownAdapter(dialect))?;
        let mut conn = OpenConnection {
            adapter,
            file: &file.name,
        };

        let connection_string = secrets::resolve_password(
            file.connection_string.as_deref().unwrap_or(""),
            file.connection_user.as_deref(),
            self.secrets.as_ref(),
        );
        if let Err(source) = conn.adapter.setup_connection(&connection_string) {
            log::error!("Connection failed for {}: {source}", file.name);
            return Err(RunError::Connection {
                file: file.name.clone(),
                source,
            });
        }

        let count = match &file.count_query {
            None => 0,
            Some(query) => {
                log::debug!("Count query for {}:\n{query}", file.name);
                conn.adapter.count_sql(query).map_err(|source| {
                    log::error!("Count query failed for {}: {source}", file.name);
                    RunError::CountQuery {
                        file: file.name.clone(),
                        source,
                    }
                })?
            }
        };

        let mut part_results = Vec::new();
        for part in file.checks() {
            if part.skip {
                log::debug!("Skipping {} in {}", part.display_name(), file.name);
                continue;
            }
            if let Some(result) = self.run_part(conn.adapter.as_mut(), file, part)? {
                part_results.push(result);
            }
        }
        drop(conn);

        let error_count = part_results.iter().map(|r| r.error_count).sum();
        let to_be_reviewed_count = part_results.iter().map(|r| r.to_be_reviewed_count).sum();
        let passed = part_results
            .iter()
            .filter(|r| r.result == CheckStatus::Pass)
            .count();
        let total = file.checks().count();
        let result = CheckStatus::from_counts(error_count, to_be_reviewed_count);
        let result_summary = format!("{passed}/{total} checks passed for {count} records");
        log::info!("{}: {result} ({result_summary})", file.name);

        Ok(FileResult {
            file_name: file.name.clone(),
            folder_path: file.folder_path.clone(),
            count,
            error_count,
            to_be_reviewed_count,
            result,
            result_summary,
            part_results,
        })
    }

    /// Run one check. `Ok(None)` means the query failed and the check is omitted.
    fn run_part(
        &self,
        adapter: &mut dyn SqlAdapter,
        file: &CheckFile,
        part: &CheckPart,
    ) -> Result<Option<CheckResult>, RunError> {
        let (Some(query), Some(id_column)) = (&part.sanitized_query, &part.id_column) else {
            return Ok(None);
        };

        log::debug!("Query for {} in {}:\n{query}", part.display_name(), file.name);
        let rows = match adapter.query_sql(query) {
            Ok(rows) => rows,
            Err(e) => {
                log::warn!(
                    "Check {} in {} failed and was skipped: {e}",
                    part.display_name(),
                    file.name
                );
                return Ok(None);
            }
        };
        if log::log_enabled!(log::Level::Debug) {
            log::debug!("{}", preview_rows(&rows, self.config.log_preview_rows));
        }

        let (result_data, classification) = match part.expect {
            Expect::NoResults => {
                let previous = csv_store::read_previous_rows(&part.result_path);
                let merged =
                    merge::merge_with_previous(rows, id_column, &part.approve_column, &previous);
                let classification = merge::classify(&merged, &part.approve_column);
                if self.config.write_results {
                    csv_store::write_rows(&part.result_path, &merged)?;
                }
                (merged, classification)
            }
            Expect::Snapshot => {
                let outcome = snapshot::evaluate(
                    &rows,
                    id_column,
                    &part.approve_column,
                    SnapshotPaths {
                        snapshot: &part.snapshot_path,
                        pending: &part.new_snapshot_path,
                        result: &part.result_path,
                    },
                )?;
                (outcome.rows, outcome.classification)
            }
        };

        Ok(Some(CheckResult {
            order: part.order,
            name: part.name.clone(),
            tag: part.tag.clone(),
            query: query.clone(),
            result: classification.status,
            result_data,
            error_count: classification.error_count,
            to_be_reviewed_count: classification.to_be_reviewed_count,
            last_run: Utc::now(),
            result_file: part.result_path.clone(),
        }))
    }

    /// Run `files` in order, checking `cancel` before each one.
    ///
    /// A fatal error in one file is recorded and the batch moves on.
    pub fn run_batch<'a, I>(&self, files: I, cancel: &AtomicBool) -> BatchOutcome
    where
        I: IntoIterator<Item = &'a CheckFile>,
    {
        let mut outcome = BatchOutcome::default();
        for file in files {
            if cancel.load(Ordering::Relaxed) {
                log::info!("Batch run cancelled before {}", file.name);
                outcome.cancelled = true;
                break;
            }
            match self.run_file(file) {
                Ok(result) => outcome.results.push(result),
                Err(e) => outcome.failures.push((file.name.clone(), e)),
            }
        }
        outcome
    }
}

/// A short table of the first `limit` rows for the debug log.
fn preview_rows(rows: &[Row], limit: usize) -> String {
    let Some(first) = rows.first() else {
        return "(no rows)".to_owned();
    };
    let mut out = first
        .keys()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" | ");
    for row in rows.iter().take(limit) {
        out.push('\n');
        out.push_str(&row.values().map(String::as_str).collect::<Vec<_>>().join(" | "));
    }
    if rows.len() > limit {
        out.push_str(&format!("\n({} more rows)", rows.len() - limit));
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
