//! Explicit store of parsed check files and their latest results.
//!
//! The store is owned by the caller and starts empty. Entries are keyed by
//! the file's path relative to the discovery root, so equally named files in
//! different folders live side by side. Re-parsing a file replaces its entry
//! wholesale and drops its stale result.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::AtomicBool;

use rayon::prelude::*;

use crate::config::EngineConfig;
use crate::discovery::compute_sha256;
use crate::engine::{BatchOutcome, RunEngine};
use crate::parser::{parse_file_with_config, ParsedFile};
use crate::reporter;
use crate::types::{CheckFile, Diagnostic, DiscoveredFile, FileResult, SummaryRow};

/// A parsed file with its diagnostics and the hash of the text it came from.
#[derive(Debug, Clone)]
pub struct StoredFile {
    /// Path relative to the discovery root; the store key.
    pub rel_path: String,
    /// The parsed file.
    pub file: CheckFile,
    /// Parse diagnostics after rule overrides.
    pub diagnostics: Vec<Diagnostic>,
    /// `sha256:` digest of the source text.
    pub content_hash: String,
}

/// Parsed files and results, keyed by relative path.
#[derive(Debug, Default)]
pub struct CheckStore {
    config: EngineConfig,
    files: BTreeMap<String, StoredFile>,
    results: BTreeMap<String, FileResult>,
}

impl CheckStore {
    /// Empty store.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            files: BTreeMap::new(),
            results: BTreeMap::new(),
        }
    }

    /// Parse one document, unless its text is unchanged since the last parse.
    ///
    /// Returns `true` when the entry was (re)built.
    pub fn parse_document(&mut self, discovered: &DiscoveredFile) -> bool {
        let hash = if discovered.content_hash.is_empty() {
            compute_sha256(&discovered.content)
        } else {
            discovered.content_hash.clone()
        };
        if self
            .files
            .get(&discovered.rel_path)
            .is_some_and(|stored| stored.content_hash == hash)
        {
            return false;
        }

        let stored = parse_one(discovered, hash, &self.config);
        self.results.remove(&discovered.rel_path);
        self.files.insert(discovered.rel_path.clone(), stored);
        true
    }

    /// Replace every entry by parsing `discovered` in parallel.
    pub fn parse_all(&mut self, discovered: &[DiscoveredFile]) {
        let config = &self.config;
        let parsed: Vec<(String, StoredFile)> = discovered
            .par_iter()
            .map(|d| {
                let hash = if d.content_hash.is_empty() {
                    compute_sha256(&d.content)
                } else {
                    d.content_hash.clone()
                };
                (d.rel_path.clone(), parse_one(d, hash, config))
            })
            .collect();

        self.files = parsed.into_iter().collect();
        self.results.clear();
    }

    /// Forget a file and its result.
    pub fn remove(&mut self, rel_path: &str) -> Option<StoredFile> {
        self.results.remove(rel_path);
        self.files.remove(rel_path)
    }

    /// Run every stored file in relative-path order, storing the results.
    pub fn run_all(&mut self, engine: &RunEngine, cancel: &AtomicBool) -> BatchOutcome {
        let outcome = engine.run_batch(self.files.values().map(|s| &s.file), cancel);

        let keys: HashMap<(&Path, &str), &str> = self
            .files
            .values()
            .map(|s| {
                (
                    (s.file.folder_path.as_path(), s.file.name.as_str()),
                    s.rel_path.as_str(),
                )
            })
            .collect();
        let keyed: Vec<(String, FileResult)> = outcome
            .results
            .iter()
            .filter_map(|result| {
                keys.get(&(result.folder_path.as_path(), result.file_name.as_str()))
                    .map(|key| ((*key).to_owned(), result.clone()))
            })
            .collect();
        self.results.extend(keyed);
        outcome
    }

    /// Run the file stored under `rel_path` and store its result.
    ///
    /// Returns `None` when the file is unknown.
    ///
    /// # Errors
    ///
    /// Propagates the engine's fatal [`crate::engine::RunError`].
    pub fn run_file(
        &mut self,
        engine: &RunEngine,
        rel_path: &str,
    ) -> Option<Result<&FileResult, crate::engine::RunError>> {
        let stored = self.files.get(rel_path)?;
        Some(match engine.run_file(&stored.file) {
            Ok(result) => {
                self.results.insert(rel_path.to_owned(), result);
                Ok(&self.results[rel_path])
            }
            Err(e) => {
                self.results.remove(rel_path);
                Err(e)
            }
        })
    }

    /// A stored file.
    #[must_use]
    pub fn get(&self, rel_path: &str) -> Option<&StoredFile> {
        self.files.get(rel_path)
    }

    /// The latest result of a file.
    #[must_use]
    pub fn result(&self, rel_path: &str) -> Option<&FileResult> {
        self.results.get(rel_path)
    }

    /// All stored files, in relative-path order.
    pub fn files(&self) -> impl Iterator<Item = &StoredFile> {
        self.files.values()
    }

    /// All stored results, in relative-path order.
    pub fn results(&self) -> impl Iterator<Item = &FileResult> {
        self.results.values()
    }

    /// Number of stored files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the store holds no files.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// One summary row per executed check across all results.
    #[must_use]
    pub fn summary(&self) -> Vec<SummaryRow> {
        reporter::summary_rows(self.results.values())
    }
}

fn parse_one(discovered: &DiscoveredFile, content_hash: String, config: &EngineConfig) -> StoredFile {
    let ParsedFile { file, diagnostics } = parse_file_with_config(
        &discovered.folder,
        &discovered.file_name,
        &discovered.content,
        config,
    );
    for d in &diagnostics {
        log::debug!(
            "{}:{}: {} {} {}",
            discovered.rel_path,
            d.line,
            d.severity,
            d.rule_id,
            d.message
        );
    }
    StoredFile {
        rel_path: discovered.rel_path.clone(),
        file,
        diagnostics: config.apply_rule_overrides(diagnostics),
        content_hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CheckStatus;
    use indoc::indoc;
    use std::path::Path;
    use tempfile::tempdir;

    fn discovered_at(folder: &Path, rel_path: &str, name: &str, content: &str) -> DiscoveredFile {
        DiscoveredFile {
            folder: folder.to_path_buf(),
            file_name: name.to_owned(),
            rel_path: rel_path.to_owned(),
            content: content.to_owned(),
            content_hash: compute_sha256(content),
        }
    }

    fn discovered(folder: &Path, name: &str, content: &str) -> DiscoveredFile {
        DiscoveredFile {
            folder: folder.to_path_buf(),
            file_name: name.to_owned(),
            rel_path: name.to_owned(),
            content: content.to_owned(),
            content_hash: compute_sha256(content),
        }
    }

    const SQLITE_FILE: &str = indoc! {"
        -- pn-sqlDialect sqlite

        -- pn-check
        -- pn-id-col id
        SELECT 1 AS id
    "};

    #[test]
    fn test_starts_empty() {
        let store = CheckStore::new(EngineConfig::default());
        assert!(store.is_empty());
        assert!(store.summary().is_empty());
    }

    #[test]
    fn test_parse_document_skips_unchanged_text() {
        let mut store = CheckStore::new(EngineConfig::default());
        let doc = discovered(Path::new("/w"), "a.piton.sql", SQLITE_FILE);
        assert!(store.parse_document(&doc));
        assert!(!store.parse_document(&doc));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_reparse_replaces_and_drops_result() {
        let dir = tempdir().unwrap();
        let mut store = CheckStore::new(EngineConfig::default());
        let engine = RunEngine::new(EngineConfig::default());
        store.parse_document(&discovered(dir.path(), "a.piton.sql", SQLITE_FILE));

        let result = store.run_file(&engine, "a.piton.sql").unwrap().unwrap();
        assert_eq!(result.result, CheckStatus::ToReview);
        assert!(store.result("a.piton.sql").is_some());

        let edited = SQLITE_FILE.replace("SELECT 1 AS id", "SELECT 2 AS id");
        assert!(store.parse_document(&discovered(dir.path(), "a.piton.sql", &edited)));
        assert!(store.result("a.piton.sql").is_none());
        assert_eq!(
            store.get("a.piton.sql").unwrap().file.parts[1]
                .sanitized_query
                .as_deref(),
            Some("SELECT 2 AS id")
        );
    }

    #[test]
    fn test_parse_all_replaces_everything() {
        let mut store = CheckStore::new(EngineConfig::default());
        store.parse_document(&discovered(Path::new("/w"), "old.piton.sql", SQLITE_FILE));
        store.parse_all(&[
            discovered(Path::new("/w"), "b.piton.sql", SQLITE_FILE),
            discovered(Path::new("/w"), "a.piton.sql", "-- nothing here"),
        ]);

        let names: Vec<&str> = store.files().map(|f| f.file.name.as_str()).collect();
        assert_eq!(names, vec!["a.piton.sql", "b.piton.sql"]);
        let a = store.get("a.piton.sql").unwrap();
        assert_eq!(a.diagnostics[0].rule_id, "PN001");
    }

    #[test]
    fn test_rule_overrides_applied() {
        let mut config = EngineConfig::default();
        config
            .rules
            .insert("PN001".to_owned(), crate::config::RuleSeverityOverride::Off);
        let mut store = CheckStore::new(config);
        store.parse_document(&discovered(Path::new("/w"), "a.piton.sql", "-- nothing"));
        assert!(store.get("a.piton.sql").unwrap().diagnostics.is_empty());
    }

    #[test]
    fn test_run_all_in_name_order() {
        let dir = tempdir().unwrap();
        let mut store = CheckStore::new(EngineConfig::default());
        store.parse_document(&discovered(dir.path(), "b.piton.sql", SQLITE_FILE));
        store.parse_document(&discovered(dir.path(), "a.piton.sql", "-- pn-sqlDialect sqlite\n-- pn-skip\n"));

        let engine = RunEngine::new(EngineConfig::default());
        let outcome = store.run_all(&engine, &AtomicBool::new(false));
        let order: Vec<&str> = outcome
            .results
            .iter()
            .map(|r| r.file_name.as_str())
            .collect();
        assert_eq!(order, vec!["a.piton.sql", "b.piton.sql"]);
        assert_eq!(store.result("a.piton.sql").unwrap().result, CheckStatus::Skipped);

        let summary = store.summary();
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].file, "b.piton.sql");
    }

    #[test]
    fn test_same_name_in_different_folders() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        std::fs::create_dir_all(&a).unwrap();
        std::fs::create_dir_all(&b).unwrap();

        let mut store = CheckStore::new(EngineConfig::default());
        store.parse_all(&[
            discovered_at(&a, "a/orders.piton.sql", "orders.piton.sql", SQLITE_FILE),
            discovered_at(&b, "b/orders.piton.sql", "orders.piton.sql", SQLITE_FILE),
        ]);
        assert_eq!(store.len(), 2);

        let engine = RunEngine::new(EngineConfig::default());
        let outcome = store.run_all(&engine, &AtomicBool::new(false));
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(store.result("a/orders.piton.sql").unwrap().folder_path, a);
        assert_eq!(store.result("b/orders.piton.sql").unwrap().folder_path, b);
        assert_eq!(store.summary().len(), 2);
        assert!(a.join("orders.piton.sql.check1.csv").is_file());
        assert!(b.join("orders.piton.sql.check1.csv").is_file());
    }

    #[test]
    fn test_run_unknown_file() {
        let mut store = CheckStore::new(EngineConfig::default());
        let engine = RunEngine::new(EngineConfig::default());
        assert!(store.run_file(&engine, "missing.piton.sql").is_none());
    }
}
