//! Check file discovery.
//!
//! Uses the `ignore` crate for `.gitignore`-aware walking, plus support for a
//! `.pitonignore` file with gitignore-compatible syntax. Only files whose name
//! ends with the configured suffix (`.piton.sql` by default) are returned.

use std::path::Path;

use ignore::WalkBuilder;
use sha2::{Digest, Sha256};

use crate::config::EngineConfig;
use crate::types::DiscoveredFile;

/// Directory names that are always excluded from file walking.
const HARDCODED_EXCLUDES: &[&str] = &[".git", "node_modules", "target", ".venv"];

/// Walk `root` and return every check file, sorted by relative path.
///
/// Respects `.gitignore`, `.pitonignore`, hardcoded exclusions, and the
/// config's `exclude` patterns. Unreadable files are logged and skipped.
pub fn discover_check_files(root: &Path, config: &EngineConfig) -> Vec<DiscoveredFile> {
    let mut builder = WalkBuilder::new(root);
    builder.git_ignore(true);
    builder.git_global(false);
    builder.git_exclude(false);

    let piton_ignore = root.join(".pitonignore");
    if piton_ignore.is_file() {
        builder.add_ignore(&piton_ignore);
    }

    let excludes = build_exclude_set(&config.exclude);
    let mut files = Vec::new();

    for entry in builder.build().flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !file_name.ends_with(&config.file_suffix) {
            continue;
        }

        let rel_path = match path.strip_prefix(root) {
            Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
            Err(_) => path.to_string_lossy().replace('\\', "/"),
        };

        if is_in_excluded_dir(&rel_path) || is_config_excluded(&rel_path, config, &excludes) {
            continue;
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                log::warn!("Skipping file {} (read error: {e})", path.display());
                continue;
            }
        };

        let content_hash = compute_sha256(&content);
        files.push(DiscoveredFile {
            folder: path.parent().unwrap_or(root).to_path_buf(),
            file_name: file_name.to_owned(),
            rel_path,
            content,
            content_hash,
        });
    }

    files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    log::debug!("Discovered {} check files under {}", files.len(), root.display());
    files
}

fn is_in_excluded_dir(rel_path: &str) -> bool {
    let mut components: Vec<&str> = rel_path.split('/').collect();
    components.pop();
    components
        .iter()
        .any(|c| HARDCODED_EXCLUDES.contains(c))
}

fn build_exclude_set(patterns: &[String]) -> globset::GlobSet {
    let mut builder = globset::GlobSetBuilder::new();
    for pattern in patterns {
        match globset::Glob::new(pattern) {
            Ok(glob) => {
                builder.add(glob);
            }
            Err(e) => log::warn!("Ignoring invalid exclude pattern '{pattern}': {e}"),
        }
    }
    builder.build().unwrap_or_else(|e| {
        log::warn!("Failed to build exclude set: {e}");
        globset::GlobSet::empty()
    })
}

/// Whether a relative path matches a config-level exclusion.
fn is_config_excluded(rel_path: &str, config: &EngineConfig, globs: &globset::GlobSet) -> bool {
    for pattern in &config.exclude {
        // Prefix matching for directory patterns (e.g., "archive/")
        let normalized = pattern.trim_end_matches('/');
        if normalized.is_empty() {
            continue;
        }
        if rel_path.starts_with(&format!("{normalized}/"))
            || rel_path.contains(&format!("/{normalized}/"))
        {
            return true;
        }
    }
    globs.is_match(rel_path)
}

/// Compute the SHA-256 hex digest of a string.
#[must_use]
pub fn compute_sha256(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_discover_only_suffix_matches() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("orders.piton.sql"), "-- pn-sqlDialect duckdb").unwrap();
        fs::write(dir.path().join("model.sql"), "SELECT 1").unwrap();
        fs::write(dir.path().join("orders.piton.sql.check1.csv"), "id\n1\n").unwrap();

        let files = discover_check_files(dir.path(), &EngineConfig::default());
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file_name, "orders.piton.sql");
        assert_eq!(files[0].folder, dir.path());
    }

    #[test]
    fn test_discover_sorted_with_forward_slashes() {
        let dir = tempdir().unwrap();
        let sub = dir.path().join("b").join("nested");
        fs::create_dir_all(&sub).unwrap();
        fs::write(sub.join("z.piton.sql"), "").unwrap();
        fs::write(dir.path().join("a.piton.sql"), "").unwrap();

        let files = discover_check_files(dir.path(), &EngineConfig::default());
        let paths: Vec<&str> = files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(paths, vec!["a.piton.sql", "b/nested/z.piton.sql"]);
    }

    #[test]
    fn test_discover_excludes_hardcoded_dirs() {
        let dir = tempdir().unwrap();
        let modules = dir.path().join("node_modules");
        fs::create_dir_all(&modules).unwrap();
        fs::write(modules.join("vendored.piton.sql"), "").unwrap();
        fs::write(dir.path().join("mine.piton.sql"), "").unwrap();

        let files = discover_check_files(dir.path(), &EngineConfig::default());
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].rel_path, "mine.piton.sql");
    }

    #[test]
    fn test_discover_config_exclude() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("archive");
        fs::create_dir_all(&archive).unwrap();
        fs::write(archive.join("old.piton.sql"), "").unwrap();
        fs::write(dir.path().join("draft_x.piton.sql"), "").unwrap();
        fs::write(dir.path().join("live.piton.sql"), "").unwrap();

        let mut config = EngineConfig::default();
        config.exclude = vec!["archive/".to_owned(), "draft_*".to_owned()];
        let files = discover_check_files(dir.path(), &config);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].rel_path, "live.piton.sql");
    }

    #[test]
    fn test_discover_pitonignore() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(".pitonignore"), "legacy_*.piton.sql\n").unwrap();
        fs::write(dir.path().join("legacy_a.piton.sql"), "").unwrap();
        fs::write(dir.path().join("current.piton.sql"), "").unwrap();

        let files = discover_check_files(dir.path(), &EngineConfig::default());
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].rel_path, "current.piton.sql");
    }

    #[test]
    fn test_discover_custom_suffix() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.check.sql"), "").unwrap();
        fs::write(dir.path().join("b.piton.sql"), "").unwrap();

        let mut config = EngineConfig::default();
        config.file_suffix = ".check.sql".to_owned();
        let files = discover_check_files(dir.path(), &config);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file_name, "a.check.sql");
    }

    #[test]
    fn test_compute_sha256() {
        let hash = compute_sha256("SELECT 1");
        assert!(hash.starts_with("sha256:"));
        assert_eq!(hash.len(), 7 + 64);
        assert_eq!(hash, compute_sha256("SELECT 1"));
        assert_ne!(hash, compute_sha256("SELECT 2"));
    }
}
