//! Snapshot differencing for `pn-expect snapshot` checks.
//!
//! The first run stores the query output as the accepted baseline and passes.
//! Later runs store the output as the pending snapshot and diff it against
//! the baseline. Rows are compared as sets of non-empty `(column, value)`
//! pairs, so column order and NULL-vs-missing differences do not count as
//! changes. Diff rows carry a leading `change` column (`added` / `removed`)
//! and go through the row merger keyed on `(change, id column)`.

use std::collections::HashSet;
use std::path::Path;

use crate::csv_store::{self, PersistError};
use crate::merge::{self, Classification};
use crate::types::{CheckStatus, Row};

/// Name of the column tagging each diff row.
pub const CHANGE_COLUMN: &str = "change";

/// Result of evaluating one snapshot check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotOutcome {
    /// Merged diff rows (empty on the first run).
    pub rows: Vec<Row>,
    /// Counts and status of `rows`.
    pub classification: Classification,
    /// Whether this run created the baseline.
    pub baseline_created: bool,
}

/// Where a snapshot check keeps its files.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotPaths<'p> {
    /// Accepted baseline.
    pub snapshot: &'p Path,
    /// Pending snapshot from the latest run.
    pub pending: &'p Path,
    /// Merged diff with approval decisions.
    pub result: &'p Path,
}

/// Compare `current` against the stored baseline and persist the outcome.
///
/// # Errors
///
/// Returns [`PersistError`] if any snapshot or result file cannot be read or
/// written.
pub fn evaluate(
    current: &[Row],
    id_column: &str,
    approve_column: &str,
    paths: SnapshotPaths<'_>,
) -> Result<SnapshotOutcome, PersistError> {
    let Some(baseline) = csv_store::read_rows_if_exists(paths.snapshot)? else {
        csv_store::write_rows(paths.snapshot, current)?;
        log::info!("Created snapshot baseline {}", paths.snapshot.display());
        return Ok(SnapshotOutcome {
            rows: Vec::new(),
            classification: Classification {
                error_count: 0,
                to_be_reviewed_count: 0,
                status: CheckStatus::Pass,
            },
            baseline_created: true,
        });
    };

    csv_store::write_rows(paths.pending, current)?;

    let diff = diff_rows(&baseline, current);
    let previous = csv_store::read_previous_rows(paths.result);
    let rows = merge::merge_by(diff, &[CHANGE_COLUMN, id_column], approve_column, &previous);
    csv_store::write_rows(paths.result, &rows)?;

    let classification = merge::classify(&rows, approve_column);
    log::debug!(
        "Snapshot diff for {}: {} changed rows",
        paths.snapshot.display(),
        rows.len()
    );
    Ok(SnapshotOutcome {
        rows,
        classification,
        baseline_created: false,
    })
}

/// Symmetric difference of two row sets.
///
/// Rows only in `pending` come first, tagged `added`, in `pending` order.
/// Rows only in `baseline` follow, tagged `removed`, in `baseline` order.
/// Duplicates collapse to one diff row.
#[must_use]
pub fn diff_rows(baseline: &[Row], pending: &[Row]) -> Vec<Row> {
    let baseline_keys: HashSet<Vec<(&str, &str)>> = baseline.iter().map(canonical).collect();
    let pending_keys: HashSet<Vec<(&str, &str)>> = pending.iter().map(canonical).collect();

    let mut diff = Vec::new();
    let mut emitted = HashSet::new();
    for row in pending {
        let key = canonical(row);
        if !baseline_keys.contains(&key) && emitted.insert(key) {
            diff.push(tagged(row, "added"));
        }
    }
    let mut emitted = HashSet::new();
    for row in baseline {
        let key = canonical(row);
        if !pending_keys.contains(&key) && emitted.insert(key) {
            diff.push(tagged(row, "removed"));
        }
    }
    diff
}

/// Sorted non-empty `(column, value)` pairs.
fn canonical(row: &Row) -> Vec<(&str, &str)> {
    let mut pairs: Vec<(&str, &str)> = row
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    pairs.sort_unstable();
    pairs
}

fn tagged(row: &Row, change: &str) -> Row {
    let mut out = Row::with_capacity(row.len() + 1);
    out.insert(CHANGE_COLUMN.to_owned(), change.to_owned());
    for (k, v) in row {
        if k != CHANGE_COLUMN {
            out.insert(k.clone(), v.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn ids(values: &[&str]) -> Vec<Row> {
        values
            .iter()
            .map(|v| {
                let mut r = Row::new();
                r.insert("id".to_owned(), (*v).to_owned());
                r
            })
            .collect()
    }

    fn changes(rows: &[Row]) -> Vec<(String, String)> {
        rows.iter()
            .map(|r| (r["change"].clone(), r["id"].clone()))
            .collect()
    }

    #[test]
    fn test_diff_added_and_removed() {
        let diff = diff_rows(&ids(&["A", "B", "C"]), &ids(&["B", "C", "D"]));
        assert_eq!(
            changes(&diff),
            vec![
                ("added".to_owned(), "D".to_owned()),
                ("removed".to_owned(), "A".to_owned()),
            ]
        );
    }

    #[test]
    fn test_diff_identical_is_empty() {
        assert!(diff_rows(&ids(&["A", "B"]), &ids(&["B", "A"])).is_empty());
    }

    #[test]
    fn test_diff_ignores_column_order_and_empty_cells() {
        let mut a = Row::new();
        a.insert("id".to_owned(), "1".to_owned());
        a.insert("note".to_owned(), String::new());
        a.insert("v".to_owned(), "x".to_owned());
        let mut b = Row::new();
        b.insert("v".to_owned(), "x".to_owned());
        b.insert("id".to_owned(), "1".to_owned());
        assert!(diff_rows(&[a], &[b]).is_empty());
    }

    #[test]
    fn test_diff_collapses_duplicates() {
        let diff = diff_rows(&[], &ids(&["A", "A"]));
        assert_eq!(diff.len(), 1);
    }

    #[test]
    fn test_change_column_comes_first() {
        let diff = diff_rows(&[], &ids(&["A"]));
        assert_eq!(diff[0].get_index(0).unwrap().0, "change");
    }

    fn paths_in(dir: &Path) -> (std::path::PathBuf, std::path::PathBuf, std::path::PathBuf) {
        (
            dir.join("f.check1.snapshot.csv"),
            dir.join("f.check1.new.csv"),
            dir.join("f.check1.csv"),
        )
    }

    #[test]
    fn test_first_run_creates_baseline_and_passes() {
        let dir = tempdir().unwrap();
        let (snapshot, pending, result) = paths_in(dir.path());
        let paths = SnapshotPaths {
            snapshot: &snapshot,
            pending: &pending,
            result: &result,
        };

        let outcome = evaluate(&ids(&["A", "B", "C"]), "id", "approved", paths).unwrap();
        assert!(outcome.baseline_created);
        assert!(outcome.rows.is_empty());
        assert_eq!(outcome.classification.status, CheckStatus::Pass);
        assert!(snapshot.is_file());
        assert!(!pending.exists());
        assert!(!result.exists());
    }

    #[test]
    fn test_second_run_diffs_against_baseline() {
        let dir = tempdir().unwrap();
        let (snapshot, pending, result) = paths_in(dir.path());
        let paths = SnapshotPaths {
            snapshot: &snapshot,
            pending: &pending,
            result: &result,
        };

        evaluate(&ids(&["A", "B", "C"]), "id", "approved", paths).unwrap();
        let outcome = evaluate(&ids(&["B", "C", "D"]), "id", "approved", paths).unwrap();

        assert!(!outcome.baseline_created);
        assert_eq!(outcome.rows.len(), 2);
        assert_eq!(outcome.classification.to_be_reviewed_count, 2);
        assert_eq!(outcome.classification.error_count, 2);
        assert_eq!(outcome.classification.status, CheckStatus::ToReview);
        assert_eq!(csv_store::read_rows(&pending).unwrap(), ids(&["B", "C", "D"]));
        assert_eq!(csv_store::read_rows(&result).unwrap().len(), 2);
    }

    #[test]
    fn test_stored_decisions_carry_over_on_rerun() {
        let dir = tempdir().unwrap();
        let (snapshot, pending, result) = paths_in(dir.path());
        let paths = SnapshotPaths {
            snapshot: &snapshot,
            pending: &pending,
            result: &result,
        };

        evaluate(&ids(&["A"]), "id", "approved", paths).unwrap();
        evaluate(&ids(&["B"]), "id", "approved", paths).unwrap();

        let mut stored = csv_store::read_rows(&result).unwrap();
        for row in &mut stored {
            row.insert("approved".to_owned(), "1".to_owned());
        }
        csv_store::write_rows(&result, &stored).unwrap();

        let outcome = evaluate(&ids(&["B"]), "id", "approved", paths).unwrap();
        assert_eq!(outcome.classification.status, CheckStatus::Pass);
    }

    #[test]
    fn test_unreadable_previous_result_counts_as_empty() {
        let dir = tempdir().unwrap();
        let (snapshot, pending, result) = paths_in(dir.path());
        let paths = SnapshotPaths {
            snapshot: &snapshot,
            pending: &pending,
            result: &result,
        };

        evaluate(&ids(&["A"]), "id", "approved", paths).unwrap();
        std::fs::write(&result, b"change,id,approved\n\xff,\xfe,1\n").unwrap();

        let outcome = evaluate(&ids(&["B"]), "id", "approved", paths).unwrap();
        assert_eq!(outcome.rows.len(), 2);
        assert!(outcome.rows.iter().all(|r| r["approved"].is_empty()));
        assert_eq!(outcome.classification.status, CheckStatus::ToReview);
        assert_eq!(csv_store::read_rows(&result).unwrap().len(), 2);
    }
}
