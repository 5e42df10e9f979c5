//! Carry-forward of approval decisions across runs.
//!
//! A freshly returned row inherits the approve value of the previously stored
//! row with the same key, but only if every field of the fresh row is equal to
//! the stored one. Any change in content resets the decision to pending.

use std::collections::HashMap;

use crate::types::{CheckStatus, Row};

/// Outcome of classifying a merged row set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// Rows whose approve value is not `"1"`.
    pub error_count: usize,
    /// Rows whose approve value is empty.
    pub to_be_reviewed_count: usize,
    /// Status derived from the two counts.
    pub status: CheckStatus,
}

/// Merge a fresh result set with the previously stored one, keyed by `id_column`.
///
/// Every returned row carries `approve_column`. It holds the previous value
/// when the previous row under the same id matches field for field, and the
/// empty string otherwise. Row order follows `new_rows`.
#[must_use]
pub fn merge_with_previous(
    new_rows: Vec<Row>,
    id_column: &str,
    approve_column: &str,
    previous: &[Row],
) -> Vec<Row> {
    merge_by(new_rows, &[id_column], approve_column, previous)
}

/// Merge keyed on a composite of `key_columns`.
///
/// Previous rows are indexed by key; when keys repeat the last one wins.
/// Missing key cells count as the empty string.
#[must_use]
pub fn merge_by(
    new_rows: Vec<Row>,
    key_columns: &[&str],
    approve_column: &str,
    previous: &[Row],
) -> Vec<Row> {
    let index: HashMap<Vec<&str>, &Row> = previous
        .iter()
        .map(|row| (row_key(row, key_columns), row))
        .collect();

    new_rows
        .into_iter()
        .map(|mut row| {
            let carried = index
                .get(&row_key(&row, key_columns))
                .filter(|prev| rows_equal(&row, prev, approve_column))
                .and_then(|prev| prev.get(approve_column))
                .cloned()
                .unwrap_or_default();
            row.insert(approve_column.to_owned(), carried);
            row
        })
        .collect()
}

fn row_key<'r>(row: &'r Row, key_columns: &[&str]) -> Vec<&'r str> {
    key_columns
        .iter()
        .map(|col| row.get(*col).map_or("", String::as_str))
        .collect()
}

/// Every field of `new` (except the approve column) equals the same field of
/// `previous`, where a missing field reads as the empty string.
#[must_use]
pub fn rows_equal(new: &Row, previous: &Row, approve_column: &str) -> bool {
    new.iter()
        .filter(|(col, _)| col.as_str() != approve_column)
        .all(|(col, value)| previous.get(col).map_or("", String::as_str) == value)
}

/// Count pending and unapproved rows and derive the status.
#[must_use]
pub fn classify(rows: &[Row], approve_column: &str) -> Classification {
    let mut error_count = 0;
    let mut to_be_reviewed_count = 0;
    for row in rows {
        let value = row.get(approve_column).map_or("", String::as_str);
        if value != "1" {
            error_count += 1;
        }
        if value.is_empty() {
            to_be_reviewed_count += 1;
        }
    }
    Classification {
        error_count,
        to_be_reviewed_count,
        status: CheckStatus::from_counts(error_count, to_be_reviewed_count),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn test_unchanged_row_keeps_approval() {
        let previous = vec![row(&[("id", "1"), ("name", "x"), ("approved", "1")])];
        let merged = merge_with_previous(
            vec![row(&[("id", "1"), ("name", "x")])],
            "id",
            "approved",
            &previous,
        );
        assert_eq!(merged[0].get("approved").unwrap(), "1");
    }

    #[test]
    fn test_changed_row_resets_approval() {
        let previous = vec![row(&[("id", "1"), ("name", "x"), ("approved", "1")])];
        let merged = merge_with_previous(
            vec![row(&[("id", "1"), ("name", "y")])],
            "id",
            "approved",
            &previous,
        );
        assert_eq!(merged[0].get("approved").unwrap(), "");
    }

    #[test]
    fn test_changed_row_resets_denial() {
        let previous = vec![row(&[("id", "1"), ("name", "x"), ("approved", "0")])];
        let merged = merge_with_previous(
            vec![row(&[("id", "1"), ("name", "y")])],
            "id",
            "approved",
            &previous,
        );
        assert_eq!(merged[0].get("approved").unwrap(), "");
    }

    #[test]
    fn test_new_row_is_pending() {
        let merged = merge_with_previous(vec![row(&[("id", "7")])], "id", "approved", &[]);
        assert_eq!(merged[0].get("approved").unwrap(), "");
        assert_eq!(merged[0].len(), 2);
    }

    #[test]
    fn test_extra_column_in_previous_is_ignored() {
        let previous = vec![row(&[("id", "1"), ("old", "z"), ("approved", "1")])];
        let merged =
            merge_with_previous(vec![row(&[("id", "1")])], "id", "approved", &previous);
        assert_eq!(merged[0].get("approved").unwrap(), "1");
    }

    #[test]
    fn test_missing_column_in_previous_reads_empty() {
        let previous = vec![row(&[("id", "1"), ("approved", "1")])];
        let merged = merge_with_previous(
            vec![row(&[("id", "1"), ("note", "")])],
            "id",
            "approved",
            &previous,
        );
        assert_eq!(merged[0].get("approved").unwrap(), "1");
    }

    #[test]
    fn test_fresh_approve_value_is_overwritten() {
        let merged = merge_with_previous(
            vec![row(&[("id", "1"), ("approved", "1")])],
            "id",
            "approved",
            &[],
        );
        assert_eq!(merged[0].get("approved").unwrap(), "");
    }

    #[test]
    fn test_duplicate_previous_keys_last_wins() {
        let previous = vec![
            row(&[("id", "1"), ("approved", "0")]),
            row(&[("id", "1"), ("approved", "1")]),
        ];
        let merged =
            merge_with_previous(vec![row(&[("id", "1")])], "id", "approved", &previous);
        assert_eq!(merged[0].get("approved").unwrap(), "1");
    }

    #[test]
    fn test_merge_is_idempotent() {
        let previous = vec![
            row(&[("id", "1"), ("v", "a"), ("approved", "1")]),
            row(&[("id", "2"), ("v", "b"), ("approved", "0")]),
        ];
        let fresh = vec![row(&[("id", "1"), ("v", "a")]), row(&[("id", "2"), ("v", "b")])];
        let once = merge_with_previous(fresh.clone(), "id", "approved", &previous);
        let twice = merge_with_previous(fresh, "id", "approved", &once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_composite_key() {
        let previous = vec![
            row(&[("change", "added"), ("id", "1"), ("approved", "1")]),
            row(&[("change", "removed"), ("id", "1"), ("approved", "0")]),
        ];
        let merged = merge_by(
            vec![row(&[("change", "removed"), ("id", "1")])],
            &["change", "id"],
            "approved",
            &previous,
        );
        assert_eq!(merged[0].get("approved").unwrap(), "0");
    }

    #[test]
    fn test_classify() {
        let rows = vec![
            row(&[("approved", "1")]),
            row(&[("approved", "0")]),
            row(&[("approved", "")]),
        ];
        let c = classify(&rows, "approved");
        assert_eq!(c.error_count, 2);
        assert_eq!(c.to_be_reviewed_count, 1);
        assert_eq!(c.status, CheckStatus::ToReview);
    }

    #[test]
    fn test_classify_all_approved_and_empty() {
        let rows = vec![row(&[("approved", "1")])];
        assert_eq!(classify(&rows, "approved").status, CheckStatus::Pass);
        assert_eq!(classify(&[], "approved").status, CheckStatus::Pass);
        let denied = vec![row(&[("approved", "0")])];
        assert_eq!(classify(&denied, "approved").status, CheckStatus::Fail);
    }
}
