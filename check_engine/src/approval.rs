//! Reviewer decisions on persisted check results.
//!
//! For `no_results` checks, approve writes `1` and deny writes `0` into the
//! approve column of every stored row, leaving rows already in the opposite
//! terminal state untouched. For `snapshot` checks, approve promotes the
//! pending snapshot to the accepted baseline and deny leaves both files
//! as they are.
//!
//! Every operation either completes or leaves the files unchanged.

use std::path::PathBuf;

use crate::csv_store::{self, PersistError};
use crate::types::{CheckPart, Expect, PartType};

/// Reasons an approval action could not be applied.
#[derive(Debug, thiserror::Error)]
pub enum ApprovalError {
    /// The check has never produced a result file.
    #[error("[AP001] Nothing to review: result file '{}' does not exist", .0.display())]
    MissingResultFile(PathBuf),

    /// There is no pending snapshot to promote.
    #[error("[AP002] No pending snapshot at '{}'", .0.display())]
    MissingPendingSnapshot(PathBuf),

    /// The part is not an executable check.
    #[error("[AP003] '{0}' is not a check")]
    NotACheck(String),

    /// Reading or writing the result file failed.
    #[error(transparent)]
    Persist(#[from] PersistError),

    /// Promoting the pending snapshot failed.
    #[error("[AP004] Failed to promote snapshot '{}': {source}", path.display())]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Mark every pending or failing row as approved, or promote the snapshot.
///
/// # Errors
///
/// See [`ApprovalError`].
pub fn approve(part: &CheckPart) -> Result<(), ApprovalError> {
    ensure_check(part)?;
    match part.expect {
        Expect::NoResults => set_decision(part, "1", "0")?,
        Expect::Snapshot => promote_snapshot(part)?,
    }
    log::info!("Approved {}", part.display_name());
    Ok(())
}

/// Mark every pending or approved row as denied. A no-op for snapshots.
///
/// # Errors
///
/// See [`ApprovalError`].
pub fn deny(part: &CheckPart) -> Result<(), ApprovalError> {
    ensure_check(part)?;
    if part.expect == Expect::NoResults {
        set_decision(part, "0", "1")?;
    }
    log::info!("Denied {}", part.display_name());
    Ok(())
}

fn ensure_check(part: &CheckPart) -> Result<(), ApprovalError> {
    if part.part_type == PartType::Check {
        Ok(())
    } else {
        Err(ApprovalError::NotACheck(part.display_name()))
    }
}

/// Write `value` into every row not holding `keep`.
fn set_decision(part: &CheckPart, value: &str, keep: &str) -> Result<(), ApprovalError> {
    let mut rows = csv_store::read_rows_if_exists(&part.result_path)?
        .ok_or_else(|| ApprovalError::MissingResultFile(part.result_path.clone()))?;

    for row in &mut rows {
        let current = row.get(&part.approve_column).map(String::as_str);
        if current != Some(keep) {
            row.insert(part.approve_column.clone(), value.to_owned());
        }
    }
    csv_store::write_rows(&part.result_path, &rows)?;
    Ok(())
}

fn promote_snapshot(part: &CheckPart) -> Result<(), ApprovalError> {
    if !part.new_snapshot_path.is_file() {
        return Err(ApprovalError::MissingPendingSnapshot(
            part.new_snapshot_path.clone(),
        ));
    }
    // rename replaces the old baseline in one step
    std::fs::rename(&part.new_snapshot_path, &part.snapshot_path).map_err(|source| {
        ApprovalError::Io {
            path: part.snapshot_path.clone(),
            source,
        }
    })?;
    csv_store::remove_if_exists(&part.result_path)?;
    Ok(())
}
