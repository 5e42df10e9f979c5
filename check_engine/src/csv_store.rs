//! CSV persistence for result and snapshot files.
//!
//! Rows are string maps. Writing uses the union of all column names in
//! first-seen order as the header and fills missing cells with an empty
//! string. Every write goes through a temp file and a rename so a crash never
//! leaves a half-written result behind.

use std::path::{Path, PathBuf};

use crate::types::Row;

/// Errors raised while reading or writing CSV files.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// Filesystem failure.
    #[error("[P001] I/O error on '{}': {source}", path.display())]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Malformed CSV or encoding failure.
    #[error("[P002] CSV error on '{}': {source}", path.display())]
    Csv {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: csv::Error,
    },
}

impl PersistError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn csv(path: &Path, source: csv::Error) -> Self {
        Self::Csv {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Read every row of a CSV file. An empty file yields no rows.
///
/// # Errors
///
/// Returns [`PersistError`] if the file is missing, unreadable, or malformed.
pub fn read_rows(path: &Path) -> Result<Vec<Row>, PersistError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| PersistError::csv(path, e))?;

    let headers = reader
        .headers()
        .map_err(|e| PersistError::csv(path, e))?
        .clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| PersistError::csv(path, e))?;
        let row: Row = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.to_owned(), record.get(i).unwrap_or("").to_owned()))
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

/// Read a CSV file, or `None` when it does not exist.
///
/// # Errors
///
/// Returns [`PersistError`] if the file exists but cannot be read.
pub fn read_rows_if_exists(path: &Path) -> Result<Option<Vec<Row>>, PersistError> {
    if !path.is_file() {
        return Ok(None);
    }
    read_rows(path).map(Some)
}

/// Previously persisted rows at `path`. Missing or unreadable files count as
/// no rows; an unreadable file is logged.
#[must_use]
pub fn read_previous_rows(path: &Path) -> Vec<Row> {
    match read_rows_if_exists(path) {
        Ok(rows) => rows.unwrap_or_default(),
        Err(e) => {
            log::warn!("Ignoring unreadable previous result: {e}");
            Vec::new()
        }
    }
}

/// Union of column names across `rows`, in first-seen order.
#[must_use]
pub fn column_union(rows: &[Row]) -> Vec<String> {
    let mut columns: indexmap::IndexSet<&str> = indexmap::IndexSet::new();
    for row in rows {
        for key in row.keys() {
            columns.insert(key.as_str());
        }
    }
    columns.into_iter().map(str::to_owned).collect()
}

/// Serialize rows with the given header into CSV bytes.
pub(crate) fn encode(path: &Path, header: &[String], rows: &[Row]) -> Result<Vec<u8>, PersistError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    if !header.is_empty() {
        writer
            .write_record(header)
            .map_err(|e| PersistError::csv(path, e))?;
    }
    for row in rows {
        let record: Vec<&str> = header
            .iter()
            .map(|col| row.get(col).map_or("", String::as_str))
            .collect();
        writer
            .write_record(&record)
            .map_err(|e| PersistError::csv(path, e))?;
    }
    writer
        .into_inner()
        .map_err(|e| PersistError::io(path, e.into_error()))
}

/// Write rows to `path`, replacing any existing file.
///
/// # Errors
///
/// Returns [`PersistError`] if the file cannot be written.
pub fn write_rows(path: &Path, rows: &[Row]) -> Result<(), PersistError> {
    let header = column_union(rows);
    let bytes = encode(path, &header, rows)?;
    write_atomic(path, &bytes)
}

/// Write bytes to `path` via a temp file and rename.
///
/// # Errors
///
/// Returns [`PersistError::Io`] if any filesystem step fails.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PersistError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| PersistError::io(parent, e))?;
        }
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = path.with_file_name(format!("{file_name}.tmp.{}", std::process::id()));

    std::fs::write(&tmp_path, bytes).map_err(|e| PersistError::io(&tmp_path, e))?;
    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(PersistError::io(path, e));
    }
    Ok(())
}

/// Delete `path` if it exists.
///
/// # Errors
///
/// Returns [`PersistError::Io`] on any failure other than "not found".
pub fn remove_if_exists(path: &Path) -> Result<(), PersistError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(PersistError::io(path, e)),
    }
}
