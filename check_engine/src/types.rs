//! Core type definitions for the piton check engine.
//!
//! - [`Dialect`] selects the SQL backend a check file runs against
//! - [`CheckFile`] / [`CheckPart`] are the parsed, immutable form of an annotated SQL document
//! - [`CheckResult`] / [`FileResult`] are produced fresh by every run
//! - [`Diagnostic`] is the atomic unit of parser output
//!
//! Every result row is a [`Row`]: column name to string-normalized value, in
//! query column order.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One result row. Column order follows the query; values are strings
/// (SQL `NULL` is the empty string).
pub type Row = IndexMap<String, String>;

/// Supported SQL backends.
///
/// Directive values are matched case-insensitively: `sqlServer`, `sqlserver`
/// and the aliases `sql-server` / `mssql` all select [`Dialect::SqlServer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// PostgreSQL over a `postgres://` connection string.
    Postgres,
    /// DuckDB, embedded. An empty connection string opens an in-memory database.
    DuckDb,
    /// Oracle.
    Oracle,
    /// SQLite, embedded. The connection string is the database file path.
    Sqlite,
    /// Microsoft SQL Server.
    SqlServer,
}

impl Dialect {
    /// Every supported dialect, in registry order.
    pub const ALL: [Dialect; 5] = [
        Dialect::Postgres,
        Dialect::DuckDb,
        Dialect::Oracle,
        Dialect::Sqlite,
        Dialect::SqlServer,
    ];

    /// Parse a `pn-sqlDialect` value.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" => Some(Self::Postgres),
            "duckdb" => Some(Self::DuckDb),
            "oracle" => Some(Self::Oracle),
            "sqlite" => Some(Self::Sqlite),
            "sqlserver" | "sql-server" | "mssql" => Some(Self::SqlServer),
            _ => None,
        }
    }

    /// Embedded dialects run without a connection string.
    #[must_use]
    pub fn is_embedded(self) -> bool {
        matches!(self, Self::DuckDb | Self::Sqlite)
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Postgres => write!(f, "postgres"),
            Self::DuckDb => write!(f, "duckdb"),
            Self::Oracle => write!(f, "oracle"),
            Self::Sqlite => write!(f, "sqlite"),
            Self::SqlServer => write!(f, "sqlserver"),
        }
    }
}

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// The file or block cannot run as written.
    Error,
    /// Suspicious but harmless.
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A parse diagnostic attached to a source line.
///
/// The parser never aborts; everything it has to say about a document is
/// reported through these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Rule identifier, `"PN001"` through `"PN008"`.
    pub rule_id: String,

    /// Human-readable, actionable message.
    pub message: String,

    /// Severity level.
    pub severity: Severity,

    /// 1-based line the diagnostic belongs to (the owning `pn-check` marker
    /// for block-level problems).
    pub line: u32,
}

/// Whether a part is an executable check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PartType {
    /// A `pn-check` block with an id column and a statement.
    Check,
    /// Preamble, or a block downgraded by validation. Never executed.
    Other,
}

/// What a check expects from its query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expect {
    /// Every returned row is an exception that needs a reviewer decision.
    #[default]
    NoResults,
    /// The result set is compared against the previous accepted snapshot.
    Snapshot,
}

impl Expect {
    /// Parse a `pn-expect` value.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "no_results" => Some(Self::NoResults),
            "snapshot" => Some(Self::Snapshot),
            _ => None,
        }
    }
}

impl fmt::Display for Expect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoResults => write!(f, "no_results"),
            Self::Snapshot => write!(f, "snapshot"),
        }
    }
}

/// Outcome of a check or a whole file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CheckStatus {
    /// Not run yet.
    #[default]
    #[serde(rename = "No Run")]
    NoRun,
    /// Nothing to review and nothing denied.
    Pass,
    /// Everything reviewed, at least one row not approved.
    Fail,
    /// At least one row still needs a decision.
    #[serde(rename = "To Review")]
    ToReview,
    /// Skipped via `pn-skip` or a missing dialect.
    Skipped,
}

impl CheckStatus {
    /// Three-state precedence: anything to review wins over errors, errors
    /// win over pass.
    #[must_use]
    pub fn from_counts(error_count: usize, to_be_reviewed_count: usize) -> Self {
        if to_be_reviewed_count > 0 {
            Self::ToReview
        } else if error_count > 0 {
            Self::Fail
        } else {
            Self::Pass
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRun => write!(f, "No Run"),
            Self::Pass => write!(f, "Pass"),
            Self::Fail => write!(f, "Fail"),
            Self::ToReview => write!(f, "To Review"),
            Self::Skipped => write!(f, "Skipped"),
        }
    }
}

/// One annotated SQL document, as parsed.
///
/// Immutable after parse; a re-parse produces a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckFile {
    /// File name, e.g. `orders.piton.sql`.
    pub name: String,

    /// Directory containing the file.
    pub folder_path: PathBuf,

    /// Backend, or `None` when the directive is missing or unsupported.
    pub sql_dialect: Option<Dialect>,

    /// Connection string with `pn-filePath` already substituted. May still
    /// contain the `pn-password` placeholder.
    pub connection_string: Option<String>,

    /// User the password placeholder is resolved for.
    pub connection_user: Option<String>,

    /// Query whose row cardinality is reported as the file's record count.
    pub count_query: Option<String>,

    /// Skip the whole file.
    pub skip: bool,

    /// Preamble (order 0) followed by one part per `pn-check` marker.
    pub parts: Vec<CheckPart>,
}

impl CheckFile {
    /// Parts that are executable checks.
    pub fn checks(&self) -> impl Iterator<Item = &CheckPart> {
        self.parts.iter().filter(|p| p.part_type == PartType::Check)
    }
}

/// One block of a check file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckPart {
    /// Position in the file; 0 is the preamble.
    pub order: usize,

    /// 1-based line of the `pn-check` marker (1 for the preamble).
    pub line: u32,

    /// Check or Other.
    pub part_type: PartType,

    /// `pn-name`.
    pub name: Option<String>,

    /// `pn-tag`.
    pub tag: Option<String>,

    /// `pn-id-col`: column that correlates rows across runs.
    pub id_column: Option<String>,

    /// `pn-approve-col`.
    pub approve_column: String,

    /// `pn-expect`.
    pub expect: Expect,

    /// The extracted statement.
    pub sanitized_query: Option<String>,

    /// `pn-skip` inside the block.
    pub skip: bool,

    /// Persisted result rows, with the approval column.
    pub result_path: PathBuf,

    /// Accepted snapshot.
    pub snapshot_path: PathBuf,

    /// Pending snapshot awaiting approval.
    pub new_snapshot_path: PathBuf,
}

impl CheckPart {
    /// Name used in logs and summaries.
    #[must_use]
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("check{}", self.order),
        }
    }
}

/// Result of one executed check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Order of the part that produced this result.
    pub order: usize,

    /// Part name.
    pub name: Option<String>,

    /// Part tag.
    pub tag: Option<String>,

    /// The query that ran.
    pub query: String,

    /// Classified outcome.
    pub result: CheckStatus,

    /// Merged rows (for snapshots, the tagged diff).
    pub result_data: Vec<Row>,

    /// Rows not explicitly approved.
    pub error_count: usize,

    /// Rows without a decision.
    pub to_be_reviewed_count: usize,

    /// When the query ran.
    pub last_run: DateTime<Utc>,

    /// Where the rows were persisted.
    pub result_file: PathBuf,
}

/// Rollup of every [`CheckResult`] for one [`CheckFile`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileResult {
    /// Name of the check file.
    pub file_name: String,

    /// Directory of the check file.
    pub folder_path: PathBuf,

    /// Row cardinality of the count query.
    pub count: usize,

    /// Sum of part error counts.
    pub error_count: usize,

    /// Sum of part review counts.
    pub to_be_reviewed_count: usize,

    /// Same precedence rule as a single check, over the sums.
    pub result: CheckStatus,

    /// `"{passed}/{total} checks passed for {count} records"`.
    pub result_summary: String,

    /// Results of the parts that executed, in file order.
    pub part_results: Vec<CheckResult>,
}

impl FileResult {
    /// Result for a file that was not executed.
    #[must_use]
    pub fn skipped(file: &CheckFile) -> Self {
        Self {
            file_name: file.name.clone(),
            folder_path: file.folder_path.clone(),
            count: 0,
            error_count: 0,
            to_be_reviewed_count: 0,
            result: CheckStatus::Skipped,
            result_summary: String::new(),
            part_results: Vec::new(),
        }
    }
}

/// One line of the file-level summary artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRow {
    /// Check status.
    pub result: CheckStatus,
    /// Check file name.
    pub file: String,
    /// Check name.
    pub name: String,
    /// Check tag.
    pub tag: String,
    /// Record count of the owning file.
    pub count: usize,
    /// Rows not approved.
    pub error_count: usize,
    /// Rows without a decision.
    pub to_be_reviewed_count: usize,
}

/// A check file found on disk, with its content, ready to parse.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    /// Directory containing the file.
    pub folder: PathBuf,

    /// File name.
    pub file_name: String,

    /// Path relative to the discovery root (forward slashes).
    pub rel_path: String,

    /// Full file content.
    pub content: String,

    /// SHA-256 hex digest of the content.
    pub content_hash: String,
}
