//! Directive parser: annotated SQL text to [`CheckFile`].
//!
//! Parsing is a pure function of `(folder, file name, text)`. It never fails:
//! problems are reported as [`Diagnostic`]s and a malformed check block is
//! downgraded to [`PartType::Other`] so it is never executed.
//!
//! | Rule | Severity | Condition |
//! |---|---|---|
//! | PN001 | error | missing `pn-sqlDialect` |
//! | PN002 | error | unsupported `pn-sqlDialect` value |
//! | PN003 | error | server dialect without `pn-connectionString` |
//! | PN004 | error | check block without `pn-id-col` |
//! | PN005 | error | check block without a `SELECT`/`WITH` statement |
//! | PN006 | error | `pn-expect` outside `no_results` / `snapshot` |
//! | PN007 | warning | unknown `pn-` directive |
//! | PN008 | warning | directive repeated within one block |

use std::collections::HashSet;
use std::path::Path;

use crate::config::EngineConfig;
use crate::directive::{self, Block, Directive, Token, FILE_PATH_PLACEHOLDER};
use crate::types::{CheckFile, CheckPart, Dialect, Diagnostic, Expect, PartType, Severity};

/// A parsed file together with everything the parser had to say about it.
#[derive(Debug, Clone)]
pub struct ParsedFile {
    /// The parsed file.
    pub file: CheckFile,
    /// Diagnostics in source order.
    pub diagnostics: Vec<Diagnostic>,
}

impl ParsedFile {
    /// Whether any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }
}

/// Parse a document with the default configuration.
#[must_use]
pub fn parse_file(folder: &Path, file_name: &str, text: &str) -> ParsedFile {
    parse_file_with_config(folder, file_name, text, &EngineConfig::default())
}

/// Parse a document.
///
/// `folder` is the directory holding the file; it replaces every
/// `pn-filePath` placeholder in the connection string and in the queries.
#[must_use]
pub fn parse_file_with_config(
    folder: &Path,
    file_name: &str,
    text: &str,
    config: &EngineConfig,
) -> ParsedFile {
    let folder_str = folder_placeholder_value(folder);
    let tokens = directive::tokenize(text);
    let blocks = directive::split_blocks(&tokens);

    let mut diags = Vec::new();
    report_unknown_directives(&tokens, &mut diags);

    let header = FileHeader::collect(&tokens);
    let preamble = &blocks[0];

    let sql_dialect = validate_dialect(&header, &mut diags);
    let connection_string = header
        .connection_string
        .as_ref()
        .map(|(value, _)| value.replace(FILE_PATH_PLACEHOLDER, &folder_str))
        .filter(|value| !value.is_empty());

    if let Some(dialect) = sql_dialect {
        if !dialect.is_embedded() && connection_string.is_none() {
            let line = header.sql_dialect.as_ref().map_or(1, |(_, line)| *line);
            diags.push(diag(
                "PN003",
                Severity::Error,
                line,
                format!("Dialect '{dialect}' requires a pn-connectionString directive"),
            ));
        }
    }

    let skip = preamble
        .tokens
        .iter()
        .any(|t| matches!(t.directive(), Some(Directive::Skip(true))));

    let count_query = preamble
        .tokens
        .iter()
        .position(|t| matches!(t.directive(), Some(Directive::Count)))
        .and_then(|idx| directive::extract_statement(preamble.tokens, idx + 1))
        .map(|q| q.replace(FILE_PATH_PLACEHOLDER, &folder_str));

    let mut parts = Vec::with_capacity(blocks.len());
    parts.push(build_preamble_part(folder, file_name, config));
    for block in &blocks[1..] {
        parts.push(parse_block(
            block,
            folder,
            file_name,
            &folder_str,
            config,
            &mut diags,
        ));
    }

    diags.sort_by_key(|d| d.line);

    ParsedFile {
        file: CheckFile {
            name: file_name.to_owned(),
            folder_path: folder.to_path_buf(),
            sql_dialect,
            connection_string,
            connection_user: header
                .connection_user
                .map(|(value, _)| value)
                .filter(|v| !v.is_empty()),
            count_query,
            skip,
            parts,
        },
        diagnostics: diags,
    }
}

/// First occurrence of each file-level directive, with its line.
#[derive(Debug, Default)]
struct FileHeader {
    connection_string: Option<(String, u32)>,
    connection_user: Option<(String, u32)>,
    sql_dialect: Option<(String, u32)>,
}

impl FileHeader {
    fn collect(tokens: &[Token<'_>]) -> Self {
        let mut header = Self::default();
        for token in tokens {
            match token.directive() {
                Some(Directive::ConnectionString(v)) if header.connection_string.is_none() => {
                    header.connection_string = Some((v.clone(), token.line));
                }
                Some(Directive::ConnectionUser(v)) if header.connection_user.is_none() => {
                    header.connection_user = Some((v.clone(), token.line));
                }
                Some(Directive::SqlDialect(v)) if header.sql_dialect.is_none() => {
                    header.sql_dialect = Some((v.clone(), token.line));
                }
                _ => {}
            }
        }
        header
    }
}

fn validate_dialect(header: &FileHeader, diags: &mut Vec<Diagnostic>) -> Option<Dialect> {
    match &header.sql_dialect {
        None => {
            diags.push(diag(
                "PN001",
                Severity::Error,
                1,
                "Missing pn-sqlDialect directive; the file will not run".to_owned(),
            ));
            None
        }
        Some((raw, line)) => {
            let parsed = Dialect::parse(raw);
            if parsed.is_none() {
                diags.push(diag(
                    "PN002",
                    Severity::Error,
                    *line,
                    format!(
                        "Unsupported pn-sqlDialect '{raw}'. Expected one of: {}",
                        Dialect::ALL.map(|d| d.to_string()).join(", ")
                    ),
                ));
            }
            parsed
        }
    }
}

fn report_unknown_directives(tokens: &[Token<'_>], diags: &mut Vec<Diagnostic>) {
    for token in tokens {
        if let Some(Directive::Unknown(keyword)) = token.directive() {
            diags.push(diag(
                "PN007",
                Severity::Warning,
                token.line,
                format!("Unknown directive '{keyword}' is ignored"),
            ));
        }
    }
}

fn build_preamble_part(folder: &Path, file_name: &str, config: &EngineConfig) -> CheckPart {
    let (result_path, snapshot_path, new_snapshot_path) =
        part_paths(folder, file_name, None, 0);
    CheckPart {
        order: 0,
        line: 1,
        part_type: PartType::Other,
        name: None,
        tag: None,
        id_column: None,
        approve_column: config.default_approve_column.clone(),
        expect: Expect::NoResults,
        sanitized_query: None,
        skip: false,
        result_path,
        snapshot_path,
        new_snapshot_path,
    }
}

fn parse_block(
    block: &Block<'_, '_>,
    folder: &Path,
    file_name: &str,
    folder_str: &str,
    config: &EngineConfig,
    diags: &mut Vec<Diagnostic>,
) -> CheckPart {
    let mut name = None;
    let mut tag = None;
    let mut id_column = None;
    let mut approve_column = None;
    let mut expect_raw = None;
    let mut skip = None;
    let mut seen: HashSet<&str> = HashSet::new();

    for token in block.tokens {
        let Some(directive) = token.directive() else {
            continue;
        };
        match directive {
            Directive::Name(v) => first_wins(&mut name, v),
            Directive::Tag(v) => first_wins(&mut tag, v),
            Directive::IdColumn(v) => first_wins(&mut id_column, v),
            Directive::ApproveColumn(v) => first_wins(&mut approve_column, v),
            Directive::Expect(v) => first_wins(&mut expect_raw, v),
            Directive::Skip(flag) => {
                if skip.is_none() {
                    skip = Some(*flag);
                }
            }
            // File-level or marker directives carry no per-block state.
            Directive::ConnectionString(_)
            | Directive::ConnectionUser(_)
            | Directive::SqlDialect(_)
            | Directive::Count
            | Directive::Check
            | Directive::RunScheduleCron(_)
            | Directive::Unknown(_) => continue,
        }
        note_duplicate(directive.keyword(), token.line, &mut seen, diags);
    }

    let name = name.filter(|v| !v.is_empty());
    let tag = tag.filter(|v| !v.is_empty());
    let id_column = id_column.filter(|v| !v.is_empty());
    let approve_column = approve_column
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| config.default_approve_column.clone());

    let expect = match expect_raw.as_deref().filter(|v| !v.is_empty()) {
        None => Expect::NoResults,
        Some(raw) => Expect::parse(raw).unwrap_or_else(|| {
            diags.push(diag(
                "PN006",
                Severity::Error,
                block.marker_line,
                format!("Unsupported pn-expect '{raw}'; expected no_results or snapshot. Falling back to no_results"),
            ));
            Expect::NoResults
        }),
    };

    let sanitized_query = directive::extract_statement(block.tokens, 1)
        .map(|q| q.replace(FILE_PATH_PLACEHOLDER, folder_str));

    let mut part_type = PartType::Check;
    if id_column.is_none() {
        diags.push(diag(
            "PN004",
            Severity::Error,
            block.marker_line,
            "Check is missing pn-id-col; it will not run".to_owned(),
        ));
        part_type = PartType::Other;
    }
    if sanitized_query.is_none() {
        diags.push(diag(
            "PN005",
            Severity::Error,
            block.marker_line,
            "Check has no SELECT or WITH statement; it will not run".to_owned(),
        ));
        part_type = PartType::Other;
    }

    let (result_path, snapshot_path, new_snapshot_path) =
        part_paths(folder, file_name, name.as_deref(), block.order);

    CheckPart {
        order: block.order,
        line: block.marker_line,
        part_type,
        name,
        tag,
        id_column,
        approve_column,
        expect,
        sanitized_query,
        skip: skip.unwrap_or(false),
        result_path,
        snapshot_path,
        new_snapshot_path,
    }
}

fn first_wins(slot: &mut Option<String>, value: &str) {
    if slot.is_none() {
        *slot = Some(value.to_owned());
    }
}

fn note_duplicate<'d>(
    keyword: &'d str,
    line: u32,
    seen: &mut HashSet<&'d str>,
    diags: &mut Vec<Diagnostic>,
) {
    if !seen.insert(keyword) {
        diags.push(diag(
            "PN008",
            Severity::Warning,
            line,
            format!("Duplicate {keyword} in this check; the first value is used"),
        ));
    }
}

fn diag(rule_id: &str, severity: Severity, line: u32, message: String) -> Diagnostic {
    Diagnostic {
        rule_id: rule_id.to_owned(),
        message,
        severity,
        line,
    }
}

/// Directory string used for `pn-filePath`, without a trailing separator.
fn folder_placeholder_value(folder: &Path) -> String {
    let s = folder.to_string_lossy();
    let trimmed = s.trim_end_matches(['/', '\\']);
    if trimmed.is_empty() {
        s.into_owned()
    } else {
        trimmed.to_owned()
    }
}

/// Result, accepted snapshot, and pending snapshot paths for a part.
///
/// Base name is `{file}.{name or "check"}{order}`.
#[must_use]
pub fn part_paths(
    folder: &Path,
    file_name: &str,
    part_name: Option<&str>,
    order: usize,
) -> (std::path::PathBuf, std::path::PathBuf, std::path::PathBuf) {
    let label = part_name.map_or_else(|| "check".to_owned(), sanitize_file_component);
    let base = format!("{file_name}.{label}{order}");
    (
        folder.join(format!("{base}.csv")),
        folder.join(format!("{base}.snapshot.csv")),
        folder.join(format!("{base}.new.csv")),
    )
}

fn sanitize_file_component(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ' ' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
