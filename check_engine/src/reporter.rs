//! Output generation for the Piton check engine.
//!
//! Produces three artifacts:
//!
//! 1. **Summary CSV**: one row per executed check across a batch, written to
//!    `EngineConfig::summary_file` under the run root.
//!
//! 2. **JSON**: `serde_json` serialization of a [`FileResult`].
//!
//! 3. **SARIF v2.1.0**: parse diagnostics of one check file, so editors and
//!    code-scanning tools can surface them.
//!
//! ## SARIF Field Mapping
//!
//! | Diagnostic field | SARIF location |
//! |---|---|
//! | `rule_id` | `result.ruleId` |
//! | `message` | `result.message.text` |
//! | `severity` | `result.level` (Error→error, Warning→warning) |
//! | file path argument | `result.locations[0].physicalLocation.artifactLocation.uri` |
//! | `line` | `result.locations[0].physicalLocation.region.startLine` |

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::EngineConfig;
use crate::csv_store::{self, PersistError};
use crate::types::{Diagnostic, FileResult, Severity, SummaryRow};

/// Engine version for SARIF tool metadata.
const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// SARIF schema URL.
const SARIF_SCHEMA: &str =
    "https://raw.githubusercontent.com/oasis-tcs/sarif-spec/main/sarif-2.1/schema/sarif-schema-2.1.0.json";

/// Header of the summary CSV.
const SUMMARY_HEADER: [&str; 7] = [
    "result",
    "file",
    "name",
    "tag",
    "count",
    "errorCount",
    "toBeReviewedCount",
];

// ---------------------------------------------------------------------------
// Summary CSV
// ---------------------------------------------------------------------------

/// One summary row per executed check, in the order given.
#[must_use]
pub fn summary_rows<'a, I>(results: I) -> Vec<SummaryRow>
where
    I: IntoIterator<Item = &'a FileResult>,
{
    results
        .into_iter()
        .flat_map(|file| {
            file.part_results.iter().map(move |part| SummaryRow {
                result: part.result,
                file: file.file_name.clone(),
                name: part
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("check{}", part.order)),
                tag: part.tag.clone().unwrap_or_default(),
                count: file.count,
                error_count: part.error_count,
                to_be_reviewed_count: part.to_be_reviewed_count,
            })
        })
        .collect()
}

/// Write the summary CSV for `results` to `root/{summary_file}`.
///
/// The header row is written even when there is nothing to report.
///
/// # Errors
///
/// Returns [`PersistError`] if the file cannot be encoded or written.
pub fn write_summary<'a, I>(
    root: &Path,
    config: &EngineConfig,
    results: I,
) -> Result<PathBuf, PersistError>
where
    I: IntoIterator<Item = &'a FileResult>,
{
    let path = root.join(&config.summary_file);
    let rows = summary_rows(results);

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer
        .write_record(SUMMARY_HEADER)
        .map_err(|e| PersistError::csv(&path, e))?;
    for row in &rows {
        writer
            .serialize(row)
            .map_err(|e| PersistError::csv(&path, e))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| PersistError::io(&path, e.into_error()))?;

    csv_store::write_atomic(&path, &bytes)?;
    log::info!("Wrote {} summary rows to {}", rows.len(), path.display());
    Ok(path)
}

// ---------------------------------------------------------------------------
// JSON output
// ---------------------------------------------------------------------------

/// Serialize a [`FileResult`] to pretty-printed JSON.
///
/// # Errors
///
/// Returns an error message if serialization fails (should not happen for valid data).
pub fn to_json(result: &FileResult) -> Result<String, String> {
    serde_json::to_string_pretty(result).map_err(|e| format!("JSON serialization failed: {e}"))
}

// ---------------------------------------------------------------------------
// SARIF output
// ---------------------------------------------------------------------------

/// Serialize the parse diagnostics of one file to SARIF v2.1.0 JSON.
///
/// # Errors
///
/// Returns an error message if serialization fails.
pub fn diagnostics_to_sarif(file_path: &str, diagnostics: &[Diagnostic]) -> Result<String, String> {
    let sarif = build_sarif_log(file_path, diagnostics);
    serde_json::to_string_pretty(&sarif).map_err(|e| format!("SARIF serialization failed: {e}"))
}

fn build_sarif_log(file_path: &str, diagnostics: &[Diagnostic]) -> SarifLog {
    // BTreeMap keeps rules sorted by id
    let mut rule_map: BTreeMap<&str, SarifRule> = BTreeMap::new();
    for diag in diagnostics {
        rule_map.entry(&diag.rule_id).or_insert_with(|| SarifRule {
            id: diag.rule_id.clone(),
            name: rule_id_to_name(&diag.rule_id).to_owned(),
            short_description: SarifMessage {
                text: rule_id_to_short_description(&diag.rule_id),
            },
            default_configuration: SarifDefaultConfiguration {
                level: severity_to_sarif_level(diag.severity),
            },
        });
    }

    let results = diagnostics
        .iter()
        .map(|d| build_sarif_result(file_path, d))
        .collect();

    SarifLog {
        schema: SARIF_SCHEMA.to_owned(),
        version: "2.1.0".to_owned(),
        runs: vec![SarifRun {
            tool: SarifTool {
                driver: SarifDriver {
                    name: "piton-check".to_owned(),
                    version: ENGINE_VERSION.to_owned(),
                    rules: rule_map.into_values().collect(),
                },
            },
            results,
        }],
    }
}

fn build_sarif_result(file_path: &str, diag: &Diagnostic) -> SarifResult {
    SarifResult {
        rule_id: diag.rule_id.clone(),
        level: severity_to_sarif_level(diag.severity),
        message: SarifMessage {
            text: diag.message.clone(),
        },
        locations: vec![SarifLocation {
            physical_location: SarifPhysicalLocation {
                artifact_location: SarifArtifactLocation {
                    uri: file_path.replace('\\', "/"),
                },
                region: (diag.line > 0).then_some(SarifRegion {
                    start_line: diag.line,
                }),
            },
        }],
    }
}

fn severity_to_sarif_level(severity: Severity) -> String {
    match severity {
        Severity::Error => "error".to_owned(),
        Severity::Warning => "warning".to_owned(),
    }
}

fn rule_id_to_name(rule_id: &str) -> &str {
    match rule_id {
        "PN001" => "MissingDialect",
        "PN002" => "UnsupportedDialect",
        "PN003" => "MissingConnectionString",
        "PN004" => "MissingIdColumn",
        "PN005" => "MissingStatement",
        "PN006" => "InvalidExpect",
        "PN007" => "UnknownDirective",
        "PN008" => "DuplicateDirective",
        _ => rule_id,
    }
}

fn rule_id_to_short_description(rule_id: &str) -> String {
    match rule_id {
        "PN001" => "File has no pn-sqlDialect directive".to_owned(),
        "PN002" => "pn-sqlDialect names an unsupported backend".to_owned(),
        "PN003" => "Server dialect without pn-connectionString".to_owned(),
        "PN004" => "Check block without pn-id-col".to_owned(),
        "PN005" => "Check block without a SELECT or WITH statement".to_owned(),
        "PN006" => "pn-expect is not no_results or snapshot".to_owned(),
        "PN007" => "Unknown pn- directive".to_owned(),
        "PN008" => "Directive repeated within one check".to_owned(),
        _ => format!("Check rule {rule_id}"),
    }
}

// ---------------------------------------------------------------------------
// SARIF v2.1.0 data structures
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct SarifLog {
    #[serde(rename = "$schema")]
    schema: String,
    version: String,
    runs: Vec<SarifRun>,
}

#[derive(Debug, Serialize)]
struct SarifRun {
    tool: SarifTool,
    results: Vec<SarifResult>,
}

#[derive(Debug, Serialize)]
struct SarifTool {
    driver: SarifDriver,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SarifDriver {
    name: String,
    version: String,
    rules: Vec<SarifRule>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SarifRule {
    id: String,
    name: String,
    short_description: SarifMessage,
    default_configuration: SarifDefaultConfiguration,
}

#[derive(Debug, Serialize)]
struct SarifDefaultConfiguration {
    level: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SarifResult {
    rule_id: String,
    level: String,
    message: SarifMessage,
    locations: Vec<SarifLocation>,
}

#[derive(Debug, Serialize)]
struct SarifMessage {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SarifLocation {
    physical_location: SarifPhysicalLocation,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SarifPhysicalLocation {
    artifact_location: SarifArtifactLocation,
    #[serde(skip_serializing_if = "Option::is_none")]
    region: Option<SarifRegion>,
}

#[derive(Debug, Serialize)]
struct SarifArtifactLocation {
    uri: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SarifRegion {
    start_line: u32,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
