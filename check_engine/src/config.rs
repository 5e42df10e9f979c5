//! Configuration loading and resolution for the Piton check engine.
//!
//! Resolution order, first file found wins:
//! 1. `[check]` section in `piton.check.toml` (project root)
//! 2. `check:` section in `piton.yaml` / `piton.yml`
//! 3. Built-in defaults
//!
//! Every field is optional in the file; missing fields keep their default.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::types::{Diagnostic, Severity};

// ---------------------------------------------------------------------------
// Rule severity override
// ---------------------------------------------------------------------------

/// Per-rule severity override for parse diagnostics, or `Off` to hide a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleSeverityOverride {
    /// Report as an error.
    Error,
    /// Report as a warning.
    Warning,
    /// Do not report.
    Off,
}

// ---------------------------------------------------------------------------
// Main config
// ---------------------------------------------------------------------------

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// File name suffix that marks a check file.
    pub file_suffix: String,
    /// Glob patterns excluded from discovery, relative to the root.
    pub exclude: Vec<String>,
    /// Name of the summary CSV written by batch runs.
    pub summary_file: String,
    /// Approve column used when a check has no `pn-approve-col`.
    pub default_approve_column: String,
    /// Rows of a query result echoed to the debug log.
    pub log_preview_rows: usize,
    /// Persist merged `no_results` rows to the part's result file.
    pub write_results: bool,
    /// Severity overrides for parse diagnostics, keyed by rule id.
    pub rules: HashMap<String, RuleSeverityOverride>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            file_suffix: ".piton.sql".to_owned(),
            exclude: vec!["node_modules/".to_owned(), "target/".to_owned()],
            summary_file: "result.piton.csv".to_owned(),
            default_approve_column: "approved".to_owned(),
            log_preview_rows: 5,
            write_results: true,
            rules: HashMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// TOML / YAML deserialization helpers
// ---------------------------------------------------------------------------

/// Raw structure of `piton.check.toml`.
#[derive(Debug, Deserialize)]
struct TomlCheckFile {
    check: Option<CheckSection>,
}

/// Raw structure of `piton.yaml`.
#[derive(Debug, Deserialize)]
struct PitonYaml {
    check: Option<CheckSection>,
}

/// The `check` section shared by both file formats.
#[derive(Debug, Deserialize)]
struct CheckSection {
    file_suffix: Option<String>,
    exclude: Option<Vec<String>>,
    summary_file: Option<String>,
    default_approve_column: Option<String>,
    log_preview_rows: Option<usize>,
    write_results: Option<bool>,
    rules: Option<HashMap<String, String>>,
}

fn parse_rule_severity(s: &str) -> Option<RuleSeverityOverride> {
    match s.to_lowercase().as_str() {
        "error" => Some(RuleSeverityOverride::Error),
        "warning" | "warn" => Some(RuleSeverityOverride::Warning),
        "off" | "disabled" | "false" => Some(RuleSeverityOverride::Off),
        _ => None,
    }
}

/// Apply a [`CheckSection`] onto an [`EngineConfig`], overriding any set values.
fn apply_section(config: &mut EngineConfig, section: &CheckSection) {
    if let Some(ref v) = section.file_suffix {
        config.file_suffix = v.clone();
    }
    if let Some(ref v) = section.exclude {
        config.exclude = v.clone();
    }
    if let Some(ref v) = section.summary_file {
        config.summary_file = v.clone();
    }
    if let Some(ref v) = section.default_approve_column {
        if !v.is_empty() {
            config.default_approve_column = v.clone();
        }
    }
    if let Some(v) = section.log_preview_rows {
        config.log_preview_rows = v;
    }
    if let Some(v) = section.write_results {
        config.write_results = v;
    }
    if let Some(ref rules) = section.rules {
        for (rule_id, severity) in rules {
            match parse_rule_severity(severity) {
                Some(sev) => {
                    config.rules.insert(rule_id.clone(), sev);
                }
                None => log::warn!("Ignoring unknown severity '{severity}' for rule {rule_id}"),
            }
        }
    }
}

impl EngineConfig {
    /// Load configuration from the project root.
    ///
    /// # Errors
    ///
    /// Returns an error if a found config file cannot be read or parsed.
    pub fn load_from_project(root: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let check_toml = root.join("piton.check.toml");
        if check_toml.is_file() {
            let content = std::fs::read_to_string(&check_toml).map_err(|e| {
                ConfigError::ReadError(check_toml.display().to_string(), e.to_string())
            })?;
            let parsed: TomlCheckFile = toml::from_str(&content).map_err(|e| {
                ConfigError::ParseError(check_toml.display().to_string(), e.to_string())
            })?;
            if let Some(ref section) = parsed.check {
                apply_section(&mut config, section);
            }
            log::debug!("Loaded configuration from {}", check_toml.display());
            return Ok(config);
        }

        for name in &["piton.yaml", "piton.yml"] {
            let yaml_path = root.join(name);
            if yaml_path.is_file() {
                let content = std::fs::read_to_string(&yaml_path).map_err(|e| {
                    ConfigError::ReadError(yaml_path.display().to_string(), e.to_string())
                })?;
                let parsed: PitonYaml = serde_yaml::from_str(&content).map_err(|e| {
                    ConfigError::ParseError(yaml_path.display().to_string(), e.to_string())
                })?;
                if let Some(ref section) = parsed.check {
                    apply_section(&mut config, section);
                    log::debug!("Loaded configuration from {}", yaml_path.display());
                    return Ok(config);
                }
            }
        }

        Ok(config)
    }

    /// Apply the rule overrides to a list of parse diagnostics.
    #[must_use]
    pub fn apply_rule_overrides(&self, diagnostics: Vec<Diagnostic>) -> Vec<Diagnostic> {
        if self.rules.is_empty() {
            return diagnostics;
        }
        diagnostics
            .into_iter()
            .filter_map(|mut d| {
                match self.rules.get(&d.rule_id) {
                    Some(RuleSeverityOverride::Off) => return None,
                    Some(RuleSeverityOverride::Error) => d.severity = Severity::Error,
                    Some(RuleSeverityOverride::Warning) => d.severity = Severity::Warning,
                    None => {}
                }
                Some(d)
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur during configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read a configuration file.
    #[error("Failed to read config file '{0}': {1}")]
    ReadError(String, String),

    /// Failed to parse a configuration file.
    #[error("Failed to parse config file '{0}': {1}")]
    ParseError(String, String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
