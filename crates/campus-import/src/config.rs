//! Run configuration.
//!
//! Loaded once per import run from a JSON document and read-only afterwards,
//! except for the mutable view hooks receive during the
//! `post_config_files_read` stage before the run proper begins.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ImportError, ImportResult};

/// Supported input source formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputFormat {
    #[default]
    Csv,
    Json,
}

/// Invalid-character substitution inside multi-valued cells.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvalidChars {
    /// Characters to strip or substitute.
    pub chars: String,
    /// Replacement text; empty strips the characters.
    #[serde(default)]
    pub replacement: String,
}

/// Input source options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    #[serde(default)]
    pub format: InputFormat,
    /// CSV delimiter; sniffed from the header line when absent.
    #[serde(default)]
    pub delimiter: Option<char>,
    /// Leading header/comment lines to skip before the header row.
    #[serde(default)]
    pub skip_lines: usize,
    /// Delimiter joining multi-valued cell contents.
    #[serde(default = "default_multi_value_delimiter")]
    pub multi_value_delimiter: String,
    #[serde(default)]
    pub invalid_chars: Option<InvalidChars>,
    /// JSON only: dotted path to the array-of-objects record list.
    #[serde(default)]
    pub record_path: Option<String>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            format: InputFormat::default(),
            delimiter: None,
            skip_lines: 0,
            multi_value_delimiter: default_multi_value_delimiter(),
            invalid_chars: None,
            record_path: None,
        }
    }
}

fn default_multi_value_delimiter() -> String {
    ",".to_string()
}

/// Result artifact options. Header row names come from configuration, not
/// hard-coded column lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Per-record summary file; omitted disables the artifact.
    #[serde(default)]
    pub summary_file: Option<PathBuf>,
    /// New-password export; omitted disables the artifact.
    #[serde(default)]
    pub passwords_file: Option<PathBuf>,
    #[serde(default = "default_output_delimiter")]
    pub delimiter: char,
    /// Summary columns: built-in fields (`line`, `source_uid`, `record_uid`,
    /// `action`, `success`, `error`) or any derived attribute name.
    #[serde(default = "default_summary_columns")]
    pub columns: Vec<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            summary_file: None,
            passwords_file: None,
            delimiter: default_output_delimiter(),
            columns: default_summary_columns(),
        }
    }
}

fn default_output_delimiter() -> char {
    ';'
}

fn default_summary_columns() -> Vec<String> {
    ["line", "source_uid", "record_uid", "action", "success", "error", "username"]
        .iter()
        .map(ToString::to_string)
        .collect()
}

fn default_password_length() -> usize {
    12
}

/// Complete configuration for one import run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Identifier of the external system this import stream comes from.
    /// Stamped onto every created entry and used for orphan detection.
    pub source_uid: String,

    #[serde(default)]
    pub input: InputConfig,

    /// Column name -> domain attribute name.
    pub mapping: HashMap<String, String>,

    /// Domain attribute name -> scheme template.
    #[serde(default)]
    pub schemes: HashMap<String, String>,

    /// Attributes that must be present and non-empty after mapping.
    #[serde(default)]
    pub mandatory_attributes: Vec<String>,

    /// Role assigned to records that carry none.
    #[serde(default)]
    pub default_role: Option<String>,

    /// Column whose truthy value marks a record for deletion.
    #[serde(default)]
    pub delete_marker: Option<String>,

    /// Per-record error budget; exceeding it aborts the run.
    #[serde(default)]
    pub tolerate_errors: usize,

    /// Compute everything, commit nothing.
    #[serde(default)]
    pub dry_run: bool,

    /// Full-sync: delete entries of this stream absent from the input.
    #[serde(default)]
    pub delete_orphans: bool,

    /// Durable counter table; run-scoped counters when absent.
    #[serde(default)]
    pub counter_file: Option<PathBuf>,

    #[serde(default = "default_password_length")]
    pub password_length: usize,

    #[serde(default)]
    pub output: OutputConfig,
}

impl ImportConfig {
    /// Create a minimal configuration for programmatic use.
    #[must_use]
    pub fn new(source_uid: impl Into<String>) -> Self {
        Self {
            source_uid: source_uid.into(),
            input: InputConfig::default(),
            mapping: HashMap::new(),
            schemes: HashMap::new(),
            mandatory_attributes: Vec::new(),
            default_role: None,
            delete_marker: None,
            tolerate_errors: 0,
            dry_run: false,
            delete_orphans: false,
            counter_file: None,
            password_length: default_password_length(),
            output: OutputConfig::default(),
        }
    }

    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> ImportResult<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|e| {
            ImportError::configuration(format!("cannot read config {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&data).map_err(|e| {
            ImportError::configuration(format!("invalid config {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Map a column using builder pattern.
    #[must_use]
    pub fn with_column(mut self, column: impl Into<String>, attribute: impl Into<String>) -> Self {
        self.mapping.insert(column.into(), attribute.into());
        self
    }

    /// Add a scheme using builder pattern.
    #[must_use]
    pub fn with_scheme(mut self, attribute: impl Into<String>, template: impl Into<String>) -> Self {
        self.schemes.insert(attribute.into(), template.into());
        self
    }

    /// Declare a mandatory attribute using builder pattern.
    #[must_use]
    pub fn with_mandatory(mut self, attribute: impl Into<String>) -> Self {
        self.mandatory_attributes.push(attribute.into());
        self
    }

    /// Enable or disable dry-run mode.
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Enable or disable full-sync orphan deletion.
    #[must_use]
    pub fn with_delete_orphans(mut self, delete_orphans: bool) -> Self {
        self.delete_orphans = delete_orphans;
        self
    }

    /// Set the per-record error budget.
    #[must_use]
    pub fn with_tolerate_errors(mut self, budget: usize) -> Self {
        self.tolerate_errors = budget;
        self
    }

    /// Check internal consistency.
    pub fn validate(&self) -> ImportResult<()> {
        if self.source_uid.trim().is_empty() {
            return Err(ImportError::configuration("source_uid must not be empty"));
        }
        if self.mapping.is_empty() {
            return Err(ImportError::configuration("mapping table must not be empty"));
        }
        for attribute in &self.mandatory_attributes {
            let produced = self.mapping.values().any(|a| a == attribute)
                || self.schemes.contains_key(attribute);
            if !produced {
                return Err(ImportError::configuration(format!(
                    "mandatory attribute '{attribute}' is neither mapped nor scheme-derived"
                )));
            }
        }
        if self.password_length < 8 {
            return Err(ImportError::configuration(
                "password_length must be at least 8",
            ));
        }
        Ok(())
    }
}
