//! Result artifacts.
//!
//! After a run the writer renders two CSV artifacts: a per-record summary
//! ordered so failures surface first, and a password export for newly
//! created entries. Both are driven by the output configuration and always
//! written, even when the run aborted early.

use std::fs;
use std::path::Path;

use tracing::info;

use crate::config::OutputConfig;
use crate::error::{ImportError, ImportResult};
use crate::record::{ImportOutcome, OutcomeKind};

/// Renders the summary and password artifacts for one run.
pub struct ResultWriter {
    output: OutputConfig,
}

impl ResultWriter {
    #[must_use]
    pub fn new(output: OutputConfig) -> Self {
        Self { output }
    }

    /// Write all configured artifacts.
    pub fn write_all(&self, outcomes: &[ImportOutcome]) -> ImportResult<()> {
        if let Some(path) = &self.output.summary_file {
            self.write_summary(path, outcomes)?;
            info!(path = %path.display(), records = outcomes.len(), "summary artifact written");
        }
        if let Some(path) = &self.output.passwords_file {
            let written = self.write_passwords(path, outcomes)?;
            info!(path = %path.display(), passwords = written, "password artifact written");
        }
        Ok(())
    }

    fn delimiter(&self) -> ImportResult<u8> {
        let d = self.output.delimiter;
        if !d.is_ascii() {
            return Err(ImportError::configuration(format!(
                "output delimiter '{d}' must be an ASCII character"
            )));
        }
        Ok(d as u8)
    }

    fn write_summary(&self, path: &Path, outcomes: &[ImportOutcome]) -> ImportResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut writer = csv::WriterBuilder::new()
            .delimiter(self.delimiter()?)
            .from_path(path)?;
        writer.write_record(&self.output.columns)?;

        let mut ordered: Vec<&ImportOutcome> = outcomes.iter().collect();
        ordered.sort_by_key(|o| (kind_rank(o.kind), o.line));

        for outcome in ordered {
            let row: Vec<String> = self
                .output
                .columns
                .iter()
                .map(|column| render_column(column, outcome))
                .collect();
            writer.write_record(&row)?;
        }
        writer.flush()?;
        Ok(())
    }

    fn write_passwords(&self, path: &Path, outcomes: &[ImportOutcome]) -> ImportResult<usize> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut writer = csv::WriterBuilder::new()
            .delimiter(self.delimiter()?)
            .from_path(path)?;
        writer.write_record(["username", "password"])?;

        let mut written = 0;
        for outcome in outcomes {
            if outcome.kind != OutcomeKind::Created {
                continue;
            }
            let Some(password) = &outcome.password else {
                continue;
            };
            let username = outcome
                .attributes
                .get("username")
                .map(String::as_str)
                .unwrap_or_default();
            writer.write_record([username, password])?;
            written += 1;
        }
        writer.flush()?;
        Ok(written)
    }
}

/// Failures first, then mutations, no-ops last.
fn kind_rank(kind: OutcomeKind) -> u8 {
    match kind {
        OutcomeKind::Error => 0,
        OutcomeKind::Created => 1,
        OutcomeKind::Modified => 2,
        OutcomeKind::Deleted => 3,
        OutcomeKind::Unchanged => 4,
    }
}

fn render_column(column: &str, outcome: &ImportOutcome) -> String {
    match column {
        "line" => outcome.line.to_string(),
        "source_uid" => outcome.source_uid.clone(),
        "record_uid" => outcome.record_uid.clone(),
        "action" => outcome.action.to_string(),
        "success" => (!outcome.is_error()).to_string(),
        "error" => outcome.error.clone().unwrap_or_default(),
        // Any other column name is looked up as a derived attribute
        other => outcome.attributes.get(other).cloned().unwrap_or_default(),
    }
}
