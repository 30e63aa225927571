//! Record types flowing through the pipeline.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Pipeline-owned attribute names.
///
/// These are computed by the pipeline's own identity logic and must not be
/// overridable through free-form extra properties.
pub const PIPELINE_OWNED: &[&str] = &["username", "password", "role", "source_uid", "record_uid"];

/// One raw input row: an ordered field-name to string-value mapping.
///
/// Ephemeral; exists only between the reader and the field mapper.
#[derive(Debug, Clone, Default)]
pub struct RawRecord {
    /// 1-based input line (or array index) of origin, for error reporting.
    pub line: usize,
    fields: Vec<(String, String)>,
}

impl RawRecord {
    /// Create an empty record for the given input line.
    #[must_use]
    pub fn new(line: usize) -> Self {
        Self {
            line,
            fields: Vec::new(),
        }
    }

    /// Append a field, preserving input order.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    /// Get a field value by name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Iterate fields in input order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Field names in input order.
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// The action the reconciler decided for a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordAction {
    /// Not yet decided, or downgraded to no-op.
    #[default]
    None,
    Create,
    Modify,
    Delete,
}

impl std::fmt::Display for RecordAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordAction::None => write!(f, "none"),
            RecordAction::Create => write!(f, "create"),
            RecordAction::Modify => write!(f, "modify"),
            RecordAction::Delete => write!(f, "delete"),
        }
    }
}

/// The validated, mapped domain object for one input row.
///
/// Created by the field mapper, mutated by hooks at each stage, consumed by
/// the result writer. Mapped domain attributes and free-form extras are
/// disjoint sets; pipeline-owned names are rejected from the extras map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportRecord {
    /// Identifier of the external system this record came from.
    pub source_uid: String,
    /// Identifier of the record within the external system.
    pub record_uid: String,
    /// Input line of origin.
    pub line: usize,
    /// Reconciler decision.
    pub action: RecordAction,
    /// Pipeline-generated password, if one was issued.
    pub password: Option<String>,
    attributes: HashMap<String, String>,
    extras: HashMap<String, String>,
}

impl ImportRecord {
    /// Create an empty record for one input line.
    #[must_use]
    pub fn new(line: usize, source_uid: impl Into<String>) -> Self {
        Self {
            source_uid: source_uid.into(),
            line,
            ..Self::default()
        }
    }

    /// Set a mapped domain attribute.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(name.into(), value.into());
    }

    /// Get a mapped domain attribute.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// All mapped domain attributes.
    pub fn attributes(&self) -> &HashMap<String, String> {
        &self.attributes
    }

    /// The derived username, if mapping or schemes produced one.
    pub fn username(&self) -> Option<&str> {
        self.attribute("username")
    }

    /// Set a free-form extra property.
    ///
    /// Pipeline-owned attribute names are rejected with
    /// [`RecordError::NotSupported`](crate::error::RecordError).
    pub fn set_extra(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), crate::error::RecordError> {
        let name = name.into();
        if PIPELINE_OWNED.contains(&name.as_str()) {
            return Err(crate::error::RecordError::not_supported(name));
        }
        self.extras.insert(name, value.into());
        Ok(())
    }

    /// All free-form extra properties.
    pub fn extras(&self) -> &HashMap<String, String> {
        &self.extras
    }

    /// The external identity key pair.
    pub fn key(&self) -> (&str, &str) {
        (self.source_uid.as_str(), self.record_uid.as_str())
    }
}

/// Result classification for one processed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeKind {
    Created,
    Modified,
    Deleted,
    Unchanged,
    Error,
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutcomeKind::Created => write!(f, "created"),
            OutcomeKind::Modified => write!(f, "modified"),
            OutcomeKind::Deleted => write!(f, "deleted"),
            OutcomeKind::Unchanged => write!(f, "unchanged"),
            OutcomeKind::Error => write!(f, "error"),
        }
    }
}

/// One per processed record: classification, error and final attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportOutcome {
    pub kind: OutcomeKind,
    pub line: usize,
    pub source_uid: String,
    pub record_uid: String,
    pub action: RecordAction,
    pub error: Option<String>,
    /// Pipeline-generated password for newly created entries.
    pub password: Option<String>,
    /// Final derived attribute values, for the result writer.
    pub attributes: HashMap<String, String>,
}

impl ImportOutcome {
    /// Build a successful outcome from a committed record.
    #[must_use]
    pub fn success(kind: OutcomeKind, record: &ImportRecord) -> Self {
        Self {
            kind,
            line: record.line,
            source_uid: record.source_uid.clone(),
            record_uid: record.record_uid.clone(),
            action: record.action,
            error: None,
            password: record.password.clone(),
            attributes: record.attributes.clone(),
        }
    }

    /// Build a failed outcome from a record and its error.
    #[must_use]
    pub fn failed(record: &ImportRecord, error: impl std::fmt::Display) -> Self {
        Self {
            kind: OutcomeKind::Error,
            line: record.line,
            source_uid: record.source_uid.clone(),
            record_uid: record.record_uid.clone(),
            action: record.action,
            error: Some(error.to_string()),
            password: None,
            attributes: record.attributes.clone(),
        }
    }

    /// Build a failed outcome for a raw row that never became a record.
    #[must_use]
    pub fn failed_raw(line: usize, source_uid: &str, error: impl std::fmt::Display) -> Self {
        Self {
            kind: OutcomeKind::Error,
            line,
            source_uid: source_uid.to_string(),
            record_uid: String::new(),
            action: RecordAction::None,
            error: Some(error.to_string()),
            password: None,
            attributes: HashMap::new(),
        }
    }

    /// Whether this outcome represents a failure.
    pub fn is_error(&self) -> bool {
        self.kind == OutcomeKind::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RecordError;

    #[test]
    fn test_raw_record_order_preserved() {
        let mut raw = RawRecord::new(2);
        raw.push("b", "2");
        raw.push("a", "1");
        let names = raw.field_names();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(raw.get("a"), Some("1"));
        assert_eq!(raw.get("missing"), None);
    }

    #[test]
    fn test_extras_reject_pipeline_owned() {
        let mut rec = ImportRecord::new(2, "sis");
        assert!(rec.set_extra("nickname", "JD").is_ok());
        let err = rec.set_extra("password", "hunter2").unwrap_err();
        assert!(matches!(err, RecordError::NotSupported { .. }));
        let err = rec.set_extra("username", "jdoe").unwrap_err();
        assert!(matches!(err, RecordError::NotSupported { .. }));
    }

    #[test]
    fn test_outcome_constructors() {
        let mut rec = ImportRecord::new(3, "sis");
        rec.record_uid = "42".to_string();
        rec.set_attribute("username", "jdoe");
        rec.action = RecordAction::Create;

        let ok = ImportOutcome::success(OutcomeKind::Created, &rec);
        assert_eq!(ok.kind, OutcomeKind::Created);
        assert_eq!(ok.record_uid, "42");
        assert!(!ok.is_error());

        let failed = ImportOutcome::failed(&rec, "store rejected create");
        assert!(failed.is_error());
        assert_eq!(failed.error.as_deref(), Some("store rejected create"));
    }
}
