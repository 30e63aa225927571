//! Field mapping and validation.
//!
//! Turns a [`RawRecord`] into a validated [`ImportRecord`]: rename columns to
//! domain attributes, apply scheme-derived attributes, enforce the mandatory
//! set. Custom [`FieldHandler`]s get first refusal on every field, so a
//! deployment can route columns the mapping table does not understand.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use campus_store::Person;

use crate::config::ImportConfig;
use crate::counter::CounterStore;
use crate::error::{ImportError, ImportResult, RecordError};
use crate::record::{ImportRecord, RawRecord, RecordAction};
use crate::scheme::CompiledSchemes;

/// Values of a delete-marker column that mark a record for deletion.
const TRUTHY: &[&str] = &["1", "true", "yes", "x", "ja"];

/// First-refusal handler for raw fields.
///
/// Returning `Ok(true)` claims the field; the mapper then skips its own
/// mapping-table lookup for it.
pub trait FieldHandler: Send + Sync {
    fn handle(
        &self,
        field: &str,
        value: &str,
        record: &mut ImportRecord,
    ) -> Result<bool, RecordError>;
}

/// Compiled mapper for one run.
pub struct FieldMapper {
    source_uid: String,
    mapping: HashMap<String, String>,
    schemes: CompiledSchemes,
    mandatory: Vec<String>,
    delete_marker: Option<String>,
    default_role: Option<String>,
    handlers: Vec<Box<dyn FieldHandler>>,
}

impl FieldMapper {
    /// Build a mapper, compiling all schemes.
    ///
    /// Malformed schemes, unknown references and dependency cycles fail here,
    /// before any input is read.
    pub fn new(config: &ImportConfig) -> ImportResult<Self> {
        let base_attributes: HashSet<String> = config.mapping.values().cloned().collect();
        let schemes = CompiledSchemes::compile(&config.schemes, &base_attributes)?;
        Ok(Self {
            source_uid: config.source_uid.clone(),
            mapping: config.mapping.clone(),
            schemes,
            mandatory: config.mandatory_attributes.clone(),
            delete_marker: config.delete_marker.clone(),
            default_role: config.default_role.clone(),
            handlers: Vec::new(),
        })
    }

    /// Append a custom field handler. Handlers run in registration order.
    #[must_use]
    pub fn with_handler(mut self, handler: Box<dyn FieldHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Check the input header against the mapping table.
    ///
    /// A mapped column may be absent, unless its attribute is mandatory or
    /// carries the record identity; those make every row unprocessable, so
    /// the run fails up front.
    pub fn validate_header(&self, header: &[&str]) -> ImportResult<()> {
        for (column, attribute) in &self.mapping {
            if header.contains(&column.as_str()) {
                continue;
            }
            let required = attribute == "record_uid" || self.mandatory.contains(attribute);
            if required {
                return Err(ImportError::configuration(format!(
                    "input is missing column '{column}' mapped to required attribute '{attribute}'"
                )));
            }
            debug!(column = %column, "mapped column absent from input header");
        }
        Ok(())
    }

    /// Map and validate one raw row.
    ///
    /// `existing` is the store entry already matched to this row, if any.
    /// Scheme-derived attributes the entry already carries are kept as-is,
    /// so re-imports never reassign usernames or burn counter allocations.
    pub fn map_record(
        &self,
        raw: &RawRecord,
        counters: &mut CounterStore,
        existing: Option<&Person>,
    ) -> Result<ImportRecord, RecordError> {
        let mut record = ImportRecord::new(raw.line, self.source_uid.clone());
        let mut base: HashMap<String, String> = HashMap::new();

        'fields: for (field, value) in raw.iter() {
            for handler in &self.handlers {
                if handler.handle(field, value, &mut record)? {
                    continue 'fields;
                }
            }
            if let Some(marker) = &self.delete_marker {
                if field == marker {
                    if TRUTHY.contains(&value.trim().to_lowercase().as_str()) {
                        record.action = RecordAction::Delete;
                    }
                    continue;
                }
            }
            match self.mapping.get(field) {
                Some(attribute) if attribute == "record_uid" => {
                    record.record_uid = value.trim().to_string();
                }
                Some(attribute) => {
                    base.insert(attribute.clone(), value.to_string());
                }
                // Unmapped columns are ignored
                None => {}
            }
        }

        if let Some(person) = existing {
            for attribute in self.schemes.attribute_names() {
                let open = base.get(attribute).map_or(true, String::is_empty);
                if open {
                    if let Some(value) = person.attribute(attribute) {
                        if !value.is_empty() {
                            base.insert(attribute.to_string(), value.to_string());
                        }
                    }
                }
            }
        }

        let resolved = self.schemes.evaluate_all(&base, counters)?;
        for (attribute, value) in resolved {
            record.set_attribute(attribute, value);
        }

        if let Some(role) = &self.default_role {
            let blank = record.attribute("role").map_or(true, |r| r.trim().is_empty());
            if blank {
                record.set_attribute("role", role.clone());
            }
        }

        // Records marked for deletion only need their identity
        if record.action != RecordAction::Delete {
            for attribute in &self.mandatory {
                // Identity names live in struct fields, not the attribute map
                let value = match attribute.as_str() {
                    "record_uid" => Some(record.record_uid.as_str()),
                    "source_uid" => Some(record.source_uid.as_str()),
                    name => record.attribute(name),
                };
                match value {
                    None => return Err(RecordError::missing(attribute)),
                    Some(value) if value.trim().is_empty() => {
                        return Err(RecordError::empty(attribute))
                    }
                    Some(_) => {}
                }
            }
        }

        Ok(record)
    }
}
