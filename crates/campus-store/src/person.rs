//! The Person entity as seen by the import pipeline.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Distinguished identifier of a persisted person.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PersonId(Uuid);

impl PersonId {
    /// Generate a fresh identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PersonId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PersonId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A persisted person entry.
///
/// `source_uid` tags the import stream that created the entry; entries
/// created manually carry no `source_uid` and are never touched by
/// full-sync orphan deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
    /// Store-assigned identifier.
    pub id: PersonId,
    /// Identifier of the external system the entry was imported from.
    pub source_uid: Option<String>,
    /// Identifier of the record within the external system.
    pub record_uid: Option<String>,
    /// Flat attribute map (firstname, lastname, username, ...).
    pub attributes: HashMap<String, String>,
}

impl Person {
    /// Get a single attribute value.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Payload for creating a new person.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewPerson {
    pub source_uid: Option<String>,
    pub record_uid: Option<String>,
    pub attributes: HashMap<String, String>,
}

impl NewPerson {
    /// Create an empty payload.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the external identity keys.
    #[must_use]
    pub fn with_keys(mut self, source_uid: impl Into<String>, record_uid: impl Into<String>) -> Self {
        self.source_uid = Some(source_uid.into());
        self.record_uid = Some(record_uid.into());
        self
    }

    /// Set an attribute using builder pattern.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_person_id_display() {
        let id = PersonId::new();
        assert_eq!(id.to_string(), id.as_uuid().to_string());
    }

    #[test]
    fn test_new_person_builder() {
        let p = NewPerson::new()
            .with_keys("sis", "42")
            .with("firstname", "Jane");
        assert_eq!(p.source_uid.as_deref(), Some("sis"));
        assert_eq!(p.record_uid.as_deref(), Some("42"));
        assert_eq!(p.attributes.get("firstname").map(String::as_str), Some("Jane"));
    }
}
