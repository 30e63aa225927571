//! Capability traits for store adapters.
//!
//! Adapters implement only the operations their backend supports; the import
//! pipeline requires the full set via the [`PersonStore`] marker.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::person::{NewPerson, Person, PersonId};

/// Capability for reading person entries.
#[async_trait]
pub trait PersonSearch: Send + Sync {
    /// Find a person by the external identity key pair.
    async fn find_by_key(&self, source_uid: &str, record_uid: &str)
        -> StoreResult<Option<Person>>;

    /// Find a person by the fallback natural key.
    ///
    /// Used only when a record carries no external identity keys.
    async fn find_by_name(&self, firstname: &str, lastname: &str) -> StoreResult<Option<Person>>;

    /// Load all person entries.
    ///
    /// The reconciler calls this once per run and indexes the snapshot;
    /// adapters should stream from the backend but may buffer.
    async fn list_all(&self) -> StoreResult<Vec<Person>>;
}

/// Capability for creating person entries.
#[async_trait]
pub trait PersonCreate: Send + Sync {
    /// Create a new person, returning the store-assigned identifier.
    async fn create(&self, person: NewPerson) -> StoreResult<PersonId>;
}

/// Capability for modifying person entries.
#[async_trait]
pub trait PersonModify: Send + Sync {
    /// Apply attribute changes to an existing person.
    ///
    /// Returns `true` if the entry changed.
    async fn modify(&self, id: PersonId, changes: HashMap<String, String>) -> StoreResult<bool>;
}

/// Capability for removing person entries.
#[async_trait]
pub trait PersonRemove: Send + Sync {
    /// Remove a person from the store.
    ///
    /// Returns `true` if the entry existed.
    async fn remove(&self, id: PersonId) -> StoreResult<bool>;
}

/// Marker trait for adapters that support the full import surface.
pub trait PersonStore: PersonSearch + PersonCreate + PersonModify + PersonRemove {}

// Blanket implementation for any adapter implementing all capabilities
impl<T> PersonStore for T where T: PersonSearch + PersonCreate + PersonModify + PersonRemove {}
