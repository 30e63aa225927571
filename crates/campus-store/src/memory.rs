//! In-memory store adapter for tests and the CLI demo mode.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{StoreError, StoreResult};
use crate::person::{NewPerson, Person, PersonId};
use crate::traits::{PersonCreate, PersonModify, PersonRemove, PersonSearch};

/// Counters for mutating calls, exposed so tests can assert dry-run behavior.
#[derive(Debug, Default)]
pub struct MutationCounts {
    pub creates: AtomicUsize,
    pub modifies: AtomicUsize,
    pub removes: AtomicUsize,
}

impl MutationCounts {
    /// Total number of mutating calls observed.
    pub fn total(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
            + self.modifies.load(Ordering::SeqCst)
            + self.removes.load(Ordering::SeqCst)
    }
}

/// A store adapter backed by a process-local map.
#[derive(Debug, Default)]
pub struct MemoryPersonStore {
    entries: Mutex<HashMap<PersonId, Person>>,
    counts: MutationCounts,
}

impl MemoryPersonStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Access the mutation counters.
    pub fn mutation_counts(&self) -> &MutationCounts {
        &self.counts
    }

    /// Number of entries currently stored.
    pub fn len(&self) -> usize {
        self.entries.lock().expect("store lock poisoned").len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Seed an entry directly, bypassing the adapter surface.
    pub fn seed(&self, person: Person) {
        self.entries
            .lock()
            .expect("store lock poisoned")
            .insert(person.id, person);
    }
}

#[async_trait]
impl PersonSearch for MemoryPersonStore {
    async fn find_by_key(
        &self,
        source_uid: &str,
        record_uid: &str,
    ) -> StoreResult<Option<Person>> {
        let entries = self.entries.lock().expect("store lock poisoned");
        Ok(entries
            .values()
            .find(|p| {
                p.source_uid.as_deref() == Some(source_uid)
                    && p.record_uid.as_deref() == Some(record_uid)
            })
            .cloned())
    }

    async fn find_by_name(&self, firstname: &str, lastname: &str) -> StoreResult<Option<Person>> {
        let entries = self.entries.lock().expect("store lock poisoned");
        Ok(entries
            .values()
            .find(|p| {
                p.attribute("firstname") == Some(firstname)
                    && p.attribute("lastname") == Some(lastname)
            })
            .cloned())
    }

    async fn list_all(&self) -> StoreResult<Vec<Person>> {
        let entries = self.entries.lock().expect("store lock poisoned");
        Ok(entries.values().cloned().collect())
    }
}

#[async_trait]
impl PersonCreate for MemoryPersonStore {
    async fn create(&self, person: NewPerson) -> StoreResult<PersonId> {
        let mut entries = self.entries.lock().expect("store lock poisoned");
        if let (Some(s), Some(r)) = (&person.source_uid, &person.record_uid) {
            let exists = entries.values().any(|p| {
                p.source_uid.as_deref() == Some(s.as_str())
                    && p.record_uid.as_deref() == Some(r.as_str())
            });
            if exists {
                return Err(StoreError::already_exists(format!("{s}/{r}")));
            }
        }
        let id = PersonId::new();
        entries.insert(
            id,
            Person {
                id,
                source_uid: person.source_uid,
                record_uid: person.record_uid,
                attributes: person.attributes,
            },
        );
        self.counts.creates.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }
}

#[async_trait]
impl PersonModify for MemoryPersonStore {
    async fn modify(&self, id: PersonId, changes: HashMap<String, String>) -> StoreResult<bool> {
        let mut entries = self.entries.lock().expect("store lock poisoned");
        let person = entries
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found(id.to_string()))?;
        let mut changed = false;
        for (name, value) in changes {
            if person.attributes.get(&name) != Some(&value) {
                person.attributes.insert(name, value);
                changed = true;
            }
        }
        self.counts.modifies.fetch_add(1, Ordering::SeqCst);
        Ok(changed)
    }
}

#[async_trait]
impl PersonRemove for MemoryPersonStore {
    async fn remove(&self, id: PersonId) -> StoreResult<bool> {
        let mut entries = self.entries.lock().expect("store lock poisoned");
        let existed = entries.remove(&id).is_some();
        self.counts.removes.fetch_add(1, Ordering::SeqCst);
        Ok(existed)
    }
}
