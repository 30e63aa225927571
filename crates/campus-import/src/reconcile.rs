//! Reconciliation of incoming records against the store.
//!
//! The reconciler loads the existing-entry snapshot once per run, indexes it
//! by the external identity key pair, and decides per record whether anything
//! has to change. Attribute comparison covers only the attributes the run
//! produces; values other tools maintain on an entry never force a modify.

use std::collections::{HashMap, HashSet};

use tracing::{debug, instrument};

use campus_store::{Person, PersonId, PersonSearch, StoreResult};

use crate::record::{ImportRecord, RecordAction};

/// Snapshot of existing entries, indexed for reconciliation.
pub struct ExistingIndex {
    entries: HashMap<PersonId, Person>,
    by_key: HashMap<(String, String), PersonId>,
    by_name: HashMap<(String, String), PersonId>,
}

impl ExistingIndex {
    /// Load and index the store snapshot. Called once per run.
    #[instrument(skip(store))]
    pub async fn load<S: PersonSearch + ?Sized>(store: &S) -> StoreResult<Self> {
        let all = store.list_all().await?;
        debug!(entries = all.len(), "loaded existing entries");

        let mut entries = HashMap::with_capacity(all.len());
        let mut by_key = HashMap::new();
        let mut by_name = HashMap::new();
        for person in all {
            if let (Some(source_uid), Some(record_uid)) = (&person.source_uid, &person.record_uid)
            {
                by_key.insert((source_uid.clone(), record_uid.clone()), person.id);
            }
            if let (Some(first), Some(last)) =
                (person.attribute("firstname"), person.attribute("lastname"))
            {
                by_name.insert((first.to_string(), last.to_string()), person.id);
            }
            entries.insert(person.id, person);
        }
        Ok(Self {
            entries,
            by_key,
            by_name,
        })
    }

    /// Look up an entry by the external identity key pair.
    pub fn by_key(&self, source_uid: &str, record_uid: &str) -> Option<&Person> {
        self.by_key
            .get(&(source_uid.to_string(), record_uid.to_string()))
            .and_then(|id| self.entries.get(id))
    }

    /// Look up an entry by the fallback natural key.
    pub fn by_name(&self, firstname: &str, lastname: &str) -> Option<&Person> {
        self.by_name
            .get(&(firstname.to_string(), lastname.to_string()))
            .and_then(|id| self.entries.get(id))
    }

    /// Number of indexed entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the snapshot is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Per-run reconciliation state: the snapshot plus which entries the input
/// has claimed so far.
pub struct Reconciler {
    index: ExistingIndex,
    matched: HashSet<PersonId>,
}

impl Reconciler {
    #[must_use]
    pub fn new(index: ExistingIndex) -> Self {
        Self {
            index,
            matched: HashSet::new(),
        }
    }

    /// Decide the action for one mapped record.
    ///
    /// Sets `record.action` and returns the matched store identifier, if
    /// any. A record already marked for deletion keeps that action when the
    /// entry exists and degrades to a no-op when it does not.
    pub fn decide(&mut self, record: &mut ImportRecord) -> Option<PersonId> {
        let existing = self
            .find(record)
            .map(|person| (person.id, attributes_differ(record, person)));
        match existing {
            Some((id, differs)) => {
                self.matched.insert(id);
                if record.action != RecordAction::Delete {
                    record.action = if differs {
                        RecordAction::Modify
                    } else {
                        RecordAction::None
                    };
                }
                Some(id)
            }
            None => {
                record.action = match record.action {
                    // Deleting something that is not there is a no-op
                    RecordAction::Delete => RecordAction::None,
                    _ => RecordAction::Create,
                };
                None
            }
        }
    }

    fn find(&self, record: &ImportRecord) -> Option<&Person> {
        if !record.record_uid.is_empty() {
            return self.index.by_key(&record.source_uid, &record.record_uid);
        }
        // Natural-key fallback only for records without an external identity
        let first = record.attribute("firstname")?;
        let last = record.attribute("lastname")?;
        self.index.by_name(first, last)
    }

    /// Entries of this run's source absent from the input.
    ///
    /// Entries with no `source_uid` were never imported and are not
    /// candidates, regardless of full-sync settings.
    pub fn orphans(&self, source_uid: &str) -> Vec<&Person> {
        let mut orphans: Vec<&Person> = self
            .index
            .entries
            .values()
            .filter(|p| {
                !self.matched.contains(&p.id) && p.source_uid.as_deref() == Some(source_uid)
            })
            .collect();
        orphans.sort_by_key(|p| p.record_uid.clone());
        orphans
    }
}

/// Whether any attribute the record produces differs from the stored entry.
fn attributes_differ(record: &ImportRecord, person: &Person) -> bool {
    record
        .attributes()
        .iter()
        .any(|(name, value)| person.attribute(name) != Some(value.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use campus_store::MemoryPersonStore;

    async fn index_of(store: &MemoryPersonStore) -> ExistingIndex {
        ExistingIndex::load(store).await.unwrap()
    }

    fn person(keys: Option<(&str, &str)>, pairs: &[(&str, &str)]) -> Person {
        Person {
            id: PersonId::new(),
            source_uid: keys.map(|(s, _)| s.to_string()),
            record_uid: keys.map(|(_, r)| r.to_string()),
            attributes: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn record(record_uid: &str, pairs: &[(&str, &str)]) -> ImportRecord {
        let mut r = ImportRecord::new(2, "sis");
        r.record_uid = record_uid.to_string();
        for (k, v) in pairs {
            r.set_attribute(*k, *v);
        }
        r
    }

    #[tokio::test]
    async fn test_unknown_record_is_create() {
        let store = MemoryPersonStore::new();
        let mut reconciler = Reconciler::new(index_of(&store).await);

        let mut rec = record("42", &[("firstname", "Jane")]);
        let id = reconciler.decide(&mut rec);
        assert!(id.is_none());
        assert_eq!(rec.action, RecordAction::Create);
    }

    #[tokio::test]
    async fn test_identical_record_is_noop() {
        let store = MemoryPersonStore::new();
        store.seed(person(Some(("sis", "42")), &[("firstname", "Jane")]));
        let mut reconciler = Reconciler::new(index_of(&store).await);

        let mut rec = record("42", &[("firstname", "Jane")]);
        let id = reconciler.decide(&mut rec);
        assert!(id.is_some());
        assert_eq!(rec.action, RecordAction::None);
    }

    #[tokio::test]
    async fn test_changed_attribute_is_modify() {
        let store = MemoryPersonStore::new();
        store.seed(person(Some(("sis", "42")), &[("firstname", "Jane")]));
        let mut reconciler = Reconciler::new(index_of(&store).await);

        let mut rec = record("42", &[("firstname", "Janet")]);
        assert!(reconciler.decide(&mut rec).is_some());
        assert_eq!(rec.action, RecordAction::Modify);
    }

    #[tokio::test]
    async fn test_foreign_attributes_do_not_force_modify() {
        let store = MemoryPersonStore::new();
        store.seed(person(
            Some(("sis", "42")),
            &[("firstname", "Jane"), ("locker", "B-12")],
        ));
        let mut reconciler = Reconciler::new(index_of(&store).await);

        // The run does not produce "locker"; the extra value is no diff
        let mut rec = record("42", &[("firstname", "Jane")]);
        reconciler.decide(&mut rec);
        assert_eq!(rec.action, RecordAction::None);
    }

    #[tokio::test]
    async fn test_delete_marker_degrades_when_absent() {
        let store = MemoryPersonStore::new();
        let mut reconciler = Reconciler::new(index_of(&store).await);

        let mut rec = record("42", &[]);
        rec.action = RecordAction::Delete;
        assert!(reconciler.decide(&mut rec).is_none());
        assert_eq!(rec.action, RecordAction::None);
    }

    #[tokio::test]
    async fn test_delete_marked_existing_entry_keeps_delete() {
        let store = MemoryPersonStore::new();
        store.seed(person(Some(("sis", "42")), &[("firstname", "Jane")]));
        let mut reconciler = Reconciler::new(index_of(&store).await);

        let mut rec = record("42", &[("firstname", "Janet")]);
        rec.action = RecordAction::Delete;
        assert!(reconciler.decide(&mut rec).is_some());
        assert_eq!(rec.action, RecordAction::Delete);
        // The matched entry is claimed and never doubles as an orphan
        assert!(reconciler.orphans("sis").is_empty());
    }

    #[tokio::test]
    async fn test_natural_key_fallback_without_record_uid() {
        let store = MemoryPersonStore::new();
        store.seed(person(None, &[("firstname", "Jane"), ("lastname", "Doe")]));
        let mut reconciler = Reconciler::new(index_of(&store).await);

        let mut rec = record("", &[("firstname", "Jane"), ("lastname", "Doe")]);
        assert!(reconciler.decide(&mut rec).is_some());
        assert_eq!(rec.action, RecordAction::None);
    }

    #[tokio::test]
    async fn test_orphans_scoped_to_source() {
        let store = MemoryPersonStore::new();
        store.seed(person(Some(("sis", "42")), &[("firstname", "Jane")]));
        store.seed(person(Some(("sis", "43")), &[("firstname", "Max")]));
        store.seed(person(Some(("hr", "7")), &[("firstname", "Ada")]));
        // Manually created entry without source_uid
        store.seed(person(None, &[("firstname", "Eve")]));

        let mut reconciler = Reconciler::new(index_of(&store).await);
        let mut rec = record("42", &[("firstname", "Jane")]);
        reconciler.decide(&mut rec);

        let orphans = reconciler.orphans("sis");
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].record_uid.as_deref(), Some("43"));
    }
}
