//! The import run orchestrator.
//!
//! A run flows through fixed phases: configuration hooks, scheme
//! compilation, read and map, reconcile against the store snapshot, commit
//! mutations record by record, then render artifacts and persist counters.
//! Per-record failures are tolerated up to the configured budget; exceeding
//! it stops further processing while keeping everything already committed.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use campus_store::{NewPerson, PersonId, PersonStore};

use crate::config::{ImportConfig, InputFormat};
use crate::counter::CounterStore;
use crate::error::{ImportError, ImportResult, RecordError};
use crate::hooks::{HookDispatcher, HookOutcome, HookStage};
use crate::mapper::FieldMapper;
use crate::password::generate_password;
use crate::reader::{CsvReader, JsonReader, RecordStream};
use crate::reconcile::{ExistingIndex, Reconciler};
use crate::record::{ImportOutcome, ImportRecord, OutcomeKind, RecordAction};
use crate::writer::ResultWriter;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every record processed, no failures.
    Completed,
    /// Every record processed; some failed within the error budget.
    CompletedWithErrors,
    /// The error budget was exceeded; processing stopped early.
    Aborted,
}

/// Aggregate result of one run.
#[derive(Debug)]
pub struct ImportSummary {
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub created: usize,
    pub modified: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub errors: usize,
    pub outcomes: Vec<ImportOutcome>,
}

impl ImportSummary {
    fn build(status: RunStatus, started_at: DateTime<Utc>, outcomes: Vec<ImportOutcome>) -> Self {
        let count = |kind: OutcomeKind| outcomes.iter().filter(|o| o.kind == kind).count();
        Self {
            status,
            started_at,
            finished_at: Utc::now(),
            created: count(OutcomeKind::Created),
            modified: count(OutcomeKind::Modified),
            deleted: count(OutcomeKind::Deleted),
            unchanged: count(OutcomeKind::Unchanged),
            errors: count(OutcomeKind::Error),
            outcomes,
        }
    }
}

/// The input column mapped to a given attribute, if any.
fn mapped_column(mapping: &HashMap<String, String>, attribute: &str) -> Option<String> {
    mapping
        .iter()
        .find(|(_, a)| a.as_str() == attribute)
        .map(|(column, _)| column.clone())
}

/// One configured import run against a store adapter.
pub struct ImportPipeline {
    config: ImportConfig,
    store: Arc<dyn PersonStore>,
    hooks: HookDispatcher,
}

impl ImportPipeline {
    #[must_use]
    pub fn new(config: ImportConfig, store: Arc<dyn PersonStore>) -> Self {
        Self {
            config,
            store,
            hooks: HookDispatcher::new(),
        }
    }

    /// The hook registry, for registration before the run starts.
    pub fn hooks_mut(&mut self) -> &mut HookDispatcher {
        &mut self.hooks
    }

    /// Run against an input file, picking the reader from the configuration.
    pub async fn run_file(&mut self, path: impl AsRef<Path>) -> ImportResult<ImportSummary> {
        self.hooks
            .dispatch_run(HookStage::PostConfigFilesRead, &mut self.config)
            .await?;
        self.config.validate()?;
        let mapper = FieldMapper::new(&self.config)?;
        self.hooks
            .dispatch_run(HookStage::PreRead, &mut self.config)
            .await?;
        let stream = match self.config.input.format {
            InputFormat::Csv => CsvReader::open(path, &self.config.input)?.into_stream(),
            InputFormat::Json => JsonReader::open(path, &self.config.input)?.into_stream(),
        };
        self.execute(mapper, stream).await
    }

    /// Run against a pre-built record stream.
    pub async fn run(&mut self, stream: RecordStream) -> ImportResult<ImportSummary> {
        self.hooks
            .dispatch_run(HookStage::PostConfigFilesRead, &mut self.config)
            .await?;
        self.config.validate()?;
        let mapper = FieldMapper::new(&self.config)?;
        self.hooks
            .dispatch_run(HookStage::PreRead, &mut self.config)
            .await?;
        self.execute(mapper, stream).await
    }

    #[instrument(skip_all, fields(source_uid = %self.config.source_uid, dry_run = self.config.dry_run))]
    async fn execute(
        &mut self,
        mapper: FieldMapper,
        stream: RecordStream,
    ) -> ImportResult<ImportSummary> {
        let started_at = Utc::now();

        let mut counters = match &self.config.counter_file {
            Some(path) => CounterStore::load(path)?,
            None => CounterStore::in_memory(),
        };
        if self.config.dry_run {
            // Detached copy: allocations match a real run, nothing persists
            counters = counters.snapshot();
        }

        // The snapshot is loaded before mapping so scheme-derived values
        // already held by an entry stay sticky across runs
        let index = ExistingIndex::load(self.store.as_ref()).await?;
        let uid_column = mapped_column(&self.config.mapping, "record_uid");
        let name_columns = (
            mapped_column(&self.config.mapping, "firstname"),
            mapped_column(&self.config.mapping, "lastname"),
        );

        // Phase 1: read and map everything. Mutations only start after the
        // whole input parsed cleanly of duplicates.
        let mut records: Vec<ImportRecord> = Vec::new();
        let mut outcomes: Vec<ImportOutcome> = Vec::new();
        let mut seen_keys: HashSet<(String, String)> = HashSet::new();
        let mut header_checked = false;
        let mut read_rows = 0usize;
        let mut exhausted = false;

        for item in stream {
            read_rows += 1;
            let raw = match item {
                Ok(raw) => raw,
                Err(e) => {
                    outcomes.push(ImportOutcome::failed_raw(
                        e.line,
                        &self.config.source_uid,
                        e,
                    ));
                    if self.budget_exceeded(&outcomes) {
                        exhausted = true;
                        break;
                    }
                    continue;
                }
            };
            if !header_checked {
                mapper.validate_header(&raw.field_names())?;
                header_checked = true;
            }
            // Sticky scheme values follow the reconciler's matching rule:
            // identity pair first, name fallback only without a record_uid
            let uid = uid_column
                .as_deref()
                .and_then(|column| raw.get(column))
                .map(str::trim)
                .filter(|uid| !uid.is_empty());
            let existing = match uid {
                Some(uid) => index.by_key(&self.config.source_uid, uid),
                None => match &name_columns {
                    (Some(first), Some(last)) => {
                        match (raw.get(first), raw.get(last)) {
                            (Some(f), Some(l))
                                if !f.trim().is_empty() && !l.trim().is_empty() =>
                            {
                                index.by_name(f.trim(), l.trim())
                            }
                            _ => None,
                        }
                    }
                    _ => None,
                },
            };
            match mapper.map_record(&raw, &mut counters, existing) {
                Ok(record) => {
                    if !record.record_uid.is_empty() {
                        let key = (record.source_uid.clone(), record.record_uid.clone());
                        if !seen_keys.insert(key) {
                            return Err(ImportError::DuplicateRecordKey {
                                source_uid: record.source_uid.clone(),
                                record_uid: record.record_uid.clone(),
                                line: record.line,
                            });
                        }
                    }
                    records.push(record);
                }
                Err(e) => {
                    outcomes.push(ImportOutcome::failed_raw(
                        raw.line,
                        &self.config.source_uid,
                        e,
                    ));
                    if self.budget_exceeded(&outcomes) {
                        exhausted = true;
                        break;
                    }
                }
            }
        }

        if read_rows == 0 {
            warn!("input source produced no records");
        }

        // Phase 2: reconcile against the store snapshot
        let mut aborted = exhausted;
        let mut matched: Vec<(ImportRecord, Option<PersonId>)> = Vec::new();
        if !aborted {
            let mut reconciler = Reconciler::new(index);
            for mut record in records {
                let id = reconciler.decide(&mut record);
                matched.push((record, id));
            }
            // Full-sync: entries of this source absent from the input. An
            // empty input never triggers mass deletion.
            if self.config.delete_orphans && read_rows > 0 {
                for orphan in reconciler.orphans(&self.config.source_uid) {
                    let mut record = ImportRecord::new(0, self.config.source_uid.clone());
                    record.record_uid = orphan.record_uid.clone().unwrap_or_default();
                    for (name, value) in &orphan.attributes {
                        record.set_attribute(name.clone(), value.clone());
                    }
                    record.action = RecordAction::Delete;
                    matched.push((record, Some(orphan.id)));
                }
            }
        }

        // Phase 3: commit
        if !aborted {
            for (record, id) in matched {
                let outcome = self.commit(record, id).await;
                outcomes.push(outcome);
                if self.budget_exceeded(&outcomes) {
                    aborted = true;
                    break;
                }
            }
        }

        // Artifacts are rendered even for aborted runs
        ResultWriter::new(self.config.output.clone()).write_all(&outcomes)?;
        if !self.config.dry_run {
            counters.persist()?;
        }

        let errors = outcomes.iter().filter(|o| o.is_error()).count();
        let status = if aborted {
            RunStatus::Aborted
        } else if errors > 0 {
            RunStatus::CompletedWithErrors
        } else {
            RunStatus::Completed
        };
        let summary = ImportSummary::build(status, started_at, outcomes);
        info!(
            status = ?summary.status,
            created = summary.created,
            modified = summary.modified,
            deleted = summary.deleted,
            unchanged = summary.unchanged,
            errors = summary.errors,
            "import run finished"
        );
        Ok(summary)
    }

    fn budget_exceeded(&self, outcomes: &[ImportOutcome]) -> bool {
        let errors = outcomes.iter().filter(|o| o.is_error()).count();
        errors > self.config.tolerate_errors
    }

    /// Commit one reconciled record, running its record-scoped hooks.
    async fn commit(&self, record: ImportRecord, id: Option<PersonId>) -> ImportOutcome {
        match record.action {
            RecordAction::None => ImportOutcome::success(OutcomeKind::Unchanged, &record),
            RecordAction::Create => self.commit_create(record).await,
            RecordAction::Modify => match id {
                Some(id) => self.commit_modify(record, id).await,
                None => ImportOutcome::failed(&record, "modify decided without a store entry"),
            },
            RecordAction::Delete => match id {
                Some(id) => self.commit_delete(record, id).await,
                None => ImportOutcome::success(OutcomeKind::Unchanged, &record),
            },
        }
    }

    async fn commit_create(&self, mut record: ImportRecord) -> ImportOutcome {
        if record.password.is_none() {
            record.password = Some(generate_password(self.config.password_length));
        }
        match self.hooks.dispatch_record(HookStage::PreCreate, &mut record).await {
            Ok(HookOutcome::Continue) => {}
            Ok(HookOutcome::Skip) => {
                record.action = RecordAction::None;
                return ImportOutcome::success(OutcomeKind::Unchanged, &record);
            }
            Err(e) => return ImportOutcome::failed(&record, e),
        }
        if self.config.dry_run {
            return ImportOutcome::success(OutcomeKind::Created, &record);
        }

        let mut person = NewPerson::new();
        if !record.record_uid.is_empty() {
            person = person.with_keys(record.source_uid.clone(), record.record_uid.clone());
        }
        for (name, value) in record.attributes() {
            person = person.with(name.clone(), value.clone());
        }
        for (name, value) in record.extras() {
            person = person.with(name.clone(), value.clone());
        }
        if let Err(e) = self.store.create(person).await {
            return ImportOutcome::failed(&record, RecordError::store("create", e));
        }
        match self.hooks.dispatch_record(HookStage::PostCreate, &mut record).await {
            // The entry exists; a post hook failure still fails the record
            Err(e) => ImportOutcome::failed(&record, e),
            Ok(_) => ImportOutcome::success(OutcomeKind::Created, &record),
        }
    }

    async fn commit_modify(&self, mut record: ImportRecord, id: PersonId) -> ImportOutcome {
        match self.hooks.dispatch_record(HookStage::PreModify, &mut record).await {
            Ok(HookOutcome::Continue) => {}
            Ok(HookOutcome::Skip) => {
                record.action = RecordAction::None;
                return ImportOutcome::success(OutcomeKind::Unchanged, &record);
            }
            Err(e) => return ImportOutcome::failed(&record, e),
        }
        if self.config.dry_run {
            return ImportOutcome::success(OutcomeKind::Modified, &record);
        }

        let mut changes: HashMap<String, String> = record.attributes().clone();
        changes.extend(record.extras().clone());
        let changed = match self.store.modify(id, changes).await {
            Ok(changed) => changed,
            Err(e) => return ImportOutcome::failed(&record, RecordError::store("modify", e)),
        };
        if !changed {
            record.action = RecordAction::None;
            return ImportOutcome::success(OutcomeKind::Unchanged, &record);
        }
        match self.hooks.dispatch_record(HookStage::PostModify, &mut record).await {
            Err(e) => ImportOutcome::failed(&record, e),
            Ok(_) => ImportOutcome::success(OutcomeKind::Modified, &record),
        }
    }

    async fn commit_delete(&self, mut record: ImportRecord, id: PersonId) -> ImportOutcome {
        match self.hooks.dispatch_record(HookStage::PreRemove, &mut record).await {
            Ok(HookOutcome::Continue) => {}
            Ok(HookOutcome::Skip) => {
                record.action = RecordAction::None;
                return ImportOutcome::success(OutcomeKind::Unchanged, &record);
            }
            Err(e) => return ImportOutcome::failed(&record, e),
        }
        if self.config.dry_run {
            return ImportOutcome::success(OutcomeKind::Deleted, &record);
        }

        let existed = match self.store.remove(id).await {
            Ok(existed) => existed,
            Err(e) => return ImportOutcome::failed(&record, RecordError::store("remove", e)),
        };
        if !existed {
            record.action = RecordAction::None;
            return ImportOutcome::success(OutcomeKind::Unchanged, &record);
        }
        match self.hooks.dispatch_record(HookStage::PostRemove, &mut record).await {
            Err(e) => ImportOutcome::failed(&record, e),
            Ok(_) => ImportOutcome::success(OutcomeKind::Deleted, &record),
        }
    }
}
