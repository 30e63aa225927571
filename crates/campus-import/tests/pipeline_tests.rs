//! End-to-end pipeline runs against the in-memory store adapter.

use std::sync::Arc;

use async_trait::async_trait;

use campus_import::prelude::*;
use campus_store::{MemoryPersonStore, PersonSearch};

fn roster_config() -> ImportConfig {
    ImportConfig::new("sis")
        .with_column("Vorname", "firstname")
        .with_column("Nachname", "lastname")
        .with_column("ID", "record_uid")
        .with_scheme(
            "username",
            "<:umlauts><firstname:lower>[0:1].<lastname:lower>",
        )
        .with_mandatory("firstname")
        .with_mandatory("lastname")
}

fn stream(csv: &str) -> RecordStream {
    CsvReader::from_bytes(csv.as_bytes(), &InputConfig::default())
        .unwrap()
        .into_stream()
}

const ROSTER: &str = "ID;Vorname;Nachname\n1;Jane;Doe\n2;Max;Müller\n";

#[tokio::test]
async fn test_initial_import_creates_all() {
    let store = Arc::new(MemoryPersonStore::new());
    let mut pipeline = ImportPipeline::new(roster_config(), store.clone());

    let summary = pipeline.run(stream(ROSTER)).await.unwrap();
    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.created, 2);
    assert_eq!(summary.errors, 0);
    assert_eq!(store.len(), 2);

    let jane = store.find_by_key("sis", "1").await.unwrap().unwrap();
    assert_eq!(jane.attribute("username"), Some("j.doe"));
    let max = store.find_by_key("sis", "2").await.unwrap().unwrap();
    assert_eq!(max.attribute("username"), Some("m.mueller"));

    // Created entries got a generated password
    let created: Vec<_> = summary
        .outcomes
        .iter()
        .filter(|o| o.kind == OutcomeKind::Created)
        .collect();
    assert!(created.iter().all(|o| o.password.is_some()));
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let store = Arc::new(MemoryPersonStore::new());
    let mut pipeline = ImportPipeline::new(roster_config(), store.clone());
    pipeline.run(stream(ROSTER)).await.unwrap();
    let mutations_after_first = store.mutation_counts().total();

    let summary = pipeline.run(stream(ROSTER)).await.unwrap();
    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.created, 0);
    assert_eq!(summary.unchanged, 2);
    assert_eq!(store.mutation_counts().total(), mutations_after_first);
}

#[tokio::test]
async fn test_changed_row_modifies_only_that_entry() {
    let store = Arc::new(MemoryPersonStore::new());
    let mut pipeline = ImportPipeline::new(roster_config(), store.clone());
    pipeline.run(stream(ROSTER)).await.unwrap();

    let changed = "ID;Vorname;Nachname\n1;Janet;Doe\n2;Max;Müller\n";
    let summary = pipeline.run(stream(changed)).await.unwrap();
    assert_eq!(summary.modified, 1);
    assert_eq!(summary.unchanged, 1);

    let jane = store.find_by_key("sis", "1").await.unwrap().unwrap();
    assert_eq!(jane.attribute("firstname"), Some("Janet"));
}

#[tokio::test]
async fn test_counter2_numbers_colliding_usernames() {
    let store = Arc::new(MemoryPersonStore::new());
    let config = roster_config().with_scheme(
        "username",
        "<firstname:lower>[0:1].<lastname:lower>[COUNTER2]",
    );
    let mut pipeline = ImportPipeline::new(config, store.clone());

    let collisions = "ID;Vorname;Nachname\n1;Jan;Doe\n2;Jim;Doe\n3;Joe;Doe\n";
    pipeline.run(stream(collisions)).await.unwrap();

    let mut usernames = Vec::new();
    for id in ["1", "2", "3"] {
        let person = store.find_by_key("sis", id).await.unwrap().unwrap();
        usernames.push(person.attribute("username").unwrap().to_string());
    }
    assert_eq!(usernames, vec!["j.doe", "j.doe2", "j.doe3"]);
}

#[tokio::test]
async fn test_alwayscounter_numbers_every_claim() {
    let store = Arc::new(MemoryPersonStore::new());
    let config = roster_config().with_scheme(
        "username",
        "<firstname:lower>[0:1].<lastname:lower>[ALWAYSCOUNTER]",
    );
    let mut pipeline = ImportPipeline::new(config, store.clone());

    let collisions = "ID;Vorname;Nachname\n1;Jan;Doe\n2;Jim;Doe\n";
    pipeline.run(stream(collisions)).await.unwrap();

    let first = store.find_by_key("sis", "1").await.unwrap().unwrap();
    let second = store.find_by_key("sis", "2").await.unwrap().unwrap();
    assert_eq!(first.attribute("username"), Some("j.doe1"));
    assert_eq!(second.attribute("username"), Some("j.doe2"));
}

#[tokio::test]
async fn test_mandatory_violation_fails_record_not_run() {
    let store = Arc::new(MemoryPersonStore::new());
    let config = roster_config().with_tolerate_errors(5);
    let mut pipeline = ImportPipeline::new(config, store.clone());

    let input = "ID;Vorname;Nachname\n1;Jane;Doe\n2;;Müller\n";
    let summary = pipeline.run(stream(input)).await.unwrap();
    assert_eq!(summary.status, RunStatus::CompletedWithErrors);
    assert_eq!(summary.created, 1);
    assert_eq!(summary.errors, 1);

    // Only the valid record reached the store
    assert_eq!(store.len(), 1);
    let error = summary.outcomes.iter().find(|o| o.is_error()).unwrap();
    assert_eq!(error.line, 3);
    assert!(error.error.as_ref().unwrap().contains("firstname"));
}

#[tokio::test]
async fn test_error_budget_aborts_run() {
    let bad_rows = "ID;Vorname;Nachname\n1;;A\n2;;B\n3;;C\n4;Jane;Doe\n";

    // Three failures against a budget of two: abort, nothing committed
    let store = Arc::new(MemoryPersonStore::new());
    let config = roster_config().with_tolerate_errors(2);
    let mut pipeline = ImportPipeline::new(config, store.clone());
    let summary = pipeline.run(stream(bad_rows)).await.unwrap();
    assert_eq!(summary.status, RunStatus::Aborted);
    assert_eq!(summary.errors, 3);
    assert_eq!(store.mutation_counts().total(), 0);

    // Same input within a budget of three completes with errors
    let store = Arc::new(MemoryPersonStore::new());
    let config = roster_config().with_tolerate_errors(3);
    let mut pipeline = ImportPipeline::new(config, store.clone());
    let summary = pipeline.run(stream(bad_rows)).await.unwrap();
    assert_eq!(summary.status, RunStatus::CompletedWithErrors);
    assert_eq!(summary.created, 1);

    // Exactly at the limit: two failures against a budget of two complete
    let two_bad = "ID;Vorname;Nachname\n1;;A\n2;;B\n3;Jane;Doe\n";
    let store = Arc::new(MemoryPersonStore::new());
    let config = roster_config().with_tolerate_errors(2);
    let mut pipeline = ImportPipeline::new(config, store.clone());
    let summary = pipeline.run(stream(two_bad)).await.unwrap();
    assert_eq!(summary.status, RunStatus::CompletedWithErrors);
    assert_eq!(summary.errors, 2);
    assert_eq!(summary.created, 1);
}

#[tokio::test]
async fn test_reader_row_error_reports_its_line() {
    let store = Arc::new(MemoryPersonStore::new());
    let config = roster_config().with_tolerate_errors(1);
    let mut pipeline = ImportPipeline::new(config, store.clone());

    let rows: Vec<Result<RawRecord, RowError>> = vec![Err(RowError {
        line: 7,
        source: ImportError::configuration("undecodable row"),
    })];
    let summary = pipeline.run(Box::new(rows.into_iter())).await.unwrap();
    assert_eq!(summary.status, RunStatus::CompletedWithErrors);

    let error = summary.outcomes.iter().find(|o| o.is_error()).unwrap();
    assert_eq!(error.line, 7);
    assert!(error.error.as_ref().unwrap().contains("undecodable row"));
}

#[tokio::test]
async fn test_duplicate_record_key_is_fatal_before_mutation() {
    let store = Arc::new(MemoryPersonStore::new());
    let mut pipeline = ImportPipeline::new(roster_config(), store.clone());

    let input = "ID;Vorname;Nachname\n42;Jane;Doe\n42;Janet;Doe\n";
    let err = pipeline.run(stream(input)).await.unwrap_err();
    assert!(matches!(err, ImportError::DuplicateRecordKey { .. }));
    assert_eq!(store.mutation_counts().total(), 0);
}

#[tokio::test]
async fn test_dry_run_commits_nothing_but_reports_everything() {
    let store = Arc::new(MemoryPersonStore::new());
    let config = roster_config().with_dry_run(true);
    let mut pipeline = ImportPipeline::new(config, store.clone());

    let summary = pipeline.run(stream(ROSTER)).await.unwrap();
    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.created, 2);
    assert_eq!(store.mutation_counts().total(), 0);
    assert!(store.is_empty());

    // The dry run reports the same usernames a real run would produce
    let dry_usernames: Vec<_> = summary
        .outcomes
        .iter()
        .map(|o| o.attributes.get("username").cloned().unwrap())
        .collect();

    let mut pipeline = ImportPipeline::new(roster_config(), store.clone());
    let real = pipeline.run(stream(ROSTER)).await.unwrap();
    let real_usernames: Vec<_> = real
        .outcomes
        .iter()
        .map(|o| o.attributes.get("username").cloned().unwrap())
        .collect();
    assert_eq!(dry_usernames, real_usernames);
}

#[tokio::test]
async fn test_orphan_deletion_requires_full_sync() {
    let store = Arc::new(MemoryPersonStore::new());
    let mut pipeline = ImportPipeline::new(roster_config(), store.clone());
    pipeline.run(stream(ROSTER)).await.unwrap();

    // Jane left the school; default mode leaves her entry alone
    let shrunk = "ID;Vorname;Nachname\n2;Max;Müller\n";
    let summary = pipeline.run(stream(shrunk)).await.unwrap();
    assert_eq!(summary.deleted, 0);
    assert_eq!(store.len(), 2);

    // Full-sync removes her
    let config = roster_config().with_delete_orphans(true);
    let mut pipeline = ImportPipeline::new(config, store.clone());
    let summary = pipeline.run(stream(shrunk)).await.unwrap();
    assert_eq!(summary.deleted, 1);
    assert_eq!(store.len(), 1);
    assert!(store.find_by_key("sis", "1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_full_sync_spares_foreign_and_manual_entries() {
    use campus_store::{Person, PersonId};

    let store = Arc::new(MemoryPersonStore::new());
    // Entry imported from another source
    store.seed(Person {
        id: PersonId::new(),
        source_uid: Some("hr".to_string()),
        record_uid: Some("7".to_string()),
        attributes: Default::default(),
    });
    // Entry created by hand, no import provenance
    store.seed(Person {
        id: PersonId::new(),
        source_uid: None,
        record_uid: None,
        attributes: [("firstname".to_string(), "Eve".to_string())].into(),
    });

    let config = roster_config().with_delete_orphans(true);
    let mut pipeline = ImportPipeline::new(config, store.clone());
    let summary = pipeline.run(stream(ROSTER)).await.unwrap();
    assert_eq!(summary.deleted, 0);
    // Both pre-existing entries survive alongside the two imports
    assert_eq!(store.len(), 4);
}

#[tokio::test]
async fn test_pre_create_skip_reports_unchanged() {
    struct SkipAll;

    #[async_trait]
    impl ImportHook for SkipAll {
        fn name(&self) -> &str {
            "freeze"
        }

        fn stages(&self) -> Vec<HookStage> {
            vec![HookStage::PreCreate]
        }

        async fn on_record_stage(
            &self,
            _stage: HookStage,
            _record: &mut ImportRecord,
        ) -> Result<HookOutcome, HookError> {
            Ok(HookOutcome::Skip)
        }
    }

    let store = Arc::new(MemoryPersonStore::new());
    let mut pipeline = ImportPipeline::new(roster_config(), store.clone());
    pipeline.hooks_mut().register(Arc::new(SkipAll)).unwrap();

    let summary = pipeline.run(stream(ROSTER)).await.unwrap();
    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.created, 0);
    assert_eq!(summary.unchanged, 2);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_run_hook_failure_aborts() {
    struct Gate;

    #[async_trait]
    impl ImportHook for Gate {
        fn name(&self) -> &str {
            "gate"
        }

        fn stages(&self) -> Vec<HookStage> {
            vec![HookStage::PreRead]
        }

        async fn on_run_stage(
            &self,
            _stage: HookStage,
            _config: &mut ImportConfig,
        ) -> Result<(), HookError> {
            Err(HookError::new("maintenance window"))
        }
    }

    let store = Arc::new(MemoryPersonStore::new());
    let mut pipeline = ImportPipeline::new(roster_config(), store.clone());
    pipeline.hooks_mut().register(Arc::new(Gate)).unwrap();

    let err = pipeline.run(stream(ROSTER)).await.unwrap_err();
    assert!(matches!(err, ImportError::HookAborted { .. }));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_config_hook_can_rewrite_configuration() {
    struct RoleSetter;

    #[async_trait]
    impl ImportHook for RoleSetter {
        fn name(&self) -> &str {
            "role-setter"
        }

        fn stages(&self) -> Vec<HookStage> {
            vec![HookStage::PostConfigFilesRead]
        }

        async fn on_run_stage(
            &self,
            _stage: HookStage,
            config: &mut ImportConfig,
        ) -> Result<(), HookError> {
            config.default_role = Some("student".to_string());
            Ok(())
        }
    }

    let store = Arc::new(MemoryPersonStore::new());
    let mut pipeline = ImportPipeline::new(roster_config(), store.clone());
    pipeline.hooks_mut().register(Arc::new(RoleSetter)).unwrap();
    pipeline.run(stream(ROSTER)).await.unwrap();

    let jane = store.find_by_key("sis", "1").await.unwrap().unwrap();
    assert_eq!(jane.attribute("role"), Some("student"));
}

#[tokio::test]
async fn test_artifacts_written_for_aborted_run() {
    let dir = tempfile::tempdir().unwrap();
    let summary_path = dir.path().join("summary.csv");

    let store = Arc::new(MemoryPersonStore::new());
    let mut config = roster_config().with_tolerate_errors(0);
    config.output.summary_file = Some(summary_path.clone());
    let mut pipeline = ImportPipeline::new(config, store.clone());

    let input = "ID;Vorname;Nachname\n1;;A\n2;Jane;Doe\n";
    let summary = pipeline.run(stream(input)).await.unwrap();
    assert_eq!(summary.status, RunStatus::Aborted);

    let text = std::fs::read_to_string(&summary_path).unwrap();
    assert!(text.lines().count() >= 2);
    assert!(text.contains("false"));
}

#[tokio::test]
async fn test_password_artifact_lists_created_entries() {
    let dir = tempfile::tempdir().unwrap();
    let passwords_path = dir.path().join("passwords.csv");

    let store = Arc::new(MemoryPersonStore::new());
    let mut config = roster_config();
    config.output.passwords_file = Some(passwords_path.clone());
    let mut pipeline = ImportPipeline::new(config, store.clone());
    pipeline.run(stream(ROSTER)).await.unwrap();

    let text = std::fs::read_to_string(&passwords_path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[1].starts_with("j.doe;") || lines[2].starts_with("j.doe;"));
}

#[tokio::test]
async fn test_durable_counters_survive_runs() {
    let dir = tempfile::tempdir().unwrap();
    let counter_path = dir.path().join("counters.json");

    let config = || {
        let mut c = roster_config().with_scheme(
            "username",
            "<firstname:lower>[0:1].<lastname:lower>[COUNTER2]",
        );
        c.counter_file = Some(counter_path.clone());
        c
    };

    let store = Arc::new(MemoryPersonStore::new());
    let mut pipeline = ImportPipeline::new(config(), store.clone());
    pipeline
        .run(stream("ID;Vorname;Nachname\n1;Jan;Doe\n"))
        .await
        .unwrap();

    // A later run keeps record 1 on its existing username and numbers the
    // new same-named student from the persisted counter state
    let mut pipeline = ImportPipeline::new(config(), store.clone());
    pipeline
        .run(stream("ID;Vorname;Nachname\n1;Jan;Doe\n2;Jim;Doe\n"))
        .await
        .unwrap();

    let first = store.find_by_key("sis", "1").await.unwrap().unwrap();
    assert_eq!(first.attribute("username"), Some("j.doe"));
    let second = store.find_by_key("sis", "2").await.unwrap().unwrap();
    assert_eq!(second.attribute("username"), Some("j.doe2"));

    // The allocation is burned even if Jim is later deleted: a third
    // same-named student in a later run gets "j.doe3"
    let mut pipeline = ImportPipeline::new(config(), store.clone());
    pipeline
        .run(stream("ID;Vorname;Nachname\n1;Jan;Doe\n3;Jon;Doe\n"))
        .await
        .unwrap();
    let third = store.find_by_key("sis", "3").await.unwrap().unwrap();
    assert_eq!(third.attribute("username"), Some("j.doe3"));
}

#[tokio::test]
async fn test_name_matched_entries_keep_username_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    let counter_path = dir.path().join("counters.json");

    // No record_uid column: entries match by name only
    let config = || {
        let mut c = ImportConfig::new("sis")
            .with_column("Vorname", "firstname")
            .with_column("Nachname", "lastname")
            .with_scheme(
                "username",
                "<firstname:lower>[0:1].<lastname:lower>[COUNTER2]",
            )
            .with_mandatory("firstname")
            .with_mandatory("lastname");
        c.counter_file = Some(counter_path.clone());
        c
    };

    let store = Arc::new(MemoryPersonStore::new());
    let mut pipeline = ImportPipeline::new(config(), store.clone());
    let summary = pipeline
        .run(stream("Vorname;Nachname\nJan;Doe\n"))
        .await
        .unwrap();
    assert_eq!(summary.created, 1);

    let mut pipeline = ImportPipeline::new(config(), store.clone());
    let summary = pipeline
        .run(stream("Vorname;Nachname\nJan;Doe\n"))
        .await
        .unwrap();
    assert_eq!(summary.unchanged, 1);

    // The entry keeps its first username; no counter allocation was burned,
    // so the next colliding name takes the "2" suffix
    let jan = store.find_by_name("Jan", "Doe").await.unwrap().unwrap();
    assert_eq!(jan.attribute("username"), Some("j.doe"));

    let mut pipeline = ImportPipeline::new(config(), store.clone());
    pipeline
        .run(stream("Vorname;Nachname\nJan;Doe\nJim;Doe\n"))
        .await
        .unwrap();
    let jim = store.find_by_name("Jim", "Doe").await.unwrap().unwrap();
    assert_eq!(jim.attribute("username"), Some("j.doe2"));
}
