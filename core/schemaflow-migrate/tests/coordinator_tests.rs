use async_trait::async_trait;
use pretty_assertions::assert_eq;
use schemaflow_changes::{SchemaChange, diff};
use schemaflow_migrate::index::mock::{IndexCall, RecordingIndexSync};
use schemaflow_migrate::{
    CancelHandle, FailureReason, IndexSync, IndexSyncError, InstanceState, MappingDelta,
    MigrationConfig, MigrationCoordinator, MigrationError, NoopIndexSync,
};
use schemaflow_model::{ContainerDefinition, ContentInstance, FieldSchema, FieldType};
use schemaflow_storage::mock::FlakyStore;
use schemaflow_storage::{ContainerVersion, ContentStore, MemoryStore};
use schemaflow_types::InstanceId;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Duration;

fn article() -> ContainerDefinition {
    ContainerDefinition::schema("article")
        .with_field(FieldSchema::string("title"))
        .with_field(FieldSchema::string("rank"))
        .with_field(FieldSchema::string("notes").not_searchable())
        .with_display_field("title")
}

fn ranked() -> ContainerDefinition {
    ContainerDefinition::schema("article")
        .with_field(FieldSchema::string("title"))
        .with_field(FieldSchema::number("rank"))
        .with_field(FieldSchema::string("notes").not_searchable())
        .with_display_field("title")
}

fn fields(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

struct Fixture {
    store: Arc<MemoryStore>,
    v1: ContainerVersion,
    v2: ContainerVersion,
    changes: Vec<SchemaChange>,
    ids: Vec<InstanceId>,
}

/// Creates `article` v1 with `count` instances whose rank is `"i"`, except
/// the indices in `bad`, and commits `ranked` as v2.
async fn fixture(count: usize, bad: &[usize]) -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let v1 = store.create_container(article()).await.unwrap();
    let mut ids = Vec::new();
    for i in 0..count {
        let rank = if bad.contains(&i) {
            json!(format!("rank-{i}"))
        } else {
            json!(i.to_string())
        };
        let instance = ContentInstance::new(
            v1.container,
            v1.id,
            fields(&[("title", json!(format!("Article {i}"))), ("rank", rank)]),
        );
        ids.push(instance.id);
        store.insert_instance(instance).await.unwrap();
    }
    let changes = diff(&article(), &ranked()).unwrap();
    let v2 = store
        .commit_version(v1.container, v1.id, ranked(), changes.clone())
        .await
        .unwrap();
    Fixture {
        store,
        v1,
        v2,
        changes,
        ids,
    }
}

fn coordinator(store: Arc<dyn ContentStore>, config: MigrationConfig) -> MigrationCoordinator {
    MigrationCoordinator::new(store, Arc::new(NoopIndexSync), config)
}

// ── Partial failure ──────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn hundred_instances_three_unparseable() {
    let f = fixture(100, &[7, 42, 99]).await;
    let report = coordinator(f.store.clone(), MigrationConfig::default())
        .migrate(&f.v1, &f.v2, &f.changes)
        .await
        .unwrap();

    assert_eq!(report.migrated_count(), 97);
    assert_eq!(report.failed_count(), 3);
    assert_eq!(report.skipped_count(), 0);
    assert_eq!(report.remaining, 0);
    assert!(report.is_complete());

    for &bad in &[7, 42, 99] {
        let id = f.ids[bad];
        let failure = report.failure(id).unwrap();
        match &failure.reason {
            FailureReason::Conversion(e) => {
                assert_eq!(e.field, "rank");
                assert_eq!(e.from, "string");
                assert_eq!(e.to, "number");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(report.state_of(id), InstanceState::Failed);
        let stored = f.store.load_instance(id).await.unwrap();
        assert_eq!(stored.version, f.v1.id);
        assert_eq!(stored.get_str("rank"), Some(format!("rank-{bad}").as_str()));
    }

    let migrated = f.store.load_instance(f.ids[5]).await.unwrap();
    assert_eq!(migrated.version, f.v2.id);
    assert_eq!(migrated.get_number("rank"), Some(5.0));
    assert_eq!(report.state_of(f.ids[5]), InstanceState::Migrated);
    assert_eq!(f.store.count_bound(f.v1.id).await.unwrap(), 3);
    assert_eq!(f.store.count_bound(f.v2.id).await.unwrap(), 97);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rerun_has_empty_queue() {
    let f = fixture(20, &[]).await;
    let coordinator = coordinator(f.store.clone(), MigrationConfig::default());
    let first = coordinator.migrate(&f.v1, &f.v2, &f.changes).await.unwrap();
    assert_eq!(first.migrated_count(), 20);

    let second = coordinator.migrate(&f.v1, &f.v2, &f.changes).await.unwrap();
    assert_eq!(second.processed(), 0);
    assert_eq!(second.remaining, 0);
}

#[tokio::test]
async fn single_worker_small_pages() {
    let f = fixture(23, &[3]).await;
    let config = MigrationConfig {
        workers: 1,
        page_size: 4,
        queue_capacity: 2,
        ..Default::default()
    };
    let report = coordinator(f.store.clone(), config)
        .migrate(&f.v1, &f.v2, &f.changes)
        .await
        .unwrap();
    assert_eq!(report.migrated_count(), 22);
    assert_eq!(report.failed_count(), 1);
}

// ── Value transforms ─────────────────────────────────────────────

#[tokio::test]
async fn add_remove_and_rename_move_values() {
    let store = Arc::new(MemoryStore::new());
    let v1 = store.create_container(article()).await.unwrap();
    let instance = ContentInstance::new(
        v1.container,
        v1.id,
        fields(&[
            ("title", json!("Hello")),
            ("rank", json!("1")),
            ("notes", json!("draft")),
        ]),
    );
    let id = instance.id;
    store.insert_instance(instance).await.unwrap();

    let changes = vec![
        SchemaChange::RemoveField {
            field: "notes".into(),
        },
        SchemaChange::RenameField {
            field: "rank".into(),
            new_name: "position".into(),
        },
        SchemaChange::AddField {
            field: FieldSchema::list("tags", FieldType::String),
        },
    ];
    let target = schemaflow_changes::apply(&article(), &changes).unwrap();
    let v2 = store
        .commit_version(v1.container, v1.id, target, changes.clone())
        .await
        .unwrap();

    let report = coordinator(store.clone(), MigrationConfig::default())
        .migrate(&v1, &v2, &changes)
        .await
        .unwrap();
    assert_eq!(report.migrated, vec![id]);

    let stored = store.load_instance(id).await.unwrap();
    assert_eq!(
        stored.fields,
        fields(&[("title", json!("Hello")), ("position", json!("1"))])
    );
}

#[tokio::test]
async fn list_conversion_fails_whole_field() {
    let store = Arc::new(MemoryStore::new());
    let before = ContainerDefinition::schema("page")
        .with_field(FieldSchema::list("scores", FieldType::String));
    let after = ContainerDefinition::schema("page")
        .with_field(FieldSchema::list("scores", FieldType::Number));
    let v1 = store.create_container(before.clone()).await.unwrap();

    let good = ContentInstance::new(v1.container, v1.id, fields(&[("scores", json!(["1", "2"]))]));
    let bad = ContentInstance::new(v1.container, v1.id, fields(&[("scores", json!(["1", "two"]))]));
    let (good_id, bad_id) = (good.id, bad.id);
    store.insert_instance(good).await.unwrap();
    store.insert_instance(bad).await.unwrap();

    let changes = diff(&before, &after).unwrap();
    let v2 = store
        .commit_version(v1.container, v1.id, after, changes.clone())
        .await
        .unwrap();
    let report = coordinator(store.clone(), MigrationConfig::default())
        .migrate(&v1, &v2, &changes)
        .await
        .unwrap();

    assert_eq!(report.migrated, vec![good_id]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].instance, bad_id);
    assert_eq!(
        store.load_instance(good_id).await.unwrap().get("scores"),
        Some(&json!([1, 2]))
    );
    assert_eq!(
        store.load_instance(bad_id).await.unwrap().get("scores"),
        Some(&json!(["1", "two"]))
    );
}

#[tokio::test]
async fn added_required_field_fails_type_check() {
    let f = fixture(2, &[]).await;
    let target = ranked().with_field(FieldSchema::string("summary").required());
    let changes = diff(&ranked(), &target).unwrap();
    let v3 = f
        .store
        .commit_version(f.v2.container, f.v2.id, target, changes.clone())
        .await
        .unwrap();
    coordinator(f.store.clone(), MigrationConfig::default())
        .migrate(&f.v1, &f.v2, &f.changes)
        .await
        .unwrap();

    let report = coordinator(f.store.clone(), MigrationConfig::default())
        .migrate(&f.v2, &v3, &changes)
        .await
        .unwrap();

    assert_eq!(report.migrated_count(), 0);
    assert_eq!(report.failed_count(), 2);
    for id in &f.ids {
        match &report.failure(*id).unwrap().reason {
            FailureReason::TypeCheck { message } => assert!(message.contains("summary")),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(f.store.load_instance(*id).await.unwrap().version, f.v2.id);
    }
}

#[tokio::test]
async fn narrowed_range_fails_out_of_range_values() {
    let store = Arc::new(MemoryStore::new());
    let before = ContainerDefinition::schema("review").with_field(FieldSchema::number("stars"));
    let after = ContainerDefinition::schema("review")
        .with_field(FieldSchema::number("stars").with_range(Some(1.0), Some(5.0)));
    let v1 = store.create_container(before.clone()).await.unwrap();

    let ok = ContentInstance::new(v1.container, v1.id, fields(&[("stars", json!(4))]));
    let high = ContentInstance::new(v1.container, v1.id, fields(&[("stars", json!(9))]));
    let (ok_id, high_id) = (ok.id, high.id);
    store.insert_instance(ok).await.unwrap();
    store.insert_instance(high).await.unwrap();

    let changes = diff(&before, &after).unwrap();
    let v2 = store
        .commit_version(v1.container, v1.id, after, changes.clone())
        .await
        .unwrap();
    let report = coordinator(store.clone(), MigrationConfig::default())
        .migrate(&v1, &v2, &changes)
        .await
        .unwrap();

    assert_eq!(report.migrated, vec![ok_id]);
    assert!(matches!(
        report.failure(high_id).unwrap().reason,
        FailureReason::TypeCheck { .. }
    ));
}

// ── Retries ──────────────────────────────────────────────────────

#[tokio::test]
async fn transient_storage_errors_are_retried() {
    let f = fixture(5, &[]).await;
    let flaky = Arc::new(FlakyStore::new(f.store.clone(), 2));
    flaky.make_flaky(f.ids[1]).await;
    flaky.make_broken(f.ids[3]).await;

    let config = MigrationConfig {
        retry_backoff_ms: 1,
        ..Default::default()
    };
    let report = coordinator(flaky.clone(), config)
        .migrate(&f.v1, &f.v2, &f.changes)
        .await
        .unwrap();

    assert_eq!(report.migrated_count(), 4);
    assert!(report.migrated.contains(&f.ids[1]));
    let failure = report.failure(f.ids[3]).unwrap();
    assert_eq!(failure.attempts, 3);
    assert!(matches!(failure.reason, FailureReason::Storage { .. }));
    // 3 clean + 3 for the flaky one + 3 for the broken one
    assert_eq!(flaky.commit_attempts(), 9);
    assert_eq!(
        flaky.inner().load_instance(f.ids[3]).await.unwrap().version,
        f.v1.id
    );
}

// ── Cancellation and timeouts ────────────────────────────────────

#[tokio::test]
async fn cancelled_before_start_leaves_everything_queued() {
    let f = fixture(10, &[]).await;
    let cancel = CancelHandle::new();
    cancel.cancel();
    let report = coordinator(f.store.clone(), MigrationConfig::default())
        .migrate_with_cancel(&f.v1, &f.v2, &f.changes, &cancel)
        .await
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.processed(), 0);
    assert_eq!(report.remaining, 10);
    assert_eq!(report.state_of(f.ids[0]), InstanceState::Queued);
}

/// Cancels the run from inside the first reindex call.
struct CancelOnReindex(CancelHandle);

#[async_trait]
impl IndexSync for CancelOnReindex {
    async fn update_mapping(&self, _: &str, _: &MappingDelta) -> Result<(), IndexSyncError> {
        Ok(())
    }

    async fn reindex(&self, _: InstanceId) -> Result<(), IndexSyncError> {
        self.0.cancel();
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_mid_run_finishes_in_flight_and_resumes_later() {
    let f = fixture(10, &[]).await;
    let cancel = CancelHandle::new();
    let config = MigrationConfig::default().with_workers(1);
    let coordinator = MigrationCoordinator::new(
        f.store.clone(),
        Arc::new(CancelOnReindex(cancel.clone())),
        config.clone(),
    );

    let report = coordinator
        .migrate_with_cancel(&f.v1, &f.v2, &f.changes, &cancel)
        .await
        .unwrap();
    assert!(report.cancelled);
    assert_eq!(report.migrated_count(), 1);
    assert_eq!(report.remaining, 9);

    let resumed = MigrationCoordinator::new(f.store.clone(), Arc::new(NoopIndexSync), config)
        .migrate(&f.v1, &f.v2, &f.changes)
        .await
        .unwrap();
    assert_eq!(resumed.migrated_count(), 9);
    assert!(resumed.is_complete());
}

/// Reindexing that takes a while.
struct SlowIndex;

#[async_trait]
impl IndexSync for SlowIndex {
    async fn update_mapping(&self, _: &str, _: &MappingDelta) -> Result<(), IndexSyncError> {
        Ok(())
    }

    async fn reindex(&self, _: InstanceId) -> Result<(), IndexSyncError> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn timeout_drains_in_flight_instances() {
    let f = fixture(10, &[]).await;
    let config = MigrationConfig::default()
        .with_workers(1)
        .with_timeout(Duration::from_millis(50));
    let report = MigrationCoordinator::new(f.store.clone(), Arc::new(SlowIndex), config)
        .migrate(&f.v1, &f.v2, &f.changes)
        .await
        .unwrap();

    assert!(report.timed_out);
    assert!(!report.cancelled);
    assert_eq!(report.migrated_count(), 1);
    assert_eq!(report.remaining, 9);
    assert!(!report.is_complete());
}

// ── Index sync ───────────────────────────────────────────────────

#[tokio::test]
async fn mappings_update_before_reindexing() {
    let f = fixture(3, &[]).await;
    let index = Arc::new(RecordingIndexSync::new());
    let report = MigrationCoordinator::new(f.store.clone(), index.clone(), MigrationConfig::default())
        .migrate(&f.v1, &f.v2, &f.changes)
        .await
        .unwrap();
    assert_eq!(report.migrated_count(), 3);

    let calls = index.calls().await;
    assert_eq!(calls.len(), 4);
    assert!(matches!(
        &calls[0],
        IndexCall::UpdateMapping {
            delta: MappingDelta::ChangeFieldType { field },
            ..
        } if field.name == "rank" && field.field_type == FieldType::Number
    ));
    let mut reindexed = index.reindexed().await;
    reindexed.sort();
    let mut ids = f.ids.clone();
    ids.sort();
    assert_eq!(reindexed, ids);
}

#[tokio::test]
async fn non_searchable_changes_skip_mappings() {
    let store = Arc::new(MemoryStore::new());
    let v1 = store.create_container(article()).await.unwrap();
    let changes = vec![SchemaChange::RemoveField {
        field: "notes".into(),
    }];
    let target = schemaflow_changes::apply(&article(), &changes).unwrap();
    let v2 = store
        .commit_version(v1.container, v1.id, target, changes.clone())
        .await
        .unwrap();

    let index = Arc::new(RecordingIndexSync::new());
    MigrationCoordinator::new(store, index.clone(), MigrationConfig::default())
        .migrate(&v1, &v2, &changes)
        .await
        .unwrap();
    assert!(index.mapping_updates().await.is_empty());
}

#[tokio::test]
async fn index_failures_do_not_fail_migration() {
    let f = fixture(4, &[]).await;
    let index = Arc::new(RecordingIndexSync::failing());
    let report = MigrationCoordinator::new(f.store.clone(), index.clone(), MigrationConfig::default())
        .migrate(&f.v1, &f.v2, &f.changes)
        .await
        .unwrap();
    assert_eq!(report.migrated_count(), 4);
    assert!(report.failed.is_empty());
    assert_eq!(index.reindexed().await.len(), 4);
}

// ── Corrupt input ────────────────────────────────────────────────

#[tokio::test]
async fn changes_must_reproduce_target() {
    let f = fixture(2, &[]).await;
    let err = coordinator(f.store.clone(), MigrationConfig::default())
        .migrate(&f.v1, &f.v2, &[])
        .await
        .unwrap_err();
    assert!(matches!(err, MigrationError::ChainMismatch { .. }));
    assert_eq!(f.store.count_bound(f.v1.id).await.unwrap(), 2);
}

#[tokio::test]
async fn corrupt_chain_is_rejected() {
    let f = fixture(2, &[]).await;
    let corrupt = vec![SchemaChange::RemoveField {
        field: "missing".into(),
    }];
    let err = coordinator(f.store.clone(), MigrationConfig::default())
        .migrate(&f.v1, &f.v2, &corrupt)
        .await
        .unwrap_err();
    assert!(matches!(err, MigrationError::InvalidChange(_)));
}

#[tokio::test]
async fn versions_of_different_containers_are_rejected() {
    let f = fixture(1, &[]).await;
    let other = f.store.create_container(ranked()).await.unwrap();
    let err = coordinator(f.store.clone(), MigrationConfig::default())
        .migrate(&f.v1, &other, &f.changes)
        .await
        .unwrap_err();
    assert!(matches!(err, MigrationError::ContainerMismatch { .. }));
}
