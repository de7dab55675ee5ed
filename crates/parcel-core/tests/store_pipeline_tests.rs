/// TaskSettings ストアの流れ: open (作成 / 移行) → 保存 → 再オープン → load → execute
///
/// 実行方法: cargo test --test store_pipeline_tests

use chrono::{TimeZone, Utc};
use parcel_core::impls::StaticQueueProbe;
use parcel_core::kinds::{Level, QueueDepthMeasure, SampleLimit};
use parcel_core::ports::FixedClock;
use parcel_core::schema::task_settings::{self, MANAGER_ID};
use parcel_core::{CatalogBuilder, Configured, SchemaError, SchemaLadder, StoreConfig};
use std::sync::Arc;

#[tokio::test]
async fn test_saved_settings_survive_reopen_and_execute() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::at(dir.path().join("tasks.db"));
    let catalog = CatalogBuilder::new().with_builtin().unwrap().build().unwrap();

    {
        let repo = catalog.open_task_settings(&config).unwrap();
        assert!(repo.store().report().created);
        let measure = Configured::new(QueueDepthMeasure::new("orders", 3, SampleLimit::Limited(5)))
            .with_description("orders backlog");
        repo.save("orders", &measure).unwrap();
    }

    let repo = catalog.open_task_settings(&config).unwrap();
    assert!(!repo.store().report().created);
    assert!(!repo.store().report().was_upgraded());

    let mut loaded = repo.load::<QueueDepthMeasure>("orders").unwrap().unwrap();
    assert_eq!(loaded.description.as_deref(), Some("orders backlog"));

    let probe = StaticQueueProbe::new();
    probe.set_depth("orders", 4).await;
    let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 6, 0, 0).unwrap());
    let measurement = loaded.object.execute(&probe, &clock).await.unwrap();
    assert_eq!(measurement.level, Level::Warning);
    assert_eq!(measurement.samples_retained, 1);
}

#[tokio::test]
async fn test_v1_store_file_is_upgraded_on_open() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::at(dir.path().join("legacy.db"));

    let v1 = SchemaLadder::builder(MANAGER_ID)
        .step(1, "CREATE TABLE TaskSettings (Id INTEGER PRIMARY KEY AUTOINCREMENT, Name TEXT NOT NULL UNIQUE, Payload TEXT NOT NULL);")
        .build()
        .unwrap();
    let store = v1.open(&config).unwrap();
    store
        .connection()
        .execute(
            "INSERT INTO TaskSettings (Name, Payload) VALUES ('rule', ?1)",
            [r#"{"Type":"RequiredFieldRuleV1","Object":{"FieldName":"Invoice"}}"#],
        )
        .unwrap();
    drop(store);

    let ladder = Arc::new(task_settings::ladder().unwrap());
    let store = ladder.open_async(config.clone()).await.unwrap();
    assert_eq!(store.report().from_version, 1);
    assert_eq!(store.report().applied_steps, vec![2, 3]);
    let state = store.schema_state().unwrap();
    assert_eq!(state.current_version, 3);
    assert_eq!(state.manager_id, MANAGER_ID);
    drop(store);

    let catalog = CatalogBuilder::new().with_builtin().unwrap().build().unwrap();
    let repo = catalog.open_task_settings(&config).unwrap();
    let rules = repo.list_by_tag("RequiredFieldRuleV1").unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].name, "rule");
}

#[test]
fn test_store_from_newer_software_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::at(dir.path().join("future.db"));

    let newer = (1..=4)
        .fold(SchemaLadder::builder(MANAGER_ID), |b, v| {
            b.step(v, format!("CREATE TABLE Future{v} (Id INTEGER);"))
        })
        .build()
        .unwrap();
    newer.open(&config).unwrap();

    let catalog = CatalogBuilder::new().with_builtin().unwrap().build().unwrap();
    let err = catalog.open_task_settings(&config).unwrap_err();
    assert!(matches!(
        err,
        parcel_core::ParcelError::Schema(SchemaError::UnsupportedFutureVersion { found: 4, latest: 3 })
    ));
}
