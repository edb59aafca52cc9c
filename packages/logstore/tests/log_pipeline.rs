//! End-to-end pipeline tests: tracing events through the layer into the
//! store, retention over the accumulated rows, and the cron scheduler
//! driving retention on a cadence.

use logstore::{
    cleanup, CleanupOutcome, LogStore, RetentionPolicy, SqliteLogLayer,
};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

#[tokio::test]
async fn captured_events_accumulate_then_retention_trims_them() {
    let store = LogStore::in_memory().await.unwrap();
    let (layer, pump) = SqliteLogLayer::attach(store.clone());

    let subscriber = tracing_subscriber::registry().with(layer);
    tracing::subscriber::with_default(subscriber, || {
        for i in 0..30 {
            tracing::info!(sequence = i, "pipeline event");
        }
    });
    pump.join().await;

    assert_eq!(store.count().await.unwrap(), 30);

    let outcome = cleanup(&store, &RetentionPolicy::rows_only(20)).await.unwrap();
    assert_eq!(outcome, CleanupOutcome::Evicted { deleted: 6 });
    assert_eq!(store.count().await.unwrap(), 24);

    // The survivors are the most recent events.
    let oldest = store.recent(100).await.unwrap().pop().unwrap();
    assert_eq!(oldest.message, "pipeline event sequence=6");
}

#[tokio::test]
async fn env_filter_gates_what_reaches_the_store() {
    let store = LogStore::in_memory().await.unwrap();
    let (layer, pump) = SqliteLogLayer::attach(store.clone());

    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::new("warn"))
        .with(layer);
    tracing::subscriber::with_default(subscriber, || {
        tracing::info!("filtered out");
        tracing::warn!("kept");
    });
    pump.join().await;

    let entries = store.recent(10).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].message, "kept");
    assert_eq!(entries[0].level, "WARN");
}

#[tokio::test(flavor = "multi_thread")]
async fn scheduler_runs_retention_on_its_cadence() {
    let store = LogStore::in_memory().await.unwrap();
    for i in 0..60 {
        let entry = logstore::NewLogEntry {
            timestamp: chrono::Utc::now(),
            level: logstore::LogLevel::Debug,
            target: "pipeline::tests".to_string(),
            message: format!("seed {i}"),
            file: None,
            line: None,
        };
        store.insert(&entry).await.unwrap();
    }

    // Every second, so the test observes a pass without waiting long.
    let mut scheduler = logstore::start_retention_scheduler(
        store.clone(),
        RetentionPolicy::rows_only(50),
        "* * * * * *",
    )
    .await
    .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(2500)).await;
    scheduler.shutdown().await.ok();

    // One pass evicts 12 rows, leaving 48, which is under budget; any
    // further passes before shutdown are no-ops.
    assert_eq!(store.count().await.unwrap(), 48);
}
