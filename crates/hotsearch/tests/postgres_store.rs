//! PostgreSQL snapshot store tests.
//!
//! Requires a PostgreSQL database. Set DATABASE_URL to run.
//! Run with: cargo test -p hotsearch --test postgres_store -- --ignored

use chrono::NaiveDate;
use hotsearch::db::PostgresStore;
use hotsearch::test_helpers::{records, setup_test_db};
use hotsearch::{NormalizedRecord, Partition, SnapshotStore, SourceItems};

/// Unique source id per test so runs never collide.
fn unique_source(prefix: &str) -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{}-{}", prefix, nanos)
}

async fn store() -> PostgresStore {
    PostgresStore::new(setup_test_db().await.expect("DATABASE_URL required"))
}

#[tokio::test]
#[ignore]
async fn test_latest_replace_and_order() {
    let store = store().await;
    let source = unique_source("latest");

    let mut items = records(&source, 3);
    items[1] = items[1].clone().with_hot_value("1.5万").with_description("desc");
    store.replace_latest(&source, &items).await.unwrap();
    assert_eq!(store.get_latest(&source).await.unwrap(), items);

    store.replace_latest(&source, &records(&source, 1)).await.unwrap();
    assert_eq!(store.get_latest(&source).await.unwrap().len(), 1);
}

#[tokio::test]
#[ignore]
async fn test_order_follows_write_order_not_rank() {
    let store = store().await;
    let source = unique_source("order");
    let items = vec![
        NormalizedRecord::new(3, "third", "u3"),
        NormalizedRecord::new(1, "first", "u1"),
    ];
    store.replace_latest(&source, &items).await.unwrap();
    assert_eq!(store.get_latest(&source).await.unwrap(), items);
}

#[tokio::test]
#[ignore]
async fn test_replace_all_latest_batch() {
    let store = store().await;
    let a = unique_source("batch-a");
    let b = unique_source("batch-b");

    let mut batch = SourceItems::new();
    batch.insert(a.clone(), records(&a, 2));
    batch.insert(b.clone(), records(&b, 4));
    store.replace_all_latest(&batch).await.unwrap();

    let all = store.get_all_latest().await.unwrap();
    assert_eq!(all[&a].len(), 2);
    assert_eq!(all[&b].len(), 4);
}

#[tokio::test]
#[ignore]
async fn test_history_partitions() {
    let store = store().await;
    let source = unique_source("history");
    let date = NaiveDate::from_ymd_opt(2025, 5, 20).unwrap();

    let mut batch = SourceItems::new();
    batch.insert(source.clone(), records(&source, 2));
    store
        .append_partition(Partition::new(date, 8).unwrap(), &batch)
        .await
        .unwrap();
    store
        .append_partition(Partition::new(date, 9).unwrap(), &batch)
        .await
        .unwrap();

    // Same partition again replaces rather than duplicates
    store
        .append_partition(Partition::new(date, 9).unwrap(), &batch)
        .await
        .unwrap();

    let at = store
        .get_by_partition(&source, Partition::new(date, 9).unwrap())
        .await
        .unwrap();
    assert_eq!(at.len(), 2);

    let by_date = store.get_by_date(&source, date).await.unwrap();
    assert_eq!(by_date.keys().copied().collect::<Vec<_>>(), vec![8, 9]);

    let by_source = store.get_by_source(&source).await.unwrap();
    assert_eq!(by_source.len(), 1);
    assert_eq!(by_source[&date].len(), 2);

    // History writes leave the latest view alone
    assert!(store.get_latest(&source).await.unwrap().is_empty());
}
