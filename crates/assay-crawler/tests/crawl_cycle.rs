#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;

use assay_common::config::{CrawlerConfig, InventoryBackendKind, InventoryConfig};
use assay_crawler::source::{MemoryMetastore, MemoryMountSource, MountInfo, TableDescription};
use assay_crawler::{CrawlState, Mount, MountsCrawler, Table, TablesCrawler};
use assay_inventory::{InventoryKind, InventoryStore};

fn config(max_age_secs: u64) -> CrawlerConfig {
    CrawlerConfig {
        max_age_secs,
        force_refresh: false,
        parallelism: 2,
        call_timeout_secs: 5,
        max_retries: 0,
        retry_backoff_ms: 1,
        include_databases: vec![],
    }
}

fn metastore() -> Arc<MemoryMetastore> {
    let source = Arc::new(MemoryMetastore::new("hive_metastore"));
    source.insert_table(
        "sales",
        "orders",
        TableDescription::external("delta", "s3://bkt/sales/orders"),
    );
    source.insert_table(
        "sales",
        "returns",
        TableDescription::external("delta", "s3://bkt/sales/returns"),
    );
    source.insert_table(
        "raw",
        "events",
        TableDescription::external("json", "/mnt/raw/events"),
    );
    source
}

#[tokio::test]
async fn test_second_crawl_within_window_does_not_fetch() {
    let dir = tempfile::tempdir().unwrap();
    let inventory = InventoryConfig {
        backend: InventoryBackendKind::File,
        path: dir.path().display().to_string(),
    };
    let source = metastore();

    let store = Arc::new(InventoryStore::open(&inventory).await.unwrap());
    let first = TablesCrawler::new(source.clone(), store, &config(3600))
        .snapshot()
        .await
        .unwrap();
    assert!(!first.reused);

    // a fresh process reads the persisted snapshot
    let store = Arc::new(InventoryStore::open(&inventory).await.unwrap());
    let second = TablesCrawler::new(source.clone(), store, &config(3600))
        .snapshot()
        .await
        .unwrap();
    assert!(second.reused);
    assert_eq!(second.state, CrawlState::Fetched);
    assert_eq!(second.rows, first.rows);
    assert_eq!(source.list_database_calls(), 1);
}

#[tokio::test]
async fn test_tables_and_mounts_crawl_concurrently() {
    let store = Arc::new(InventoryStore::memory());
    let tables = TablesCrawler::new(metastore(), store.clone(), &config(0));
    let mounts = MountsCrawler::new(
        Arc::new(MemoryMountSource::new(vec![MountInfo::new(
            "/mnt/raw",
            "s3://raw-bucket",
        )])),
        store.clone(),
        &config(0),
    );

    let (tables_outcome, mounts_outcome) =
        tokio::try_join!(tables.snapshot(), mounts.snapshot()).unwrap();
    assert_eq!(tables_outcome.rows.len(), 3);
    assert_eq!(mounts_outcome.rows.len(), 1);
    assert_eq!(tables.base().wait_terminal().await, CrawlState::Fetched);
    assert_eq!(mounts.base().wait_terminal().await, CrawlState::Fetched);

    let stored_tables: Vec<Table> = store.load(InventoryKind::Tables).await.unwrap();
    let stored_mounts: Vec<Mount> = store.load(InventoryKind::Mounts).await.unwrap();
    assert_eq!(stored_tables, tables_outcome.rows);
    assert_eq!(stored_mounts, mounts_outcome.rows);
}

#[tokio::test]
async fn test_outage_serves_previous_snapshot() {
    let store = Arc::new(InventoryStore::memory());
    let source = metastore();
    let crawler = TablesCrawler::new(source.clone(), store.clone(), &config(0));
    let first = crawler.snapshot().await.unwrap();

    source.set_unavailable(true);
    let degraded = crawler.snapshot().await.unwrap();
    assert_eq!(degraded.state, CrawlState::Degraded);
    assert_eq!(degraded.rows, first.rows);
    assert_eq!(degraded.metadata.id, first.metadata.id);

    // the stored snapshot is untouched
    let metadata = store.metadata(InventoryKind::Tables).await.unwrap().unwrap();
    assert_eq!(metadata.id, first.metadata.id);
}
