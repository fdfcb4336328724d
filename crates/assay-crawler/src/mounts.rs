use std::collections::BTreeMap;
use std::sync::Arc;

use assay_common::config::CrawlerConfig;
use assay_common::error::CommonResult;
use assay_common::path::{StoragePath, StorageProvider};
use assay_inventory::{InventoryKind, InventoryStore};
use log::debug;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::crawler::{CrawlOutcome, CrawlPolicy, CrawlerBase, Fetch, Fetched};
use crate::error::{CrawlResult, SkippedEntry, TopologyWarning};
use crate::retry::{call_with_retry, CallPolicy};
use crate::source::MountSource;

/// A workspace mount point and the storage it points to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mount {
    /// The logical path, e.g. `/mnt/raw`.
    pub name: String,
    pub source: String,
    pub provider: StorageProvider,
}

impl Mount {
    /// The logical path as a `dbfs:` location.
    pub fn path(&self) -> CommonResult<StoragePath> {
        StoragePath::parse(&self.name)
    }

    pub fn source_path(&self) -> CommonResult<StoragePath> {
        StoragePath::parse(&self.source)
    }
}

fn normalize_name(name: &str) -> Option<String> {
    let name = name.trim();
    let name = name.strip_prefix("dbfs:").unwrap_or(name);
    let name = name.trim_end_matches('/');
    if name.is_empty() {
        None
    } else if name.starts_with('/') {
        Some(name.to_string())
    } else {
        Some(format!("/{name}"))
    }
}

struct MountsFetcher {
    source: Arc<dyn MountSource>,
    calls: CallPolicy,
}

#[async_trait::async_trait]
impl Fetch<Mount> for MountsFetcher {
    async fn fetch(&self, _cancel: &CancellationToken) -> CrawlResult<Fetched<Mount>> {
        let listed =
            call_with_retry(&self.calls, "list mounts", || self.source.list_mounts()).await?;
        debug!("found {} mount entries", listed.len());

        let mut mounts: BTreeMap<String, Mount> = BTreeMap::new();
        let mut fetched = Fetched::new(vec![]);
        for info in listed {
            let Some(name) = normalize_name(&info.name) else {
                fetched
                    .skipped
                    .push(SkippedEntry::new(&info.name, "empty mount name"));
                continue;
            };
            let source = match StoragePath::parse(&info.source) {
                Ok(x) => x,
                Err(e) => {
                    fetched.skipped.push(SkippedEntry::new(name, e));
                    continue;
                }
            };
            let mount = Mount {
                name: name.clone(),
                source: source.to_string(),
                provider: source.provider(),
            };
            if let Some(previous) = mounts.insert(name.clone(), mount) {
                fetched.warnings.push(TopologyWarning::new(
                    name,
                    format!(
                        "mount listed more than once, replacing source {} with {}",
                        previous.source, source
                    ),
                ));
            }
        }
        fetched.rows = mounts.into_values().collect();
        Ok(fetched)
    }
}

/// Inventories the mount points of the workspace file system.
pub struct MountsCrawler {
    base: CrawlerBase<Mount>,
}

impl MountsCrawler {
    pub fn new(
        source: Arc<dyn MountSource>,
        store: Arc<InventoryStore>,
        config: &CrawlerConfig,
    ) -> Self {
        let fetcher = MountsFetcher {
            source,
            calls: CallPolicy::from_config(config),
        };
        Self {
            base: CrawlerBase::new(
                InventoryKind::Mounts,
                CrawlPolicy::from_config(config),
                store,
                Arc::new(fetcher),
            ),
        }
    }

    pub fn base(&self) -> &CrawlerBase<Mount> {
        &self.base
    }

    pub async fn snapshot(&self) -> CrawlResult<CrawlOutcome<Mount>> {
        self.base.snapshot().await
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::CrawlState;
    use crate::source::{MemoryMountSource, MountInfo};

    fn config() -> CrawlerConfig {
        CrawlerConfig {
            max_age_secs: 0,
            force_refresh: false,
            parallelism: 1,
            call_timeout_secs: 5,
            max_retries: 0,
            retry_backoff_ms: 1,
            include_databases: vec![],
        }
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("/mnt/raw/"), Some("/mnt/raw".to_string()));
        assert_eq!(normalize_name("dbfs:/mnt/raw"), Some("/mnt/raw".to_string()));
        assert_eq!(normalize_name("mnt/raw"), Some("/mnt/raw".to_string()));
        assert_eq!(normalize_name("/"), None);
    }

    #[tokio::test]
    async fn test_dedup_keeps_last_seen() {
        let source = Arc::new(MemoryMountSource::new(vec![
            MountInfo::new("/mnt/raw", "s3://old-bucket/raw"),
            MountInfo::new("/mnt/curated", "abfss://c@acct.dfs.core.windows.net/cur"),
            MountInfo::new("dbfs:/mnt/raw/", "s3://new-bucket/raw"),
            MountInfo::new("/", "DatabricksRoot"),
        ]));
        let crawler = MountsCrawler::new(source, Arc::new(InventoryStore::memory()), &config());
        let outcome = crawler.snapshot().await.unwrap();

        assert_eq!(
            outcome.rows,
            vec![
                Mount {
                    name: "/mnt/curated".to_string(),
                    source: "abfss://c@acct.dfs.core.windows.net/cur".to_string(),
                    provider: StorageProvider::Azure,
                },
                Mount {
                    name: "/mnt/raw".to_string(),
                    source: "s3://new-bucket/raw".to_string(),
                    provider: StorageProvider::Aws,
                },
            ]
        );
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warnings[0].subject, "/mnt/raw");
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.metadata.skipped, 1);
    }

    #[tokio::test]
    async fn test_unreachable_mount_table_degrades() {
        let source = Arc::new(MemoryMountSource::new(vec![MountInfo::new(
            "/mnt/raw",
            "s3://raw",
        )]));
        let crawler =
            MountsCrawler::new(source.clone(), Arc::new(InventoryStore::memory()), &config());
        let first = crawler.snapshot().await.unwrap();
        assert_eq!(first.state, CrawlState::Fetched);

        source.set_unavailable(true);
        let second = crawler.snapshot().await.unwrap();
        assert_eq!(second.state, CrawlState::Degraded);
        assert_eq!(second.rows, first.rows);
        assert_eq!(source.list_mount_calls(), 2);
        assert!(second.rows[0].path().unwrap().is_mount_path());
    }
}
