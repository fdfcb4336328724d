use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use assay_common::config::LocationsConfig;
use assay_common::path::StoragePath;
use assay_crawler::error::{CrawlError, CrawlResult};
use assay_crawler::{
    CrawlOutcome, CrawlPolicy, CrawlerBase, Fetch, Fetched, Mount, MountsCrawler, Table,
    TablesCrawler,
};
use assay_inventory::{InventoryKind, InventoryStore};
use log::debug;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::matching::MountIndex;
use crate::trie::{EntryKind, LocationTrie, Reduction};

/// A storage prefix that needs an access grant before tables under it can be migrated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalLocation {
    pub location: String,
    pub table_count: usize,
    pub mount_count: usize,
    /// The location equals or lies under the source of an existing mount.
    pub satisfied_by_mount: bool,
}

/// Derives the external locations covering the crawled tables and mount sources.
///
/// Tables already reachable through a mount are left out, since access to
/// them is granted through the mount source. Every other located table,
/// including one on the workspace root file system, ends up under exactly
/// one root.
pub(crate) fn derive_external_locations(
    tables: &[Table],
    mounts: &[Mount],
    config: &LocationsConfig,
) -> Fetched<ExternalLocation> {
    let index = MountIndex::new(mounts);
    let mut tries: BTreeMap<StoragePath, LocationTrie> = BTreeMap::new();
    let mut insert = |path: &StoragePath, kind: EntryKind| {
        tries
            .entry(path.root())
            .or_insert_with(|| LocationTrie::new(path.root()))
            .insert(path, kind);
    };

    for table in tables {
        let Some(path) = table.storage_path() else {
            continue;
        };
        if let Some(mount) = index.longest_match(&path) {
            debug!("{} is reachable through mount {}", table.key(), mount.name);
            continue;
        }
        insert(&path, EntryKind::Table);
    }
    for source in index.sources() {
        insert(source, EntryKind::Mount);
    }

    let reduction = Reduction {
        min_depth: config.min_depth,
        isolation_threshold: config.isolation_threshold,
    };
    let mut fetched = Fetched::new(vec![]);
    for trie in tries.values() {
        let reduced = trie.reduce(&reduction);
        fetched.warnings.extend(reduced.warnings);
        fetched
            .rows
            .extend(reduced.roots.into_iter().map(|root| ExternalLocation {
                location: root.path.to_string(),
                table_count: root.table_count,
                mount_count: root.mount_count,
                satisfied_by_mount: index.sources().iter().any(|x| root.path.starts_with(x)),
            }));
    }
    fetched.rows.sort_by(|a, b| a.location.cmp(&b.location));
    fetched
}

struct ExternalLocationsFetcher {
    tables: Arc<TablesCrawler>,
    mounts: Arc<MountsCrawler>,
    config: LocationsConfig,
}

#[async_trait::async_trait]
impl Fetch<ExternalLocation> for ExternalLocationsFetcher {
    async fn fetch(&self, cancel: &CancellationToken) -> CrawlResult<Fetched<ExternalLocation>> {
        let (tables, mounts) = tokio::try_join!(
            self.tables.base().join_rows(),
            self.mounts.base().join_rows()
        )?;
        if cancel.is_cancelled() {
            return Err(CrawlError::Cancelled(InventoryKind::ExternalLocations));
        }
        Ok(derive_external_locations(&tables, &mounts, &self.config))
    }
}

/// The minimal set of storage prefixes to grant before migrating tables.
/// Recomputed from the upstream snapshots on every cycle.
pub struct ExternalLocations {
    base: CrawlerBase<ExternalLocation>,
}

impl ExternalLocations {
    pub fn new(
        tables: Arc<TablesCrawler>,
        mounts: Arc<MountsCrawler>,
        store: Arc<InventoryStore>,
        config: &LocationsConfig,
    ) -> Self {
        let fetcher = ExternalLocationsFetcher {
            tables,
            mounts,
            config: config.clone(),
        };
        let policy = CrawlPolicy {
            max_age: Duration::ZERO,
            force_refresh: true,
        };
        Self {
            base: CrawlerBase::new(
                InventoryKind::ExternalLocations,
                policy,
                store,
                Arc::new(fetcher),
            ),
        }
    }

    pub fn base(&self) -> &CrawlerBase<ExternalLocation> {
        &self.base
    }

    pub async fn snapshot(&self) -> CrawlResult<CrawlOutcome<ExternalLocation>> {
        self.base.snapshot().await
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use assay_crawler::TableType;

    use super::*;

    fn table(name: &str, location: &str) -> Table {
        Table {
            catalog: "hive_metastore".to_string(),
            database: "db".to_string(),
            name: name.to_string(),
            object_type: TableType::External,
            location: Some(location.to_string()),
            table_format: Some("DELTA".to_string()),
            size_in_bytes: None,
            last_modified: None,
            view_text: None,
        }
    }

    fn mount(name: &str, source: &str) -> Mount {
        let source = StoragePath::parse(source).unwrap();
        Mount {
            name: name.to_string(),
            source: source.to_string(),
            provider: source.provider(),
        }
    }

    fn locations(fetched: &Fetched<ExternalLocation>) -> Vec<(&str, usize, usize, bool)> {
        fetched
            .rows
            .iter()
            .map(|x| {
                (
                    x.location.as_str(),
                    x.table_count,
                    x.mount_count,
                    x.satisfied_by_mount,
                )
            })
            .collect()
    }

    #[test]
    fn test_tables_under_mounts_are_excluded() {
        let tables = vec![
            table("a", "/mnt/raw/a"),
            table("b", "s3://raw-bucket/landing/b"),
            table("c", "s3://curated/sales/c"),
            table("d", "dbfs:/user/hive/warehouse/d"),
        ];
        let mounts = vec![mount("/mnt/raw", "s3://raw-bucket/landing")];
        let fetched = derive_external_locations(&tables, &mounts, &LocationsConfig::default());
        assert_eq!(
            locations(&fetched),
            vec![
                ("dbfs:/user/hive/warehouse", 1, 0, false),
                ("s3://curated/sales", 1, 0, false),
                ("s3://raw-bucket/landing", 0, 1, true),
            ]
        );
    }

    #[test]
    fn test_table_beside_mount_source() {
        let tables = vec![
            table("t", "s3://raw-bucket/other/t"),
            table("u", "s3://raw-bucket/landing/sub/u"),
        ];
        let mounts = vec![mount("/mnt/raw", "s3://raw-bucket/landing")];
        let fetched = derive_external_locations(&tables, &mounts, &LocationsConfig::default());
        assert_eq!(
            locations(&fetched),
            vec![
                ("s3://raw-bucket/landing", 0, 1, true),
                ("s3://raw-bucket/other", 1, 0, false),
            ]
        );

        let config = LocationsConfig {
            min_depth: 0,
            isolation_threshold: None,
        };
        let fetched = derive_external_locations(&tables, &mounts, &config);
        assert_eq!(
            locations(&fetched),
            vec![("s3://raw-bucket", 1, 1, false)]
        );
    }

    #[test]
    fn test_views_and_unlocated_tables_are_ignored() {
        let mut view = table("v", "s3://bkt/x/v");
        view.object_type = TableType::View;
        view.location = None;
        let fetched = derive_external_locations(&[view], &[], &LocationsConfig::default());
        assert!(fetched.rows.is_empty());
    }
}
