use std::sync::Arc;
use std::time::Duration;

use assay_common::path::StoragePath;
use assay_crawler::error::{CrawlError, CrawlResult, TopologyWarning};
use assay_crawler::{
    CrawlOutcome, CrawlPolicy, CrawlerBase, Fetch, Fetched, Mount, MountsCrawler, Table,
    TablesCrawler,
};
use assay_inventory::{InventoryKind, InventoryStore};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::external::{ExternalLocation, ExternalLocations};
use crate::matching::{longest_prefix, MountIndex};

/// How a located table is reached: through a mount, or through an external location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInMount {
    pub table_key: String,
    pub location: String,
    pub mount_name: Option<String>,
    pub mount_source: Option<String>,
    pub external_location: Option<String>,
    pub requires_location_grant: bool,
}

pub(crate) fn derive_tables_in_mounts(
    tables: &[Table],
    mounts: &[Mount],
    locations: &[ExternalLocation],
) -> Fetched<TableInMount> {
    let index = MountIndex::new(mounts);
    let locations: Vec<(StoragePath, &str)> = locations
        .iter()
        .filter_map(|x| {
            StoragePath::parse(&x.location)
                .ok()
                .map(|path| (path, x.location.as_str()))
        })
        .collect();

    let mut fetched = Fetched::new(vec![]);
    for table in tables {
        let Some(path) = table.storage_path() else {
            continue;
        };
        let mut row = TableInMount {
            table_key: table.key(),
            location: path.to_string(),
            mount_name: None,
            mount_source: None,
            external_location: None,
            requires_location_grant: false,
        };
        if let Some(mount) = index.longest_match(&path) {
            row.mount_name = Some(mount.name.clone());
            row.mount_source = Some(mount.source.clone());
        } else {
            if path.is_mount_path() {
                fetched.warnings.push(TopologyWarning::new(
                    row.table_key.clone(),
                    format!("no mount is defined for {}", row.location),
                ));
            }
            row.requires_location_grant = true;
            row.external_location =
                longest_prefix(&path, locations.iter().map(|(p, x)| (p, x.to_string())));
            if row.external_location.is_none() {
                fetched.warnings.push(TopologyWarning::new(
                    row.table_key.clone(),
                    format!("no external location covers {}", row.location),
                ));
            }
        }
        fetched.rows.push(row);
    }
    fetched.rows.sort_by(|a, b| a.table_key.cmp(&b.table_key));
    fetched
}

struct TablesInMountsFetcher {
    tables: Arc<TablesCrawler>,
    mounts: Arc<MountsCrawler>,
    locations: Arc<ExternalLocations>,
}

#[async_trait::async_trait]
impl Fetch<TableInMount> for TablesInMountsFetcher {
    async fn fetch(&self, cancel: &CancellationToken) -> CrawlResult<Fetched<TableInMount>> {
        let (tables, mounts, locations) = tokio::try_join!(
            self.tables.base().join_rows(),
            self.mounts.base().join_rows(),
            self.locations.base().join_rows()
        )?;
        if cancel.is_cancelled() {
            return Err(CrawlError::Cancelled(InventoryKind::TablesInMounts));
        }
        Ok(derive_tables_in_mounts(&tables, &mounts, &locations))
    }
}

/// Resolves every located table to the mount or external location it is reached through.
pub struct TablesInMounts {
    base: CrawlerBase<TableInMount>,
}

impl TablesInMounts {
    pub fn new(
        tables: Arc<TablesCrawler>,
        mounts: Arc<MountsCrawler>,
        locations: Arc<ExternalLocations>,
        store: Arc<InventoryStore>,
    ) -> Self {
        let fetcher = TablesInMountsFetcher {
            tables,
            mounts,
            locations,
        };
        let policy = CrawlPolicy {
            max_age: Duration::ZERO,
            force_refresh: true,
        };
        Self {
            base: CrawlerBase::new(
                InventoryKind::TablesInMounts,
                policy,
                store,
                Arc::new(fetcher),
            ),
        }
    }

    pub fn base(&self) -> &CrawlerBase<TableInMount> {
        &self.base
    }

    pub async fn snapshot(&self) -> CrawlResult<CrawlOutcome<TableInMount>> {
        self.base.snapshot().await
    }
}
