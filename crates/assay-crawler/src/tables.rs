use std::sync::Arc;

use assay_common::config::CrawlerConfig;
use assay_common::error::CommonResult;
use assay_common::path::{StoragePath, StorageProvider};
use assay_inventory::{InventoryKind, InventoryStore};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::crawler::{CrawlOutcome, CrawlPolicy, CrawlerBase, Fetch, Fetched};
use crate::error::{CrawlError, CrawlResult, SkippedEntry};
use crate::retry::{call_with_retry, CallPolicy};
use crate::source::{MetastoreSource, TableDescription};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TableType {
    Managed,
    External,
    View,
}

/// One table, view, or external table found in the metastore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub catalog: String,
    pub database: String,
    pub name: String,
    pub object_type: TableType,
    /// Always `None` for views.
    pub location: Option<String>,
    pub table_format: Option<String>,
    pub size_in_bytes: Option<u64>,
    pub last_modified: Option<DateTime<Utc>>,
    pub view_text: Option<String>,
}

impl Table {
    pub fn key(&self) -> String {
        format!("{}.{}.{}", self.catalog, self.database, self.name).to_lowercase()
    }

    pub fn is_view(&self) -> bool {
        self.object_type == TableType::View
    }

    pub fn storage_path(&self) -> Option<StoragePath> {
        self.location
            .as_deref()
            .and_then(|x| StoragePath::parse(x).ok())
    }

    /// Returns whether the table lives on the workspace root file system
    /// rather than on a mount or in cloud storage.
    pub fn is_dbfs_root(&self) -> bool {
        self.storage_path()
            .is_some_and(|x| x.provider() == StorageProvider::Dbfs && !x.is_mount_path())
    }

    fn from_description(
        catalog: &str,
        database: &str,
        name: &str,
        description: TableDescription,
    ) -> CommonResult<Self> {
        let location = match (description.object_type, description.location) {
            (TableType::View, _) | (_, None) => None,
            (_, Some(location)) => Some(StoragePath::parse(&location)?.to_string()),
        };
        Ok(Self {
            catalog: catalog.to_string(),
            database: database.to_string(),
            name: name.to_string(),
            object_type: description.object_type,
            location,
            table_format: description.table_format.map(|x| x.to_uppercase()),
            size_in_bytes: description.size_in_bytes,
            last_modified: description.last_modified,
            view_text: description.view_text,
        })
    }
}

struct TablesFetcher {
    source: Arc<dyn MetastoreSource>,
    calls: CallPolicy,
    parallelism: usize,
    include_databases: Vec<String>,
}

struct DatabaseScan {
    rows: Vec<Table>,
    skipped: Vec<SkippedEntry>,
}

/// Compiles database include names into case-insensitive patterns,
/// where `*` matches any run of characters.
fn include_patterns(names: &[String]) -> CrawlResult<Vec<Regex>> {
    names
        .iter()
        .map(|name| {
            let pattern = name
                .trim()
                .split('*')
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(".*");
            Regex::new(&format!("(?i)^{pattern}$"))
                .map_err(|e| CrawlError::invalid(format!("database pattern {name}: {e}")))
        })
        .collect()
}

impl TablesFetcher {
    async fn scan_database(
        &self,
        database: &str,
        cancel: &CancellationToken,
    ) -> CrawlResult<DatabaseScan> {
        let catalog = self.source.catalog();
        let mut scan = DatabaseScan {
            rows: vec![],
            skipped: vec![],
        };
        let tables = match call_with_retry(&self.calls, "list tables", || {
            self.source.list_tables(database)
        })
        .await
        {
            Ok(x) => x,
            Err(e) if e.is_retryable() => return Err(e.into()),
            Err(e) => {
                scan.skipped
                    .push(SkippedEntry::new(format!("{catalog}.{database}"), e));
                return Ok(scan);
            }
        };
        debug!("found {} tables in {catalog}.{database}", tables.len());

        for table in tables {
            if cancel.is_cancelled() {
                return Err(CrawlError::Cancelled(InventoryKind::Tables));
            }
            let key = format!("{catalog}.{database}.{table}").to_lowercase();
            let description = call_with_retry(&self.calls, "describe table", || {
                self.source.describe_table(database, &table)
            })
            .await;
            // an outage outlasting the retries fails the whole fetch
            match description.map(|x| Table::from_description(catalog, database, &table, x)) {
                Ok(Ok(row)) => scan.rows.push(row),
                Ok(Err(e)) => scan.skipped.push(SkippedEntry::new(key, e)),
                Err(e) if e.is_retryable() => return Err(e.into()),
                Err(e) => scan.skipped.push(SkippedEntry::new(key, e)),
            }
        }
        Ok(scan)
    }
}

#[async_trait::async_trait]
impl Fetch<Table> for TablesFetcher {
    async fn fetch(&self, cancel: &CancellationToken) -> CrawlResult<Fetched<Table>> {
        let databases = call_with_retry(&self.calls, "list databases", || {
            self.source.list_databases()
        })
        .await?;
        let patterns = include_patterns(&self.include_databases)?;
        let databases: Vec<String> = databases
            .into_iter()
            .filter(|x| patterns.is_empty() || patterns.iter().any(|p| p.is_match(x)))
            .collect();
        debug!(
            "scanning {} databases with parallelism {}",
            databases.len(),
            self.parallelism
        );

        let scans: Vec<CrawlResult<DatabaseScan>> = futures::stream::iter(databases)
            .map(|database| async move { self.scan_database(&database, cancel).await })
            .buffer_unordered(self.parallelism.max(1))
            .collect()
            .await;

        let mut fetched = Fetched::new(vec![]);
        for scan in scans {
            let scan = scan?;
            fetched.rows.extend(scan.rows);
            fetched.skipped.extend(scan.skipped);
        }
        fetched
            .rows
            .sort_by(|a, b| (&a.database, &a.name).cmp(&(&b.database, &b.name)));
        fetched.skipped.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(fetched)
    }
}

/// Inventories every table of a metastore.
pub struct TablesCrawler {
    base: CrawlerBase<Table>,
}

impl TablesCrawler {
    pub fn new(
        source: Arc<dyn MetastoreSource>,
        store: Arc<InventoryStore>,
        config: &CrawlerConfig,
    ) -> Self {
        let fetcher = TablesFetcher {
            source,
            calls: CallPolicy::from_config(config),
            parallelism: config.parallelism,
            include_databases: config.include_databases.clone(),
        };
        Self {
            base: CrawlerBase::new(
                InventoryKind::Tables,
                CrawlPolicy::from_config(config),
                store,
                Arc::new(fetcher),
            ),
        }
    }

    pub fn base(&self) -> &CrawlerBase<Table> {
        &self.base
    }

    pub async fn snapshot(&self) -> CrawlResult<CrawlOutcome<Table>> {
        self.base.snapshot().await
    }
}
