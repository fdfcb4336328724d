use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::{SourceError, SourceResult};
use crate::source::{MetastoreSource, MountInfo, MountSource, TableDescription};

type DatabaseEntries = BTreeMap<String, SourceResult<TableDescription>>;

/// An in-process metastore.
///
/// Individual tables can be registered as failing, and the whole source can
/// be switched to unavailable, which makes it useful for exercising the
/// crawlers' error handling.
pub struct MemoryMetastore {
    catalog: String,
    databases: Mutex<BTreeMap<String, DatabaseEntries>>,
    unavailable: AtomicBool,
    list_database_calls: AtomicUsize,
}

impl MemoryMetastore {
    pub fn new(catalog: impl Into<String>) -> Self {
        Self {
            catalog: catalog.into(),
            databases: Mutex::new(BTreeMap::new()),
            unavailable: AtomicBool::new(false),
            list_database_calls: AtomicUsize::new(0),
        }
    }

    pub fn insert_database(&self, database: &str) {
        let mut databases = self.databases.lock().unwrap_or_else(|e| e.into_inner());
        databases.entry(database.to_string()).or_default();
    }

    pub fn insert_table(&self, database: &str, table: &str, description: TableDescription) {
        self.insert_entry(database, table, Ok(description));
    }

    pub fn insert_failure(&self, database: &str, table: &str, error: SourceError) {
        self.insert_entry(database, table, Err(error));
    }

    fn insert_entry(&self, database: &str, table: &str, entry: SourceResult<TableDescription>) {
        let mut databases = self.databases.lock().unwrap_or_else(|e| e.into_inner());
        databases
            .entry(database.to_string())
            .or_default()
            .insert(table.to_string(), entry);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// The number of times the database list was requested.
    pub fn list_database_calls(&self) -> usize {
        self.list_database_calls.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> SourceResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(SourceError::unavailable(format!(
                "metastore {} is unreachable",
                self.catalog
            )))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl MetastoreSource for MemoryMetastore {
    fn catalog(&self) -> &str {
        &self.catalog
    }

    async fn list_databases(&self) -> SourceResult<Vec<String>> {
        self.list_database_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let databases = self.databases.lock().unwrap_or_else(|e| e.into_inner());
        Ok(databases.keys().cloned().collect())
    }

    async fn list_tables(&self, database: &str) -> SourceResult<Vec<String>> {
        self.check_available()?;
        let databases = self.databases.lock().unwrap_or_else(|e| e.into_inner());
        databases
            .get(database)
            .map(|x| x.keys().cloned().collect())
            .ok_or_else(|| SourceError::NotFound(format!("database {database}")))
    }

    async fn describe_table(&self, database: &str, table: &str) -> SourceResult<TableDescription> {
        self.check_available()?;
        let databases = self.databases.lock().unwrap_or_else(|e| e.into_inner());
        databases
            .get(database)
            .and_then(|x| x.get(table))
            .cloned()
            .unwrap_or_else(|| Err(SourceError::NotFound(format!("table {database}.{table}"))))
    }
}

/// An in-process list of mount points.
#[derive(Default)]
pub struct MemoryMountSource {
    mounts: Mutex<Vec<MountInfo>>,
    unavailable: AtomicBool,
    list_mount_calls: AtomicUsize,
}

impl MemoryMountSource {
    pub fn new(mounts: Vec<MountInfo>) -> Self {
        Self {
            mounts: Mutex::new(mounts),
            unavailable: AtomicBool::new(false),
            list_mount_calls: AtomicUsize::new(0),
        }
    }

    pub fn push(&self, mount: MountInfo) {
        let mut mounts = self.mounts.lock().unwrap_or_else(|e| e.into_inner());
        mounts.push(mount);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn list_mount_calls(&self) -> usize {
        self.list_mount_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl MountSource for MemoryMountSource {
    async fn list_mounts(&self) -> SourceResult<Vec<MountInfo>> {
        self.list_mount_calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SourceError::unavailable("mount table is unreachable"));
        }
        let mounts = self.mounts.lock().unwrap_or_else(|e| e.into_inner());
        Ok(mounts.clone())
    }
}
