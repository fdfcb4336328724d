use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{SourceError, SourceResult};
use crate::source::{MetastoreSource, MountInfo, MountSource, TableDescription};

fn default_catalog() -> String {
    "hive_metastore".to_string()
}

/// An exported copy of a metastore and its mount table.
///
/// ```json
/// {
///   "catalog": "hive_metastore",
///   "databases": {
///     "sales": [
///       {"name": "orders", "object_type": "EXTERNAL", "table_format": "DELTA",
///        "location": "s3://bkt/sales/orders"}
///     ]
///   },
///   "mounts": [{"name": "/mnt/raw", "source": "s3://raw-bucket"}]
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataDump {
    #[serde(default = "default_catalog")]
    pub catalog: String,
    #[serde(default)]
    pub databases: BTreeMap<String, Vec<DumpTable>>,
    #[serde(default)]
    pub mounts: Vec<MountInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpTable {
    pub name: String,
    #[serde(flatten)]
    pub description: TableDescription,
}

/// Serves both metastore and mount listings from a [`MetadataDump`].
pub struct DumpSource {
    dump: MetadataDump,
}

impl DumpSource {
    pub fn new(dump: MetadataDump) -> Self {
        Self { dump }
    }

    pub async fn load(path: impl AsRef<Path>) -> SourceResult<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SourceError::NotFound(path.display().to_string()),
            std::io::ErrorKind::PermissionDenied => {
                SourceError::PermissionDenied(path.display().to_string())
            }
            _ => SourceError::unavailable(format!("{}: {e}", path.display())),
        })?;
        let dump = serde_json::from_slice(&bytes)
            .map_err(|e| SourceError::Corrupted(format!("{}: {e}", path.display())))?;
        Ok(Self::new(dump))
    }

    pub fn dump(&self) -> &MetadataDump {
        &self.dump
    }

    fn database(&self, database: &str) -> SourceResult<&[DumpTable]> {
        self.dump
            .databases
            .get(database)
            .map(|x| x.as_slice())
            .ok_or_else(|| SourceError::NotFound(format!("database {database}")))
    }
}

#[async_trait::async_trait]
impl MetastoreSource for DumpSource {
    fn catalog(&self) -> &str {
        &self.dump.catalog
    }

    async fn list_databases(&self) -> SourceResult<Vec<String>> {
        Ok(self.dump.databases.keys().cloned().collect())
    }

    async fn list_tables(&self, database: &str) -> SourceResult<Vec<String>> {
        Ok(self
            .database(database)?
            .iter()
            .map(|x| x.name.clone())
            .collect())
    }

    async fn describe_table(&self, database: &str, table: &str) -> SourceResult<TableDescription> {
        self.database(database)?
            .iter()
            .find(|x| x.name == table)
            .map(|x| x.description.clone())
            .ok_or_else(|| SourceError::NotFound(format!("table {database}.{table}")))
    }
}

#[async_trait::async_trait]
impl MountSource for DumpSource {
    async fn list_mounts(&self) -> SourceResult<Vec<MountInfo>> {
        Ok(self.dump.mounts.clone())
    }
}
