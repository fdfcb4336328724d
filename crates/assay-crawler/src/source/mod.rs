mod dump;
mod memory;

use chrono::{DateTime, Utc};
pub use dump::{DumpSource, MetadataDump};
pub use memory::{MemoryMetastore, MemoryMountSource};
use serde::{Deserialize, Serialize};

use crate::error::SourceResult;
use crate::tables::TableType;

/// Table metadata as reported by the metastore, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescription {
    pub object_type: TableType,
    #[serde(default)]
    pub table_format: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub size_in_bytes: Option<u64>,
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub view_text: Option<String>,
}

impl TableDescription {
    pub fn managed(format: &str, location: &str) -> Self {
        Self::table(TableType::Managed, format, location)
    }

    pub fn external(format: &str, location: &str) -> Self {
        Self::table(TableType::External, format, location)
    }

    pub fn view(text: &str) -> Self {
        Self {
            object_type: TableType::View,
            table_format: None,
            location: None,
            size_in_bytes: None,
            last_modified: None,
            view_text: Some(text.to_string()),
        }
    }

    fn table(object_type: TableType, format: &str, location: &str) -> Self {
        Self {
            object_type,
            table_format: Some(format.to_string()),
            location: Some(location.to_string()),
            size_in_bytes: None,
            last_modified: None,
            view_text: None,
        }
    }
}

/// A mount point as reported by the workspace file system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountInfo {
    pub name: String,
    pub source: String,
}

impl MountInfo {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }
}

/// A legacy metastore that can be enumerated database by database.
#[async_trait::async_trait]
pub trait MetastoreSource: Send + Sync {
    /// The catalog name recorded on every crawled table.
    fn catalog(&self) -> &str;

    async fn list_databases(&self) -> SourceResult<Vec<String>>;

    async fn list_tables(&self, database: &str) -> SourceResult<Vec<String>>;

    async fn describe_table(&self, database: &str, table: &str) -> SourceResult<TableDescription>;
}

#[async_trait::async_trait]
pub trait MountSource: Send + Sync {
    async fn list_mounts(&self) -> SourceResult<Vec<MountInfo>>;
}
