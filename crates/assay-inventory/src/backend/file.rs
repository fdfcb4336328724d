use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::backend::InventoryBackend;
use crate::error::{InventoryError, InventoryResult};
use crate::kind::InventoryKind;

const SNAPSHOT_EXTENSION: &str = "json";
const PARTIAL_EXTENSION: &str = "tmp";

/// Stores one JSON file per inventory kind under a directory.
///
/// A write goes to a uniquely named temporary file first and is renamed over
/// the snapshot file once it has been synced, so the previous snapshot stays
/// readable until the new one is fully committed.
#[derive(Debug, Clone)]
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn snapshot_path(&self, kind: InventoryKind) -> PathBuf {
        self.root.join(format!("{}.{SNAPSHOT_EXTENSION}", kind.as_str()))
    }

    fn partial_path(&self, kind: InventoryKind) -> PathBuf {
        self.root.join(format!(
            "{}.{SNAPSHOT_EXTENSION}.{}.{PARTIAL_EXTENSION}",
            kind.as_str(),
            Uuid::new_v4().simple()
        ))
    }

    /// Deletes temporary files left behind by writes that never committed.
    pub async fn discard_partial_writes(&self) -> InventoryResult<usize> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(x) => x,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(InventoryError::io(&self.root, e)),
        };
        let mut count = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| InventoryError::io(&self.root, e))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|x| x == PARTIAL_EXTENSION) {
                warn!("discarding uncommitted inventory write: {}", path.display());
                fs::remove_file(&path)
                    .await
                    .map_err(|e| InventoryError::io(&path, e))?;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn write_partial(&self, path: &Path, bytes: &[u8]) -> InventoryResult<()> {
        let mut file = fs::File::create(path)
            .await
            .map_err(|e| InventoryError::io(path, e))?;
        file.write_all(bytes)
            .await
            .map_err(|e| InventoryError::io(path, e))?;
        file.flush().await.map_err(|e| InventoryError::io(path, e))?;
        file.sync_all()
            .await
            .map_err(|e| InventoryError::io(path, e))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl InventoryBackend for FileBackend {
    fn name(&self) -> &str {
        "file"
    }

    async fn read(&self, kind: InventoryKind) -> InventoryResult<Option<Vec<u8>>> {
        let path = self.snapshot_path(kind);
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(InventoryError::io(path, e)),
        }
    }

    async fn write(&self, kind: InventoryKind, bytes: Vec<u8>) -> InventoryResult<()> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| InventoryError::io(&self.root, e))?;
        let partial = self.partial_path(kind);
        let target = self.snapshot_path(kind);
        debug!(
            "writing {} bytes for {kind} to {}",
            bytes.len(),
            partial.display()
        );
        if let Err(e) = self.write_partial(&partial, &bytes).await {
            let _ = fs::remove_file(&partial).await;
            return Err(e);
        }
        if let Err(e) = fs::rename(&partial, &target).await {
            let _ = fs::remove_file(&partial).await;
            return Err(InventoryError::io(target, e));
        }
        Ok(())
    }

    async fn remove(&self, kind: InventoryKind) -> InventoryResult<bool> {
        let path = self.snapshot_path(kind);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(InventoryError::io(path, e)),
        }
    }
}
