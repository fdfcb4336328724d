use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assay_common::config::{InventoryBackendKind, InventoryConfig};
use chrono::{TimeDelta, Utc};
use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::backend::{FileBackend, InventoryBackend, MemoryBackend};
use crate::error::InventoryResult;
use crate::kind::InventoryKind;
use crate::snapshot::{fingerprint, Snapshot, SnapshotMetadata};

#[derive(Serialize)]
struct StoredSnapshotRef<'a> {
    metadata: &'a SnapshotMetadata,
    rows: &'a serde_json::Value,
}

#[derive(Deserialize)]
struct StoredSnapshot<R> {
    metadata: SnapshotMetadata,
    rows: Vec<R>,
}

/// Reads only the metadata of a stored snapshot; the rows are skipped.
#[derive(Deserialize)]
struct StoredMetadata {
    metadata: SnapshotMetadata,
}

/// Typed snapshot persistence on top of an [`InventoryBackend`].
///
/// Each kind holds exactly one snapshot. Saving a kind replaces its snapshot
/// atomically, and concurrent saves of the same kind are serialized.
pub struct InventoryStore {
    backend: Arc<dyn InventoryBackend>,
    locks: Mutex<HashMap<InventoryKind, Arc<tokio::sync::Mutex<()>>>>,
}

impl InventoryStore {
    pub fn new(backend: Arc<dyn InventoryBackend>) -> Self {
        Self {
            backend,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    /// Opens the store described by the configuration.
    /// For the file backend, writes interrupted by a previous crash are discarded.
    pub async fn open(config: &InventoryConfig) -> InventoryResult<Self> {
        match config.backend {
            InventoryBackendKind::Memory => Ok(Self::memory()),
            InventoryBackendKind::File => {
                let backend = FileBackend::new(&config.path);
                let discarded = backend.discard_partial_writes().await?;
                if discarded > 0 {
                    info!("discarded {discarded} uncommitted inventory writes");
                }
                Ok(Self::new(Arc::new(backend)))
            }
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    fn lock_for(&self, kind: InventoryKind) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(kind).or_default().clone()
    }

    pub async fn save<R: Serialize>(
        &self,
        kind: InventoryKind,
        rows: &[R],
    ) -> InventoryResult<SnapshotMetadata> {
        self.save_with_skipped(kind, rows, 0).await
    }

    /// Replaces the snapshot of `kind`, recording how many source entries
    /// were skipped while producing `rows`.
    pub async fn save_with_skipped<R: Serialize>(
        &self,
        kind: InventoryKind,
        rows: &[R],
        skipped: usize,
    ) -> InventoryResult<SnapshotMetadata> {
        let rows = serde_json::to_value(rows)?;
        let metadata = SnapshotMetadata {
            id: Uuid::new_v4(),
            kind,
            crawled_at: Utc::now(),
            row_count: rows.as_array().map(|x| x.len()).unwrap_or_default(),
            skipped,
            fingerprint: fingerprint(&serde_json::to_vec(&rows)?),
        };
        let bytes = serde_json::to_vec(&StoredSnapshotRef {
            metadata: &metadata,
            rows: &rows,
        })?;

        let lock = self.lock_for(kind);
        let _guard = lock.lock().await;
        self.backend.write(kind, bytes).await?;
        debug!(
            "saved {kind} snapshot {} with {} rows",
            metadata.id, metadata.row_count
        );
        Ok(metadata)
    }

    pub async fn load_snapshot<R: DeserializeOwned>(
        &self,
        kind: InventoryKind,
    ) -> InventoryResult<Option<Snapshot<R>>> {
        let Some(bytes) = self.backend.read(kind).await? else {
            return Ok(None);
        };
        let stored: StoredSnapshot<R> = serde_json::from_slice(&bytes)?;
        Ok(Some(Snapshot {
            metadata: stored.metadata,
            rows: stored.rows,
        }))
    }

    /// Returns the rows of the latest snapshot, or no rows if there is none.
    pub async fn load<R: DeserializeOwned>(&self, kind: InventoryKind) -> InventoryResult<Vec<R>> {
        Ok(self
            .load_snapshot(kind)
            .await?
            .map(|x| x.rows)
            .unwrap_or_default())
    }

    pub async fn metadata(&self, kind: InventoryKind) -> InventoryResult<Option<SnapshotMetadata>> {
        let Some(bytes) = self.backend.read(kind).await? else {
            return Ok(None);
        };
        let stored: StoredMetadata = serde_json::from_slice(&bytes)?;
        Ok(Some(stored.metadata))
    }

    /// Returns whether the latest snapshot of `kind` was taken within `max_age`.
    /// A zero `max_age` is never fresh.
    pub async fn is_fresh(&self, kind: InventoryKind, max_age: Duration) -> InventoryResult<bool> {
        if max_age.is_zero() {
            return Ok(false);
        }
        let Some(metadata) = self.metadata(kind).await? else {
            return Ok(false);
        };
        let max_age = TimeDelta::from_std(max_age).unwrap_or(TimeDelta::MAX);
        Ok(Utc::now() - metadata.crawled_at <= max_age)
    }

    /// Deletes the snapshot of `kind`. Returns whether there was one.
    pub async fn reset(&self, kind: InventoryKind) -> InventoryResult<bool> {
        let lock = self.lock_for(kind);
        let _guard = lock.lock().await;
        let removed = self.backend.remove(kind).await?;
        if removed {
            info!("reset {kind} inventory");
        }
        Ok(removed)
    }

    pub async fn reset_all(&self) -> InventoryResult<usize> {
        let mut count = 0;
        for kind in InventoryKind::ALL {
            if self.reset(kind).await? {
                count += 1;
            }
        }
        Ok(count)
    }
}
