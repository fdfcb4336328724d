use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use twox_hash::XxHash64;
use uuid::Uuid;

use crate::kind::InventoryKind;

/// Bookkeeping stored alongside the rows of one inventory kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub id: Uuid,
    pub kind: InventoryKind,
    pub crawled_at: DateTime<Utc>,
    pub row_count: usize,
    /// Source entries that could not be read during the crawl.
    pub skipped: usize,
    /// XXH64 of the serialized rows, so consumers can detect unchanged snapshots.
    pub fingerprint: String,
}

#[derive(Debug, Clone)]
pub struct Snapshot<R> {
    pub metadata: SnapshotMetadata,
    pub rows: Vec<R>,
}

pub(crate) fn fingerprint(bytes: &[u8]) -> String {
    format!("{:016x}", XxHash64::oneshot(0, bytes))
}
