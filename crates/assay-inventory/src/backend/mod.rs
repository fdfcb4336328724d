mod file;
mod memory;

pub use file::FileBackend;
pub use memory::MemoryBackend;

use crate::error::InventoryResult;
use crate::kind::InventoryKind;

/// Byte-level storage for inventory snapshots.
///
/// `write` must replace the stored value for a kind atomically: a reader
/// observes either the previous bytes or the new bytes, never a mix.
#[async_trait::async_trait]
pub trait InventoryBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn read(&self, kind: InventoryKind) -> InventoryResult<Option<Vec<u8>>>;

    async fn write(&self, kind: InventoryKind, bytes: Vec<u8>) -> InventoryResult<()>;

    /// Removes the stored value. Returns whether anything was removed.
    async fn remove(&self, kind: InventoryKind) -> InventoryResult<bool>;
}
