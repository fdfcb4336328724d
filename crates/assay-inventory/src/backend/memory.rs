use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::backend::InventoryBackend;
use crate::error::InventoryResult;
use crate::kind::InventoryKind;

/// Keeps snapshots in process memory. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<InventoryKind, Arc<Vec<u8>>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl InventoryBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn read(&self, kind: InventoryKind) -> InventoryResult<Option<Vec<u8>>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(&kind).map(|x| x.as_ref().clone()))
    }

    async fn write(&self, kind: InventoryKind, bytes: Vec<u8>) -> InventoryResult<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(kind, Arc::new(bytes));
        Ok(())
    }

    async fn remove(&self, kind: InventoryKind) -> InventoryResult<bool> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.remove(&kind).is_some())
    }
}
