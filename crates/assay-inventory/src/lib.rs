pub mod backend;
pub mod error;
pub mod kind;
pub mod snapshot;
pub mod store;

pub use kind::InventoryKind;
pub use snapshot::{Snapshot, SnapshotMetadata};
pub use store::InventoryStore;
