pub mod external;
mod matching;
pub mod tables_in_mounts;
mod trie;

pub use external::{ExternalLocation, ExternalLocations};
pub use tables_in_mounts::{TableInMount, TablesInMounts};
