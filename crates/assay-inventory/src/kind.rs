use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::InventoryError;

/// The logical tables of the inventory.
/// The string names are read by downstream reporting and must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InventoryKind {
    Tables,
    Mounts,
    ExternalLocations,
    TablesInMounts,
}

impl InventoryKind {
    pub const ALL: [InventoryKind; 4] = [
        InventoryKind::Tables,
        InventoryKind::Mounts,
        InventoryKind::ExternalLocations,
        InventoryKind::TablesInMounts,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InventoryKind::Tables => "tables",
            InventoryKind::Mounts => "mounts",
            InventoryKind::ExternalLocations => "external_locations",
            InventoryKind::TablesInMounts => "tables_in_mounts",
        }
    }
}

impl fmt::Display for InventoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InventoryKind {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| InventoryError::invalid(format!("unknown inventory kind: {s}")))
    }
}
