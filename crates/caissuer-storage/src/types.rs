//! Change notifications published by issuer stores.

use caissuer_core::ResourceKey;
use serde::{Deserialize, Serialize};

/// Kind of spec-level change.
///
/// Status writes never produce events, so a controller watching the store is
/// not re-triggered by its own status updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreEventKind {
    /// Issuer was created or its spec changed.
    Applied,
    /// Issuer was deleted.
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreEvent {
    pub key: ResourceKey,
    pub kind: StoreEventKind,
    /// Generation of the issuer after the change (0 for deletions).
    pub generation: u64,
}

impl StoreEvent {
    pub fn applied(key: ResourceKey, generation: u64) -> Self {
        Self {
            key,
            kind: StoreEventKind::Applied,
            generation,
        }
    }

    pub fn deleted(key: ResourceKey) -> Self {
        Self {
            key,
            kind: StoreEventKind::Deleted,
            generation: 0,
        }
    }
}
