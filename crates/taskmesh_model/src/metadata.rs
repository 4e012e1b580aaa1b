//! Metadata high-water-mark keys.

use crate::id::EntityType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Key into the app metadata map.
///
/// Each key holds the timestamp of the most recent accepted mutation for
/// one entity type. Clients use it as a cheap checkpoint: "give me
/// everything changed since metadata[key]" instead of a full hash sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataKey {
    /// Last accepted task mutation.
    LastTaskUpdate,
    /// Last accepted user mutation.
    LastUserUpdate,
    /// Last accepted group mutation.
    LastGroupUpdate,
}

impl MetadataKey {
    /// Returns the key tracking the given entity type.
    pub fn for_entity_type(entity_type: EntityType) -> Self {
        match entity_type {
            EntityType::Task => MetadataKey::LastTaskUpdate,
            EntityType::User => MetadataKey::LastUserUpdate,
            EntityType::Group => MetadataKey::LastGroupUpdate,
        }
    }

    /// Returns the stable string form used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataKey::LastTaskUpdate => "last_task_update",
            MetadataKey::LastUserUpdate => "last_user_update",
            MetadataKey::LastGroupUpdate => "last_group_update",
        }
    }
}

impl fmt::Display for MetadataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
