//! Entity identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for an entity.
///
/// Entity IDs are server-assigned integers that are:
/// - Stable for the lifetime of the entity
/// - Immutable once assigned
/// - Never reused, even after a purge
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EntityId(u64);

impl EntityId {
    /// Creates an entity ID from a raw integer.
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw integer value.
    #[inline]
    #[must_use]
    pub const fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for EntityId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// The kind of record under synchronization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// A task record.
    Task,
    /// A user record.
    User,
    /// A group record.
    Group,
}

impl EntityType {
    /// Returns the lowercase name used on the wire and in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Task => "task",
            EntityType::User => "user",
            EntityType::Group => "group",
        }
    }

    /// All entity types, in verification order.
    pub const ALL: [EntityType; 3] = [EntityType::Task, EntityType::User, EntityType::Group];
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
