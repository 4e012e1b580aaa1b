//! Entity records.

use crate::id::{EntityId, EntityType};
use crate::time::Timestamp;
use serde::{Deserialize, Serialize};

/// A task under synchronization.
///
/// Deletion is a tombstone: the record is retained with `deleted` set so
/// that clients holding a stale copy learn of the deletion during hash
/// verification instead of seeing the id silently disappear.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Server-assigned identifier.
    pub id: EntityId,
    /// Display name.
    pub name: String,
    /// Free-form notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Whether the task has been completed.
    pub completed: bool,
    /// Whether the task is active (deactivated tasks are hidden, not deleted).
    pub enabled: bool,
    /// Owning group, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<EntityId>,
    /// Users the task is assigned to.
    #[serde(default)]
    pub assignee_ids: Vec<EntityId>,
    /// Last accepted mutation time. Monotonically non-decreasing.
    pub updated_at: Timestamp,
    /// Tombstone flag.
    #[serde(default)]
    pub deleted: bool,
}

impl Task {
    /// Creates a new task with the given identity and name.
    pub fn new(id: EntityId, name: impl Into<String>, updated_at: Timestamp) -> Self {
        Self {
            id,
            name: name.into(),
            notes: None,
            completed: false,
            enabled: true,
            group_id: None,
            assignee_ids: Vec::new(),
            updated_at,
            deleted: false,
        }
    }
}

/// A user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Server-assigned identifier.
    pub id: EntityId,
    /// Display name.
    pub name: String,
    /// Whether the user is active.
    pub enabled: bool,
    /// Last accepted mutation time.
    pub updated_at: Timestamp,
    /// Tombstone flag.
    #[serde(default)]
    pub deleted: bool,
}

impl User {
    /// Creates a new user with the given identity and name.
    pub fn new(id: EntityId, name: impl Into<String>, updated_at: Timestamp) -> Self {
        Self {
            id,
            name: name.into(),
            enabled: true,
            updated_at,
            deleted: false,
        }
    }
}

/// A group record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Server-assigned identifier.
    pub id: EntityId,
    /// Display name.
    pub name: String,
    /// Whether the group is active.
    pub enabled: bool,
    /// Member users.
    #[serde(default)]
    pub member_ids: Vec<EntityId>,
    /// Last accepted mutation time.
    pub updated_at: Timestamp,
    /// Tombstone flag.
    #[serde(default)]
    pub deleted: bool,
}

impl Group {
    /// Creates a new group with the given identity and name.
    pub fn new(id: EntityId, name: impl Into<String>, updated_at: Timestamp) -> Self {
        Self {
            id,
            name: name.into(),
            enabled: true,
            member_ids: Vec::new(),
            updated_at,
            deleted: false,
        }
    }
}

/// Any record under synchronization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "entity_type", rename_all = "snake_case")]
pub enum Entity {
    /// A task record.
    Task(Task),
    /// A user record.
    User(User),
    /// A group record.
    Group(Group),
}

impl Entity {
    /// Returns the entity's identifier.
    pub fn id(&self) -> EntityId {
        match self {
            Entity::Task(t) => t.id,
            Entity::User(u) => u.id,
            Entity::Group(g) => g.id,
        }
    }

    /// Returns the entity's type.
    pub fn entity_type(&self) -> EntityType {
        match self {
            Entity::Task(_) => EntityType::Task,
            Entity::User(_) => EntityType::User,
            Entity::Group(_) => EntityType::Group,
        }
    }

    /// Returns the last accepted mutation time.
    pub fn updated_at(&self) -> Timestamp {
        match self {
            Entity::Task(t) => t.updated_at,
            Entity::User(u) => u.updated_at,
            Entity::Group(g) => g.updated_at,
        }
    }

    /// Sets the last accepted mutation time.
    pub fn set_updated_at(&mut self, at: Timestamp) {
        match self {
            Entity::Task(t) => t.updated_at = at,
            Entity::User(u) => u.updated_at = at,
            Entity::Group(g) => g.updated_at = at,
        }
    }

    /// Returns true if the entity carries a tombstone.
    pub fn is_deleted(&self) -> bool {
        match self {
            Entity::Task(t) => t.deleted,
            Entity::User(u) => u.deleted,
            Entity::Group(g) => g.deleted,
        }
    }

    /// Marks the entity as deleted.
    pub fn mark_deleted(&mut self) {
        match self {
            Entity::Task(t) => t.deleted = true,
            Entity::User(u) => u.deleted = true,
            Entity::Group(g) => g.deleted = true,
        }
    }

    /// Returns the task record, if this is a task.
    pub fn as_task(&self) -> Option<&Task> {
        match self {
            Entity::Task(t) => Some(t),
            _ => None,
        }
    }

    /// Returns the user record, if this is a user.
    pub fn as_user(&self) -> Option<&User> {
        match self {
            Entity::User(u) => Some(u),
            _ => None,
        }
    }

    /// Returns the group record, if this is a group.
    pub fn as_group(&self) -> Option<&Group> {
        match self {
            Entity::Group(g) => Some(g),
            _ => None,
        }
    }
}

impl From<Task> for Entity {
    fn from(task: Task) -> Self {
        Entity::Task(task)
    }
}

impl From<User> for Entity {
    fn from(user: User) -> Self {
        Entity::User(user)
    }
}

impl From<Group> for Entity {
    fn from(group: Group) -> Self {
        Entity::Group(group)
    }
}
