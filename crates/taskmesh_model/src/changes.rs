//! Typed change sets submitted by clients.
//!
//! A change set carries only the fields the client actually touched.
//! Fields a given client version does not understand travel in the
//! `extra` map and are preserved verbatim rather than dropped, so an
//! older client can relay newer fields without corrupting them.

use crate::entity::{Group, Task, User};
use crate::id::EntityId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Partial update for a task.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskChanges {
    /// New display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New notes text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// New completion state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    /// New enabled state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// New owning group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<EntityId>,
    /// Replacement assignee list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_ids: Option<Vec<EntityId>>,
    /// Fields this client version does not understand, preserved verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl TaskChanges {
    /// Applies the present fields to a task record.
    pub fn apply_to(&self, task: &mut Task) {
        if let Some(name) = &self.name {
            task.name = name.clone();
        }
        if let Some(notes) = &self.notes {
            task.notes = Some(notes.clone());
        }
        if let Some(completed) = self.completed {
            task.completed = completed;
        }
        if let Some(enabled) = self.enabled {
            task.enabled = enabled;
        }
        if let Some(group_id) = self.group_id {
            task.group_id = Some(group_id);
        }
        if let Some(assignees) = &self.assignee_ids {
            task.assignee_ids = assignees.clone();
        }
    }
}

/// Partial update for a user.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserChanges {
    /// New display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New enabled state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Fields this client version does not understand, preserved verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl UserChanges {
    /// Applies the present fields to a user record.
    pub fn apply_to(&self, user: &mut User) {
        if let Some(name) = &self.name {
            user.name = name.clone();
        }
        if let Some(enabled) = self.enabled {
            user.enabled = enabled;
        }
    }
}

/// Partial update for a group.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GroupChanges {
    /// New display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New enabled state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Replacement member list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_ids: Option<Vec<EntityId>>,
    /// Fields this client version does not understand, preserved verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl GroupChanges {
    /// Applies the present fields to a group record.
    pub fn apply_to(&self, group: &mut Group) {
        if let Some(name) = &self.name {
            group.name = name.clone();
        }
        if let Some(enabled) = self.enabled {
            group.enabled = enabled;
        }
        if let Some(members) = &self.member_ids {
            group.member_ids = members.clone();
        }
    }
}

/// A change set for any entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "entity_type", rename_all = "snake_case")]
pub enum EntityChanges {
    /// Changes to a task.
    Task(TaskChanges),
    /// Changes to a user.
    User(UserChanges),
    /// Changes to a group.
    Group(GroupChanges),
}

impl EntityChanges {
    /// Returns the name the change set would assign, if any.
    ///
    /// Used by validation: an update may not blank a display name.
    pub fn name(&self) -> Option<&str> {
        match self {
            EntityChanges::Task(c) => c.name.as_deref(),
            EntityChanges::User(c) => c.name.as_deref(),
            EntityChanges::Group(c) => c.name.as_deref(),
        }
    }
}
