//! Append-only task history.

use crate::id::EntityId;
use crate::time::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A lifecycle transition recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HistoryAction {
    /// The task was created.
    Created,
    /// The task was first shown to a user.
    FirstShown,
    /// The task was marked completed.
    Confirmed,
    /// A completion was rolled back.
    Unconfirmed,
    /// Task fields were edited.
    Edited,
    /// The task was deleted.
    Deleted,
    /// The task was re-enabled.
    Activated,
    /// The task was disabled.
    Deactivated,
}

impl fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HistoryAction::Created => "CREATED",
            HistoryAction::FirstShown => "FIRST_SHOWN",
            HistoryAction::Confirmed => "CONFIRMED",
            HistoryAction::Unconfirmed => "UNCONFIRMED",
            HistoryAction::Edited => "EDITED",
            HistoryAction::Deleted => "DELETED",
            HistoryAction::Activated => "ACTIVATED",
            HistoryAction::Deactivated => "DEACTIVATED",
        };
        f.write_str(name)
    }
}

/// One entry in the append-only task history log.
///
/// Entries are written as a side effect of every accepted mutation and are
/// never updated or removed afterwards; only a hard purge of the parent
/// task cascades into its history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHistoryEntry {
    /// The task this entry belongs to.
    pub task_id: EntityId,
    /// The recorded transition.
    pub action: HistoryAction,
    /// When the transition happened, as observed by the client.
    pub action_timestamp: Timestamp,
    /// For recurring tasks, the iteration the transition applies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration_date: Option<Timestamp>,
    /// Free-form context, e.g. which fields an edit touched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl TaskHistoryEntry {
    /// Creates a history entry with no iteration date or detail.
    pub fn new(task_id: EntityId, action: HistoryAction, action_timestamp: Timestamp) -> Self {
        Self {
            task_id,
            action,
            action_timestamp,
            iteration_date: None,
            detail: None,
        }
    }

    /// Attaches free-form detail.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Attaches an iteration date for recurring tasks.
    #[must_use]
    pub fn with_iteration(mut self, iteration: Timestamp) -> Self {
        self.iteration_date = Some(iteration);
        self
    }
}
