//! Conflict resolution and resolved-data write-back messages.

use serde::{Deserialize, Serialize};
use taskmesh_model::{Entity, EntityId, EntityType};

/// Overall status of a batch operation.
///
/// Batch calls report per-item outcomes; the batch status only summarizes
/// them. A batch never aborts because one item failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Every item succeeded (or the lists were empty).
    Ok,
    /// Some items succeeded, some failed or diverged.
    Partial,
    /// No item succeeded.
    Failed,
}

impl BatchStatus {
    /// Summarizes applied/failed counts into a batch status.
    pub fn from_counts(applied: usize, failed: usize) -> Self {
        match (applied, failed) {
            (_, 0) => BatchStatus::Ok,
            (0, _) => BatchStatus::Failed,
            _ => BatchStatus::Partial,
        }
    }
}

/// A per-item failure in a batch response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    /// The entity the failure refers to.
    pub id: EntityId,
    /// What went wrong.
    pub error: String,
}

impl ItemFailure {
    /// Creates a per-item failure record.
    pub fn new(id: EntityId, error: impl Into<String>) -> Self {
        Self {
            id,
            error: error.into(),
        }
    }
}

/// Client request: propose local candidates for conflicted entities.
///
/// The server is authoritative for the decision: each candidate is compared
/// against the server's current state and the later `updated_at` wins, with
/// exact ties resolving to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictResolutionRequest {
    /// The kind of entity being resolved.
    pub entity_type: EntityType,
    /// The client's candidate state for each conflicted id.
    pub resolutions: Vec<Entity>,
}

impl ConflictResolutionRequest {
    /// Creates a resolution request.
    pub fn new(entity_type: EntityType, resolutions: Vec<Entity>) -> Self {
        Self {
            entity_type,
            resolutions,
        }
    }
}

/// Server response: per-entity resolution outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictResolutionResponse {
    /// Overall batch status.
    pub status: BatchStatus,
    /// Entities whose resolution was written.
    pub applied: Vec<EntityId>,
    /// Entities whose resolution could not be applied.
    pub failed: Vec<ItemFailure>,
}

impl ConflictResolutionResponse {
    /// Creates a response from per-item outcomes.
    pub fn new(applied: Vec<EntityId>, failed: Vec<ItemFailure>) -> Self {
        let status = BatchStatus::from_counts(applied.len(), failed.len());
        Self {
            status,
            applied,
            failed,
        }
    }
}

/// Client request: write back resolved entity payloads.
///
/// Re-entrant by entity id and target digest — applying the same resolved
/// payload twice yields the same end state and reports success both times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyResolvedDataRequest {
    /// The kind of entity being written back.
    pub entity_type: EntityType,
    /// The resolved entity states.
    pub resolved_data: Vec<Entity>,
}

impl ApplyResolvedDataRequest {
    /// Creates a write-back request.
    pub fn new(entity_type: EntityType, resolved_data: Vec<Entity>) -> Self {
        Self {
            entity_type,
            resolved_data,
        }
    }
}

/// Server response: per-entity write-back outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyResolvedDataResponse {
    /// Overall batch status.
    pub status: BatchStatus,
    /// Entities written (or already at the target state).
    pub applied: Vec<EntityId>,
    /// Entities that could not be written.
    pub failed: Vec<ItemFailure>,
}

impl ApplyResolvedDataResponse {
    /// Creates a response from per-item outcomes.
    pub fn new(applied: Vec<EntityId>, failed: Vec<ItemFailure>) -> Self {
        let status = BatchStatus::from_counts(applied.len(), failed.len());
        Self {
            status,
            applied,
            failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskmesh_model::{Task, Timestamp};

    #[test]
    fn batch_status_from_counts() {
        assert_eq!(BatchStatus::from_counts(0, 0), BatchStatus::Ok);
        assert_eq!(BatchStatus::from_counts(3, 0), BatchStatus::Ok);
        assert_eq!(BatchStatus::from_counts(2, 1), BatchStatus::Partial);
        assert_eq!(BatchStatus::from_counts(0, 2), BatchStatus::Failed);
    }

    #[test]
    fn resolution_response_status() {
        let response = ConflictResolutionResponse::new(
            vec![EntityId::new(1)],
            vec![ItemFailure::new(EntityId::new(2), "entity not found")],
        );
        assert_eq!(response.status, BatchStatus::Partial);
        assert_eq!(response.applied, vec![EntityId::new(1)]);
        assert_eq!(response.failed[0].error, "entity not found");
    }

    #[test]
    fn apply_request_roundtrip() {
        let task = Task::new(EntityId::new(8), "mow lawn", Timestamp::from_millis(44));
        let request = ApplyResolvedDataRequest::new(EntityType::Task, vec![Entity::from(task)]);

        let json = serde_json::to_string(&request).unwrap();
        let back: ApplyResolvedDataRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, request);
    }
}
