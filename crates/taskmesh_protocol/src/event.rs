//! Sync events and their per-event responses.

use serde::{Deserialize, Serialize};
use taskmesh_digest::EntityDigest;
use taskmesh_model::{EntityChanges, EntityId, EntityType, Timestamp};

/// The kind of mutation a client intends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Create a new entity.
    Create,
    /// Update fields of an existing entity.
    Update,
    /// Tombstone an existing entity.
    Delete,
    /// Mark a task completed.
    Complete,
    /// Roll back a completion.
    Uncomplete,
}

/// An intended mutation queued on a client.
///
/// Events are immutable once created and consumed exactly once by the
/// server's event applier. `client_hash` is the digest the client believed
/// was current before mutating; a mismatch against the server's digest
/// routes the event through conflict resolution instead of applying.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncEvent {
    /// The intended mutation.
    pub event_type: EventType,
    /// The kind of entity targeted.
    pub entity_type: EntityType,
    /// Target entity. Absent for creates (the server assigns identity).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<EntityId>,
    /// Client-observed time of the user action.
    pub timestamp: Timestamp,
    /// Field changes, for create and update events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changes: Option<EntityChanges>,
    /// Digest the client believed was current before mutating.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_hash: Option<EntityDigest>,
}

impl SyncEvent {
    /// Creates a create event.
    pub fn create(entity_type: EntityType, timestamp: Timestamp, changes: EntityChanges) -> Self {
        Self {
            event_type: EventType::Create,
            entity_type,
            entity_id: None,
            timestamp,
            changes: Some(changes),
            client_hash: None,
        }
    }

    /// Creates an update event.
    pub fn update(
        entity_type: EntityType,
        entity_id: EntityId,
        timestamp: Timestamp,
        changes: EntityChanges,
        client_hash: Option<EntityDigest>,
    ) -> Self {
        Self {
            event_type: EventType::Update,
            entity_type,
            entity_id: Some(entity_id),
            timestamp,
            changes: Some(changes),
            client_hash,
        }
    }

    /// Creates a delete event.
    pub fn delete(
        entity_type: EntityType,
        entity_id: EntityId,
        timestamp: Timestamp,
        client_hash: Option<EntityDigest>,
    ) -> Self {
        Self {
            event_type: EventType::Delete,
            entity_type,
            entity_id: Some(entity_id),
            timestamp,
            changes: None,
            client_hash,
        }
    }

    /// Creates a complete event for a task.
    pub fn complete(
        entity_id: EntityId,
        timestamp: Timestamp,
        client_hash: Option<EntityDigest>,
    ) -> Self {
        Self {
            event_type: EventType::Complete,
            entity_type: EntityType::Task,
            entity_id: Some(entity_id),
            timestamp,
            changes: None,
            client_hash,
        }
    }

    /// Creates an uncomplete event for a task.
    pub fn uncomplete(
        entity_id: EntityId,
        timestamp: Timestamp,
        client_hash: Option<EntityDigest>,
    ) -> Self {
        Self {
            event_type: EventType::Uncomplete,
            entity_type: EntityType::Task,
            entity_id: Some(entity_id),
            timestamp,
            changes: None,
            client_hash,
        }
    }
}

/// Outcome of applying a single sync event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncEventStatus {
    /// The mutation was applied.
    Confirmed,
    /// The client's hash was stale; nothing was applied.
    Conflict,
    /// The event could not be applied (not found, invalid payload).
    Error,
}

/// Per-event response from the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncEventResponse {
    /// Outcome of the event.
    pub status: SyncEventStatus,
    /// The kind of entity targeted.
    pub entity_type: EntityType,
    /// The entity the outcome refers to. For confirmed creates this is the
    /// server-assigned identity the client must adopt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<EntityId>,
    /// The server's current digest for the entity, when one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_hash: Option<EntityDigest>,
    /// Human-readable context for conflict and error outcomes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SyncEventResponse {
    /// Creates a confirmed response.
    pub fn confirmed(
        entity_type: EntityType,
        entity_id: EntityId,
        server_hash: EntityDigest,
    ) -> Self {
        Self {
            status: SyncEventStatus::Confirmed,
            entity_type,
            entity_id: Some(entity_id),
            server_hash: Some(server_hash),
            message: None,
        }
    }

    /// Creates a conflict response carrying the server's current digest.
    pub fn conflict(
        entity_type: EntityType,
        entity_id: EntityId,
        server_hash: EntityDigest,
    ) -> Self {
        Self {
            status: SyncEventStatus::Conflict,
            entity_type,
            entity_id: Some(entity_id),
            server_hash: Some(server_hash),
            message: Some("client hash is stale".into()),
        }
    }

    /// Creates an error response.
    pub fn error(
        entity_type: EntityType,
        entity_id: Option<EntityId>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status: SyncEventStatus::Error,
            entity_type,
            entity_id,
            server_hash: None,
            message: Some(message.into()),
        }
    }

    /// Returns true if the event was applied.
    pub fn is_confirmed(&self) -> bool {
        self.status == SyncEventStatus::Confirmed
    }

    /// Returns true if the event needs conflict resolution.
    pub fn is_conflict(&self) -> bool {
        self.status == SyncEventStatus::Conflict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskmesh_model::TaskChanges;

    #[test]
    fn create_event_has_no_id() {
        let changes = EntityChanges::Task(TaskChanges {
            name: Some("sweep".into()),
            ..TaskChanges::default()
        });
        let event = SyncEvent::create(EntityType::Task, Timestamp::from_millis(1), changes);

        assert_eq!(event.event_type, EventType::Create);
        assert!(event.entity_id.is_none());
        assert!(event.client_hash.is_none());
    }

    #[test]
    fn event_wire_format() {
        let event = SyncEvent::complete(EntityId::new(5), Timestamp::from_millis(9), None);
        let json = serde_json::to_string(&event).unwrap();

        assert!(json.contains("\"event_type\":\"complete\""));
        assert!(json.contains("\"entity_type\":\"task\""));
        assert!(!json.contains("client_hash"));

        let back: SyncEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn response_classification() {
        let ok = SyncEventResponse::confirmed(
            EntityType::Task,
            EntityId::new(1),
            EntityDigest::from_bytes([0u8; 32]),
        );
        assert!(ok.is_confirmed());
        assert!(!ok.is_conflict());

        let err = SyncEventResponse::error(EntityType::User, None, "entity not found");
        assert_eq!(err.status, SyncEventStatus::Error);
        assert!(err.server_hash.is_none());
    }
}
