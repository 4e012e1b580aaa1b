//! Incremental change fetch messages.

use serde::{Deserialize, Serialize};
use taskmesh_model::{Entity, EntityType, Timestamp};

/// Client request: everything of one entity type changed since a checkpoint.
///
/// The checkpoint comes from the server's metadata high-water mark returned
/// by the previous fetch, so a client that is already current transfers
/// nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchChangesRequest {
    /// The kind of entity to fetch.
    pub entity_type: EntityType,
    /// Checkpoint from the last successful fetch.
    pub since: Timestamp,
    /// Maximum number of entities to return.
    pub limit: u32,
}

impl FetchChangesRequest {
    /// Creates a fetch request.
    pub fn new(entity_type: EntityType, since: Timestamp, limit: u32) -> Self {
        Self {
            entity_type,
            since,
            limit,
        }
    }
}

/// Server response: changed entities and the advanced checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchChangesResponse {
    /// Entities with `updated_at` strictly after the requested checkpoint,
    /// in ascending `updated_at` order. Tombstones are included so clients
    /// learn of deletions.
    pub entities: Vec<Entity>,
    /// Checkpoint to persist for the next fetch.
    pub checkpoint: Timestamp,
    /// Whether more changes remain past `limit`.
    pub has_more: bool,
}

impl FetchChangesResponse {
    /// Creates a fetch response.
    pub fn new(entities: Vec<Entity>, checkpoint: Timestamp, has_more: bool) -> Self {
        Self {
            entities,
            checkpoint,
            has_more,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskmesh_model::{EntityId, User};

    #[test]
    fn fetch_roundtrip() {
        let request = FetchChangesRequest::new(EntityType::User, Timestamp::from_millis(50), 100);
        let json = serde_json::to_string(&request).unwrap();
        let back: FetchChangesRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, request);
    }

    #[test]
    fn response_carries_checkpoint() {
        let user = User::new(EntityId::new(1), "dana", Timestamp::from_millis(60));
        let response =
            FetchChangesResponse::new(vec![Entity::from(user)], Timestamp::from_millis(60), false);

        assert_eq!(response.checkpoint, Timestamp::from_millis(60));
        assert!(!response.has_more);
    }
}
