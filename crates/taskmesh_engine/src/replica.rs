//! The client's cached replica of server state.

use crate::error::SessionResult;
use parking_lot::Mutex;
use std::collections::HashMap;
use taskmesh_digest::digest_entity;
use taskmesh_model::{Entity, EntityId, EntityType, Timestamp};
use taskmesh_protocol::IdHash;

/// The client's cached, possibly-stale copy of server state.
///
/// The session reads digest lists from here during verification and
/// writes winning entities back during resolution. The replica also
/// persists the per-type fetch checkpoint between sessions.
pub trait ReplicaStore: Send + Sync {
    /// Returns the `{id, hash}` list for one entity type.
    fn digests(&self, entity_type: EntityType) -> SessionResult<Vec<IdHash>>;

    /// Returns the cached copy of an entity, if any.
    fn get(&self, entity_type: EntityType, id: EntityId) -> SessionResult<Option<Entity>>;

    /// Writes an entity into the cache, replacing any prior copy.
    /// Tombstones are stored like any other state so deletions stick.
    fn put(&self, entity: Entity) -> SessionResult<()>;

    /// Returns the fetch checkpoint for one entity type.
    fn checkpoint(&self, entity_type: EntityType) -> SessionResult<Timestamp>;

    /// Persists the fetch checkpoint for one entity type.
    fn set_checkpoint(&self, entity_type: EntityType, at: Timestamp) -> SessionResult<()>;
}

/// An in-memory replica for tests and examples.
#[derive(Debug, Default)]
pub struct MemoryReplica {
    entities: Mutex<HashMap<(EntityType, EntityId), Entity>>,
    checkpoints: Mutex<HashMap<EntityType, Timestamp>>,
}

impl MemoryReplica {
    /// Creates an empty replica.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of cached entities of one type.
    pub fn len(&self, entity_type: EntityType) -> usize {
        self.entities
            .lock()
            .keys()
            .filter(|(kind, _)| *kind == entity_type)
            .count()
    }

    /// Returns true if nothing of the given type is cached.
    pub fn is_empty(&self, entity_type: EntityType) -> bool {
        self.len(entity_type) == 0
    }
}

impl ReplicaStore for MemoryReplica {
    fn digests(&self, entity_type: EntityType) -> SessionResult<Vec<IdHash>> {
        let entities = self.entities.lock();
        let mut pairs = Vec::new();
        for ((kind, id), entity) in entities.iter() {
            if *kind != entity_type {
                continue;
            }
            pairs.push(IdHash {
                id: *id,
                hash: digest_entity(entity)?,
            });
        }
        pairs.sort_by_key(|pair| pair.id);
        Ok(pairs)
    }

    fn get(&self, entity_type: EntityType, id: EntityId) -> SessionResult<Option<Entity>> {
        Ok(self.entities.lock().get(&(entity_type, id)).cloned())
    }

    fn put(&self, entity: Entity) -> SessionResult<()> {
        self.entities
            .lock()
            .insert((entity.entity_type(), entity.id()), entity);
        Ok(())
    }

    fn checkpoint(&self, entity_type: EntityType) -> SessionResult<Timestamp> {
        Ok(self
            .checkpoints
            .lock()
            .get(&entity_type)
            .copied()
            .unwrap_or(Timestamp::EPOCH))
    }

    fn set_checkpoint(&self, entity_type: EntityType, at: Timestamp) -> SessionResult<()> {
        self.checkpoints.lock().insert(entity_type, at);
        Ok(())
    }
}
