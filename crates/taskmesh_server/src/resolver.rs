//! Conflict detection and resolution.

use crate::error::ServerResult;
use std::collections::BTreeMap;
use std::sync::Arc;
use taskmesh_digest::digest_entity;
use taskmesh_model::{
    Entity, EntityId, EntityType, HistoryAction, MetadataKey, TaskHistoryEntry, Timestamp,
};
use taskmesh_protocol::{
    ApplyResolvedDataRequest, ApplyResolvedDataResponse, ConflictResolutionRequest,
    ConflictResolutionResponse, HashVerificationRequest, HashVerificationResponse, HashMismatch,
    ItemFailure,
};
use taskmesh_store::{Clock, EntityStore, StoreError, StoreResult};
use tracing::info;

/// Which candidate a conflict resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    /// The client's candidate state wins.
    Client,
    /// The server's current state wins.
    Server,
}

/// Resolves divergence between client replicas and the server of record.
///
/// Precedence is purely timestamp-based: the candidate with the later
/// `updated_at` wins and exact ties resolve to the server. Wall-clock
/// comparison stays correct with any subset of devices offline for
/// arbitrary periods, which is why it replaced counter-based schemes that
/// desynchronize under multi-device offline edits.
pub struct ConflictResolver {
    store: Arc<EntityStore>,
    clock: Arc<dyn Clock>,
}

enum ResolutionWrite {
    ServerKept,
    Written {
        updated_at: Timestamp,
        history: Option<TaskHistoryEntry>,
    },
}

impl ConflictResolver {
    /// Creates a resolver over the given store and clock.
    pub fn new(store: Arc<EntityStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Decides a point conflict between a client candidate and the
    /// server's current state.
    pub fn resolve_one(client: &Entity, server: &Entity) -> Winner {
        if client.updated_at() > server.updated_at() {
            Winner::Client
        } else {
            Winner::Server
        }
    }

    /// Partitions a client's `{id, hash}` list against server state.
    ///
    /// Every id from either side lands in exactly one bucket; matches are
    /// implicit. Tombstones the client still reports surface as conflicts
    /// so the client learns of the deletion; tombstones the client never
    /// knew are not echoed back as `missing_on_client`.
    pub fn verify(
        &self,
        request: &HashVerificationRequest,
    ) -> ServerResult<HashVerificationResponse> {
        let mut remaining: BTreeMap<_, _> = request
            .hashes
            .iter()
            .map(|pair| (pair.id, pair.hash))
            .collect();

        let mut conflicts = Vec::new();
        let mut missing_on_client = Vec::new();

        for entity in self.store.snapshot(request.entity_type) {
            let id = entity.id();
            let server_hash = digest_entity(&entity)?;
            match remaining.remove(&id) {
                Some(client_hash) if client_hash == server_hash => {}
                Some(client_hash) => conflicts.push(HashMismatch {
                    id,
                    client_hash,
                    server_hash,
                    server_entity: entity,
                }),
                None => {
                    if !entity.is_deleted() {
                        missing_on_client.push(id);
                    }
                }
            }
        }

        // Whatever the client reported that we never saw signals a push
        // that never landed.
        let missing_on_server: Vec<EntityId> = remaining.into_keys().collect();

        Ok(HashVerificationResponse::new(
            conflicts,
            missing_on_client,
            missing_on_server,
        ))
    }

    /// Applies a batch of client candidates, deciding each against the
    /// server's current state under the entity lock.
    ///
    /// Partial success is expected: each candidate reports its own outcome
    /// and one failure never aborts the rest.
    pub fn apply_resolutions(
        &self,
        request: &ConflictResolutionRequest,
    ) -> ConflictResolutionResponse {
        let mut applied = Vec::new();
        let mut failed = Vec::new();

        for candidate in &request.resolutions {
            let id = candidate.id();
            if candidate.entity_type() != request.entity_type {
                failed.push(ItemFailure::new(
                    id,
                    format!(
                        "candidate is a {}, request targets {}",
                        candidate.entity_type(),
                        request.entity_type
                    ),
                ));
                continue;
            }

            match self.decide_and_write(request.entity_type, candidate) {
                Ok(write) => {
                    applied.push(id);
                    if let ResolutionWrite::Written {
                        updated_at,
                        history,
                    } = write
                    {
                        if let Some(entry) = history {
                            self.store.append_history(entry);
                        }
                        self.store.advance_metadata(
                            MetadataKey::for_entity_type(request.entity_type),
                            updated_at,
                        );
                    }
                }
                Err(e) => failed.push(ItemFailure::new(id, e.to_string())),
            }
        }

        info!(
            entity_type = %request.entity_type,
            applied = applied.len(),
            failed = failed.len(),
            "resolved conflicts"
        );
        ConflictResolutionResponse::new(applied, failed)
    }

    fn decide_and_write(
        &self,
        entity_type: EntityType,
        candidate: &Entity,
    ) -> StoreResult<ResolutionWrite> {
        let decided_at = self.clock.now();
        self.store
            .with_entity(entity_type, candidate.id(), |entity| {
                match Self::resolve_one(candidate, entity) {
                    Winner::Server => Ok(ResolutionWrite::ServerKept),
                    Winner::Client => {
                        let history = (entity_type == EntityType::Task).then(|| {
                            let action = if candidate.is_deleted() && !entity.is_deleted() {
                                HistoryAction::Deleted
                            } else {
                                HistoryAction::Edited
                            };
                            TaskHistoryEntry::new(candidate.id(), action, decided_at)
                                .with_detail("conflict resolution")
                        });
                        *entity = candidate.clone();
                        Ok(ResolutionWrite::Written {
                            updated_at: candidate.updated_at(),
                            history,
                        })
                    }
                }
            })
    }

    /// Writes back resolved entity payloads.
    ///
    /// Re-entrant by id and target digest: a payload whose digest already
    /// matches the stored row reports applied without rewriting, so
    /// retrying the identical request converges instead of erroring.
    pub fn apply_resolved(&self, request: &ApplyResolvedDataRequest) -> ApplyResolvedDataResponse {
        let mut applied = Vec::new();
        let mut failed = Vec::new();

        for entity in &request.resolved_data {
            let id = entity.id();
            if entity.entity_type() != request.entity_type {
                failed.push(ItemFailure::new(
                    id,
                    format!(
                        "payload is a {}, request targets {}",
                        entity.entity_type(),
                        request.entity_type
                    ),
                ));
                continue;
            }

            match self.write_resolved(request.entity_type, entity) {
                Ok(()) => applied.push(id),
                Err(e) => failed.push(ItemFailure::new(id, e.to_string())),
            }
        }

        ApplyResolvedDataResponse::new(applied, failed)
    }

    fn write_resolved(&self, entity_type: EntityType, resolved: &Entity) -> StoreResult<()> {
        let target = digest_entity(resolved)
            .map_err(|e| StoreError::Transient(format!("digest encoding: {e}")))?;
        let written_at = self.clock.now();

        if self.store.contains(entity_type, resolved.id()) {
            let wrote = self.store.with_entity(entity_type, resolved.id(), |entity| {
                let current = digest_entity(entity)
                    .map_err(|e| StoreError::Transient(format!("digest encoding: {e}")))?;
                if current == target {
                    return Ok(false);
                }
                if resolved.updated_at() < entity.updated_at() {
                    return Err(StoreError::validation(format!(
                        "{} {} superseded by newer server state",
                        entity_type,
                        resolved.id()
                    )));
                }
                *entity = resolved.clone();
                Ok(true)
            })?;

            if wrote {
                if entity_type == EntityType::Task {
                    self.store.append_history(
                        TaskHistoryEntry::new(resolved.id(), HistoryAction::Edited, written_at)
                            .with_detail("resolved data"),
                    );
                }
                self.store.advance_metadata(
                    MetadataKey::for_entity_type(entity_type),
                    resolved.updated_at(),
                );
            }
            return Ok(());
        }

        // The server never saw this id: a write-back repairing a push that
        // never landed.
        self.store.upsert(resolved.clone());
        if entity_type == EntityType::Task {
            self.store.append_history(
                TaskHistoryEntry::new(resolved.id(), HistoryAction::Created, written_at)
                    .with_detail("resolved data"),
            );
        }
        self.store
            .advance_metadata(MetadataKey::for_entity_type(entity_type), resolved.updated_at());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskmesh_model::Task;
    use taskmesh_protocol::{BatchStatus, IdHash};
    use taskmesh_store::ManualClock;

    fn resolver() -> (ConflictResolver, Arc<EntityStore>, Arc<ManualClock>) {
        let store = Arc::new(EntityStore::new());
        let clock = Arc::new(ManualClock::starting_at(Timestamp::from_millis(10_000)));
        let shared: Arc<dyn Clock> = clock.clone();
        let resolver = ConflictResolver::new(Arc::clone(&store), shared);
        (resolver, store, clock)
    }

    fn seed_task(store: &EntityStore, name: &str, at: i64) -> Entity {
        let id = store.allocate_id();
        let entity = Entity::from(Task::new(id, name, Timestamp::from_millis(at)));
        store.insert(entity.clone()).unwrap();
        entity
    }

    #[test]
    fn later_timestamp_wins_and_ties_go_to_server() {
        let older = Entity::from(Task::new(EntityId::new(1), "a", Timestamp::from_millis(100)));
        let newer = Entity::from(Task::new(EntityId::new(1), "b", Timestamp::from_millis(200)));

        assert_eq!(ConflictResolver::resolve_one(&newer, &older), Winner::Client);
        assert_eq!(ConflictResolver::resolve_one(&older, &newer), Winner::Server);

        let tied = Entity::from(Task::new(EntityId::new(1), "c", Timestamp::from_millis(200)));
        assert_eq!(ConflictResolver::resolve_one(&tied, &newer), Winner::Server);
    }

    #[test]
    fn verify_partitions_every_id_exactly_once() {
        let (resolver, store, _) = resolver();

        let matching = seed_task(&store, "same", 10);
        let diverged = seed_task(&store, "server version", 20);
        let server_only = seed_task(&store, "unseen", 30);

        let mut stale = diverged.clone();
        if let Entity::Task(task) = &mut stale {
            task.name = "client version".into();
        }
        let client_only = EntityId::new(999);

        let request = HashVerificationRequest::new(
            EntityType::Task,
            vec![
                IdHash {
                    id: matching.id(),
                    hash: digest_entity(&matching).unwrap(),
                },
                IdHash {
                    id: diverged.id(),
                    hash: digest_entity(&stale).unwrap(),
                },
                IdHash {
                    id: client_only,
                    hash: digest_entity(&matching).unwrap(),
                },
            ],
        );

        let response = resolver.verify(&request).unwrap();

        assert_eq!(response.conflicts.len(), 1);
        assert_eq!(response.conflicts[0].id, diverged.id());
        assert_eq!(response.missing_on_client, vec![server_only.id()]);
        assert_eq!(response.missing_on_server, vec![client_only]);

        // The matching id appears in no bucket.
        let mentioned: Vec<EntityId> = response
            .conflicts
            .iter()
            .map(|c| c.id)
            .chain(response.missing_on_client.iter().copied())
            .chain(response.missing_on_server.iter().copied())
            .collect();
        assert!(!mentioned.contains(&matching.id()));
    }

    #[test]
    fn verify_reports_tombstones_the_client_still_holds() {
        let (resolver, store, _) = resolver();
        let live = seed_task(&store, "gone soon", 10);

        // Client's copy predates the deletion.
        let client_hash = digest_entity(&live).unwrap();
        store
            .with_entity(EntityType::Task, live.id(), |entity| {
                entity.mark_deleted();
                entity.set_updated_at(Timestamp::from_millis(50));
                Ok(())
            })
            .unwrap();

        let request = HashVerificationRequest::new(
            EntityType::Task,
            vec![IdHash {
                id: live.id(),
                hash: client_hash,
            }],
        );
        let response = resolver.verify(&request).unwrap();
        assert_eq!(response.conflicts.len(), 1);
        assert!(response.missing_on_client.is_empty());
    }

    #[test]
    fn verify_skips_tombstones_unknown_to_the_client() {
        let (resolver, store, _) = resolver();
        let entity = seed_task(&store, "never synced", 10);
        store
            .with_entity(EntityType::Task, entity.id(), |e| {
                e.mark_deleted();
                Ok(())
            })
            .unwrap();

        let request = HashVerificationRequest::new(EntityType::Task, vec![]);
        let response = resolver.verify(&request).unwrap();
        assert!(response.is_clean());
    }

    #[test]
    fn client_candidate_with_later_timestamp_is_written() {
        let (resolver, store, _) = resolver();
        let server_state = seed_task(&store, "server", 100);

        let mut candidate = server_state.clone();
        if let Entity::Task(task) = &mut candidate {
            task.name = "client".into();
            task.updated_at = Timestamp::from_millis(200);
        }

        let response = resolver.apply_resolutions(&ConflictResolutionRequest::new(
            EntityType::Task,
            vec![candidate.clone()],
        ));

        assert_eq!(response.status, BatchStatus::Ok);
        assert_eq!(response.applied, vec![server_state.id()]);

        let stored = store.get(EntityType::Task, server_state.id()).unwrap();
        assert_eq!(stored.as_task().unwrap().name, "client");

        let history = store.history_for(server_state.id());
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].detail.as_deref(), Some("conflict resolution"));
    }

    #[test]
    fn server_keeps_newer_state_without_writing() {
        let (resolver, store, _) = resolver();
        let server_state = seed_task(&store, "server", 300);

        let mut candidate = server_state.clone();
        if let Entity::Task(task) = &mut candidate {
            task.name = "older client edit".into();
            task.updated_at = Timestamp::from_millis(100);
        }

        let response = resolver.apply_resolutions(&ConflictResolutionRequest::new(
            EntityType::Task,
            vec![candidate],
        ));

        // The decision applied; the server's state is the winner.
        assert_eq!(response.applied, vec![server_state.id()]);
        let stored = store.get(EntityType::Task, server_state.id()).unwrap();
        assert_eq!(stored.as_task().unwrap().name, "server");
        assert!(store.history_for(server_state.id()).is_empty());
    }

    #[test]
    fn unknown_candidate_fails_per_item() {
        let (resolver, store, _) = resolver();
        let known = seed_task(&store, "known", 100);
        let mut winner = known.clone();
        winner.set_updated_at(Timestamp::from_millis(200));

        let ghost = Entity::from(Task::new(
            EntityId::new(404),
            "ghost",
            Timestamp::from_millis(150),
        ));

        let response = resolver.apply_resolutions(&ConflictResolutionRequest::new(
            EntityType::Task,
            vec![winner, ghost],
        ));

        assert_eq!(response.status, BatchStatus::Partial);
        assert_eq!(response.applied, vec![known.id()]);
        assert_eq!(response.failed.len(), 1);
        assert!(response.failed[0].error.contains("not found"));
    }

    #[test]
    fn apply_resolved_is_reentrant() {
        let (resolver, store, _) = resolver();
        let server_state = seed_task(&store, "server", 100);

        let mut resolved = server_state.clone();
        if let Entity::Task(task) = &mut resolved {
            task.name = "winner".into();
            task.updated_at = Timestamp::from_millis(200);
        }

        let request =
            ApplyResolvedDataRequest::new(EntityType::Task, vec![resolved.clone()]);

        let first = resolver.apply_resolved(&request);
        assert_eq!(first.status, BatchStatus::Ok);
        assert_eq!(first.applied, vec![server_state.id()]);

        let second = resolver.apply_resolved(&request);
        assert_eq!(second.status, BatchStatus::Ok);
        assert_eq!(second.applied, vec![server_state.id()]);

        // The no-op repeat wrote no second history entry.
        let history = store.history_for(server_state.id());
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn apply_resolved_creates_missing_rows() {
        let (resolver, store, _) = resolver();

        let payload = Entity::from(Task::new(
            EntityId::new(41),
            "recovered",
            Timestamp::from_millis(100),
        ));
        let response = resolver.apply_resolved(&ApplyResolvedDataRequest::new(
            EntityType::Task,
            vec![payload],
        ));

        assert_eq!(response.applied, vec![EntityId::new(41)]);
        assert!(store.contains(EntityType::Task, EntityId::new(41)));
        // The allocator moved past the external id.
        assert!(store.allocate_id() > EntityId::new(41));
    }

    #[test]
    fn apply_resolved_rejects_superseded_payloads() {
        let (resolver, store, _) = resolver();
        let server_state = seed_task(&store, "server", 500);

        let mut stale = server_state.clone();
        if let Entity::Task(task) = &mut stale {
            task.name = "stale".into();
            task.updated_at = Timestamp::from_millis(100);
        }

        let response = resolver.apply_resolved(&ApplyResolvedDataRequest::new(
            EntityType::Task,
            vec![stale],
        ));

        assert_eq!(response.status, BatchStatus::Failed);
        assert!(response.failed[0].error.contains("superseded"));
        let stored = store.get(EntityType::Task, server_state.id()).unwrap();
        assert_eq!(stored.as_task().unwrap().name, "server");
    }
}
