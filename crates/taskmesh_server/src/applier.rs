//! Event application.

use crate::error::ServerResult;
use std::sync::Arc;
use taskmesh_digest::{digest_entity, EntityDigest};
use taskmesh_model::{
    Entity, EntityChanges, EntityType, Group, HistoryAction, MetadataKey, Task, TaskHistoryEntry,
    Timestamp, User,
};
use taskmesh_protocol::{EventType, SyncEvent, SyncEventResponse};
use taskmesh_store::{EntityStore, StoreError, StoreResult};
use tracing::{debug, info};

/// Applies client-submitted sync events to the entity store.
///
/// Every event is all-or-nothing: validation and the digest comparison run
/// before anything mutates, and the comparison plus the write execute under
/// the entity's row lock so no other writer can interleave. Each accepted
/// task transition appends exactly one history entry.
pub struct EventApplier {
    store: Arc<EntityStore>,
}

/// Result of the in-lock portion of an apply.
enum Outcome {
    /// The event was accepted (possibly as an idempotent no-op).
    Accepted(Accepted),
    /// The client's hash was stale; nothing was touched.
    Conflict(EntityDigest),
}

struct Accepted {
    server_hash: EntityDigest,
    updated_at: Timestamp,
    history: Option<TaskHistoryEntry>,
    mutated: bool,
}

impl Accepted {
    fn noop(server_hash: EntityDigest, updated_at: Timestamp) -> Self {
        Self {
            server_hash,
            updated_at,
            history: None,
            mutated: false,
        }
    }
}

impl EventApplier {
    /// Creates an applier over the given store.
    pub fn new(store: Arc<EntityStore>) -> Self {
        Self { store }
    }

    /// Applies one event and reports the outcome inline.
    ///
    /// Failures surface as `status = error` responses, never as transport
    /// errors; a failed event stays queued on the client for retry.
    pub fn apply(&self, event: &SyncEvent) -> SyncEventResponse {
        let result = match event.event_type {
            EventType::Create => self.apply_create(event),
            _ => self.apply_mutation(event),
        };

        match result {
            Ok(response) => response,
            Err(e) => {
                debug!(entity_type = %event.entity_type, error = %e, "event rejected");
                SyncEventResponse::error(event.entity_type, event.entity_id, e.to_string())
            }
        }
    }

    fn apply_create(&self, event: &SyncEvent) -> ServerResult<SyncEventResponse> {
        let changes = event
            .changes
            .as_ref()
            .ok_or_else(|| StoreError::validation("create requires changes"))?;
        let name = changes
            .name()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| StoreError::validation("create requires a non-empty name"))?;

        let id = self.store.allocate_id();
        // The client-observed event time becomes the initial updated_at;
        // later mutations clamp forward, so monotonicity is unaffected by
        // client clock skew.
        let entity = build_entity(event.entity_type, id, name, changes, event.timestamp)?;
        let server_hash = digest_entity(&entity)?;
        let updated_at = entity.updated_at();

        self.store.insert(entity)?;
        if event.entity_type == EntityType::Task {
            self.store.append_history(TaskHistoryEntry::new(
                id,
                HistoryAction::Created,
                event.timestamp,
            ));
        }
        self.store
            .advance_metadata(MetadataKey::for_entity_type(event.entity_type), updated_at);

        info!(entity_type = %event.entity_type, %id, "created");
        Ok(SyncEventResponse::confirmed(
            event.entity_type,
            id,
            server_hash,
        ))
    }

    fn apply_mutation(&self, event: &SyncEvent) -> ServerResult<SyncEventResponse> {
        let id = event
            .entity_id
            .ok_or_else(|| StoreError::validation("event requires an entity_id"))?;

        match event.event_type {
            EventType::Complete | EventType::Uncomplete if event.entity_type != EntityType::Task => {
                return Err(StoreError::validation("only tasks can be completed").into());
            }
            EventType::Update if event.changes.is_none() => {
                return Err(StoreError::validation("update requires changes").into());
            }
            EventType::Update => {
                if event.changes.as_ref().and_then(EntityChanges::name).map(str::trim) == Some("") {
                    return Err(StoreError::validation("name cannot be emptied").into());
                }
            }
            _ => {}
        }

        let outcome = self.store.with_entity(event.entity_type, id, |entity| {
            let current = digest_in_lock(entity)?;
            if let Some(client_hash) = event.client_hash {
                if client_hash != current {
                    return Ok(Outcome::Conflict(current));
                }
            }
            let accepted = match event.event_type {
                EventType::Delete => apply_delete(entity, event, current)?,
                EventType::Complete | EventType::Uncomplete => {
                    apply_completion(entity, event, current)?
                }
                EventType::Update => apply_update(entity, event)?,
                // Creates are dispatched before this point.
                EventType::Create => {
                    return Err(StoreError::validation("create has no target entity"));
                }
            };
            Ok(Outcome::Accepted(accepted))
        })?;

        match outcome {
            Outcome::Conflict(server_hash) => {
                info!(entity_type = %event.entity_type, %id, "stale client hash");
                Ok(SyncEventResponse::conflict(
                    event.entity_type,
                    id,
                    server_hash,
                ))
            }
            Outcome::Accepted(accepted) => {
                if let Some(entry) = accepted.history {
                    self.store.append_history(entry);
                }
                if accepted.mutated {
                    self.store.advance_metadata(
                        MetadataKey::for_entity_type(event.entity_type),
                        accepted.updated_at,
                    );
                    debug!(entity_type = %event.entity_type, %id, event = ?event.event_type, "applied");
                }
                Ok(SyncEventResponse::confirmed(
                    event.entity_type,
                    id,
                    accepted.server_hash,
                ))
            }
        }
    }

}

/// Computes a digest inside a row lock, mapping encoding failures onto the
/// store's transient class so the caller retries idempotently.
fn digest_in_lock(entity: &Entity) -> StoreResult<EntityDigest> {
    digest_entity(entity).map_err(|e| StoreError::Transient(format!("digest encoding: {e}")))
}

fn build_entity(
    entity_type: EntityType,
    id: taskmesh_model::EntityId,
    name: &str,
    changes: &EntityChanges,
    timestamp: Timestamp,
) -> ServerResult<Entity> {
    let entity = match (entity_type, changes) {
        (EntityType::Task, EntityChanges::Task(changes)) => {
            let mut task = Task::new(id, name, timestamp);
            changes.apply_to(&mut task);
            Entity::from(task)
        }
        (EntityType::User, EntityChanges::User(changes)) => {
            let mut user = User::new(id, name, timestamp);
            changes.apply_to(&mut user);
            Entity::from(user)
        }
        (EntityType::Group, EntityChanges::Group(changes)) => {
            let mut group = Group::new(id, name, timestamp);
            changes.apply_to(&mut group);
            Entity::from(group)
        }
        _ => {
            return Err(
                StoreError::validation(format!("changes do not match entity type {entity_type}"))
                    .into(),
            )
        }
    };
    Ok(entity)
}

fn apply_delete(
    entity: &mut Entity,
    event: &SyncEvent,
    current: EntityDigest,
) -> StoreResult<Accepted> {
    if entity.is_deleted() {
        // Repeated delete: already at the target state, no second
        // DELETED entry.
        return Ok(Accepted::noop(current, entity.updated_at()));
    }

    // Stage on a clone; the row only changes once the digest succeeds.
    let mut next = entity.clone();
    next.mark_deleted();
    let updated_at = next.updated_at().max(event.timestamp);
    next.set_updated_at(updated_at);
    let server_hash = digest_in_lock(&next)?;

    let history = (next.entity_type() == EntityType::Task).then(|| {
        TaskHistoryEntry::new(next.id(), HistoryAction::Deleted, event.timestamp)
    });
    *entity = next;
    Ok(Accepted {
        server_hash,
        updated_at,
        history,
        mutated: true,
    })
}

fn apply_completion(
    entity: &mut Entity,
    event: &SyncEvent,
    current: EntityDigest,
) -> StoreResult<Accepted> {
    if entity.is_deleted() {
        return Err(StoreError::validation(format!(
            "task {} is deleted",
            entity.id()
        )));
    }
    let Entity::Task(task) = &*entity else {
        return Err(StoreError::validation("only tasks can be completed"));
    };

    let target = event.event_type == EventType::Complete;
    if task.completed == target {
        // Repeated completion toggles are no-ops; the state change is not
        // double-counted and history stays single-entry.
        return Ok(Accepted::noop(current, task.updated_at));
    }

    let mut next = task.clone();
    next.completed = target;
    next.updated_at = next.updated_at.max(event.timestamp);
    let updated_at = next.updated_at;

    let action = if target {
        HistoryAction::Confirmed
    } else {
        HistoryAction::Unconfirmed
    };
    let history = TaskHistoryEntry::new(next.id, action, event.timestamp);

    let staged = Entity::from(next);
    let server_hash = digest_in_lock(&staged)?;
    *entity = staged;

    Ok(Accepted {
        server_hash,
        updated_at,
        history: Some(history),
        mutated: true,
    })
}

fn apply_update(entity: &mut Entity, event: &SyncEvent) -> StoreResult<Accepted> {
    if entity.is_deleted() {
        return Err(StoreError::validation(format!(
            "{} {} is deleted",
            entity.entity_type(),
            entity.id()
        )));
    }
    let changes = event
        .changes
        .as_ref()
        .ok_or_else(|| StoreError::validation("update requires changes"))?;

    let enabled_before = enabled_flag(entity);
    let mut next = entity.clone();
    match (&mut next, changes) {
        (Entity::Task(task), EntityChanges::Task(changes)) => changes.apply_to(task),
        (Entity::User(user), EntityChanges::User(changes)) => changes.apply_to(user),
        (Entity::Group(group), EntityChanges::Group(changes)) => changes.apply_to(group),
        _ => {
            return Err(StoreError::validation(format!(
                "changes do not match entity type {}",
                entity.entity_type()
            )))
        }
    }

    let updated_at = next.updated_at().max(event.timestamp);
    next.set_updated_at(updated_at);
    let server_hash = digest_in_lock(&next)?;

    let history = (next.entity_type() == EntityType::Task).then(|| {
        let action = match (enabled_before, enabled_flag(&next)) {
            (true, false) => HistoryAction::Deactivated,
            (false, true) => HistoryAction::Activated,
            _ => HistoryAction::Edited,
        };
        TaskHistoryEntry::new(next.id(), action, event.timestamp)
    });
    *entity = next;

    Ok(Accepted {
        server_hash,
        updated_at,
        history,
        mutated: true,
    })
}

fn enabled_flag(entity: &Entity) -> bool {
    match entity {
        Entity::Task(task) => task.enabled,
        Entity::User(user) => user.enabled,
        Entity::Group(group) => group.enabled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskmesh_model::{EntityId, TaskChanges, UserChanges};
    use taskmesh_protocol::SyncEventStatus;

    fn applier() -> (EventApplier, Arc<EntityStore>) {
        let store = Arc::new(EntityStore::new());
        (EventApplier::new(Arc::clone(&store)), store)
    }

    fn create_task(applier: &EventApplier, name: &str, at: i64) -> SyncEventResponse {
        let changes = EntityChanges::Task(TaskChanges {
            name: Some(name.into()),
            ..TaskChanges::default()
        });
        applier.apply(&SyncEvent::create(
            EntityType::Task,
            Timestamp::from_millis(at),
            changes,
        ))
    }

    #[test]
    fn create_confirms_and_writes_history() {
        let (applier, store) = applier();

        let response = create_task(&applier, "water plants", 100);
        assert!(response.is_confirmed());
        let id = response.entity_id.unwrap();
        assert!(response.server_hash.is_some());

        let history = store.history_for(id);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action, HistoryAction::Created);
        assert_eq!(history[0].action_timestamp, Timestamp::from_millis(100));

        assert_eq!(
            store.metadata(MetadataKey::LastTaskUpdate),
            Timestamp::from_millis(100)
        );
    }

    #[test]
    fn create_requires_name() {
        let (applier, _) = applier();
        let changes = EntityChanges::Task(TaskChanges::default());
        let response = applier.apply(&SyncEvent::create(
            EntityType::Task,
            Timestamp::from_millis(1),
            changes,
        ));
        assert_eq!(response.status, SyncEventStatus::Error);
    }

    #[test]
    fn create_rejects_mismatched_changes() {
        let (applier, _) = applier();
        let changes = EntityChanges::User(UserChanges {
            name: Some("pat".into()),
            ..UserChanges::default()
        });
        let response = applier.apply(&SyncEvent::create(
            EntityType::Task,
            Timestamp::from_millis(1),
            changes,
        ));
        assert_eq!(response.status, SyncEventStatus::Error);
    }

    #[test]
    fn update_with_matching_hash_applies() {
        let (applier, store) = applier();
        let created = create_task(&applier, "dishes", 100);
        let id = created.entity_id.unwrap();

        let changes = EntityChanges::Task(TaskChanges {
            notes: Some("use the good soap".into()),
            ..TaskChanges::default()
        });
        let response = applier.apply(&SyncEvent::update(
            EntityType::Task,
            id,
            Timestamp::from_millis(200),
            changes,
            created.server_hash,
        ));

        assert!(response.is_confirmed());
        assert_ne!(response.server_hash, created.server_hash);

        let entity = store.get(EntityType::Task, id).unwrap();
        assert_eq!(entity.as_task().unwrap().notes.as_deref(), Some("use the good soap"));
        assert_eq!(entity.updated_at(), Timestamp::from_millis(200));
    }

    #[test]
    fn stale_hash_conflicts_without_applying() {
        let (applier, store) = applier();
        let created = create_task(&applier, "dishes", 100);
        let id = created.entity_id.unwrap();

        // Someone else edits first.
        let other = EntityChanges::Task(TaskChanges {
            name: Some("dry dishes".into()),
            ..TaskChanges::default()
        });
        let accepted = applier.apply(&SyncEvent::update(
            EntityType::Task,
            id,
            Timestamp::from_millis(150),
            other,
            None,
        ));
        assert!(accepted.is_confirmed());

        // Our update still carries the original hash.
        let changes = EntityChanges::Task(TaskChanges {
            name: Some("wash dishes".into()),
            ..TaskChanges::default()
        });
        let response = applier.apply(&SyncEvent::update(
            EntityType::Task,
            id,
            Timestamp::from_millis(200),
            changes,
            created.server_hash,
        ));

        assert!(response.is_conflict());
        assert_eq!(response.server_hash, accepted.server_hash);

        // The entity is unchanged by the conflicting event.
        let entity = store.get(EntityType::Task, id).unwrap();
        assert_eq!(entity.as_task().unwrap().name, "dry dishes");
        assert_eq!(entity.updated_at(), Timestamp::from_millis(150));
    }

    #[test]
    fn absent_hash_skips_the_check() {
        let (applier, _) = applier();
        let created = create_task(&applier, "dishes", 100);
        let id = created.entity_id.unwrap();

        let changes = EntityChanges::Task(TaskChanges {
            completed: Some(true),
            ..TaskChanges::default()
        });
        let response = applier.apply(&SyncEvent::update(
            EntityType::Task,
            id,
            Timestamp::from_millis(150),
            changes,
            None,
        ));
        assert!(response.is_confirmed());
    }

    #[test]
    fn update_missing_entity_errors() {
        let (applier, _) = applier();
        let changes = EntityChanges::Task(TaskChanges {
            name: Some("x".into()),
            ..TaskChanges::default()
        });
        let response = applier.apply(&SyncEvent::update(
            EntityType::Task,
            EntityId::new(404),
            Timestamp::from_millis(1),
            changes,
            None,
        ));
        assert_eq!(response.status, SyncEventStatus::Error);
        assert!(response.message.unwrap().contains("not found"));
    }

    #[test]
    fn complete_then_repeat_is_idempotent() {
        let (applier, store) = applier();
        let created = create_task(&applier, "laundry", 100);
        let id = created.entity_id.unwrap();

        let first = applier.apply(&SyncEvent::complete(id, Timestamp::from_millis(200), None));
        assert!(first.is_confirmed());

        let second = applier.apply(&SyncEvent::complete(id, Timestamp::from_millis(300), None));
        assert!(second.is_confirmed());
        assert_eq!(second.server_hash, first.server_hash);

        // One CREATED + one CONFIRMED, no duplicate.
        let history = store.history_for(id);
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].action, HistoryAction::Confirmed);

        // The repeat did not bump updated_at.
        let entity = store.get(EntityType::Task, id).unwrap();
        assert_eq!(entity.updated_at(), Timestamp::from_millis(200));
    }

    #[test]
    fn uncomplete_rolls_back() {
        let (applier, store) = applier();
        let created = create_task(&applier, "laundry", 100);
        let id = created.entity_id.unwrap();

        applier.apply(&SyncEvent::complete(id, Timestamp::from_millis(200), None));
        let response = applier.apply(&SyncEvent::uncomplete(id, Timestamp::from_millis(300), None));
        assert!(response.is_confirmed());

        let entity = store.get(EntityType::Task, id).unwrap();
        assert!(!entity.as_task().unwrap().completed);

        let history = store.history_for(id);
        assert_eq!(history.last().unwrap().action, HistoryAction::Unconfirmed);
    }

    #[test]
    fn delete_is_tombstone_and_idempotent() {
        let (applier, store) = applier();
        let created = create_task(&applier, "laundry", 100);
        let id = created.entity_id.unwrap();

        let first = applier.apply(&SyncEvent::delete(
            EntityType::Task,
            id,
            Timestamp::from_millis(200),
            None,
        ));
        assert!(first.is_confirmed());

        // The row stays as a tombstone.
        let entity = store.get(EntityType::Task, id).unwrap();
        assert!(entity.is_deleted());

        let second = applier.apply(&SyncEvent::delete(
            EntityType::Task,
            id,
            Timestamp::from_millis(300),
            None,
        ));
        assert!(second.is_confirmed());

        // Exactly one DELETED entry.
        let deletes = store
            .history_for(id)
            .into_iter()
            .filter(|entry| entry.action == HistoryAction::Deleted)
            .count();
        assert_eq!(deletes, 1);
    }

    #[test]
    fn update_on_tombstone_errors() {
        let (applier, _) = applier();
        let created = create_task(&applier, "laundry", 100);
        let id = created.entity_id.unwrap();
        applier.apply(&SyncEvent::delete(
            EntityType::Task,
            id,
            Timestamp::from_millis(200),
            None,
        ));

        let changes = EntityChanges::Task(TaskChanges {
            name: Some("late edit".into()),
            ..TaskChanges::default()
        });
        let response = applier.apply(&SyncEvent::update(
            EntityType::Task,
            id,
            Timestamp::from_millis(300),
            changes,
            None,
        ));
        assert_eq!(response.status, SyncEventStatus::Error);
    }

    #[test]
    fn updated_at_is_monotonic_under_skewed_clients() {
        let (applier, store) = applier();
        let created = create_task(&applier, "laundry", 500);
        let id = created.entity_id.unwrap();

        // A client with a slow clock submits an older timestamp.
        let current = store.get(EntityType::Task, id).unwrap();
        let changes = EntityChanges::Task(TaskChanges {
            notes: Some("late".into()),
            ..TaskChanges::default()
        });
        let response = applier.apply(&SyncEvent::update(
            EntityType::Task,
            id,
            Timestamp::from_millis(100),
            changes,
            None,
        ));
        assert!(response.is_confirmed());

        let after = store.get(EntityType::Task, id).unwrap();
        assert!(after.updated_at() >= current.updated_at());
    }

    #[test]
    fn enable_toggle_records_activation_actions() {
        let (applier, store) = applier();
        let created = create_task(&applier, "laundry", 100);
        let id = created.entity_id.unwrap();

        let disable = EntityChanges::Task(TaskChanges {
            enabled: Some(false),
            ..TaskChanges::default()
        });
        applier.apply(&SyncEvent::update(
            EntityType::Task,
            id,
            Timestamp::from_millis(200),
            disable,
            None,
        ));

        let enable = EntityChanges::Task(TaskChanges {
            enabled: Some(true),
            ..TaskChanges::default()
        });
        applier.apply(&SyncEvent::update(
            EntityType::Task,
            id,
            Timestamp::from_millis(300),
            enable,
            None,
        ));

        let actions: Vec<HistoryAction> = store
            .history_for(id)
            .into_iter()
            .map(|entry| entry.action)
            .collect();
        assert_eq!(
            actions,
            vec![
                HistoryAction::Created,
                HistoryAction::Deactivated,
                HistoryAction::Activated
            ]
        );
    }

    #[test]
    fn user_mutations_do_not_touch_task_history() {
        let (applier, store) = applier();
        let changes = EntityChanges::User(UserChanges {
            name: Some("alex".into()),
            ..UserChanges::default()
        });
        let response = applier.apply(&SyncEvent::create(
            EntityType::User,
            Timestamp::from_millis(100),
            changes,
        ));
        assert!(response.is_confirmed());
        assert_eq!(store.history_len(), 0);
        assert_eq!(
            store.metadata(MetadataKey::LastUserUpdate),
            Timestamp::from_millis(100)
        );
    }
}
