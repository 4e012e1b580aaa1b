//! The entity store.

use crate::error::{StoreError, StoreResult};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use taskmesh_model::{
    Entity, EntityId, EntityType, MetadataKey, TaskHistoryEntry, Timestamp,
};
use tracing::debug;

/// One table of entity rows, each behind its own lock.
#[derive(Default)]
struct Table {
    rows: RwLock<HashMap<EntityId, Arc<Mutex<Entity>>>>,
}

impl Table {
    fn row(&self, id: EntityId) -> Option<Arc<Mutex<Entity>>> {
        self.rows.read().get(&id).cloned()
    }
}

/// Authoritative storage for tasks, users and groups.
///
/// The store exclusively owns the server's copy of every entity; clients
/// hold cached, possibly-stale replicas. Identifiers are allocated here
/// and never reused. Deletions are tombstones — the row stays so that
/// hash verification can surface the deletion to stale clients — and only
/// [`EntityStore::purge_task`] removes data for real.
pub struct EntityStore {
    tasks: Table,
    users: Table,
    groups: Table,
    next_id: AtomicU64,
    history: Mutex<Vec<TaskHistoryEntry>>,
    metadata: Mutex<BTreeMap<MetadataKey, Timestamp>>,
}

impl EntityStore {
    /// Creates an empty store. The first allocated id is 1.
    pub fn new() -> Self {
        Self {
            tasks: Table::default(),
            users: Table::default(),
            groups: Table::default(),
            next_id: AtomicU64::new(1),
            history: Mutex::new(Vec::new()),
            metadata: Mutex::new(BTreeMap::new()),
        }
    }

    fn table(&self, entity_type: EntityType) -> &Table {
        match entity_type {
            EntityType::Task => &self.tasks,
            EntityType::User => &self.users,
            EntityType::Group => &self.groups,
        }
    }

    /// Allocates a fresh entity identifier.
    pub fn allocate_id(&self) -> EntityId {
        EntityId::new(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Inserts a newly created entity.
    ///
    /// The id must come from [`EntityStore::allocate_id`]; inserting over
    /// an existing row is a validation error.
    pub fn insert(&self, entity: Entity) -> StoreResult<()> {
        let table = self.table(entity.entity_type());
        let mut rows = table.rows.write();
        let id = entity.id();
        if rows.contains_key(&id) {
            return Err(StoreError::validation(format!(
                "{} {} already exists",
                entity.entity_type(),
                id
            )));
        }
        debug!(entity_type = %entity.entity_type(), %id, "insert");
        rows.insert(id, Arc::new(Mutex::new(entity)));
        Ok(())
    }

    /// Writes an entity regardless of whether a row already exists.
    ///
    /// Used by resolution write-back, where the id is known to both sides.
    /// Keeps the id allocator ahead of externally supplied ids.
    pub fn upsert(&self, entity: Entity) {
        let id = entity.id();
        self.next_id.fetch_max(id.raw() + 1, Ordering::SeqCst);

        let table = self.table(entity.entity_type());
        if let Some(row) = table.row(id) {
            *row.lock() = entity;
            return;
        }
        let mut rows = table.rows.write();
        // A racing upsert may have inserted the row since the lookup.
        match rows.get(&id) {
            Some(row) => *row.lock() = entity,
            None => {
                rows.insert(id, Arc::new(Mutex::new(entity)));
            }
        }
    }

    /// Returns a clone of the entity's current state, tombstones included.
    pub fn get(&self, entity_type: EntityType, id: EntityId) -> Option<Entity> {
        self.table(entity_type).row(id).map(|row| row.lock().clone())
    }

    /// Returns true if a row exists for the id, tombstoned or not.
    pub fn contains(&self, entity_type: EntityType, id: EntityId) -> bool {
        self.table(entity_type).rows.read().contains_key(&id)
    }

    /// Runs `f` with the entity's row lock held.
    ///
    /// This is the per-entity critical section: the applier's digest
    /// comparison and the write that follows it both happen inside `f`,
    /// so no other writer can interleave between them. Errors from `f`
    /// propagate unchanged; `f` must not mutate on its error paths.
    pub fn with_entity<T>(
        &self,
        entity_type: EntityType,
        id: EntityId,
        f: impl FnOnce(&mut Entity) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let row = self
            .table(entity_type)
            .row(id)
            .ok_or_else(|| StoreError::not_found(entity_type, id))?;
        let mut entity = row.lock();
        f(&mut entity)
    }

    /// Returns all ids of one entity type, in ascending order.
    pub fn ids(&self, entity_type: EntityType) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self
            .table(entity_type)
            .rows
            .read()
            .keys()
            .copied()
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Returns a cloned snapshot of one entity type, ordered by id.
    pub fn snapshot(&self, entity_type: EntityType) -> Vec<Entity> {
        let rows = self.table(entity_type).rows.read();
        let mut entities: Vec<Entity> = rows.values().map(|row| row.lock().clone()).collect();
        entities.sort_unstable_by_key(Entity::id);
        entities
    }

    /// Returns entities changed strictly after `since`, oldest first.
    ///
    /// The boolean is true when more changes remain past `limit`.
    pub fn changed_since(
        &self,
        entity_type: EntityType,
        since: Timestamp,
        limit: usize,
    ) -> (Vec<Entity>, bool) {
        let mut changed: Vec<Entity> = self
            .snapshot(entity_type)
            .into_iter()
            .filter(|entity| entity.updated_at() > since)
            .collect();
        changed.sort_by_key(|entity| (entity.updated_at(), entity.id()));

        let has_more = changed.len() > limit;
        changed.truncate(limit);
        (changed, has_more)
    }

    /// Returns the number of rows for one entity type.
    pub fn len(&self, entity_type: EntityType) -> usize {
        self.table(entity_type).rows.read().len()
    }

    /// Returns true if no rows exist for the entity type.
    pub fn is_empty(&self, entity_type: EntityType) -> bool {
        self.len(entity_type) == 0
    }

    /// Appends a task history entry. The log is append-only; entries are
    /// never updated or removed except through [`EntityStore::purge_task`].
    pub fn append_history(&self, entry: TaskHistoryEntry) {
        self.history.lock().push(entry);
    }

    /// Returns the history of one task in append order.
    pub fn history_for(&self, task_id: EntityId) -> Vec<TaskHistoryEntry> {
        self.history
            .lock()
            .iter()
            .filter(|entry| entry.task_id == task_id)
            .cloned()
            .collect()
    }

    /// Returns the total number of history entries.
    pub fn history_len(&self) -> usize {
        self.history.lock().len()
    }

    /// Hard-deletes a task, cascading into its history.
    ///
    /// Maintenance path only; sync deletions are tombstones.
    pub fn purge_task(&self, id: EntityId) -> StoreResult<()> {
        let removed = self.tasks.rows.write().remove(&id);
        if removed.is_none() {
            return Err(StoreError::not_found(EntityType::Task, id));
        }
        self.history.lock().retain(|entry| entry.task_id != id);
        debug!(%id, "purged task and history");
        Ok(())
    }

    /// Advances a metadata high-water mark. The value only moves forward;
    /// an older timestamp leaves the mark untouched.
    pub fn advance_metadata(&self, key: MetadataKey, to: Timestamp) {
        let mut metadata = self.metadata.lock();
        let mark = metadata.entry(key).or_insert(Timestamp::EPOCH);
        *mark = (*mark).max(to);
    }

    /// Reads a metadata high-water mark. Unset keys read as the epoch.
    pub fn metadata(&self, key: MetadataKey) -> Timestamp {
        self.metadata
            .lock()
            .get(&key)
            .copied()
            .unwrap_or(Timestamp::EPOCH)
    }
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EntityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStore")
            .field("tasks", &self.len(EntityType::Task))
            .field("users", &self.len(EntityType::User))
            .field("groups", &self.len(EntityType::Group))
            .field("history", &self.history_len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskmesh_model::{HistoryAction, Task, User};

    fn store_with_task(name: &str) -> (EntityStore, EntityId) {
        let store = EntityStore::new();
        let id = store.allocate_id();
        store
            .insert(Entity::from(Task::new(id, name, Timestamp::from_millis(10))))
            .unwrap();
        (store, id)
    }

    #[test]
    fn insert_and_get() {
        let (store, id) = store_with_task("dishes");

        let entity = store.get(EntityType::Task, id).unwrap();
        assert_eq!(entity.as_task().unwrap().name, "dishes");
        assert!(store.contains(EntityType::Task, id));
        assert!(store.get(EntityType::User, id).is_none());
    }

    #[test]
    fn insert_over_existing_id_fails() {
        let (store, id) = store_with_task("dishes");
        let duplicate = Entity::from(Task::new(id, "other", Timestamp::EPOCH));
        assert!(store.insert(duplicate).is_err());
    }

    #[test]
    fn ids_are_never_reused() {
        let store = EntityStore::new();
        let a = store.allocate_id();
        let b = store.allocate_id();
        assert!(b > a);

        // Upserting a high external id keeps the allocator ahead of it.
        store.upsert(Entity::from(User::new(
            EntityId::new(100),
            "pat",
            Timestamp::EPOCH,
        )));
        assert!(store.allocate_id() > EntityId::new(100));
    }

    #[test]
    fn with_entity_mutates_in_place() {
        let (store, id) = store_with_task("dishes");

        store
            .with_entity(EntityType::Task, id, |entity| {
                if let Entity::Task(task) = entity {
                    task.completed = true;
                }
                Ok(())
            })
            .unwrap();

        let entity = store.get(EntityType::Task, id).unwrap();
        assert!(entity.as_task().unwrap().completed);
    }

    #[test]
    fn with_entity_missing_row() {
        let store = EntityStore::new();
        let result = store.with_entity(EntityType::Task, EntityId::new(99), |_| Ok(()));
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn changed_since_filters_and_paginates() {
        let store = EntityStore::new();
        for millis in [10, 20, 30] {
            let id = store.allocate_id();
            store
                .insert(Entity::from(Task::new(
                    id,
                    format!("t{millis}"),
                    Timestamp::from_millis(millis),
                )))
                .unwrap();
        }

        let (all, has_more) = store.changed_since(EntityType::Task, Timestamp::from_millis(10), 10);
        assert_eq!(all.len(), 2);
        assert!(!has_more);
        assert!(all[0].updated_at() < all[1].updated_at());

        let (page, has_more) = store.changed_since(EntityType::Task, Timestamp::EPOCH, 2);
        assert_eq!(page.len(), 2);
        assert!(has_more);
    }

    #[test]
    fn history_is_append_only_per_task() {
        let (store, id) = store_with_task("dishes");
        let other = store.allocate_id();

        store.append_history(TaskHistoryEntry::new(
            id,
            HistoryAction::Created,
            Timestamp::from_millis(10),
        ));
        store.append_history(TaskHistoryEntry::new(
            other,
            HistoryAction::Created,
            Timestamp::from_millis(11),
        ));
        store.append_history(TaskHistoryEntry::new(
            id,
            HistoryAction::Confirmed,
            Timestamp::from_millis(12),
        ));

        let history = store.history_for(id);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].action, HistoryAction::Created);
        assert_eq!(history[1].action, HistoryAction::Confirmed);
    }

    #[test]
    fn purge_cascades_history() {
        let (store, id) = store_with_task("dishes");
        store.append_history(TaskHistoryEntry::new(
            id,
            HistoryAction::Created,
            Timestamp::from_millis(10),
        ));

        store.purge_task(id).unwrap();
        assert!(!store.contains(EntityType::Task, id));
        assert!(store.history_for(id).is_empty());
        assert!(store.purge_task(id).is_err());
    }

    #[test]
    fn metadata_only_advances() {
        let store = EntityStore::new();
        let key = MetadataKey::LastTaskUpdate;
        assert_eq!(store.metadata(key), Timestamp::EPOCH);

        store.advance_metadata(key, Timestamp::from_millis(100));
        store.advance_metadata(key, Timestamp::from_millis(50));
        assert_eq!(store.metadata(key), Timestamp::from_millis(100));
    }

    #[test]
    fn concurrent_writes_to_distinct_entities() {
        use std::thread;

        let store = Arc::new(EntityStore::new());
        let a = store.allocate_id();
        let b = store.allocate_id();
        store
            .insert(Entity::from(Task::new(a, "a", Timestamp::EPOCH)))
            .unwrap();
        store
            .insert(Entity::from(Task::new(b, "b", Timestamp::EPOCH)))
            .unwrap();

        let handles: Vec<_> = [a, b]
            .into_iter()
            .map(|id| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..100 {
                        store
                            .with_entity(EntityType::Task, id, |entity| {
                                entity.set_updated_at(Timestamp::from_millis(i));
                                Ok(())
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(
            store.get(EntityType::Task, a).unwrap().updated_at(),
            Timestamp::from_millis(99)
        );
    }
}
