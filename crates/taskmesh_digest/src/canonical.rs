//! Canonical CBOR form of an entity.

use crate::error::{DigestError, DigestResult};
use ciborium::value::Value;
use taskmesh_model::{Entity, EntityId, Group, Task, User};

/// Encodes an entity into its canonical CBOR bytes.
///
/// Keys are inserted in lexicographic order and id arrays are sorted, so
/// the output depends only on the entity's content fields. `updated_at`
/// is precedence bookkeeping and is not part of the canonical form.
pub fn canonical_bytes(entity: &Entity) -> DigestResult<Vec<u8>> {
    let value = match entity {
        Entity::Task(task) => canonical_task(task),
        Entity::User(user) => canonical_user(user),
        Entity::Group(group) => canonical_group(group),
    };

    let mut buf = Vec::new();
    ciborium::ser::into_writer(&value, &mut buf)
        .map_err(|e| DigestError::Encode(e.to_string()))?;
    Ok(buf)
}

fn canonical_task(task: &Task) -> Value {
    // Keys in lexicographic order: assignee_ids, completed, deleted,
    // enabled, group_id, id, kind, name, notes.
    let mut pairs = vec![
        (text("assignee_ids"), id_array(&task.assignee_ids)),
        (text("completed"), Value::Bool(task.completed)),
        (text("deleted"), Value::Bool(task.deleted)),
        (text("enabled"), Value::Bool(task.enabled)),
    ];
    if let Some(group_id) = task.group_id {
        pairs.push((text("group_id"), id_value(group_id)));
    }
    pairs.push((text("id"), id_value(task.id)));
    pairs.push((text("kind"), text("task")));
    pairs.push((text("name"), text(&task.name)));
    if let Some(notes) = &task.notes {
        pairs.push((text("notes"), text(notes)));
    }
    Value::Map(pairs)
}

fn canonical_user(user: &User) -> Value {
    let pairs = vec![
        (text("deleted"), Value::Bool(user.deleted)),
        (text("enabled"), Value::Bool(user.enabled)),
        (text("id"), id_value(user.id)),
        (text("kind"), text("user")),
        (text("name"), text(&user.name)),
    ];
    Value::Map(pairs)
}

fn canonical_group(group: &Group) -> Value {
    let pairs = vec![
        (text("deleted"), Value::Bool(group.deleted)),
        (text("enabled"), Value::Bool(group.enabled)),
        (text("id"), id_value(group.id)),
        (text("kind"), text("group")),
        (text("member_ids"), id_array(&group.member_ids)),
        (text("name"), text(&group.name)),
    ];
    Value::Map(pairs)
}

fn text(s: impl Into<String>) -> Value {
    Value::Text(s.into())
}

fn id_value(id: EntityId) -> Value {
    Value::Integer(id.raw().into())
}

fn id_array(ids: &[EntityId]) -> Value {
    let mut sorted: Vec<EntityId> = ids.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    Value::Array(sorted.into_iter().map(id_value).collect())
}
