//! The diff→apply round-trip law: for any sequence of local inserts, edits
//! and removals, replaying the emitted operation stream against a fresh
//! empty store reproduces the final local state exactly.

use std::cell::RefCell;
use std::rc::Rc;

use proptest::prelude::*;
use serde_json::{json, Value};

use mooring_client::{
    ChangeDescriptor, ChangeDiffEngine, Collection, Entity, Fingerprint, ObjectIdGenerator,
    RemoteOperation,
};

#[derive(Debug, Clone)]
enum Action {
    Insert { name: String },
    Rename { slot: usize, name: String },
    Remove { slot: usize },
    AddTag { slot: usize, tag: String },
    RemoveTag { slot: usize, tag_slot: usize },
}

fn action_strategy() -> impl Strategy<Value = Action> {
    prop_oneof![
        "[a-z]{1,8}".prop_map(|name| Action::Insert { name }),
        (0usize..8, "[a-z]{1,8}").prop_map(|(slot, name)| Action::Rename { slot, name }),
        (0usize..8).prop_map(|slot| Action::Remove { slot }),
        (0usize..8, "[a-z]{1,5}").prop_map(|(slot, tag)| Action::AddTag { slot, tag }),
        (0usize..8, 0usize..8).prop_map(|(slot, tag_slot)| Action::RemoveTag { slot, tag_slot }),
    ]
}

/// Drive the engine the way the binding wrapper would: mutate the collection
/// first, then report the mutation as a descriptor. Collects every emitted
/// operation.
fn run_actions(actions: &[Action]) -> (Collection, Vec<RemoteOperation>) {
    let ids = Rc::new(RefCell::new(ObjectIdGenerator::new(Fingerprint::from_parts(
        0x777777, 0x4242, 0,
    ))));
    let mut engine = ChangeDiffEngine::new(ids, None);
    let mut collection = Collection::new("tasks");
    let mut ops = Vec::new();

    for action in actions {
        let change = match action {
            Action::Insert { name } => {
                let value = json!({"name": name, "tags": []});
                let index = collection.len();
                collection.push(Entity::from_value(value.clone()).unwrap());
                ChangeDescriptor::insert("data", index, value)
            }
            Action::Rename { slot, name } => {
                if collection.is_empty() {
                    continue;
                }
                let index = slot % collection.len();
                let entity = &mut collection.entities_mut()[index];
                entity.set("name", json!(name)).unwrap();
                ChangeDescriptor::set(&format!("data.{index}.name"), json!(name))
            }
            Action::Remove { slot } => {
                if collection.is_empty() {
                    continue;
                }
                let index = slot % collection.len();
                let removed = collection.remove(index).unwrap();
                ChangeDescriptor::remove("data", index, vec![removed.into_value()])
            }
            Action::AddTag { slot, tag } => {
                if collection.is_empty() {
                    continue;
                }
                let index = slot % collection.len();
                let entity = &mut collection.entities_mut()[index];
                let tags = entity.value_mut()["tags"].as_array_mut().unwrap();
                let tag_index = tags.len();
                tags.push(json!(tag));
                ChangeDescriptor::insert(&format!("data.{index}.tags"), tag_index, json!(tag))
            }
            Action::RemoveTag { slot, tag_slot } => {
                if collection.is_empty() {
                    continue;
                }
                let index = slot % collection.len();
                let entity = &mut collection.entities_mut()[index];
                let tags = entity.value_mut()["tags"].as_array_mut().unwrap();
                if tags.is_empty() {
                    continue;
                }
                let tag_index = tag_slot % tags.len();
                let removed = tags.remove(tag_index);
                ChangeDescriptor::remove(&format!("data.{index}.tags"), tag_index, vec![removed])
            }
        };
        if let Some(op) = engine.observe(&mut collection, &change).unwrap() {
            ops.push(op);
        }
    }
    (collection, ops)
}

/// Replay the operation stream against an empty store, the way the remote
/// side interprets it: adds append, removes delete by id, updates set a
/// scalar path, append when the path resolves to an array, and remove one
/// element for `__remove__`-tagged paths.
fn replay(ops: &[RemoteOperation]) -> Vec<Value> {
    let mut data: Vec<Value> = Vec::new();
    for op in ops {
        match op {
            RemoteOperation::Add { entity } => data.push(entity.clone()),
            RemoteOperation::Remove { entity_id } => {
                data.retain(|e| e["id"].as_str() != Some(entity_id));
            }
            RemoteOperation::Update {
                entity_id,
                path,
                value,
            } => {
                let Some(entity) = data
                    .iter_mut()
                    .find(|e| e["id"].as_str() == Some(entity_id))
                else {
                    continue;
                };
                apply_update(entity, path, value);
            }
            _ => {}
        }
    }
    data
}

fn apply_update(entity: &mut Value, path: &str, value: &Value) {
    let segments: Vec<&str> = path.split('.').collect();

    if segments.last() == Some(&"__remove__") {
        let index: usize = segments[segments.len() - 2].parse().unwrap();
        let array_path = &segments[..segments.len() - 2];
        if let Some(array) = walk_mut(entity, array_path).and_then(Value::as_array_mut) {
            if index < array.len() {
                array.remove(index);
            }
        }
        return;
    }

    if let Some(existing) = walk_mut(entity, &segments) {
        if let Some(array) = existing.as_array_mut() {
            array.push(value.clone());
        } else {
            *existing = value.clone();
        }
        return;
    }

    let (last, parents) = segments.split_last().unwrap();
    if let Some(parent) = walk_mut(entity, parents).and_then(Value::as_object_mut) {
        parent.insert((*last).to_string(), value.clone());
    }
}

fn walk_mut<'a>(root: &'a mut Value, segments: &[&str]) -> Option<&'a mut Value> {
    let mut current = root;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get_mut(*segment)?,
            Value::Array(items) => items.get_mut(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn replayed_operations_reproduce_local_state(
        actions in prop::collection::vec(action_strategy(), 0..30)
    ) {
        let (collection, ops) = run_actions(&actions);
        let replayed = replay(&ops);

        let local: Vec<Value> = collection
            .entities()
            .iter()
            .map(Entity::to_wire)
            .collect();
        prop_assert_eq!(local, replayed);
    }
}

#[test]
fn scripted_roundtrip_covers_every_operation_shape() {
    let actions = vec![
        Action::Insert { name: "alpha".into() },
        Action::Insert { name: "beta".into() },
        Action::AddTag { slot: 0, tag: "red".into() },
        Action::AddTag { slot: 0, tag: "blue".into() },
        Action::Rename { slot: 1, name: "gamma".into() },
        Action::RemoveTag { slot: 0, tag_slot: 0 },
        Action::Remove { slot: 1 },
        Action::Insert { name: "delta".into() },
    ];
    let (collection, ops) = run_actions(&actions);
    let replayed = replay(&ops);
    let local: Vec<Value> = collection.entities().iter().map(Entity::to_wire).collect();
    assert_eq!(local, replayed);
    assert_eq!(local.len(), 2);
    assert_eq!(local[0]["tags"], json!(["blue"]));
}
