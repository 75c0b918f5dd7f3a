use std::cell::RefCell;
use std::rc::Rc;
use std::sync::LazyLock;

use log::{debug, warn};
use regex::Regex;
use serde_json::Value;

use crate::collection::{path, value_readonly, Collection};
use crate::diff::descriptor::{ChangeDescriptor, Mutation, DATA_FIELD};
use crate::diff::error::DiffError;
use crate::object_id::ObjectIdGenerator;
use crate::queue::{RemoteOperation, REMOVE_TAG};
use crate::schema::SchemaRegistry;

/// Paths passing through `__x__` bookkeeping fields are the engine's own
/// patches echoing back through the observation channel.
static INTERNAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"__\w+__").expect("internal marker pattern is valid"));

/// Observes change descriptors for one collection and emits zero or one
/// remote operation per descriptor.
///
/// The engine mutates the collection it observes in exactly two ways: it
/// consumes one-shot readonly-echo markers, and it assigns object ids to
/// freshly-inserted entities/elements before their operation is queued.
pub struct ChangeDiffEngine {
    ids: Rc<RefCell<ObjectIdGenerator>>,
    schemas: Option<Rc<SchemaRegistry>>,
}

impl ChangeDiffEngine {
    pub fn new(ids: Rc<RefCell<ObjectIdGenerator>>, schemas: Option<Rc<SchemaRegistry>>) -> Self {
        Self { ids, schemas }
    }

    /// Classify one descriptor. The underlying mutation has already been
    /// applied to `collection` by the binding wrapper; this decides whether
    /// it is remote-worthy.
    pub fn observe(
        &mut self,
        collection: &mut Collection,
        change: &ChangeDescriptor,
    ) -> Result<Option<RemoteOperation>, DiffError> {
        let segments: Vec<&str> = path::split(&change.path);

        // Length bookkeeping is a side effect of insert/remove, not an edit.
        if segments.last() == Some(&"length") {
            return Ok(None);
        }
        if INTERNAL_RE.is_match(&change.path) {
            debug!("ignoring internal change: {}", change.path);
            return Ok(None);
        }

        let at_root = segments.len() == 1 && segments[0] == DATA_FIELD;
        match &change.mutation {
            Mutation::Insert { index, .. } if at_root => self.root_insert(collection, *index),
            Mutation::Remove { removed, .. } if at_root => {
                self.root_remove(&change.path, removed)
            }
            Mutation::Insert { index, value } => {
                self.nested_insert(collection, &segments, *index, value)
            }
            Mutation::Remove { index, removed } => {
                self.nested_remove(collection, &change.path, &segments, *index, removed)
            }
            Mutation::Set { value } => self.field_set(collection, &segments, value),
        }
    }

    /// Root insertion: assign an id if the entity lacks one, then emit `add`.
    fn root_insert(
        &mut self,
        collection: &mut Collection,
        index: usize,
    ) -> Result<Option<RemoteOperation>, DiffError> {
        let Some(entity) = collection.entities_mut().get_mut(index) else {
            debug!("ignoring insert at stale index {index}");
            return Ok(None);
        };
        if entity.consume_readonly() {
            debug!("suppressing echoed insert at index {index}");
            return Ok(None);
        }
        if entity.id().is_none() {
            let id = self.ids.borrow_mut().next();
            entity.set_id(&id);
        }
        Ok(Some(RemoteOperation::Add {
            entity: entity.to_wire(),
        }))
    }

    /// Root removal: emit `remove` unless the entity left with an echo mark.
    fn root_remove(
        &mut self,
        change_path: &str,
        removed: &[Value],
    ) -> Result<Option<RemoteOperation>, DiffError> {
        if removed.len() != 1 {
            return Err(DiffError::UnsupportedBatchRemoval {
                path: change_path.to_string(),
                count: removed.len(),
            });
        }
        let value = &removed[0];
        if value_readonly(value) {
            debug!("suppressing echoed removal");
            return Ok(None);
        }
        let Some(entity_id) = value.get("id").and_then(Value::as_str) else {
            warn!("removed entity carries no id; nothing to tell the server");
            return Ok(None);
        };
        Ok(Some(RemoteOperation::Remove {
            entity_id: entity_id.to_string(),
        }))
    }

    /// Insertion into a nested array belonging to an entity.
    fn nested_insert(
        &mut self,
        collection: &mut Collection,
        segments: &[&str],
        index: usize,
        value: &Value,
    ) -> Result<Option<RemoteOperation>, DiffError> {
        let Some((owner_index, entity_id)) = self.resolve_owner(collection, segments) else {
            return Ok(None);
        };

        let rel_path = segments[2..].join(".");
        let mut payload = value.clone();
        if payload.is_object() && payload.get("id").is_none() {
            let id = self.ids.borrow_mut().next();
            // The descriptor carries a copy; the live element needs the id too.
            let owner = &mut collection.entities_mut()[owner_index];
            let slot_path = format!("{rel_path}.{index}");
            match path::get_mut(owner.value_mut(), &slot_path).and_then(Value::as_object_mut) {
                Some(slot) => {
                    slot.insert("id".to_string(), Value::String(id.clone()));
                }
                None => warn!("inserted element not found at `{slot_path}`"),
            }
            payload
                .as_object_mut()
                .expect("payload checked object above")
                .insert("id".to_string(), Value::String(id));
        }

        Ok(Some(RemoteOperation::Update {
            entity_id,
            path: rel_path,
            value: payload,
        }))
    }

    /// Removal of exactly one element from a nested array; more than one in a
    /// single batch cannot be expressed by the update operation shape.
    fn nested_remove(
        &mut self,
        collection: &mut Collection,
        change_path: &str,
        segments: &[&str],
        index: usize,
        removed: &[Value],
    ) -> Result<Option<RemoteOperation>, DiffError> {
        let Some((_, entity_id)) = self.resolve_owner(collection, segments) else {
            return Ok(None);
        };
        if removed.is_empty() {
            return Ok(None);
        }
        if removed.len() > 1 {
            return Err(DiffError::UnsupportedBatchRemoval {
                path: change_path.to_string(),
                count: removed.len(),
            });
        }

        let rel_path = segments[2..].join(".");
        Ok(Some(RemoteOperation::Update {
            entity_id,
            path: format!("{rel_path}.{index}.{REMOVE_TAG}"),
            value: Value::String(String::new()),
        }))
    }

    /// Scalar/object field mutation elsewhere on an entity.
    fn field_set(
        &mut self,
        collection: &mut Collection,
        segments: &[&str],
        value: &Value,
    ) -> Result<Option<RemoteOperation>, DiffError> {
        let Some((owner_index, entity_id)) = self.resolve_owner(collection, segments) else {
            return Ok(None);
        };

        // Rewrite opaque identity keys to live indices, left to right; arrays
        // are reordered by insert/remove between mutations, so the lookup has
        // to happen at emit time.
        let owner = &collection.entities()[owner_index];
        let mut resolved: Vec<String> = Vec::with_capacity(segments.len() - 2);
        for segment in &segments[2..] {
            if let Some(token) = segment.strip_prefix('#') {
                let prefix = resolved.join(".");
                let array = if prefix.is_empty() {
                    Some(owner.value())
                } else {
                    path::get(owner.value(), &prefix)
                }
                .and_then(Value::as_array);

                let Some(array) = array else {
                    debug!("opaque key `{segment}` does not address an array");
                    return Ok(None);
                };
                let Some(index) = array
                    .iter()
                    .position(|el| el.get("id").and_then(Value::as_str) == Some(token))
                else {
                    debug!("opaque key `{segment}` no longer resolves; dropping change");
                    return Ok(None);
                };
                resolved.push(index.to_string());
            } else {
                resolved.push((*segment).to_string());
            }
        }

        let rel_path = resolved.join(".");
        let value = self.clean(collection.route(), &rel_path, value.clone());
        Ok(Some(RemoteOperation::Update {
            entity_id,
            path: rel_path,
            value,
        }))
    }

    /// Resolve the owning entity from the first two path segments, consuming
    /// its echo marker when present. `None` means the descriptor is noise or
    /// a suppressed echo.
    fn resolve_owner(
        &mut self,
        collection: &mut Collection,
        segments: &[&str],
    ) -> Option<(usize, String)> {
        if segments.len() < 3 {
            debug!("ignoring path too short: {segments:?}");
            return None;
        }
        let Some(owner_index) = resolve_entity_index(collection, segments[1]) else {
            debug!("ignoring invalid change index: {}", segments[1]);
            return None;
        };

        let owner = &mut collection.entities_mut()[owner_index];
        if owner.consume_readonly() {
            debug!("suppressing readonly change under `{}`", segments[1]);
            return None;
        }
        let Some(entity_id) = owner.id().map(str::to_string) else {
            warn!("dropping edit on entity without an id (add still in flight?)");
            return None;
        };
        Some((owner_index, entity_id))
    }

    fn clean(&self, route: &str, field_path: &str, value: Value) -> Value {
        match &self.schemas {
            Some(registry) => registry.clean(route, field_path, value),
            None => value,
        }
    }
}

fn resolve_entity_index(collection: &Collection, segment: &str) -> Option<usize> {
    if let Some(token) = segment.strip_prefix('#') {
        collection.index_of(token)
    } else {
        segment
            .parse::<usize>()
            .ok()
            .filter(|index| *index < collection.len())
    }
}
