//! In-memory entity collections and the readonly-echo bookkeeping shared by
//! the diff engine, the request queue and the realtime reconciler.

pub mod path;

use serde_json::{Map, Value};

use crate::types::CollectionStatus;

pub use path::PathError;

/// One-shot marker meaning "the next structurally-matching local mutation was
/// caused by applying a remote patch, not by the user". Stored on the entity
/// itself so it travels with removals. Consumed by the first diff observation.
pub const READONLY_MARKER: &str = "__readonly__";

/// One record in a collection. Always a JSON object; carries a 24-hex `id`
/// once persisted remotely.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity(Value);

impl Entity {
    pub fn new() -> Self {
        Self(Value::Object(Map::new()))
    }

    /// Wrap a raw JSON value. Returns `None` when the value is not an object.
    pub fn from_value(value: Value) -> Option<Self> {
        value.is_object().then_some(Self(value))
    }

    fn object(&self) -> &Map<String, Value> {
        self.0.as_object().expect("entity payload is always a JSON object")
    }

    fn object_mut(&mut self) -> &mut Map<String, Value> {
        self.0
            .as_object_mut()
            .expect("entity payload is always a JSON object")
    }

    pub fn id(&self) -> Option<&str> {
        self.object().get("id").and_then(Value::as_str)
    }

    pub fn set_id(&mut self, id: &str) {
        self.object_mut()
            .insert("id".to_string(), Value::String(id.to_string()));
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    pub fn value_mut(&mut self) -> &mut Value {
        &mut self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    pub fn get(&self, field_path: &str) -> Option<&Value> {
        path::get(&self.0, field_path)
    }

    pub fn set(&mut self, field_path: &str, value: Value) -> Result<(), PathError> {
        path::set(&mut self.0, field_path, value)
    }

    pub fn mark_readonly(&mut self) {
        self.object_mut()
            .insert(READONLY_MARKER.to_string(), Value::Bool(true));
    }

    pub fn is_readonly(&self) -> bool {
        value_readonly(&self.0)
    }

    /// Consume the echo marker. Returns whether it was set; the marker never
    /// survives the call.
    pub fn consume_readonly(&mut self) -> bool {
        self.object_mut().remove(READONLY_MARKER).is_some()
    }

    /// Serializable form with all `__x__` bookkeeping fields stripped.
    pub fn to_wire(&self) -> Value {
        strip_markers(&self.0)
    }
}

impl Default for Entity {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn value_readonly(value: &Value) -> bool {
    value
        .as_object()
        .and_then(|map| map.get(READONLY_MARKER))
        .is_some()
}

pub(crate) fn is_marker_key(key: &str) -> bool {
    key.len() > 4 && key.starts_with("__") && key.ends_with("__")
}

fn strip_markers(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(key, _)| !is_marker_key(key))
                .map(|(key, val)| (key.clone(), strip_markers(val)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(strip_markers).collect()),
        other => other.clone(),
    }
}

/// The ordered set of entities for one remote resource route.
#[derive(Debug)]
pub struct Collection {
    route: String,
    entities: Vec<Entity>,
    status: CollectionStatus,
    loaded: bool,
}

impl Collection {
    pub fn new(route: &str) -> Self {
        Self {
            route: route.to_string(),
            entities: Vec::new(),
            status: CollectionStatus::Idle,
            loaded: false,
        }
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn status(&self) -> CollectionStatus {
        self.status
    }

    pub fn set_status(&mut self, status: CollectionStatus) {
        self.status = status;
    }

    pub fn loaded(&self) -> bool {
        self.loaded
    }

    pub fn set_loaded(&mut self, loaded: bool) {
        self.loaded = loaded;
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Direct mutable access for the binding wrapper; every mutation made here
    /// must be reported back through a change descriptor.
    pub fn entities_mut(&mut self) -> &mut Vec<Entity> {
        &mut self.entities
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.entities.iter().position(|e| e.id() == Some(id))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index_of(id).is_some()
    }

    pub fn find(&self, id: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.id() == Some(id))
    }

    pub fn find_mut(&mut self, id: &str) -> Option<&mut Entity> {
        self.entities.iter_mut().find(|e| e.id() == Some(id))
    }

    pub fn push(&mut self, entity: Entity) {
        self.entities.push(entity);
    }

    pub fn remove(&mut self, index: usize) -> Option<Entity> {
        (index < self.entities.len()).then(|| self.entities.remove(index))
    }

    /// Whole-array refresh; marks the collection loaded.
    pub fn replace_all(&mut self, entities: Vec<Entity>) {
        self.entities = entities;
        self.loaded = true;
    }

    /// Bulk wipe: echo-mark every entity, then drain them all.
    pub fn clear_marked(&mut self) -> Vec<Entity> {
        for entity in &mut self.entities {
            entity.mark_readonly();
        }
        std::mem::take(&mut self.entities)
    }
}
