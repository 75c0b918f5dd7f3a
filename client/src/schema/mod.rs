//! Schema registry: collection schemas, default-value generation and entity
//! validation. Constructed once from the application schema document and
//! passed explicitly to the components that need it; there is no process-wide
//! schema state.

mod validate;

use serde_json::{Map, Value};
use thiserror::Error;

pub use validate::ValidationResult;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// The schema document was not the expected JSON array
    #[error("schema document must be a JSON array of collection schemas")]
    MalformedDocument,

    /// No schema is registered under the requested collection name
    #[error("no schema registered for collection `{0}`")]
    UnknownCollection(String),
}

/// Immutable set of collection schemas.
///
/// A schema document is `{"name": ..., "properties": {...}}` where property
/// configs carry `__type`, `__default`, `__required`, `__enum` and, for
/// arrays of objects, a nested `__schema`.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaRegistry {
    schemas: Vec<Value>,
}

impl SchemaRegistry {
    pub fn new(schemas: Vec<Value>) -> Self {
        Self { schemas }
    }

    pub fn from_value(document: Value) -> Result<Self, SchemaError> {
        match document {
            Value::Array(schemas) => Ok(Self { schemas }),
            _ => Err(SchemaError::MalformedDocument),
        }
    }

    pub fn collection_names(&self) -> Vec<&str> {
        self.schemas
            .iter()
            .filter_map(|s| s.get("name").and_then(Value::as_str))
            .collect()
    }

    pub fn get(&self, collection: &str) -> Option<&Value> {
        self.schemas
            .iter()
            .find(|s| s.get("name").and_then(Value::as_str) == Some(collection))
    }

    pub fn has(&self, collection: &str) -> bool {
        self.get(collection).is_some()
    }

    /// Walk `path` through a schema's properties, unwrapping nested array
    /// schemas, and return the properties map at that point.
    pub fn sub_schema<'a>(schema: &'a Value, path: &str) -> Option<&'a Value> {
        let mut properties = schema.get("properties")?;
        for segment in path.split('.') {
            let property = properties.get(segment)?;
            if property.get("__type").and_then(Value::as_str) == Some("array") {
                properties = property.get("__schema")?;
            } else {
                properties = property;
            }
        }
        Some(properties)
    }

    /// Flatten a schema's properties to `(dotted-path, leaf config)` pairs.
    /// A leaf is a property whose children are all `__`-prefixed config keys.
    pub fn flatten(schema: &Value) -> Vec<(String, &Value)> {
        let mut flattened = Vec::new();
        if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
            for (name, property) in properties {
                flatten_property(name, property, &mut String::new(), &mut flattened);
            }
        }
        flattened
    }

    /// Default value for one property config, by declared type.
    pub fn prop_default(config: &Value) -> Value {
        let declared = config.get("__default");
        match config.get("__type").and_then(Value::as_str) {
            Some("string") => declared.cloned().unwrap_or_else(|| Value::String(String::new())),
            Some("number") => declared.cloned().unwrap_or_else(|| Value::from(0)),
            Some("array") => Value::Array(Vec::new()),
            Some("object") => Value::Object(Map::new()),
            Some("id") => declared.cloned().unwrap_or(Value::Null),
            Some("date") => match declared {
                Some(Value::Null) => Value::Null,
                Some(default) => default.clone(),
                None => Value::String(chrono::Utc::now().to_rfc3339()),
            },
            // Unknown types share the boolean default.
            _ => declared.cloned().unwrap_or(Value::Bool(false)),
        }
    }

    /// Build a fully-defaulted entity body for a collection.
    pub fn create_default(&self, collection: &str) -> Result<Value, SchemaError> {
        let schema = self
            .get(collection)
            .ok_or_else(|| SchemaError::UnknownCollection(collection.to_string()))?;
        Ok(inflate(Self::flatten(schema)))
    }

    /// Build a defaulted object for a nested path of a collection schema.
    pub fn create_from_path(&self, collection: &str, path: &str) -> Option<Value> {
        let schema = self.get(collection)?;
        let properties = Self::sub_schema(schema, path)?;
        let mut flattened = Vec::new();
        if let Some(map) = properties.as_object() {
            for (name, property) in map {
                if name.starts_with("__") {
                    continue;
                }
                flatten_property(name, property, &mut String::new(), &mut flattened);
            }
        }
        Some(inflate(flattened))
    }

    /// Coerce a raw binding-layer value to the declared type of its field,
    /// when the collection schema declares one. Unknown paths pass through.
    pub fn clean(&self, collection: &str, field_path: &str, value: Value) -> Value {
        let Some(schema) = self.get(collection) else {
            return value;
        };
        let Some((_, config)) = Self::flatten(schema)
            .into_iter()
            .find(|(path, _)| path == field_path)
        else {
            return value;
        };

        match config.get("__type").and_then(Value::as_str) {
            Some("boolean") => match value {
                Value::String(s) => Value::Bool(s.eq_ignore_ascii_case("true")),
                other => other,
            },
            Some("number") => match value {
                Value::String(s) => {
                    let digits: String = s
                        .chars()
                        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                        .collect();
                    digits
                        .parse::<f64>()
                        .ok()
                        .and_then(|n| serde_json::Number::from_f64(n).map(Value::Number))
                        .unwrap_or(Value::String(s))
                }
                other => other,
            },
            _ => value,
        }
    }
}

fn flatten_property<'a>(
    name: &str,
    property: &'a Value,
    prefix: &mut String,
    flattened: &mut Vec<(String, &'a Value)>,
) {
    let path = if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    };

    let children: Vec<(&String, &Value)> = property
        .as_object()
        .map(|map| map.iter().filter(|(key, _)| !key.starts_with("__")).collect())
        .unwrap_or_default();

    if children.is_empty() {
        flattened.push((path, property));
        return;
    }

    let saved = prefix.clone();
    *prefix = path;
    for (child_name, child) in children {
        flatten_property(child_name, child, prefix, flattened);
    }
    *prefix = saved;
}

fn inflate(flattened: Vec<(String, &Value)>) -> Value {
    let mut result = Value::Object(Map::new());
    for (path, config) in flattened {
        let default = SchemaRegistry::prop_default(config);
        // Property paths never contain numeric segments, so this only ever
        // creates intermediate objects.
        let _ = crate::collection::path::set(&mut result, &path, default);
    }
    result
}
