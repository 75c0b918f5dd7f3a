use serde_json::Value;

use crate::query::predicate::parse_date;
use crate::schema::{SchemaError, SchemaRegistry};

/// Outcome of validating one entity against its collection schema.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub missing: Vec<String>,
    pub invalid: Vec<String>,
}

impl ValidationResult {
    fn valid() -> Self {
        Self {
            is_valid: true,
            missing: Vec::new(),
            invalid: Vec::new(),
        }
    }
}

impl SchemaRegistry {
    /// Validate an entity body against its collection schema, tolerating the
    /// same loose string/number inputs the binding layer produces.
    pub fn validate(&self, collection: &str, entity: &Value) -> Result<ValidationResult, SchemaError> {
        let schema = self
            .get(collection)
            .ok_or_else(|| SchemaError::UnknownCollection(collection.to_string()))?;
        let flattened_schema = Self::flatten(schema);
        let flattened_body = flatten_body(entity);
        Ok(validate_flat(&flattened_schema, &flattened_body, ""))
    }
}

/// Flatten an entity body to `(dotted-path, value)` leaves. Arrays, nulls and
/// scalars are leaves; objects recurse.
fn flatten_body(body: &Value) -> Vec<(String, &Value)> {
    fn walk<'a>(prefix: &str, value: &'a Value, out: &mut Vec<(String, &'a Value)>) {
        match value {
            Value::Object(map) => {
                for (key, child) in map {
                    let path = if prefix.is_empty() {
                        key.clone()
                    } else {
                        format!("{prefix}.{key}")
                    };
                    walk(&path, child, out);
                }
            }
            leaf => out.push((prefix.to_string(), leaf)),
        }
    }

    let mut out = Vec::new();
    if let Some(map) = body.as_object() {
        for (key, child) in map {
            walk(key, child, &mut out);
        }
    }
    out
}

fn validate_flat(
    schema: &[(String, &Value)],
    values: &[(String, &Value)],
    parent: &str,
) -> ValidationResult {
    let mut result = ValidationResult::valid();

    for (property, config) in schema {
        let found = values.iter().find(|(path, _)| path == property);

        let Some((_, value)) = found else {
            if config.get("__default").is_some() {
                continue;
            }
            if config.get("__required").and_then(Value::as_bool) == Some(true) {
                result.is_valid = false;
                result.missing.push(format!("{parent}{property}"));
            }
            continue;
        };

        if !validate_prop(value, config) {
            result.is_valid = false;
            result
                .invalid
                .push(format!("{parent}{property}:{value}"));
            continue;
        }

        // Arrays of structured elements validate element-wise.
        if config.get("__type").and_then(Value::as_str) == Some("array") {
            if let (Some(sub_schema), Some(elements)) =
                (config.get("__schema").and_then(Value::as_object), value.as_array())
            {
                let sub_entries: Vec<(String, &Value)> = sub_schema
                    .iter()
                    .filter(|(key, _)| !key.starts_with("__"))
                    .map(|(key, cfg)| (key.clone(), cfg))
                    .collect();
                for (index, element) in elements.iter().enumerate() {
                    let element_values = flatten_body(element);
                    let sub_result = validate_flat(
                        &sub_entries,
                        &element_values,
                        &format!("{property}.{index}."),
                    );
                    if !sub_result.is_valid {
                        result.is_valid = false;
                        result.missing.extend(sub_result.missing);
                        result.invalid.extend(sub_result.invalid);
                    }
                }
            }
        }
    }

    result
}

/// Loose single-property check: string inputs for booleans and numbers are
/// acceptable where they coerce, and null always passes.
fn validate_prop(value: &Value, config: &Value) -> bool {
    if value.is_null() {
        return true;
    }

    match config.get("__type").and_then(Value::as_str) {
        Some("number") => match value {
            Value::Number(_) => true,
            Value::String(s) => s.parse::<f64>().is_ok(),
            _ => false,
        },
        Some("id") => value.is_string(),
        Some("object") => value.is_object(),
        Some("string") => {
            let coerced = match value {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            };
            let Some(coerced) = coerced else {
                return false;
            };
            match config.get("__enum").and_then(Value::as_array) {
                Some(allowed) => {
                    coerced.is_empty() || allowed.iter().any(|v| v.as_str() == Some(&coerced))
                }
                None => true,
            }
        }
        Some("array") => value.is_array(),
        Some("date") => parse_date(value).is_some(),
        // boolean, plus unknown types which share its tolerance
        _ => matches!(value, Value::Bool(_) | Value::String(_) | Value::Number(_)),
    }
}
