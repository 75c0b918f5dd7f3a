use serde_json::Value;
use thiserror::Error;

/// Errors that can occur while resolving a dotted field path into a JSON tree
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// A segment addressed a key or index that does not exist
    #[error("path segment `{segment}` not found while resolving `{path}`")]
    MissingSegment { path: String, segment: String },

    /// A segment tried to index into a value that is not a container
    #[error("path segment `{segment}` of `{path}` addresses a non-container value")]
    NotAContainer { path: String, segment: String },

    /// The terminal value was not an array where one was required
    #[error("`{path}` does not resolve to an array")]
    NotAnArray { path: String },
}

pub fn split(path: &str) -> Vec<&str> {
    path.split('.').filter(|s| !s.is_empty()).collect()
}

/// Resolve a dotted path to a value reference. Numeric segments index arrays.
pub fn get<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in split(path) {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

pub fn get_mut<'a>(root: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    let mut current = root;
    for segment in split(path) {
        current = match current {
            Value::Object(map) => map.get_mut(segment)?,
            Value::Array(items) => items.get_mut(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Write `value` at `path`, creating intermediate objects for missing keys.
/// Array segments must already exist; a dangling index is an error.
pub fn set(root: &mut Value, path: &str, value: Value) -> Result<(), PathError> {
    let segments = split(path);
    let Some((last, parents)) = segments.split_last() else {
        *root = value;
        return Ok(());
    };

    let mut current = root;
    for segment in parents {
        current = match current {
            Value::Object(map) => map
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Default::default())),
            Value::Array(items) => {
                let index =
                    segment
                        .parse::<usize>()
                        .map_err(|_| PathError::NotAContainer {
                            path: path.to_string(),
                            segment: segment.to_string(),
                        })?;
                items
                    .get_mut(index)
                    .ok_or_else(|| PathError::MissingSegment {
                        path: path.to_string(),
                        segment: segment.to_string(),
                    })?
            }
            _ => {
                return Err(PathError::NotAContainer {
                    path: path.to_string(),
                    segment: segment.to_string(),
                })
            }
        };
    }

    match current {
        Value::Object(map) => {
            map.insert(last.to_string(), value);
            Ok(())
        }
        Value::Array(items) => {
            let index = last.parse::<usize>().map_err(|_| PathError::NotAContainer {
                path: path.to_string(),
                segment: last.to_string(),
            })?;
            let slot = items.get_mut(index).ok_or_else(|| PathError::MissingSegment {
                path: path.to_string(),
                segment: last.to_string(),
            })?;
            *slot = value;
            Ok(())
        }
        _ => Err(PathError::NotAContainer {
            path: path.to_string(),
            segment: last.to_string(),
        }),
    }
}

/// Append to the array at `path`, creating the array when the key is absent.
pub fn push(root: &mut Value, path: &str, value: Value) -> Result<(), PathError> {
    let slot = ensure_array(root, path)?;
    slot.push(value);
    Ok(())
}

/// Remove a contiguous run of elements from the array at `path`.
pub fn splice(
    root: &mut Value,
    path: &str,
    index: usize,
    count: usize,
) -> Result<Vec<Value>, PathError> {
    let items = ensure_array(root, path)?;
    let end = (index + count).min(items.len());
    if index >= items.len() {
        return Ok(Vec::new());
    }
    Ok(items.drain(index..end).collect())
}

fn ensure_array<'a>(root: &'a mut Value, path: &str) -> Result<&'a mut Vec<Value>, PathError> {
    if get(root, path).is_none() {
        set(root, path, Value::Array(Vec::new()))?;
    }
    let slot = get_mut(root, path).ok_or_else(|| PathError::MissingSegment {
        path: path.to_string(),
        segment: path.to_string(),
    })?;
    slot.as_array_mut().ok_or_else(|| PathError::NotAnArray {
        path: path.to_string(),
    })
}
