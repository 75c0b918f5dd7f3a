use serde_json::Value;

/// First path segment of every descriptor: the collection's data field.
pub const DATA_FIELD: &str = "data";

/// What happened at the descriptor's path.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// A value was written at the path
    Set { value: Value },
    /// An element was inserted into the array at the path
    Insert { index: usize, value: Value },
    /// Elements were removed from the array at the path. The binding wrapper
    /// reports one descriptor per removed element at the collection root;
    /// a multi-element batch inside a nested array is unrepresentable and is
    /// surfaced as an unsupported-diff error.
    Remove { index: usize, removed: Vec<Value> },
}

/// One detected local mutation, produced by the binding wrapper after the
/// collection has already been edited, and consumed within a single diff
/// cycle.
///
/// Paths are dot-separated. The first segment is always `data`; the second
/// addresses the entity, either as a live numeric index or as a `#`-prefixed
/// identity token (resolved against entity ids at emit time); the remaining
/// segments walk into the entity.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeDescriptor {
    pub path: String,
    pub mutation: Mutation,
}

impl ChangeDescriptor {
    pub fn set(path: &str, value: Value) -> Self {
        Self {
            path: path.to_string(),
            mutation: Mutation::Set { value },
        }
    }

    pub fn insert(path: &str, index: usize, value: Value) -> Self {
        Self {
            path: path.to_string(),
            mutation: Mutation::Insert { index, value },
        }
    }

    pub fn remove(path: &str, index: usize, removed: Vec<Value>) -> Self {
        Self {
            path: path.to_string(),
            mutation: Mutation::Remove { index, removed },
        }
    }
}
