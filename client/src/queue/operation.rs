use serde::Deserialize;
use serde_json::{json, Value};

use crate::transport::HttpMethod;

/// Path suffix that tags a nested-array element removal inside an update body.
pub const REMOVE_TAG: &str = "__remove__";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    List,
    Get,
    Search,
    Count,
    Add,
    Update,
    Remove,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OperationKind::List => "list",
            OperationKind::Get => "get",
            OperationKind::Search => "search",
            OperationKind::Count => "count",
            OperationKind::Add => "add",
            OperationKind::Update => "update",
            OperationKind::Remove => "remove",
        };
        f.write_str(name)
    }
}

/// A queued unit of work destined for the transport layer. Created by the
/// diff engine or the query executor, destroyed once its response is applied
/// or its error surfaced.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteOperation {
    /// Fetch the whole collection
    List,
    /// Fetch one entity by id
    Get { entity_id: String },
    /// Server-side query; the response is merged into local state
    Search {
        query: Value,
        limit: u64,
        skip: u64,
        sort: Value,
    },
    /// Authoritative result count for a query
    Count { query: Value },
    /// Create one entity; payload carries the locally-assigned id
    Add { entity: Value },
    /// Patch one field path of one entity
    Update {
        entity_id: String,
        path: String,
        value: Value,
    },
    /// Delete one entity by id
    Remove { entity_id: String },
}

impl RemoteOperation {
    pub fn kind(&self) -> OperationKind {
        match self {
            RemoteOperation::List => OperationKind::List,
            RemoteOperation::Get { .. } => OperationKind::Get,
            RemoteOperation::Search { .. } => OperationKind::Search,
            RemoteOperation::Count { .. } => OperationKind::Count,
            RemoteOperation::Add { .. } => OperationKind::Add,
            RemoteOperation::Update { .. } => OperationKind::Update,
            RemoteOperation::Remove { .. } => OperationKind::Remove,
        }
    }

    pub fn method(&self) -> HttpMethod {
        match self.kind() {
            OperationKind::List | OperationKind::Get => HttpMethod::Get,
            OperationKind::Search | OperationKind::Count => HttpMethod::Search,
            OperationKind::Add => HttpMethod::Post,
            OperationKind::Update => HttpMethod::Put,
            OperationKind::Remove => HttpMethod::Delete,
        }
    }

    /// Entity id for scalar-URL operations, `None` for root operations.
    pub fn entity_id(&self) -> Option<&str> {
        match self {
            RemoteOperation::Get { entity_id }
            | RemoteOperation::Update { entity_id, .. }
            | RemoteOperation::Remove { entity_id } => Some(entity_id),
            _ => None,
        }
    }

    pub fn body(&self) -> Option<Value> {
        match self {
            RemoteOperation::Search {
                query,
                limit,
                skip,
                sort,
            } => Some(json!({
                "query": query,
                "limit": limit,
                "skip": skip,
                "sort": sort,
            })),
            RemoteOperation::Count { query } => Some(json!({ "query": query })),
            RemoteOperation::Add { entity } => Some(entity.clone()),
            RemoteOperation::Update { path, value, .. } => Some(json!({
                "path": path,
                "value": value,
            })),
            _ => None,
        }
    }
}

/// Server-computed side effect folded back out of an update response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UpdateEffect {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: EffectKind,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum EffectKind {
    #[serde(rename = "scalar")]
    Scalar,
    #[serde(rename = "scalar-increment")]
    ScalarIncrement,
    #[serde(rename = "vector-add")]
    VectorAdd,
    #[serde(rename = "vector-rm")]
    VectorRm,
}

/// Operand of a `vector-rm` effect: a contiguous run to remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct VectorRm {
    pub index: usize,
    #[serde(rename = "numRemoved")]
    pub num_removed: usize,
}
