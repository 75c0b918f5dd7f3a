use thiserror::Error;

use crate::diff::DiffError;
use crate::object_id::ConfigurationError;
use crate::query::QueryError;
use crate::queue::QueueError;
use crate::realtime::RealtimeError;
use crate::schema::{SchemaError, ValidationResult};
use crate::storage::StorageError;
use crate::transport::TransportError;

/// Top-level error surface of the synchronization client.
///
/// Failures stay local to their collection: a queue error for one collection
/// never halts another's, and realtime desync never halts the HTTP queues.
/// The only fatal condition is missing identity configuration at startup.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("unknown collection `{0}`")]
    UnknownCollection(String),

    /// Schema mismatch: reported to the caller, never sent to the server
    #[error("entity failed `{collection}` schema validation")]
    Validation {
        collection: String,
        result: ValidationResult,
    },

    #[error(transparent)]
    Diff(#[from] DiffError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Realtime(#[from] RealtimeError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
