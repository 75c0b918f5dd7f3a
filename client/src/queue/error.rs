use thiserror::Error;

use crate::queue::operation::OperationKind;
use crate::transport::TransportError;

/// Errors surfaced to a caller awaiting a queued remote operation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueueError {
    /// The transport failed; the collection status is `Error` and the queue
    /// will not advance past the failed operation on its own
    #[error("{kind} request against `{collection}` failed: {source}")]
    Transport {
        kind: OperationKind,
        collection: String,
        #[source]
        source: TransportError,
    },

    /// The operation was cleared from the queue before it was dispatched
    #[error("request dropped before dispatch")]
    Dropped,
}
