use thiserror::Error;

use crate::collection::PathError;

/// A break in realtime sequence continuity. Both cases flip the connection
/// to `Desynced`; the owning orchestrator decides whether to force a reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SequenceError {
    /// The event's sequence number was already applied
    #[error("duplicate realtime event: sequence {sequence} already applied")]
    Duplicate { sequence: u64, last: u64 },

    /// The event's sequence number is not the direct successor of the cursor
    #[error("realtime sequence mismatch: got {sequence}, cursor at {last}")]
    Mismatch { sequence: u64, last: u64 },
}

/// Errors while decoding or applying a realtime payload
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RealtimeError {
    #[error("malformed realtime event: {message}")]
    MalformedEvent { message: String },

    #[error("realtime patch failed at `{path}`: {source}")]
    Patch {
        path: String,
        #[source]
        source: PathError,
    },
}
