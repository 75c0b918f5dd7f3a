//! Per-collection request queue: serializes remote operations, dispatches
//! them one at a time, and folds responses back into local state.

mod error;
mod operation;
mod request_queue;

pub use error::QueueError;
pub use operation::{
    EffectKind, OperationKind, RemoteOperation, UpdateEffect, VectorRm, REMOVE_TAG,
};
pub use request_queue::{RequestQueue, ResponseHandle};
