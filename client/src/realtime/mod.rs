//! Realtime reconciliation: consumes the server's ordered event stream,
//! guards sequence continuity, and folds accepted payloads into the same
//! local collections the request queue patches.

mod error;
mod event;
pub(crate) mod path_spec;
mod reconciler;

pub use error::{RealtimeError, SequenceError};
pub use event::{ActivityEvent, ActivityPayload, ActivityVerb, RealtimeMessage, DB_ACTIVITY};
pub use reconciler::{
    apply_payload, payload_route, ConnectionState, EventDisposition, RealtimeReconciler,
};
