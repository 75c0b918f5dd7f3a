//! # Mooring Client
//! Keeps reactive in-memory collections synchronized with a remote document
//! store reachable over REST and a realtime event stream.
//!
//! The core detects fine-grained local mutations and translates them into a
//! minimal queue of remote operations, dispatched strictly one at a time per
//! collection. In parallel it reconciles server-pushed events (including
//! out-of-order and duplicate delivery) back into the same local state
//! without re-diffing its own patches.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

mod client;
mod collection;
mod diff;
mod error;
mod object_id;
mod query;
mod queue;
mod realtime;
mod schema;
mod service;
mod storage;
mod transport;
mod types;

pub use client::{ClientConfig, LoadConfig, LoadProgress, RealtimeOutcome, SyncClient};
pub use collection::{Collection, Entity, PathError, READONLY_MARKER};
pub use diff::{ChangeDescriptor, ChangeDiffEngine, DiffError, Mutation, DATA_FIELD};
pub use error::ClientError;
pub use object_id::{ConfigurationError, Fingerprint, ObjectIdGenerator};
pub use query::{
    evaluate, FindResult, LocalQueryExecutor, QueryError, SortOrder, SortSpec, SortType,
};
pub use queue::{
    EffectKind, OperationKind, QueueError, RemoteOperation, RequestQueue, ResponseHandle,
    UpdateEffect, VectorRm, REMOVE_TAG,
};
pub use realtime::{
    apply_payload, payload_route, ActivityEvent, ActivityPayload, ActivityVerb, ConnectionState,
    EventDisposition, RealtimeError, RealtimeMessage, RealtimeReconciler, SequenceError,
    DB_ACTIVITY,
};
pub use schema::{SchemaError, SchemaRegistry, ValidationResult};
pub use service::DataService;
pub use storage::{MemoryStore, ObjectStore, StorageError};
pub use transport::{
    HttpMethod, HttpRequest, HttpTransport, RequestContext, TransportError, UrlBuilder,
};
pub use types::{CollectionStatus, SequenceNumber};
