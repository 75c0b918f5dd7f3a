//! Persistent local cache contract. Direct-call and background-task backed
//! stores are two implementations of this one trait; which one a client gets
//! is decided at composition time, never by feature branching in the core.

mod error;
mod memory;

use async_trait::async_trait;
use serde_json::Value;

pub use error::StorageError;
pub use memory::MemoryStore;

/// Asynchronous key/value object store, keyed by entity `id` within named
/// collections.
#[async_trait(?Send)]
pub trait ObjectStore {
    /// Create or open the store and ensure every collection exists.
    async fn init(&self, name: &str, version: u32, collections: &[String])
        -> Result<(), StorageError>;

    async fn read_all(&self, collection: &str) -> Result<Vec<Value>, StorageError>;

    /// Insert or replace one item by its `id`.
    async fn write(&self, collection: &str, item: Value) -> Result<(), StorageError>;

    async fn bulk_write(&self, collection: &str, items: Vec<Value>) -> Result<(), StorageError>;

    async fn clear(&self, collection: &str) -> Result<(), StorageError>;
}
