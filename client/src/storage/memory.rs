use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;

use crate::storage::{ObjectStore, StorageError};

struct Inner {
    initialised: bool,
    collections: HashMap<String, Vec<Value>>,
}

/// In-memory [`ObjectStore`], for tests and cache-less composition.
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                initialised: false,
                collections: HashMap::new(),
            }),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn item_id(item: &Value) -> Option<String> {
    item.get("id").and_then(Value::as_str).map(str::to_string)
}

#[async_trait(?Send)]
impl ObjectStore for MemoryStore {
    async fn init(
        &self,
        _name: &str,
        _version: u32,
        collections: &[String],
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.write().expect("memory store lock poisoned");
        if inner.initialised {
            return Err(StorageError::AlreadyInitialised);
        }
        inner.initialised = true;
        for collection in collections {
            inner.collections.entry(collection.clone()).or_default();
        }
        Ok(())
    }

    async fn read_all(&self, collection: &str) -> Result<Vec<Value>, StorageError> {
        let inner = self.inner.read().expect("memory store lock poisoned");
        if !inner.initialised {
            return Err(StorageError::NotInitialised);
        }
        inner
            .collections
            .get(collection)
            .cloned()
            .ok_or_else(|| StorageError::UnknownCollection(collection.to_string()))
    }

    async fn write(&self, collection: &str, item: Value) -> Result<(), StorageError> {
        let mut inner = self.inner.write().expect("memory store lock poisoned");
        if !inner.initialised {
            return Err(StorageError::NotInitialised);
        }
        let items = inner
            .collections
            .get_mut(collection)
            .ok_or_else(|| StorageError::UnknownCollection(collection.to_string()))?;
        match item_id(&item).and_then(|id| {
            items
                .iter()
                .position(|existing| item_id(existing) == Some(id.clone()))
        }) {
            Some(index) => items[index] = item,
            None => items.push(item),
        }
        Ok(())
    }

    async fn bulk_write(&self, collection: &str, items: Vec<Value>) -> Result<(), StorageError> {
        for item in items {
            self.write(collection, item).await?;
        }
        Ok(())
    }

    async fn clear(&self, collection: &str) -> Result<(), StorageError> {
        let mut inner = self.inner.write().expect("memory store lock poisoned");
        if !inner.initialised {
            return Err(StorageError::NotInitialised);
        }
        let items = inner
            .collections
            .get_mut(collection)
            .ok_or_else(|| StorageError::UnknownCollection(collection.to_string()))?;
        items.clear();
        Ok(())
    }
}
