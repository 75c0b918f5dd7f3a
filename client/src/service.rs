use log::warn;
use serde_json::{json, Value};

use crate::collection::{Collection, Entity};
use crate::diff::{ChangeDescriptor, ChangeDiffEngine, DiffError, DATA_FIELD};
use crate::queue::{QueueError, RemoteOperation, RequestQueue, ResponseHandle};
use crate::query::SortSpec;
use crate::transport::{HttpTransport, RequestContext};

/// One collection's synchronization pipeline: the collection itself, the
/// diff engine observing it, and the request queue feeding the transport.
pub struct DataService {
    collection: Collection,
    diff: ChangeDiffEngine,
    queue: RequestQueue,
}

impl DataService {
    pub fn new(route: &str, diff: ChangeDiffEngine) -> Self {
        Self {
            collection: Collection::new(route),
            diff,
            queue: RequestQueue::new(),
        }
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    pub fn collection_mut(&mut self) -> &mut Collection {
        &mut self.collection
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn clear_pending(&mut self) -> usize {
        self.queue.clear_pending()
    }

    /// Feed one change descriptor through the diff engine; remote-worthy
    /// mutations are queued and their response handle returned.
    pub fn observe(
        &mut self,
        change: &ChangeDescriptor,
    ) -> Result<Option<ResponseHandle>, DiffError> {
        match self.diff.observe(&mut self.collection, change)? {
            Some(op) => Ok(Some(self.queue.enqueue(op))),
            None => Ok(None),
        }
    }

    /// Queue a full-collection fetch.
    pub fn load(&mut self) -> ResponseHandle {
        self.queue.enqueue(RemoteOperation::List)
    }

    /// Queue a single-entity fetch; the response is appended if new.
    pub fn fetch_entity(&mut self, entity_id: &str) -> ResponseHandle {
        self.queue.enqueue(RemoteOperation::Get {
            entity_id: entity_id.to_string(),
        })
    }

    /// Queue a server-side search; new entities merge into the collection.
    pub fn search(
        &mut self,
        query: &Value,
        limit: u64,
        skip: u64,
        sort: Option<&SortSpec>,
    ) -> ResponseHandle {
        self.queue.enqueue(RemoteOperation::Search {
            query: query.clone(),
            limit,
            skip,
            sort: sort.map(SortSpec::to_wire).unwrap_or_else(|| json!({})),
        })
    }

    pub fn count(&mut self, query: &Value) -> ResponseHandle {
        self.queue.enqueue(RemoteOperation::Count {
            query: query.clone(),
        })
    }

    /// Insert an entity through the normal mutation pipeline, as if the
    /// binding wrapper had pushed it and reported the splice.
    pub fn insert(&mut self, entity: Value) -> Result<Option<ResponseHandle>, DiffError> {
        let Some(entity) = Entity::from_value(entity) else {
            warn!("refusing to insert non-object entity into `{}`", self.collection.route());
            return Ok(None);
        };
        let index = self.collection.len();
        let value = entity.value().clone();
        self.collection.push(entity);
        self.observe(&ChangeDescriptor::insert(DATA_FIELD, index, value))
    }

    /// Remove an entity by id through the normal mutation pipeline.
    pub fn remove(&mut self, entity_id: &str) -> Result<Option<ResponseHandle>, DiffError> {
        let Some(index) = self.collection.index_of(entity_id) else {
            return Ok(None);
        };
        let Some(removed) = self.collection.remove(index) else {
            return Ok(None);
        };
        self.observe(&ChangeDescriptor::remove(
            DATA_FIELD,
            index,
            vec![removed.into_value()],
        ))
    }

    /// Drive the queue until it drains or an operation fails.
    pub async fn flush<T>(
        &mut self,
        ctx: &RequestContext,
        transport: &T,
    ) -> Result<(), QueueError>
    where
        T: HttpTransport + ?Sized,
    {
        self.queue.run(&mut self.collection, ctx, transport).await
    }
}
