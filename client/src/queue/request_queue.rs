use std::collections::VecDeque;

use futures::channel::oneshot;
use log::warn;
use serde_json::Value;

use crate::collection::{Collection, Entity};
use crate::queue::error::QueueError;
use crate::queue::operation::{EffectKind, RemoteOperation, UpdateEffect};
use crate::transport::{HttpRequest, HttpTransport, RequestContext};
use crate::types::CollectionStatus;

/// Caller's side of a queued operation; resolves once the operation's
/// response has been applied, or rejects with the dispatch failure.
pub struct ResponseHandle {
    rx: oneshot::Receiver<Result<Value, QueueError>>,
}

impl ResponseHandle {
    pub async fn response(self) -> Result<Value, QueueError> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(QueueError::Dropped),
        }
    }
}

struct Pending {
    op: RemoteOperation,
    tx: oneshot::Sender<Result<Value, QueueError>>,
}

/// Per-collection FIFO of remote operations.
///
/// Dispatch is strictly serial: `run` holds exclusive access to the queue and
/// its collection for the whole pump, so at most one operation is ever in
/// flight per collection. The add-response patch below relies on this.
pub struct RequestQueue {
    pending: VecDeque<Pending>,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Append an operation; dispatch happens on the next `run`.
    pub fn enqueue(&mut self, op: RemoteOperation) -> ResponseHandle {
        let (tx, rx) = oneshot::channel();
        self.pending.push_back(Pending { op, tx });
        ResponseHandle { rx }
    }

    /// Drop every queued-but-undispatched operation. Their handles resolve
    /// with [`QueueError::Dropped`]. Safe at any time: an operation already
    /// handed to the transport cannot be cancelled, but it is no longer in
    /// this queue either.
    pub fn clear_pending(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }

    /// Pump the queue until it is empty or an operation fails.
    ///
    /// On failure the collection status flips to `Error`, the caller's
    /// promise is rejected, and the queue stops without advancing; remaining
    /// operations stay queued for the owner to retry or clear.
    pub async fn run<T>(
        &mut self,
        collection: &mut Collection,
        ctx: &RequestContext,
        transport: &T,
    ) -> Result<(), QueueError>
    where
        T: HttpTransport + ?Sized,
    {
        while let Some(next) = self.pending.pop_front() {
            collection.set_status(CollectionStatus::Working);

            let request = build_request(&next.op, collection.route(), ctx);
            match transport.send(request).await {
                Ok(response) => {
                    apply_response(collection, &next.op, &response);
                    collection.set_status(CollectionStatus::Done);
                    let _ = next.tx.send(Ok(response));
                }
                Err(source) => {
                    collection.set_status(CollectionStatus::Error);
                    let error = QueueError::Transport {
                        kind: next.op.kind(),
                        collection: collection.route().to_string(),
                        source,
                    };
                    let _ = next.tx.send(Err(error.clone()));
                    return Err(error);
                }
            }
        }
        Ok(())
    }
}

impl Default for RequestQueue {
    fn default() -> Self {
        Self::new()
    }
}

fn build_request(op: &RemoteOperation, route: &str, ctx: &RequestContext) -> HttpRequest {
    let url = match op.entity_id() {
        Some(entity_id) => ctx.urls.scalar(route, entity_id),
        None => ctx.urls.vector(route),
    };
    HttpRequest {
        method: op.method(),
        url,
        params: ctx.params(),
        body: op.body(),
    }
}

/// Fold a completed response back into local state. Every mutation made here
/// is echo-marked before it lands, so the next diff observation suppresses it.
fn apply_response(collection: &mut Collection, op: &RemoteOperation, response: &Value) {
    match op {
        RemoteOperation::List => patch_list(collection, response),
        RemoteOperation::Get { .. } => patch_get(collection, response),
        RemoteOperation::Search { .. } => patch_search(collection, response),
        RemoteOperation::Add { .. } => patch_add(collection, response),
        RemoteOperation::Update {
            entity_id, path, ..
        } => patch_update(collection, entity_id, path, response),
        RemoteOperation::Count { .. } | RemoteOperation::Remove { .. } => {}
    }
}

fn patch_list(collection: &mut Collection, response: &Value) {
    let Some(items) = response.as_array() else {
        warn!(
            "list response for `{}` is not an array; ignoring",
            collection.route()
        );
        return;
    };
    let entities = items
        .iter()
        .filter_map(|item| {
            let entity = Entity::from_value(item.clone());
            if entity.is_none() {
                warn!(
                    "dropping non-object list item for `{}`",
                    collection.route()
                );
            }
            entity
        })
        .collect();
    collection.replace_all(entities);
}

fn patch_get(collection: &mut Collection, response: &Value) {
    let Some(mut entity) = Entity::from_value(response.clone()) else {
        warn!(
            "get response for `{}` is not an object; ignoring",
            collection.route()
        );
        return;
    };
    if let Some(id) = entity.id() {
        if collection.contains(id) {
            return;
        }
    }
    entity.mark_readonly();
    collection.push(entity);
}

fn patch_search(collection: &mut Collection, response: &Value) {
    let Some(items) = response.as_array() else {
        warn!(
            "search response for `{}` is not an array; ignoring",
            collection.route()
        );
        return;
    };
    for item in items {
        let Some(mut entity) = Entity::from_value(item.clone()) else {
            continue;
        };
        if let Some(id) = entity.id() {
            if collection.contains(id) {
                continue;
            }
        }
        entity.mark_readonly();
        collection.push(entity);
    }
}

/// Assign the server-returned id to the first entity still lacking one.
/// First-unassigned-wins is only safe because at most one add is in flight
/// per collection at a time.
fn patch_add(collection: &mut Collection, response: &Value) {
    let Some(id) = response.get("id").and_then(Value::as_str) else {
        warn!(
            "add response for `{}` carries no id; local entity left unassigned",
            collection.route()
        );
        return;
    };
    let id = id.to_string();
    // An id assigned locally before enqueue comes back as an echo; nothing to
    // patch, and no other unassigned entity may be claimed.
    if collection.contains(&id) {
        return;
    }
    if let Some(entity) = collection
        .entities_mut()
        .iter_mut()
        .find(|e| e.id().is_none())
    {
        entity.mark_readonly();
        entity.set_id(&id);
    }
}

/// Fold server-computed `vector-add` side effects back onto the nested
/// element that originated them, matching by missing id with a `name`
/// tie-break, and echo-marking before the id lands.
fn patch_update(collection: &mut Collection, entity_id: &str, _op_path: &str, response: &Value) {
    let Some(effects) = response.as_array() else {
        return;
    };

    for effect in effects {
        let Ok(effect) = serde_json::from_value::<UpdateEffect>(effect.clone()) else {
            continue;
        };
        if effect.kind != EffectKind::VectorAdd {
            continue;
        }
        let Some(new_id) = effect.value.get("id").and_then(Value::as_str) else {
            continue;
        };
        let new_id = new_id.to_string();
        let effect_name = effect.value.get("name").cloned();

        let Some(entity) = collection.find_mut(entity_id) else {
            warn!("update response targets unknown entity `{entity_id}`");
            continue;
        };

        let Some(base) = entity.get(&effect.path).and_then(Value::as_array) else {
            continue;
        };
        let slot = base.iter().position(|element| {
            if element.get("id").is_some() {
                return false;
            }
            match (element.get("name"), &effect_name) {
                (Some(element_name), Some(name)) => element_name == name,
                (Some(_), None) => false,
                (None, _) => true,
            }
        });

        if let Some(index) = slot {
            entity.mark_readonly();
            let id_path = format!("{}.{}.id", effect.path, index);
            if let Err(err) = entity.set(&id_path, Value::String(new_id)) {
                warn!("failed to assign nested element id at `{id_path}`: {err}");
            }
        }
    }
}
