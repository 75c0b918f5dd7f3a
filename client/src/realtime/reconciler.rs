use std::collections::VecDeque;

use log::{debug, warn};
use serde_json::Value;

use crate::collection::{path, Collection, Entity};
use crate::queue::{EffectKind, UpdateEffect, VectorRm};
use crate::realtime::error::{RealtimeError, SequenceError};
use crate::realtime::event::{ActivityEvent, ActivityPayload, ActivityVerb};
use crate::realtime::path_spec;
use crate::types::SequenceNumber;

/// Connection lifecycle of the realtime stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    Synced,
    Desynced,
}

/// What the reconciler decided about one inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventDisposition {
    /// Intake is paused after a reconnect; held until resync drains it
    Buffered,
    /// Sequence continuity broke; the event was dropped and the connection
    /// is now desynced
    Rejected(SequenceError),
    /// The event originated from this client; cursor advanced, nothing to
    /// apply locally
    SelfEcho,
    /// Cursor advanced; the caller applies this payload to its collection
    Apply(ActivityPayload),
}

/// Tracks sequence continuity of the realtime stream and decides which
/// payloads get applied. The cursor must advance by exactly one per applied
/// event and never regresses; any other delta desyncs the connection until
/// the orchestrator explicitly resynchronizes.
pub struct RealtimeReconciler {
    user_id: Option<String>,
    cursor: Option<SequenceNumber>,
    state: ConnectionState,
    buffering: bool,
    buffer: VecDeque<ActivityEvent>,
}

impl RealtimeReconciler {
    pub fn new(user_id: Option<&str>) -> Self {
        Self {
            user_id: user_id.map(str::to_string),
            cursor: None,
            state: ConnectionState::Disconnected,
            buffering: false,
            buffer: VecDeque::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn cursor(&self) -> Option<SequenceNumber> {
        self.cursor
    }

    pub fn is_synced(&self) -> bool {
        self.state == ConnectionState::Synced
    }

    pub fn on_connected(&mut self) {
        if self.state == ConnectionState::Disconnected {
            self.state = ConnectionState::Connected;
        }
    }

    pub fn on_disconnected(&mut self) {
        self.state = ConnectionState::Disconnected;
    }

    /// A reconnect after an established connection pauses intake: events are
    /// buffered unapplied until the orchestrator reloads authoritative
    /// snapshots and calls [`begin_resync`](Self::begin_resync).
    pub fn on_reconnected(&mut self) {
        self.state = ConnectionState::Connected;
        self.buffering = true;
    }

    /// End paused intake. Resets the cursor for the new connection, marks the
    /// stream synced and hands back the buffered events in arrival order for
    /// the caller to replay through [`handle_event`](Self::handle_event).
    pub fn begin_resync(&mut self) -> Vec<ActivityEvent> {
        self.buffering = false;
        self.cursor = None;
        self.state = ConnectionState::Synced;
        self.buffer.drain(..).collect()
    }

    /// Sequence-check one inbound event and decide its fate. The cursor
    /// advances for self-echoes too: this client's own writes are already
    /// reflected by the optimistic local mutation.
    pub fn handle_event(&mut self, event: ActivityEvent) -> EventDisposition {
        if self.buffering {
            self.buffer.push_back(event);
            return EventDisposition::Buffered;
        }

        if let Some(last) = self.cursor {
            if event.sequence == last {
                self.state = ConnectionState::Desynced;
                return EventDisposition::Rejected(SequenceError::Duplicate {
                    sequence: event.sequence,
                    last,
                });
            }
            if event.sequence != last + 1 {
                self.state = ConnectionState::Desynced;
                return EventDisposition::Rejected(SequenceError::Mismatch {
                    sequence: event.sequence,
                    last,
                });
            }
        }

        self.cursor = Some(event.sequence);
        self.state = ConnectionState::Synced;

        let is_self = self
            .user_id
            .as_deref()
            .map(|user| user == event.data.user)
            .unwrap_or(false);
        if is_self {
            debug!("suppressing self-echo at sequence {}", event.sequence);
            EventDisposition::SelfEcho
        } else {
            EventDisposition::Apply(event.data)
        }
    }
}

/// Collection key a payload addresses: the first segment of its path.
pub fn payload_route(payload: &ActivityPayload) -> Option<String> {
    path_spec::route_segments(&payload.path).into_iter().next()
}

/// Apply one accepted payload to its collection. Every entity touched is
/// echo-marked before the mutation lands, so the observation channel's
/// report of it is suppressed instead of re-diffed.
pub fn apply_payload(
    payload: &ActivityPayload,
    collection: &mut Collection,
) -> Result<(), RealtimeError> {
    let segments = path_spec::route_segments(&payload.path);
    let spec_segments = path_spec::route_segments(&payload.path_spec);
    let params = path_spec::extract_params(&segments, &spec_segments);

    match payload.verb {
        ActivityVerb::Post => apply_post(&segments, &payload.response, collection),
        ActivityVerb::Put => apply_put(&segments, &payload.response, collection),
        ActivityVerb::Delete => {
            apply_delete(params.get("id").map(String::as_str), collection);
            Ok(())
        }
    }
}

/// `post`: idempotent append of each response entity.
fn apply_post(
    segments: &[String],
    response: &Value,
    collection: &mut Collection,
) -> Result<(), RealtimeError> {
    if segments.len() != 1 {
        return Ok(());
    }

    let single = std::slice::from_ref(response);
    let responses = response.as_array().map(Vec::as_slice).unwrap_or(single);
    for item in responses {
        let Some(mut entity) = Entity::from_value(item.clone()) else {
            warn!("dropping non-object post payload for `{}`", collection.route());
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
    Ok(())
}

/// `put`: apply each declared side effect to the addressed entity.
fn apply_put(
    segments: &[String],
    response: &Value,
    collection: &mut Collection,
) -> Result<(), RealtimeError> {
    if segments.len() != 2 {
        return Ok(());
    }
    let entity_id = segments[1].as_str();

    let single = std::slice::from_ref(response);
    let effects = response.as_array().map(Vec::as_slice).unwrap_or(single);
    for raw in effects {
        let Ok(effect) = serde_json::from_value::<UpdateEffect>(raw.clone()) else {
            warn!("skipping undecodable update effect for `{}`", collection.route());
            continue;
        };
        let Some(entity) = collection.find_mut(entity_id) else {
            debug!("put for unknown entity `{entity_id}`; ignoring");
            return Ok(());
        };

        entity.mark_readonly();
        match effect.kind {
            EffectKind::Scalar => {
                set_or_warn(entity.value_mut(), &effect.path, effect.value.clone());
            }
            EffectKind::ScalarIncrement => {
                let current = entity
                    .get(&effect.path)
                    .and_then(Value::as_f64)
                    .unwrap_or(0.0);
                let delta = effect.value.as_f64().unwrap_or(0.0);
                let next = serde_json::Number::from_f64(current + delta)
                    .map(Value::Number)
                    .unwrap_or(Value::Null);
                set_or_warn(entity.value_mut(), &effect.path, next);
            }
            EffectKind::VectorAdd => {
                if let Err(err) = path::push(entity.value_mut(), &effect.path, effect.value.clone())
                {
                    warn!("vector-add at `{}` failed: {err}", effect.path);
                }
            }
            EffectKind::VectorRm => {
                let Ok(run) = serde_json::from_value::<VectorRm>(effect.value.clone()) else {
                    warn!("vector-rm at `{}` carries no index/numRemoved", effect.path);
                    continue;
                };
                if let Err(err) =
                    path::splice(entity.value_mut(), &effect.path, run.index, run.num_removed)
                {
                    warn!("vector-rm at `{}` failed: {err}", effect.path);
                }
            }
        }
    }
    Ok(())
}

fn set_or_warn(root: &mut Value, field_path: &str, value: Value) {
    if let Err(err) = path::set(root, field_path, value) {
        warn!("scalar patch at `{field_path}` failed: {err}");
    }
}

/// `delete` with an entity id removes that entity; without one it is the
/// server's bulk wipe signal and clears the entire collection.
fn apply_delete(entity_id: Option<&str>, collection: &mut Collection) {
    match entity_id {
        Some(id) => {
            if let Some(index) = collection.index_of(id) {
                if let Some(entity) = collection.entities_mut().get_mut(index) {
                    entity.mark_readonly();
                }
                collection.remove(index);
            }
        }
        None => {
            collection.clear_marked();
        }
    }
}
