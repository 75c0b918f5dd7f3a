//! Realtime reconciliation through the client: sequence discipline,
//! self-echo suppression, echo-marking of applied patches, bulk wipes, and
//! the reconnect/resync pause-buffer protocol.

use futures::executor::block_on;
use serde_json::{json, Value};

use mooring_client::{
    ChangeDescriptor, RealtimeOutcome, SequenceError, SyncClient,
};
use mooring_test::{test_config, MockTransport};

fn activity(sequence: u64, user: &str, verb: &str, path: &str, response: Value) -> Value {
    let root = path.split('/').next().unwrap();
    let path_spec = if path.contains('/') {
        format!("{root}/:id")
    } else {
        root.to_string()
    };
    json!({
        "type": "db-activity",
        "payload": {
            "sequence": sequence,
            "data": {
                "path": path,
                "pathSpec": path_spec,
                "verb": verb,
                "user": user,
                "response": response,
            }
        }
    })
}

fn client() -> SyncClient<MockTransport> {
    let mut client = SyncClient::new(test_config(), MockTransport::new()).unwrap();
    client.register_collection("tasks");
    client.realtime_connected();
    client
}

#[test]
fn sequence_discipline_duplicate_and_gap_signal_desync() {
    let mut client = client();

    let outcome = client
        .handle_realtime(activity(41, "other", "post", "tasks", json!({"id": "aa"})))
        .unwrap();
    assert_eq!(outcome, RealtimeOutcome::Applied);
    assert!(client.synced());

    let outcome = client
        .handle_realtime(activity(42, "other", "post", "tasks", json!({"id": "bb"})))
        .unwrap();
    assert_eq!(outcome, RealtimeOutcome::Applied);
    assert!(client.synced());

    let outcome = client
        .handle_realtime(activity(42, "other", "post", "tasks", json!({"id": "cc"})))
        .unwrap();
    assert_eq!(
        outcome,
        RealtimeOutcome::OutOfSequence(SequenceError::Duplicate { sequence: 42, last: 42 })
    );
    assert!(!client.synced());
    assert_eq!(client.collection("tasks").unwrap().len(), 2, "duplicate dropped");

    let outcome = client
        .handle_realtime(activity(44, "other", "post", "tasks", json!({"id": "dd"})))
        .unwrap();
    assert_eq!(
        outcome,
        RealtimeOutcome::OutOfSequence(SequenceError::Mismatch { sequence: 44, last: 42 })
    );
}

#[test]
fn self_originated_events_advance_cursor_without_applying() {
    let mut client = client();

    let outcome = client
        .handle_realtime(activity(1, "user-1", "post", "tasks", json!({"id": "mine"})))
        .unwrap();
    assert_eq!(outcome, RealtimeOutcome::SelfEcho);
    assert!(client.collection("tasks").unwrap().is_empty());

    // The cursor advanced: the next foreign event is in sequence.
    let outcome = client
        .handle_realtime(activity(2, "other", "post", "tasks", json!({"id": "theirs"})))
        .unwrap();
    assert_eq!(outcome, RealtimeOutcome::Applied);
}

#[test]
fn remote_put_does_not_feed_back_into_the_diff_engine() {
    let mut client = client();

    client
        .handle_realtime(activity(1, "other", "post", "tasks", json!({"id": "aa", "content": "old"})))
        .unwrap();

    // The post itself lands echo-marked; the wrapper reporting the insert
    // must not generate an add.
    let echoed = client
        .observe("tasks", &ChangeDescriptor::insert("data", 0, json!({"id": "aa"})))
        .unwrap();
    assert!(echoed.is_none());

    client
        .handle_realtime(activity(
            2,
            "other",
            "put",
            "tasks/aa",
            json!([{"path": "content", "type": "scalar", "value": "new"}]),
        ))
        .unwrap();

    let entity = client.collection("tasks").unwrap().find("aa").unwrap();
    assert_eq!(entity.get("content"), Some(&json!("new")));

    // The observation channel reports the same change back; it must be
    // suppressed, not re-diffed into a second update.
    let echoed = client
        .observe("tasks", &ChangeDescriptor::set("data.0.content", json!("new")))
        .unwrap();
    assert!(echoed.is_none());
    assert_eq!(client.service("tasks").unwrap().pending(), 0);

    // Exactly once: a genuine user edit afterwards is remote-worthy.
    let edited = client
        .observe("tasks", &ChangeDescriptor::set("data.0.content", json!("user")))
        .unwrap();
    assert!(edited.is_some());
}

#[test]
fn delete_without_entity_id_wipes_the_whole_collection() {
    let mut client = client();

    client
        .handle_realtime(activity(1, "other", "post", "tasks", json!([{"id": "aa"}, {"id": "bb"}])))
        .unwrap();
    assert_eq!(client.collection("tasks").unwrap().len(), 2);

    let outcome = client
        .handle_realtime(activity(2, "other", "delete", "tasks", Value::Null))
        .unwrap();
    assert_eq!(outcome, RealtimeOutcome::Applied);
    assert!(client.collection("tasks").unwrap().is_empty());
}

#[test]
fn delete_with_entity_id_removes_one_and_suppresses_the_echo() {
    let mut client = client();

    client
        .handle_realtime(activity(1, "other", "post", "tasks", json!([{"id": "aa"}, {"id": "bb"}])))
        .unwrap();

    client
        .handle_realtime(activity(2, "other", "delete", "tasks/aa", Value::Null))
        .unwrap();
    assert_eq!(client.collection("tasks").unwrap().len(), 1);

    // The wrapper reports the removal it observed; the echo mark the
    // reconciler left on the removed entity suppresses a remote delete.
    let echoed = client
        .observe(
            "tasks",
            &ChangeDescriptor::remove("data", 0, vec![json!({"id": "aa", "__readonly__": true})]),
        )
        .unwrap();
    assert!(echoed.is_none());
    assert_eq!(client.service("tasks").unwrap().pending(), 0);
}

#[test]
fn reconnect_buffers_events_until_explicit_resync() {
    let mut client = client();

    // Establish a loaded collection so resync reloads it.
    client
        .handle_realtime(activity(1, "other", "post", "tasks", json!({"id": "aa"})))
        .unwrap();
    client.service_mut("tasks").unwrap().collection_mut().set_loaded(true);

    client.realtime_reconnected();
    let outcome = client
        .handle_realtime(activity(1, "other", "post", "tasks", json!({"id": "bb"})))
        .unwrap();
    assert_eq!(outcome, RealtimeOutcome::Buffered);
    assert_eq!(client.collection("tasks").unwrap().len(), 1, "not applied while paused");

    // The authoritative snapshot the server hands back during resync.
    client
        .transport()
        .respond_with(json!([{"id": "aa"}, {"id": "zz"}]));
    block_on(client.resync()).unwrap();

    // Snapshot replaced local state, then the buffered event drained.
    let collection = client.collection("tasks").unwrap();
    assert_eq!(collection.len(), 3);
    assert!(collection.contains("zz"));
    assert!(collection.contains("bb"));
    assert!(client.synced());
}
