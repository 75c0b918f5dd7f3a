//! Queue discipline: strict per-collection serialization, halt-on-error, and
//! the add-response id correlation.

use std::cell::RefCell;
use std::rc::Rc;

use futures::executor::block_on;
use serde_json::{json, Value};

use mooring_client::{
    ChangeDescriptor, ChangeDiffEngine, CollectionStatus, DataService, Entity, Fingerprint,
    HttpMethod, ObjectIdGenerator, QueueError, RequestContext, TransportError, UrlBuilder,
};
use mooring_test::MockTransport;

fn service(route: &str) -> DataService {
    let ids = Rc::new(RefCell::new(ObjectIdGenerator::new(Fingerprint::from_parts(
        0x0AB0BA, 0x0101, 0,
    ))));
    DataService::new(route, ChangeDiffEngine::new(ids, None))
}

fn ctx() -> RequestContext {
    RequestContext::new(UrlBuilder::new("https://db.test", None), "test-token")
}

#[test]
fn three_updates_dispatch_sequentially_never_overlapping() {
    let mut service = service("tasks");
    service
        .collection_mut()
        .entities_mut()
        .push(Entity::from_value(json!({"id": "aa", "a": 0, "b": 0, "c": 0})).unwrap());

    let transport = MockTransport::new();
    transport.respond_with(json!([]));
    transport.respond_with(json!([]));
    transport.respond_with(json!([]));

    let handles: Vec<_> = ["a", "b", "c"]
        .iter()
        .map(|field| {
            service
                .observe(&ChangeDescriptor::set(&format!("data.0.{field}"), json!(1)))
                .unwrap()
                .expect("field edit queues an update")
        })
        .collect();
    assert_eq!(service.pending(), 3);

    block_on(service.flush(&ctx(), &transport)).unwrap();

    assert_eq!(transport.request_count(), 3);
    assert_eq!(transport.max_in_flight(), 1, "dispatch must never overlap");
    for request in transport.requests() {
        assert_eq!(request.method, HttpMethod::Put);
        assert_eq!(request.url, "https://db.test/api/v1/tasks/aa");
        assert!(request.params.iter().any(|(k, _)| k == "urq"));
        assert!(request
            .params
            .iter()
            .any(|(k, v)| k == "token" && v == "test-token"));
    }

    // Requests went out in enqueue order.
    let paths: Vec<String> = transport
        .requests()
        .iter()
        .map(|r| r.body.as_ref().unwrap()["path"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(paths, vec!["a", "b", "c"]);

    for handle in handles {
        block_on(handle.response()).unwrap();
    }
    assert_eq!(service.collection().status(), CollectionStatus::Done);
}

#[test]
fn failure_halts_the_queue_without_implicit_advance() {
    let mut service = service("tasks");
    service
        .collection_mut()
        .entities_mut()
        .push(Entity::from_value(json!({"id": "aa"})).unwrap());

    let transport = MockTransport::new();
    transport.respond_with(json!([]));
    transport.fail_with(TransportError::Status { status: 500 });

    let first = service
        .observe(&ChangeDescriptor::set("data.0.a", json!(1)))
        .unwrap()
        .unwrap();
    let second = service
        .observe(&ChangeDescriptor::set("data.0.b", json!(2)))
        .unwrap()
        .unwrap();
    let third = service
        .observe(&ChangeDescriptor::set("data.0.c", json!(3)))
        .unwrap()
        .unwrap();

    let result = block_on(service.flush(&ctx(), &transport));
    assert!(result.is_err());

    assert_eq!(service.collection().status(), CollectionStatus::Error);
    assert_eq!(transport.request_count(), 2, "third op never dispatched");
    assert_eq!(service.pending(), 1, "failed op is not silently retried, queue holds the rest");

    block_on(first.response()).unwrap();
    match block_on(second.response()) {
        Err(QueueError::Transport {
            collection, source, ..
        }) => {
            assert_eq!(collection, "tasks");
            assert_eq!(source, TransportError::Status { status: 500 });
        }
        other => panic!("expected transport rejection, got {other:?}"),
    }

    // Clearing pending operations resolves their handles as dropped.
    assert_eq!(service.clear_pending(), 1);
    assert_eq!(block_on(third.response()), Err(QueueError::Dropped));
}

#[test]
fn add_roundtrip_assigns_id_before_enqueue_and_response_touches_nothing_else() {
    let mut service = service("tasks");

    let handle = service
        .insert(json!({"name": "fresh"}))
        .unwrap()
        .expect("insert queues an add");

    let local_id = service.collection().entities()[0]
        .id()
        .expect("id assigned synchronously before enqueue")
        .to_string();
    assert_eq!(local_id.len(), 24);

    // A second entity that has not been through the pipeline yet.
    service
        .collection_mut()
        .entities_mut()
        .push(Entity::from_value(json!({"name": "later"})).unwrap());

    let transport = MockTransport::new();
    transport.respond_with(json!({"id": local_id.clone()}));
    block_on(service.flush(&ctx(), &transport)).unwrap();

    // The add body carried the locally-assigned id.
    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, HttpMethod::Post);
    assert_eq!(
        requests[0].body.as_ref().unwrap()["id"],
        Value::String(local_id.clone())
    );

    block_on(handle.response()).unwrap();
    assert_eq!(service.collection().entities()[0].id(), Some(local_id.as_str()));
    assert_eq!(
        service.collection().entities()[1].id(),
        None,
        "the echoed add response must not claim another unassigned entity"
    );
}
