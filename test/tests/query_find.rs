//! Find/count orchestration: the server-confirms-superset split, the
//! search-once content hash, and the local-only fast path.

use futures::executor::block_on;
use serde_json::json;

use mooring_client::{HttpMethod, SortOrder, SortSpec, SortType, SyncClient};
use mooring_test::{test_config, MockTransport};

fn schema_client() -> SyncClient<MockTransport> {
    let mut client = SyncClient::new(test_config(), MockTransport::new()).unwrap();
    client
        .apply_schema(json!([
            {
                "name": "tasks",
                "properties": {
                    "name": {"__type": "string"},
                    "status": {"__type": "string"}
                }
            }
        ]))
        .unwrap();
    client
}

#[test]
fn remote_sourced_find_searches_counts_then_pages_locally() {
    let mut client = schema_client();
    let query = json!({"status": {"$eq": "open"}});

    // Local state already has one match; the server knows about another.
    client
        .service_mut("tasks")
        .unwrap()
        .collection_mut()
        .entities_mut()
        .push(
            mooring_client::Entity::from_value(json!({"id": "aa", "status": "open", "name": "b"}))
                .unwrap(),
        );

    client
        .transport()
        .respond_with(json!([{"id": "bb", "status": "open", "name": "a"}]));
    client.transport().respond_with(json!(2));

    let sort = SortSpec::new("name", SortType::String, SortOrder::Asc);
    let result = block_on(client.find("tasks", &query, 10, 0, Some(sort))).unwrap();

    // The SEARCH round-trips carried the query and the sort spec.
    let requests = client.transport().requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].method, HttpMethod::Search);
    assert_eq!(requests[0].url, "https://db.test/api/v1/tasks");
    let body = requests[0].body.as_ref().unwrap();
    assert_eq!(body["query"], query);
    assert_eq!(body["limit"], json!(10));
    assert_eq!(body["skip"], json!(0));
    assert_eq!(body["sort"], json!({"name": 1}));
    assert_eq!(requests[1].body.as_ref().unwrap(), &json!({"query": query}));

    // Merged superset, sorted locally, server count authoritative.
    assert_eq!(result.total, 2);
    assert_eq!(result.pages, 1);
    assert_eq!(result.entities.len(), 2);
    assert_eq!(result.entities[0]["id"], json!("bb"));
    assert_eq!(result.first().unwrap()["id"], json!("bb"));
}

#[test]
fn identical_query_skips_the_round_trip() {
    let mut client = schema_client();
    let query = json!({"status": {"$eq": "open"}});

    client.transport().respond_with(json!([]));
    client.transport().respond_with(json!(0));
    block_on(client.find("tasks", &query, 10, 0, None)).unwrap();
    assert_eq!(client.transport().request_count(), 2);

    block_on(client.find("tasks", &query, 10, 0, None)).unwrap();
    assert_eq!(
        client.transport().request_count(),
        2,
        "second identical query answers locally"
    );

    // A different query round-trips again.
    client.transport().respond_with(json!([]));
    client.transport().respond_with(json!(0));
    block_on(client.find("tasks", &json!({"status": {"$eq": "done"}}), 10, 0, None)).unwrap();
    assert_eq!(client.transport().request_count(), 4);
}

#[test]
fn local_only_collections_never_round_trip() {
    let mut client = schema_client();
    client.register_collection("drafts");
    client
        .service_mut("drafts")
        .unwrap()
        .collection_mut()
        .entities_mut()
        .push(mooring_client::Entity::from_value(json!({"id": "d1", "status": "open"})).unwrap());

    let result = block_on(client.find(
        "drafts",
        &json!({"status": {"$eq": "open"}}),
        0,
        0,
        None,
    ))
    .unwrap();

    assert_eq!(client.transport().request_count(), 0);
    assert_eq!(result.total, 1);
    assert_eq!(result.entities.len(), 1);
}

#[test]
fn get_entity_fetches_only_when_absent() {
    let mut client = schema_client();

    client
        .transport()
        .respond_with(json!({"id": "aa", "name": "fetched"}));
    let fetched = block_on(client.get_entity("tasks", "aa")).unwrap();
    assert_eq!(fetched["name"], json!("fetched"));
    assert_eq!(client.transport().request_count(), 1);
    assert_eq!(
        client.transport().requests()[0].url,
        "https://db.test/api/v1/tasks/aa"
    );

    // Present now, so no further round-trip; the cached copy is echo-marked
    // but the returned value is the entity itself.
    let cached = block_on(client.get_entity("tasks", "aa")).unwrap();
    assert_eq!(cached["name"], json!("fetched"));
    assert_eq!(client.transport().request_count(), 1);
}
