//! Persistent-store plumbing: init, bulk save, local seed, and clear.

use futures::executor::block_on;
use serde_json::json;

use mooring_client::{Entity, MemoryStore, ObjectStore, SyncClient};
use mooring_test::{test_config, MockTransport};

fn client() -> SyncClient<MockTransport> {
    let mut client = SyncClient::new(test_config(), MockTransport::new())
        .unwrap()
        .with_store(Box::new(MemoryStore::new()));
    client.register_collection("tasks");
    client.register_collection("notes");
    client
}

#[test]
fn save_then_reload_round_trips_collections() {
    block_on(async {
        let mut client = client();
        client.init_store().await.unwrap();

        client
            .service_mut("tasks")
            .unwrap()
            .collection_mut()
            .entities_mut()
            .push(Entity::from_value(json!({"id": "aa", "name": "keep", "__readonly__": true})).unwrap());
        client.save_collections().await.unwrap();

        // Wipe local state, then seed it back from the store.
        client
            .service_mut("tasks")
            .unwrap()
            .collection_mut()
            .entities_mut()
            .clear();
        client.load_local_collections().await.unwrap();

        let collection = client.collection("tasks").unwrap();
        assert_eq!(collection.len(), 1);
        assert!(collection.loaded());
        let entity = collection.find("aa").unwrap();
        assert_eq!(entity.get("name"), Some(&json!("keep")));
        // Bookkeeping fields never reach the store.
        assert!(!entity.is_readonly());
    });
}

#[test]
fn clear_collections_empties_the_store() {
    block_on(async {
        let mut client = client();
        client.init_store().await.unwrap();

        client
            .service_mut("notes")
            .unwrap()
            .collection_mut()
            .entities_mut()
            .push(Entity::from_value(json!({"id": "n1"})).unwrap());
        client.save_collections().await.unwrap();
        client.clear_collections().await.unwrap();

        client.load_local_collections().await.unwrap();
        assert!(client.collection("notes").unwrap().is_empty());
    });
}

#[test]
fn standalone_store_contract() {
    block_on(async {
        let store = MemoryStore::new();
        store
            .init("app", 1, &["tasks".to_string()])
            .await
            .unwrap();
        store.write("tasks", json!({"id": "a", "v": 1})).await.unwrap();
        store
            .bulk_write("tasks", vec![json!({"id": "a", "v": 2}), json!({"id": "b"})])
            .await
            .unwrap();
        let all = store.read_all("tasks").await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0]["v"], json!(2));
    });
}
