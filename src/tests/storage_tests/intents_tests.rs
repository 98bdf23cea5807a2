// Intent Store Tests - Testing deep-link intents

use crate::storage::{IntentStore, OpenIntent};
use tempfile::TempDir;

#[test]
fn test_request_and_take() {
    let store = IntentStore::in_memory();
    assert!(store.take().expect("take").is_none());

    store
        .request(OpenIntent::Direct { user_id: 2 })
        .expect("request");
    store
        .request(OpenIntent::Group { conversation_id: 9 })
        .expect("request");

    // Latest request wins, and take consumes it
    assert_eq!(
        store.take().expect("take"),
        Some(OpenIntent::Group { conversation_id: 9 })
    );
    assert!(store.pending().is_none());
}

#[test]
fn test_restore_does_not_overwrite_newer_intent() {
    let store = IntentStore::in_memory();
    store
        .restore(OpenIntent::Direct { user_id: 2 })
        .expect("restore");
    assert_eq!(store.pending(), Some(OpenIntent::Direct { user_id: 2 }));

    store
        .restore(OpenIntent::Direct { user_id: 3 })
        .expect("restore");
    assert_eq!(store.pending(), Some(OpenIntent::Direct { user_id: 2 }));
}

#[test]
fn test_intent_survives_reload() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("intents").join("pending.json");

    {
        let store = IntentStore::with_path(&path).expect("open");
        store
            .request(OpenIntent::Group { conversation_id: 9 })
            .expect("request");
    }

    let reloaded = IntentStore::with_path(&path).expect("reopen");
    assert_eq!(
        reloaded.take().expect("take"),
        Some(OpenIntent::Group { conversation_id: 9 })
    );

    let after_take = IntentStore::with_path(&path).expect("reopen");
    assert!(after_take.pending().is_none());
}

#[test]
fn test_intent_serialization_shape() {
    let json = serde_json::to_value(OpenIntent::Direct { user_id: 2 }).expect("serialize");
    assert_eq!(json["kind"], "direct");
    assert_eq!(json["user_id"], 2);
}
