// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn ctx() -> OpContext {
    OpContext::background()
}

#[tokio::test]
async fn insert_and_find_round_trip() {
    let store = MemoryStore::new();
    store
        .insert_one(&ctx(), "tasks", json!({"_id": "t1", "status": "undispatched"}))
        .await
        .unwrap();

    let found = store
        .find_one(&ctx(), "tasks", &Filter::by_id("t1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found["status"], "undispatched");

    let missing = store
        .find_one(&ctx(), "tasks", &Filter::by_id("t2"))
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn duplicate_id_is_rejected() {
    let store = MemoryStore::new();
    store
        .insert_one(&ctx(), "tasks", json!({"_id": "t1"}))
        .await
        .unwrap();
    let err = store
        .insert_one(&ctx(), "tasks", json!({"_id": "t1"}))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Duplicate(id) if id == "t1"));
}

#[tokio::test]
async fn insert_many_rejects_batch_on_duplicate() {
    let store = MemoryStore::new();
    store
        .insert_one(&ctx(), "tasks", json!({"_id": "t1"}))
        .await
        .unwrap();
    let err = store
        .insert_many(
            &ctx(),
            "tasks",
            vec![json!({"_id": "t2"}), json!({"_id": "t1"})],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Duplicate(_)));
    // Nothing from the failed batch landed
    assert_eq!(store.count(&ctx(), "tasks", &Filter::all()).await.unwrap(), 1);
}

#[tokio::test]
async fn find_preserves_insertion_order() {
    let store = MemoryStore::new();
    for id in ["a", "b", "c"] {
        store
            .insert_one(&ctx(), "tasks", json!({"_id": id, "status": "failed"}))
            .await
            .unwrap();
    }
    let docs = store
        .find(&ctx(), "tasks", &Filter::all().eq("status", "failed"))
        .await
        .unwrap();
    let ids: Vec<_> = docs.iter().map(|d| d["_id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn update_one_touches_first_match_only() {
    let store = MemoryStore::new();
    for id in ["a", "b"] {
        store
            .insert_one(&ctx(), "tasks", json!({"_id": id, "status": "undispatched"}))
            .await
            .unwrap();
    }
    let result = store
        .update_one(
            &ctx(),
            "tasks",
            &Filter::all().eq("status", "undispatched"),
            &Update::new().set("status", "dispatched"),
        )
        .await
        .unwrap();
    assert_eq!(result, UpdateResult { matched: 1, modified: 1, upserted: false });

    let dispatched = store
        .count(&ctx(), "tasks", &Filter::all().eq("status", "dispatched"))
        .await
        .unwrap();
    assert_eq!(dispatched, 1);
}

#[tokio::test]
async fn conditional_update_misses_when_filter_no_longer_applies() {
    let store = MemoryStore::new();
    store
        .insert_one(&ctx(), "tasks", json!({"_id": "t1", "status": "dispatched"}))
        .await
        .unwrap();
    let result = store
        .update_one(
            &ctx(),
            "tasks",
            &Filter::by_id("t1").eq("status", "undispatched"),
            &Update::new().set("status", "dispatched"),
        )
        .await
        .unwrap();
    assert_eq!(result.matched, 0);
}

#[tokio::test]
async fn update_many_covers_all_matches() {
    let store = MemoryStore::new();
    for (id, scheduled) in [("a", false), ("b", true), ("c", false)] {
        let mut doc = json!({"_id": id});
        if scheduled {
            doc["scheduled_time"] = json!("2020-01-01T00:00:00Z");
        }
        store.insert_one(&ctx(), "tasks", doc).await.unwrap();
    }
    let result = store
        .update_many(
            &ctx(),
            "tasks",
            &Filter::all().exists("scheduled_time", false),
            &Update::new().set("scheduled_time", "2021-01-01T00:00:00Z"),
        )
        .await
        .unwrap();
    assert_eq!(result.matched, 2);
}

#[tokio::test]
async fn upsert_inserts_from_equality_terms() {
    let store = MemoryStore::new();
    let result = store
        .upsert(
            &ctx(),
            "admin",
            &Filter::by_id("jira_notifications"),
            &Update::new().set("custom_fields", json!([])),
        )
        .await
        .unwrap();
    assert!(result.upserted);

    let doc = store
        .find_one(&ctx(), "admin", &Filter::by_id("jira_notifications"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(doc["_id"], "jira_notifications");
    assert_eq!(doc["custom_fields"], json!([]));

    // Second upsert updates in place
    let result = store
        .upsert(
            &ctx(),
            "admin",
            &Filter::by_id("jira_notifications"),
            &Update::new().set("custom_fields", json!([{"project": "EVG"}])),
        )
        .await
        .unwrap();
    assert!(!result.upserted);
    assert_eq!(result.matched, 1);
    assert_eq!(store.count(&ctx(), "admin", &Filter::all()).await.unwrap(), 1);
}

#[tokio::test]
async fn delete_one_and_many() {
    let store = MemoryStore::new();
    for id in ["a", "b", "c"] {
        store
            .insert_one(&ctx(), "subscriptions", json!({"_id": id, "owner": "me"}))
            .await
            .unwrap();
    }
    assert!(store
        .delete_one(&ctx(), "subscriptions", &Filter::by_id("b"))
        .await
        .unwrap());
    let removed = store
        .delete_many(&ctx(), "subscriptions", &Filter::all().eq("owner", "me"))
        .await
        .unwrap();
    assert_eq!(removed, 2);
    assert_eq!(
        store.count(&ctx(), "subscriptions", &Filter::all()).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn cancelled_context_stops_every_operation() {
    let store = MemoryStore::new();
    store
        .insert_one(&ctx(), "tasks", json!({"_id": "t1"}))
        .await
        .unwrap();

    let token = CancellationToken::new();
    token.cancel();
    let cancelled = OpContext::with_cancel(token);

    let err = store
        .find(&cancelled, "tasks", &Filter::all())
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Cancelled));

    let err = store
        .insert_one(&cancelled, "tasks", json!({"_id": "t2"}))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Cancelled));

    // No side effects from the cancelled insert
    assert_eq!(store.count(&ctx(), "tasks", &Filter::all()).await.unwrap(), 1);
}
