// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use evg_db::{Filter, MemoryStore, Update};
use evg_model::build::{self, Build, BuildStatus};
use evg_model::clock::zero_time;
use evg_model::event::{BuildEventData, EventData, EVENT_STATE_CHANGE};
use evg_model::subscription::{Selector, WebhookSubscriber, SELECTOR_ID};
use evg_model::{Subscriber, Subscription, UiConfig};

fn ctx() -> OpContext {
    OpContext::background()
}

fn build_event(status: BuildStatus) -> EventLogEntry {
    EventLogEntry {
        id: "event-1".to_string(),
        event_type: EVENT_STATE_CHANGE.to_string(),
        resource_id: "test".to_string(),
        timestamp: zero_time(),
        data: EventData::Build(BuildEventData { status }),
        processed_at: None,
    }
}

fn subscription(id: &str, trigger: &str) -> Subscription {
    Subscription {
        id: id.to_string(),
        resource_type: "BUILD".to_string(),
        trigger: trigger.to_string(),
        selectors: vec![Selector::new(SELECTOR_ID, "test")],
        subscriber: Subscriber::EvergreenWebhook(WebhookSubscriber {
            url: "http://example.com/2".to_string(),
            secret: "secret".to_string(),
        }),
        owner: "someone".to_string(),
        trigger_data: Default::default(),
    }
}

async fn seed(db: &Db) {
    let mut b = Build::new("test");
    b.build_variant = "testvariant".to_string();
    b.status = BuildStatus::Created;
    b.insert(&ctx(), db).await.unwrap();

    for (id, trigger) in [
        ("sub-outcome", "outcome"),
        ("sub-success", "success"),
        ("sub-failure", "failure"),
    ] {
        subscription(id, trigger).upsert(&ctx(), db).await.unwrap();
    }

    UiConfig { url: "https://ci.example.com".to_string() }
        .set(&ctx(), db)
        .await
        .unwrap();
}

async fn set_build_status(db: &Db, status: BuildStatus) {
    db.update_one(
        &ctx(),
        build::COLLECTION,
        &Filter::by_id("test"),
        &Update::new().set("status", status.as_str()),
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn build_lifecycle_fans_out_to_matching_triggers() {
    let db = MemoryStore::shared();
    seed(&db).await;

    // created: nothing fires
    let n = notifications_from_event(&ctx(), &db, &build_event(BuildStatus::Created))
        .await
        .unwrap();
    assert_eq!(n.len(), 0);

    // succeeded: outcome + success
    set_build_status(&db, BuildStatus::Succeeded).await;
    let n = notifications_from_event(&ctx(), &db, &build_event(BuildStatus::Succeeded))
        .await
        .unwrap();
    assert_eq!(n.len(), 2);

    // failed: outcome + failure
    set_build_status(&db, BuildStatus::Failed).await;
    let n = notifications_from_event(&ctx(), &db, &build_event(BuildStatus::Failed))
        .await
        .unwrap();
    assert_eq!(n.len(), 2);

    // event data wins over the stored build's status
    let n = notifications_from_event(&ctx(), &db, &build_event(BuildStatus::Created))
        .await
        .unwrap();
    assert_eq!(n.len(), 0);
}

#[tokio::test]
async fn notifications_are_deterministic_for_a_fixed_store() {
    let db = MemoryStore::shared();
    seed(&db).await;
    set_build_status(&db, BuildStatus::Failed).await;

    let first = notifications_from_event(&ctx(), &db, &build_event(BuildStatus::Failed))
        .await
        .unwrap();
    let second = notifications_from_event(&ctx(), &db, &build_event(BuildStatus::Failed))
        .await
        .unwrap();

    let mut first_ids: Vec<_> = first.iter().map(|n| n.id.clone()).collect();
    let mut second_ids: Vec<_> = second.iter().map(|n| n.id.clone()).collect();
    first_ids.sort();
    second_ids.sort();
    assert_eq!(first_ids, second_ids);
}

#[tokio::test]
async fn subscriptions_for_other_resources_do_not_fire() {
    let db = MemoryStore::shared();
    seed(&db).await;
    set_build_status(&db, BuildStatus::Failed).await;

    let mut other = subscription("sub-other-id", "outcome");
    other.selectors = vec![Selector::new(SELECTOR_ID, "not-test")];
    other.upsert(&ctx(), &db).await.unwrap();

    let n = notifications_from_event(&ctx(), &db, &build_event(BuildStatus::Failed))
        .await
        .unwrap();
    assert_eq!(n.len(), 2);
}

#[tokio::test]
async fn unregistered_triggers_are_skipped_with_a_warning() {
    let db = MemoryStore::shared();
    seed(&db).await;
    set_build_status(&db, BuildStatus::Failed).await;

    subscription("sub-bogus", "no-such-trigger")
        .upsert(&ctx(), &db)
        .await
        .unwrap();

    let n = notifications_from_event(&ctx(), &db, &build_event(BuildStatus::Failed))
        .await
        .unwrap();
    assert_eq!(n.len(), 2);
}

#[tokio::test]
async fn missing_resource_fails_fan_out() {
    let db = MemoryStore::shared();
    let err = notifications_from_event(&ctx(), &db, &build_event(BuildStatus::Failed))
        .await
        .unwrap_err();
    assert!(matches!(err, TriggerError::Model(_)));
}
