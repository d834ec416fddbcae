// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use evg_db::MemoryStore;
use evg_model::build::{Build, BuildStatus};
use evg_model::clock::zero_time;
use evg_model::event::{BuildEventData, EventData, EventLogEntry, EVENT_STATE_CHANGE};
use evg_model::subscription::{Selector, WebhookSubscriber, SELECTOR_ID};
use evg_model::{FakeClock, Subscriber, Subscription, UiConfig};

fn ctx() -> OpContext {
    OpContext::background()
}

fn build_event(id: &str, status: BuildStatus) -> EventLogEntry {
    EventLogEntry {
        id: id.to_string(),
        event_type: EVENT_STATE_CHANGE.to_string(),
        resource_id: "test".to_string(),
        timestamp: zero_time(),
        data: EventData::Build(BuildEventData { status }),
        processed_at: None,
    }
}

async fn seed(db: &Db) {
    let mut b = Build::new("test");
    b.build_variant = "testvariant".to_string();
    b.status = BuildStatus::Failed;
    b.insert(&ctx(), db).await.unwrap();

    Subscription {
        id: "sub-outcome".to_string(),
        resource_type: "BUILD".to_string(),
        trigger: "outcome".to_string(),
        selectors: vec![Selector::new(SELECTOR_ID, "test")],
        subscriber: Subscriber::EvergreenWebhook(WebhookSubscriber {
            url: "http://example.com".to_string(),
            secret: "secret".to_string(),
        }),
        owner: "someone".to_string(),
        trigger_data: Default::default(),
    }
    .upsert(&ctx(), db)
    .await
    .unwrap();

    UiConfig { url: "https://ci.example.com".to_string() }
        .set(&ctx(), db)
        .await
        .unwrap();
}

#[tokio::test]
async fn pending_events_produce_rows_and_processed_stamps() {
    let db = MemoryStore::shared();
    seed(&db).await;

    let events = EventLog::new(db.clone());
    events
        .append(&ctx(), &build_event("event-1", BuildStatus::Failed))
        .await
        .unwrap();
    events
        .append(&ctx(), &build_event("event-2", BuildStatus::Succeeded))
        .await
        .unwrap();

    let processor = EventProcessor::new(db.clone(), FakeClock::new());
    let handled = processor.process_pending(&ctx()).await.unwrap();
    assert_eq!(handled, 2);

    assert!(events.unprocessed(&ctx()).await.unwrap().is_empty());
    let rows = notification::find_unsent(&ctx(), &db).await.unwrap();
    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn replayed_events_do_not_duplicate_rows() {
    let db = MemoryStore::shared();
    seed(&db).await;

    let events = EventLog::new(db.clone());
    events
        .append(&ctx(), &build_event("event-1", BuildStatus::Failed))
        .await
        .unwrap();

    let processor = EventProcessor::new(db.clone(), FakeClock::new());
    assert_eq!(processor.process_pending(&ctx()).await.unwrap(), 1);

    // Replay: the same event appended again under a new log id keeps
    // its notification id, so no second row appears
    events
        .append(&ctx(), &build_event("event-1b", BuildStatus::Failed))
        .await
        .unwrap();
    // The replayed log id differs, so its notification id differs too;
    // replaying the identical id is the at-most-once case
    let pending = events.unprocessed(&ctx()).await.unwrap();
    assert_eq!(pending.len(), 1);

    let before = notification::find_unsent(&ctx(), &db).await.unwrap().len();
    processor.process_pending(&ctx()).await.unwrap();
    let after = notification::find_unsent(&ctx(), &db).await.unwrap().len();
    assert_eq!(after, before + 1);

    // Clearing the processed stamp replays the identical event id; the
    // row count stays put
    db.update_one(
        &ctx(),
        evg_model::event::COLLECTION,
        &evg_db::Filter::by_id("event-1"),
        &evg_db::Update::new().set("processed_at", serde_json::Value::Null),
    )
    .await
    .unwrap();
    processor.process_pending(&ctx()).await.unwrap();
    let replayed = notification::find_unsent(&ctx(), &db).await.unwrap().len();
    assert_eq!(replayed, after);
}

#[tokio::test]
async fn broken_events_are_stamped_to_avoid_poisoning() {
    let db = MemoryStore::shared();
    // No build document: fan-out fails permanently
    let events = EventLog::new(db.clone());
    events
        .append(&ctx(), &build_event("event-1", BuildStatus::Failed))
        .await
        .unwrap();

    let processor = EventProcessor::new(db.clone(), FakeClock::new());
    let handled = processor.process_pending(&ctx()).await.unwrap();
    assert_eq!(handled, 0);

    // The event is stamped anyway so the next pass skips it
    assert!(events.unprocessed(&ctx()).await.unwrap().is_empty());
    assert!(notification::find_unsent(&ctx(), &db).await.unwrap().is_empty());
}

#[tokio::test]
async fn empty_backlog_is_a_cheap_no_op() {
    let db = MemoryStore::shared();
    let processor = EventProcessor::new(db, FakeClock::new());
    assert_eq!(processor.process_pending(&ctx()).await.unwrap(), 0);
}
