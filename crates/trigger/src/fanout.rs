// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Notification fan-out
//!
//! Turns one logged event into the notifications owed to matching
//! subscriptions. Trigger failures are logged and skipped so one bad
//! subscription cannot starve the rest of the event's subscribers.

use crate::error::TriggerError;
use crate::handler;
use evg_db::{Db, OpContext};
use evg_model::event::EventLogEntry;
use evg_model::{subscription, Notification};
use std::collections::HashSet;
use tracing::{debug, error, warn};

/// Notifications owed for one event, deduplicated by their
/// deterministic `(event, subscription)` ids
pub async fn notifications_from_event(
    ctx: &OpContext,
    db: &Db,
    event: &EventLogEntry,
) -> Result<Vec<Notification>, TriggerError> {
    let resource_type = event.resource_type();
    let mut handler = handler::handler_for(resource_type)
        .ok_or_else(|| TriggerError::UnknownResourceType(resource_type.to_string()))?;

    handler.fetch(ctx, db, event).await?;

    let attributes = handler.selectors();
    let subscriptions =
        subscription::find_matching(ctx, db, resource_type, &attributes).await?;
    debug!(
        event_id = %event.id,
        candidates = subscriptions.len(),
        "evaluating subscriptions for event"
    );

    let mut seen: HashSet<String> = HashSet::new();
    let mut notifications = Vec::new();
    for sub in &subscriptions {
        if !handler.triggers().contains(&sub.trigger.as_str()) {
            warn!(
                subscription_id = %sub.id,
                trigger = %sub.trigger,
                resource_type,
                "subscription names an unregistered trigger"
            );
            continue;
        }
        match handler.process(ctx, db, sub).await {
            Ok(Some(notification)) => {
                if seen.insert(notification.id.clone()) {
                    notifications.push(notification);
                }
            }
            Ok(None) => {}
            Err(err) => {
                error!(
                    event_id = %event.id,
                    subscription_id = %sub.id,
                    trigger = %sub.trigger,
                    %err,
                    "trigger evaluation failed"
                );
            }
        }
    }

    Ok(notifications)
}

#[cfg(test)]
#[path = "fanout_tests.rs"]
mod tests;
