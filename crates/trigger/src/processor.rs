// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event processor
//!
//! Scans the event log for unprocessed entries, runs notification
//! fan-out for each, persists the results through the buffered
//! inserter, and stamps the event processed. An event whose
//! notifications fail to persist keeps its unprocessed mark and is
//! picked up again on the next pass.

use crate::error::TriggerError;
use crate::fanout::notifications_from_event;
use evg_db::{to_document, BufferedInsertOpts, BufferedInserter, Db, Filter, OpContext};
use evg_model::{notification, Clock, EventLog, Notification};
use serde_json::Value;
use std::time::Duration;
use tracing::{error, info};

pub struct EventProcessor<C: Clock> {
    db: Db,
    events: EventLog,
    clock: C,
}

impl<C: Clock> EventProcessor<C> {
    pub fn new(db: Db, clock: C) -> Self {
        let events = EventLog::new(db.clone());
        Self { db, events, clock }
    }

    /// One scan over the unprocessed backlog; returns how many events
    /// were fully handled
    pub async fn process_pending(&self, ctx: &OpContext) -> Result<usize, TriggerError> {
        let pending = self.events.unprocessed(ctx).await?;
        if pending.is_empty() {
            return Ok(0);
        }
        info!(count = pending.len(), "processing events");

        let inserter = BufferedInserter::new(
            self.db.clone(),
            notification::COLLECTION,
            BufferedInsertOpts::default(),
        );
        let mut handled = 0;
        for event in &pending {
            ctx.ensure_live()?;
            let notifications = match notifications_from_event(ctx, &self.db, event).await {
                Ok(notifications) => notifications,
                Err(err) => {
                    // Fan-out failures are permanent for this event
                    // (missing resource, bad payload); stamp it so it
                    // cannot poison the backlog
                    error!(event_id = %event.id, %err, "fan-out failed; skipping event");
                    self.events
                        .mark_processed(ctx, &event.id, self.clock.now())
                        .await?;
                    continue;
                }
            };

            match self.persist(ctx, &inserter, notifications).await {
                Ok(()) => {
                    self.events
                        .mark_processed(ctx, &event.id, self.clock.now())
                        .await?;
                    handled += 1;
                }
                Err(err) => {
                    // Insertion failures are retryable; leave the event
                    // unprocessed
                    error!(event_id = %event.id, %err, "notification insert failed");
                }
            }
        }
        inserter.close().await?;
        Ok(handled)
    }

    /// Insert the batch, skipping rows an earlier replay already wrote
    async fn persist(
        &self,
        ctx: &OpContext,
        inserter: &BufferedInserter,
        notifications: Vec<Notification>,
    ) -> Result<(), TriggerError> {
        if notifications.is_empty() {
            return Ok(());
        }
        let ids: Vec<Value> = notifications.iter().map(|n| Value::from(n.id.clone())).collect();
        let existing = self
            .db
            .find(ctx, notification::COLLECTION, &Filter::all().any_of("_id", ids))
            .await?;
        let existing: std::collections::HashSet<&str> = existing
            .iter()
            .filter_map(|doc| doc.get("_id").and_then(Value::as_str))
            .collect();

        for n in &notifications {
            if existing.contains(n.id.as_str()) {
                continue;
            }
            inserter.append(to_document(n).map_err(TriggerError::from)?).await?;
        }
        inserter.flush().await?;
        Ok(())
    }

    /// Poll the event log until the context is cancelled
    pub async fn run(&self, ctx: &OpContext, poll_interval: Duration) {
        let mut ticker = tokio::time::interval(poll_interval);
        loop {
            ticker.tick().await;
            if ctx.is_cancelled() {
                info!("event processor stopping");
                return;
            }
            if let Err(err) = self.process_pending(ctx).await {
                if ctx.is_cancelled() {
                    info!("event processor stopping");
                    return;
                }
                error!(%err, "event processing pass failed");
            }
        }
    }
}

#[cfg(test)]
#[path = "processor_tests.rs"]
mod tests;
