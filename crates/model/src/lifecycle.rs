// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task lifecycle manager
//!
//! Drives the task state machine
//! (`undispatched → dispatched → started → finished`) against the
//! store, appending a state-change event for every transition. The
//! in-memory task handed in by the caller is kept in sync with what
//! was persisted.

use crate::build::{Build, BuildStatus};
use crate::clock::{is_zero_time, Clock};
use crate::error::ModelError;
use crate::event::{
    BuildEventData, EventData, EventLog, EventLogEntry, TaskEventData, EVENT_STATE_CHANGE,
};
use crate::id::IdGen;
use crate::task::{self, Task, TaskEndDetails, TaskStatus};
use chrono::{DateTime, Duration, Utc};
use evg_db::{to_document, Db, Filter, OpContext, Update};
use serde_json::Value;
use tracing::warn;

/// A started task can never have been running longer than this; used
/// to synthesize a missing start time at the end of a run.
const MAX_SYNTHETIC_RUNTIME_HOURS: i64 = 2;

pub struct TaskManager<C: Clock, I: IdGen> {
    db: Db,
    events: EventLog,
    clock: C,
    ids: I,
}

impl<C: Clock, I: IdGen> TaskManager<C, I> {
    pub fn new(db: Db, clock: C, ids: I) -> Self {
        let events = EventLog::new(db.clone());
        Self { db, events, clock, ids }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Move a task into the started state
    pub async fn mark_start(&self, ctx: &OpContext, task: &mut Task) -> Result<(), ModelError> {
        let now = self.clock.now();
        task.status = TaskStatus::Started;
        if is_zero_time(task.start_time) {
            task.start_time = now;
        }

        let update = Update::new()
            .set("status", task.status.as_str())
            .set("start_time", time_value(task.start_time)?);
        self.db
            .update_one(ctx, task::COLLECTION, &task::by_id(&task.id), &update)
            .await?;

        self.log_task_event(
            ctx,
            task,
            TaskEventData { status: TaskStatus::Started, ..Default::default() },
        )
        .await
    }

    /// Finish a task with the details the agent reported
    ///
    /// A task that was never marked started gets a synthetic start
    /// time: its create time, clamped to at most two hours before the
    /// finish time.
    pub async fn mark_end(
        &self,
        ctx: &OpContext,
        task: &mut Task,
        details: &TaskEndDetails,
    ) -> Result<(), ModelError> {
        let now = self.clock.now();
        if is_zero_time(task.start_time) {
            let earliest = now - Duration::hours(MAX_SYNTHETIC_RUNTIME_HOURS);
            task.start_time = task.create_time.max(earliest);
            warn!(
                task_id = %task.id,
                start_time = %task.start_time,
                "task finished without a recorded start time"
            );
        }
        task.finish_time = now;
        task.details = details.clone();
        task.status = details.finished_status();

        let update = Update::new()
            .set("status", task.status.as_str())
            .set("start_time", time_value(task.start_time)?)
            .set("finish_time", time_value(task.finish_time)?)
            .set(
                "details",
                serde_json::to_value(details).map_err(evg_db::DbError::from)?,
            );
        self.db
            .update_one(ctx, task::COLLECTION, &task::by_id(&task.id), &update)
            .await?;

        self.log_task_event(ctx, task, TaskEventData::from(details)).await
    }

    /// Copy the current execution into the archive collection and
    /// bump the live document's execution counter
    ///
    /// Each run archives the then-current execution, so repeated
    /// archives produce one row per `(original id, execution)`.
    pub async fn archive(&self, ctx: &OpContext, task: &mut Task) -> Result<(), ModelError> {
        let mut archived = task.clone();
        archived.id = format!("{}_{}", task.id, task.execution);
        archived.old_task_id = task.id.clone();
        self.db
            .insert_one(ctx, task::OLD_COLLECTION, to_document(&archived)?)
            .await?;

        self.db
            .update_one(
                ctx,
                task::COLLECTION,
                &task::by_id(&task.id),
                &Update::new().inc("execution", 1),
            )
            .await?;
        task.execution += 1;
        Ok(())
    }

    /// Set a task's priority
    ///
    /// A positive priority propagates through the transitive
    /// dependency closure, but only ever raises priorities there. A
    /// non-positive priority deactivates the task itself and leaves
    /// dependencies alone. Propagation is not atomic; readers may see
    /// it partially applied.
    pub async fn set_priority(
        &self,
        ctx: &OpContext,
        task: &mut Task,
        priority: i64,
        user: &str,
    ) -> Result<(), ModelError> {
        let dep_ids = crate::depend::transitive_dependency_ids(ctx, &self.db, task).await?;

        task.priority = priority;
        let mut update = Update::new().set("priority", priority);
        if priority <= 0 {
            task.activated = false;
            update = update.set("activated", false);
            warn!(task_id = %task.id, priority, user, "task disabled by priority");
        }
        self.db
            .update_one(ctx, task::COLLECTION, &task::by_id(&task.id), &update)
            .await?;

        if priority > 0 && !dep_ids.is_empty() {
            let filter = Filter::all()
                .any_of("_id", dep_ids.into_iter().map(Value::from).collect())
                .lt("priority", priority);
            self.db
                .update_many(
                    ctx,
                    task::COLLECTION,
                    &filter,
                    &Update::new().set("priority", priority),
                )
                .await?;
        }
        Ok(())
    }

    /// Flip a task's activation flag
    pub async fn set_activated(
        &self,
        ctx: &OpContext,
        task: &mut Task,
        activated: bool,
    ) -> Result<(), ModelError> {
        task.activated = activated;
        self.db
            .update_one(
                ctx,
                task::COLLECTION,
                &task::by_id(&task.id),
                &Update::new().set("activated", activated),
            )
            .await?;
        Ok(())
    }

    /// Stamp a scheduled time on every task that does not have one
    ///
    /// One bulk update; tasks whose scheduled time is already set are
    /// left untouched, so re-stamping with a later timestamp is a
    /// no-op for them.
    pub async fn set_tasks_scheduled_time(
        &self,
        ctx: &OpContext,
        tasks: &mut [Task],
        scheduled: DateTime<Utc>,
    ) -> Result<(), ModelError> {
        let ids: Vec<Value> = tasks.iter().map(|t| Value::from(t.id.clone())).collect();
        if ids.is_empty() {
            return Ok(());
        }
        let filter = Filter::all()
            .any_of("_id", ids)
            .eq("scheduled_time", time_value(crate::clock::zero_time())?);
        self.db
            .update_many(
                ctx,
                task::COLLECTION,
                &filter,
                &Update::new().set("scheduled_time", time_value(scheduled)?),
            )
            .await?;

        for t in tasks.iter_mut().filter(|t| is_zero_time(t.scheduled_time)) {
            t.scheduled_time = scheduled;
        }
        Ok(())
    }

    /// Refresh a build's cached snapshot for a task that just moved,
    /// recompute its aggregate status, and log a build state-change
    /// event when the status flips
    pub async fn update_build_status(
        &self,
        ctx: &OpContext,
        build: &mut Build,
        task: &Task,
    ) -> Result<BuildStatus, ModelError> {
        build.set_cached_task_status(ctx, &self.db, task).await?;
        let before = build.status;
        let status = build.update_status_from_tasks(ctx, &self.db).await?;
        if status != before {
            let entry = EventLogEntry {
                id: self.ids.next(),
                event_type: EVENT_STATE_CHANGE.to_string(),
                resource_id: build.id.clone(),
                timestamp: self.clock.now(),
                data: EventData::Build(BuildEventData { status }),
                processed_at: None,
            };
            self.events.append(ctx, &entry).await?;
        }
        Ok(status)
    }

    async fn log_task_event(
        &self,
        ctx: &OpContext,
        task: &Task,
        data: TaskEventData,
    ) -> Result<(), ModelError> {
        let entry = EventLogEntry {
            id: self.ids.next(),
            event_type: EVENT_STATE_CHANGE.to_string(),
            resource_id: task.id.clone(),
            timestamp: self.clock.now(),
            data: EventData::Task(data),
            processed_at: None,
        };
        self.events.append(ctx, &entry).await
    }
}

fn time_value(t: DateTime<Utc>) -> Result<Value, ModelError> {
    Ok(serde_json::to_value(t).map_err(evg_db::DbError::from)?)
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
