// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only event log
//!
//! State transitions append here; nothing ever updates or deletes a
//! logged event except the processor stamping `processed_at`. Writes
//! are durable before the caller proceeds; events are never buffered.
//!
//! The `data` payload is polymorphic, tagged by its `resource_type`
//! field; deserialization consults the tag to pick the variant.

use crate::error::ModelError;
use crate::task::{TaskEndDetails, TaskStatus};
use chrono::{DateTime, Utc};
use evg_db::{from_document, to_document, Db, Filter, OpContext, Update};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const COLLECTION: &str = "event_log";

pub const RESOURCE_TYPE_TASK: &str = "TASK";
pub const RESOURCE_TYPE_BUILD: &str = "BUILD";
pub const RESOURCE_TYPE_HOST: &str = "HOST";

pub const EVENT_STATE_CHANGE: &str = "STATE_CHANGE";
pub const EVENT_EXPIRATION: &str = "EXPIRATION";

/// Payload carried by a task state change
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskEventData {
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub timed_out: bool,
    #[serde(default)]
    pub description: String,
}

impl From<&TaskEndDetails> for TaskEventData {
    fn from(details: &TaskEndDetails) -> Self {
        Self {
            status: details.finished_status(),
            kind: details.kind.clone(),
            timed_out: details.timed_out,
            description: details.description.clone(),
        }
    }
}

/// Payload carried by a build state change
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildEventData {
    #[serde(default)]
    pub status: crate::build::BuildStatus,
}

/// Payload carried by host events
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostEventData {
    #[serde(default)]
    pub status: String,
}

/// Event payload, discriminated by resource type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "resource_type")]
pub enum EventData {
    #[serde(rename = "TASK")]
    Task(TaskEventData),
    #[serde(rename = "BUILD")]
    Build(BuildEventData),
    #[serde(rename = "HOST")]
    Host(HostEventData),
}

impl EventData {
    pub fn resource_type(&self) -> &'static str {
        match self {
            EventData::Task(_) => RESOURCE_TYPE_TASK,
            EventData::Build(_) => RESOURCE_TYPE_BUILD,
            EventData::Host(_) => RESOURCE_TYPE_HOST,
        }
    }
}

/// One logged event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    #[serde(rename = "_id")]
    pub id: String,
    pub event_type: String,
    pub resource_id: String,
    pub timestamp: DateTime<Utc>,
    pub data: EventData,
    /// Stamped once notification fan-out handled the event
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
}

impl EventLogEntry {
    pub fn resource_type(&self) -> &'static str {
        self.data.resource_type()
    }
}

/// Writer/reader handle over the `event_log` collection
#[derive(Clone)]
pub struct EventLog {
    db: Db,
}

impl EventLog {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Append one event; durable when this returns
    pub async fn append(&self, ctx: &OpContext, entry: &EventLogEntry) -> Result<(), ModelError> {
        self.db.insert_one(ctx, COLLECTION, to_document(entry)?).await?;
        Ok(())
    }

    /// Events for one resource, in append order
    pub async fn by_resource(
        &self,
        ctx: &OpContext,
        resource_id: &str,
    ) -> Result<Vec<EventLogEntry>, ModelError> {
        let filter = Filter::all().eq("resource_id", resource_id);
        self.find(ctx, &filter).await
    }

    /// Events not yet handled by the notification processor
    pub async fn unprocessed(&self, ctx: &OpContext) -> Result<Vec<EventLogEntry>, ModelError> {
        let filter = Filter::all().eq("processed_at", Value::Null);
        self.find(ctx, &filter).await
    }

    /// Stamp an event as handled
    pub async fn mark_processed(
        &self,
        ctx: &OpContext,
        event_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), ModelError> {
        let update = Update::new().set(
            "processed_at",
            serde_json::to_value(at).map_err(evg_db::DbError::from)?,
        );
        let result = self
            .db
            .update_one(ctx, COLLECTION, &Filter::by_id(event_id), &update)
            .await?;
        if result.matched == 0 {
            return Err(ModelError::not_found("event", event_id));
        }
        Ok(())
    }

    async fn find(
        &self,
        ctx: &OpContext,
        filter: &Filter,
    ) -> Result<Vec<EventLogEntry>, ModelError> {
        let docs = self.db.find(ctx, COLLECTION, filter).await?;
        docs.into_iter()
            .map(|doc| from_document(doc).map_err(ModelError::from))
            .collect()
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
