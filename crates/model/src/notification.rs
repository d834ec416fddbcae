// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Notifications awaiting delivery
//!
//! A notification's id is the SHA-256 of the event id and the
//! subscription id, so replaying an event regenerates the same ids and
//! duplicate rows never reach the delivery workers.

use crate::error::ModelError;
use crate::subscription::Subscriber;
use chrono::{DateTime, Utc};
use evg_db::{from_document, Db, Filter, OpContext, Update};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

pub const COLLECTION: &str = "notifications";

/// Payload handed to a delivery worker, shaped for its channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum NotificationPayload {
    #[serde(rename = "evergreen-webhook")]
    Webhook { url: String, secret: String, body: Value },
    #[serde(rename = "email")]
    Email { recipients: Vec<String>, subject: String, body: String },
    #[serde(rename = "jira-issue")]
    JiraIssue {
        project: String,
        issue_type: String,
        summary: String,
        description: String,
        fields: BTreeMap<String, Value>,
    },
    #[serde(rename = "jira-comment")]
    JiraComment { issue_id: String, body: String },
    #[serde(rename = "slack")]
    Slack { target: String, msg: String },
    #[serde(rename = "github-pull-request")]
    GithubStatus {
        owner: String,
        repo: String,
        git_ref: String,
        context: String,
        state: String,
        description: String,
        url: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "_id")]
    pub id: String,
    pub subscriber: Subscriber,
    pub payload: NotificationPayload,
    #[serde(default)]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: String,
}

impl Notification {
    /// Build a notification with its deterministic id
    pub fn new(
        event_id: &str,
        subscription_id: &str,
        subscriber: Subscriber,
        payload: NotificationPayload,
    ) -> Self {
        Self {
            id: deterministic_id(event_id, subscription_id),
            subscriber,
            payload,
            sent_at: None,
            error: String::new(),
        }
    }

    /// Record a successful delivery
    pub async fn mark_sent(
        &mut self,
        ctx: &OpContext,
        db: &Db,
        at: DateTime<Utc>,
    ) -> Result<(), ModelError> {
        self.sent_at = Some(at);
        let update = Update::new().set(
            "sent_at",
            serde_json::to_value(at).map_err(evg_db::DbError::from)?,
        );
        db.update_one(ctx, COLLECTION, &Filter::by_id(&self.id), &update)
            .await?;
        Ok(())
    }

    /// Record a delivery failure
    pub async fn mark_error(
        &mut self,
        ctx: &OpContext,
        db: &Db,
        message: impl Into<String>,
    ) -> Result<(), ModelError> {
        self.error = message.into();
        let update = Update::new().set("error", self.error.clone());
        db.update_one(ctx, COLLECTION, &Filter::by_id(&self.id), &update)
            .await?;
        Ok(())
    }
}

/// SHA-256 over the event and subscription ids, hex encoded
pub fn deterministic_id(event_id: &str, subscription_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(event_id.as_bytes());
    hasher.update(b"-");
    hasher.update(subscription_id.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub async fn find_one_id(
    ctx: &OpContext,
    db: &Db,
    id: &str,
) -> Result<Option<Notification>, ModelError> {
    match db.find_one(ctx, COLLECTION, &Filter::by_id(id)).await? {
        Some(doc) => Ok(Some(from_document(doc)?)),
        None => Ok(None),
    }
}

/// Notifications not yet picked up by a delivery worker
pub async fn find_unsent(ctx: &OpContext, db: &Db) -> Result<Vec<Notification>, ModelError> {
    let filter = Filter::all().eq("sent_at", Value::Null).eq("error", "");
    let docs = db.find(ctx, COLLECTION, &filter).await?;
    docs.into_iter()
        .map(|doc| from_document(doc).map_err(ModelError::from))
        .collect()
}

#[cfg(test)]
#[path = "notification_tests.rs"]
mod tests;
