// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subscription registry
//!
//! A subscription names a resource type, a trigger within that type,
//! a conjunctive set of selectors narrowing which events it applies
//! to, and the subscriber channel notifications go to.

use crate::error::ModelError;
use evg_db::{from_document, to_document, Db, Filter, OpContext, Update};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const COLLECTION: &str = "subscriptions";

pub const SELECTOR_ID: &str = "id";
pub const SELECTOR_OBJECT: &str = "object";
pub const SELECTOR_PROJECT: &str = "project";
pub const SELECTOR_OWNER: &str = "owner";
pub const SELECTOR_REQUESTER: &str = "requester";
pub const SELECTOR_IN_VERSION: &str = "in-version";
pub const SELECTOR_IN_BUILD: &str = "in-build";

/// One predicate over an event's resolved resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selector {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: String,
}

impl Selector {
    pub fn new(kind: impl Into<String>, data: impl Into<String>) -> Self {
        Self { kind: kind.into(), data: data.into() }
    }
}

/// Webhook destination with its signing secret
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookSubscriber {
    pub url: String,
    pub secret: String,
}

/// GitHub status destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GithubPullRequestSubscriber {
    pub owner: String,
    pub repo: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
}

/// Destination channel for notifications; the target shape follows
/// the type. Unknown types fail at deserialization, not at delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "target")]
pub enum Subscriber {
    #[serde(rename = "evergreen-webhook")]
    EvergreenWebhook(WebhookSubscriber),
    #[serde(rename = "email")]
    Email(String),
    #[serde(rename = "jira-issue")]
    JiraIssue(String),
    #[serde(rename = "jira-comment")]
    JiraComment(String),
    #[serde(rename = "slack")]
    Slack(String),
    #[serde(rename = "github-pull-request")]
    GithubPullRequest(GithubPullRequestSubscriber),
}

impl Subscriber {
    pub fn type_name(&self) -> &'static str {
        match self {
            Subscriber::EvergreenWebhook(_) => "evergreen-webhook",
            Subscriber::Email(_) => "email",
            Subscriber::JiraIssue(_) => "jira-issue",
            Subscriber::JiraComment(_) => "jira-comment",
            Subscriber::Slack(_) => "slack",
            Subscriber::GithubPullRequest(_) => "github-pull-request",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    #[serde(rename = "_id")]
    pub id: String,
    /// Resource type the trigger belongs to
    #[serde(rename = "type")]
    pub resource_type: String,
    pub trigger: String,
    pub selectors: Vec<Selector>,
    pub subscriber: Subscriber,
    #[serde(default)]
    pub owner: String,
    /// Free-form per-trigger parameters, e.g. the threshold for
    /// `exceeds-duration`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub trigger_data: BTreeMap<String, String>,
}

impl Subscription {
    /// Whether every selector matches the given attribute set
    pub fn matches(&self, attributes: &[Selector]) -> bool {
        self.selectors.iter().all(|s| attributes.contains(s))
    }

    /// Insert or update in place, keyed by id
    pub async fn upsert(&self, ctx: &OpContext, db: &Db) -> Result<(), ModelError> {
        let doc = to_document(self)?;
        let update = doc
            .as_object()
            .map(|obj| {
                obj.iter()
                    .filter(|(k, _)| k.as_str() != "_id")
                    .fold(Update::new(), |u, (k, v)| u.set(k.clone(), v.clone()))
            })
            .unwrap_or_default();
        db.upsert(ctx, COLLECTION, &Filter::by_id(&self.id), &update)
            .await?;
        Ok(())
    }

    pub async fn remove(&self, ctx: &OpContext, db: &Db) -> Result<(), ModelError> {
        let removed = db.delete_one(ctx, COLLECTION, &Filter::by_id(&self.id)).await?;
        if !removed {
            return Err(ModelError::not_found("subscription", self.id.clone()));
        }
        Ok(())
    }
}

/// Subscriptions of a resource type whose selectors all match the
/// event's attribute set
///
/// The store query narrows by type and selector overlap; the final
/// all-selectors check runs in memory.
pub async fn find_matching(
    ctx: &OpContext,
    db: &Db,
    resource_type: &str,
    attributes: &[Selector],
) -> Result<Vec<Subscription>, ModelError> {
    if attributes.is_empty() {
        return Ok(Vec::new());
    }
    let filter = Filter::all().eq("type", resource_type);
    let docs = db.find(ctx, COLLECTION, &filter).await?;
    let mut matching = Vec::new();
    for doc in docs {
        let sub: Subscription = from_document(doc)?;
        if overlaps(&sub, attributes) && sub.matches(attributes) {
            matching.push(sub);
        }
    }
    Ok(matching)
}

/// At least one subscription selector appears in the attribute set
fn overlaps(sub: &Subscription, attributes: &[Selector]) -> bool {
    sub.selectors.iter().any(|s| attributes.contains(s))
}

/// Remove every subscription owned by the given owner
pub async fn delete_by_owner(
    ctx: &OpContext,
    db: &Db,
    owner: &str,
) -> Result<u64, ModelError> {
    let filter = Filter::all().eq("owner", Value::from(owner));
    Ok(db.delete_many(ctx, COLLECTION, &filter).await?)
}

#[cfg(test)]
#[path = "subscription_tests.rs"]
mod tests;
