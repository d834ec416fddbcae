// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Admin configuration sections
//!
//! Each section is one document in the `admin` collection keyed by its
//! section id. Configuration is read at process start and on admin
//! updates; nothing here watches the collection.

use crate::error::ModelError;
use evg_db::{from_document, to_document, Db, Filter, OpContext, Update};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const COLLECTION: &str = "admin";

const UI_SECTION: &str = "ui";
const JIRA_NOTIFICATIONS_SECTION: &str = "jira_notifications";

/// Base URL for links rendered into notification payloads
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UiConfig {
    #[serde(default)]
    pub url: String,
}

impl UiConfig {
    pub async fn get(ctx: &OpContext, db: &Db) -> Result<Self, ModelError> {
        get_section(ctx, db, UI_SECTION).await
    }

    pub async fn set(&self, ctx: &OpContext, db: &Db) -> Result<(), ModelError> {
        set_section(ctx, db, UI_SECTION, self).await
    }
}

/// One templated Jira custom field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JiraCustomField {
    pub field: String,
    pub template: String,
}

/// Custom field templates for one Jira project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JiraProjectFields {
    pub project: String,
    pub fields: Vec<JiraCustomField>,
}

/// Operator-supplied custom field templates, keyed by Jira project
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JiraNotificationsConfig {
    #[serde(default)]
    pub custom_fields: Vec<JiraProjectFields>,
}

impl JiraNotificationsConfig {
    pub async fn get(ctx: &OpContext, db: &Db) -> Result<Self, ModelError> {
        get_section(ctx, db, JIRA_NOTIFICATIONS_SECTION).await
    }

    pub async fn set(&self, ctx: &OpContext, db: &Db) -> Result<(), ModelError> {
        set_section(ctx, db, JIRA_NOTIFICATIONS_SECTION, self).await
    }

    /// Flatten to `project → field → template`, rejecting duplicate
    /// project or field keys
    pub fn to_map(&self) -> Result<HashMap<String, HashMap<String, String>>, ModelError> {
        let mut out: HashMap<String, HashMap<String, String>> = HashMap::new();
        for project in &self.custom_fields {
            if out.contains_key(&project.project) {
                return Err(ModelError::Conflict(format!(
                    "duplicate project key '{}'",
                    project.project
                )));
            }
            let mut fields = HashMap::new();
            for custom in &project.fields {
                if fields.contains_key(&custom.field) {
                    return Err(ModelError::Conflict(format!(
                        "duplicate field key '{}' in project '{}'",
                        custom.field, project.project
                    )));
                }
                fields.insert(custom.field.clone(), custom.template.clone());
            }
            out.insert(project.project.clone(), fields);
        }
        Ok(out)
    }
}

async fn get_section<T: Default + serde::de::DeserializeOwned>(
    ctx: &OpContext,
    db: &Db,
    section: &str,
) -> Result<T, ModelError> {
    match db.find_one(ctx, COLLECTION, &Filter::by_id(section)).await? {
        Some(mut doc) => {
            // The section id is an addressing detail, not part of the
            // config shape
            if let Some(obj) = doc.as_object_mut() {
                obj.remove("_id");
            }
            Ok(from_document(doc)?)
        }
        None => Ok(T::default()),
    }
}

async fn set_section<T: Serialize>(
    ctx: &OpContext,
    db: &Db,
    section: &str,
    value: &T,
) -> Result<(), ModelError> {
    let doc = to_document(value)?;
    let update = doc
        .as_object()
        .map(|obj| {
            obj.iter()
                .fold(Update::new(), |u, (k, v)| u.set(k.clone(), v.clone()))
        })
        .unwrap_or_default();
    db.upsert(ctx, COLLECTION, &Filter::by_id(section), &update)
        .await?;
    Ok(())
}

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;
