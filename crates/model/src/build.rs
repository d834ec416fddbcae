// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Build documents: a set of tasks sharing a variant and version

use crate::clock::zero_time;
use crate::error::ModelError;
use crate::task::{Task, TaskStatus};
use chrono::{DateTime, Utc};
use evg_db::{from_document, to_document, Db, Filter, OpContext, Update};
use serde::{Deserialize, Serialize};

pub const COLLECTION: &str = "builds";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum BuildStatus {
    #[default]
    #[serde(rename = "created")]
    Created,
    #[serde(rename = "started")]
    Started,
    #[serde(rename = "succeeded")]
    Succeeded,
    #[serde(rename = "failed")]
    Failed,
}

impl BuildStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStatus::Created => "created",
            BuildStatus::Started => "started",
            BuildStatus::Succeeded => "succeeded",
            BuildStatus::Failed => "failed",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, BuildStatus::Succeeded | BuildStatus::Failed)
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Snapshot of one task's status, embedded in the build for aggregate
/// reporting
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskCache {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub activated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Build {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub build_variant: String,
    /// Variant name as shown in the UI
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub revision: String,
    #[serde(default)]
    pub status: BuildStatus,
    #[serde(default)]
    pub tasks: Vec<TaskCache>,
    #[serde(default = "zero_time")]
    pub start_time: DateTime<Utc>,
    #[serde(default = "zero_time")]
    pub finish_time: DateTime<Utc>,
}

impl Default for Build {
    fn default() -> Self {
        Self::new(String::new())
    }
}

impl Build {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            build_variant: String::new(),
            display_name: String::new(),
            version: String::new(),
            project: String::new(),
            revision: String::new(),
            status: BuildStatus::Created,
            tasks: Vec::new(),
            start_time: zero_time(),
            finish_time: zero_time(),
        }
    }

    pub async fn insert(&self, ctx: &OpContext, db: &Db) -> Result<(), ModelError> {
        db.insert_one(ctx, COLLECTION, to_document(self)?).await?;
        Ok(())
    }

    /// Recompute this build's status from its task cache and persist
    /// the result. Called after a member task transitions.
    pub async fn update_status_from_tasks(
        &mut self,
        ctx: &OpContext,
        db: &Db,
    ) -> Result<BuildStatus, ModelError> {
        let status = roll_up_status(&self.tasks);
        if status != self.status {
            self.status = status;
            let update = Update::new().set("status", status.as_str());
            db.update_one(ctx, COLLECTION, &Filter::by_id(&self.id), &update)
                .await?;
        }
        Ok(status)
    }

    /// Refresh the cached status snapshot for one member task
    pub async fn set_cached_task_status(
        &mut self,
        ctx: &OpContext,
        db: &Db,
        task: &Task,
    ) -> Result<(), ModelError> {
        for cache in self.tasks.iter_mut() {
            if cache.id == task.id {
                cache.status = task.status;
                cache.activated = task.activated;
            }
        }
        let update = Update::new().set(
            "tasks",
            serde_json::to_value(&self.tasks).map_err(evg_db::DbError::from)?,
        );
        db.update_one(ctx, COLLECTION, &Filter::by_id(&self.id), &update)
            .await?;
        Ok(())
    }
}

/// Aggregate status of a build given its task snapshots
fn roll_up_status(tasks: &[TaskCache]) -> BuildStatus {
    if tasks.is_empty() {
        return BuildStatus::Created;
    }
    let activated = |cache: &&TaskCache| cache.activated;
    if tasks.iter().filter(activated).count() == 0 {
        return BuildStatus::Created;
    }
    let all_finished = tasks
        .iter()
        .filter(activated)
        .all(|cache| cache.status.is_finished());
    if all_finished {
        let any_failed = tasks.iter().any(|cache| {
            matches!(
                cache.status,
                TaskStatus::Failed | TaskStatus::SystemFailed | TaskStatus::SetupFailed
            )
        });
        if any_failed {
            return BuildStatus::Failed;
        }
        return BuildStatus::Succeeded;
    }
    let any_underway = tasks
        .iter()
        .any(|cache| cache.status != TaskStatus::Undispatched && cache.status != TaskStatus::Inactive);
    if any_underway {
        return BuildStatus::Started;
    }
    BuildStatus::Created
}

pub async fn find_one_id(
    ctx: &OpContext,
    db: &Db,
    id: &str,
) -> Result<Option<Build>, ModelError> {
    match db.find_one(ctx, COLLECTION, &Filter::by_id(id)).await? {
        Some(doc) => Ok(Some(from_document(doc)?)),
        None => Ok(None),
    }
}

#[cfg(test)]
#[path = "build_tests.rs"]
mod tests;
