// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task document and status model
//!
//! A task is the smallest schedulable unit of work. Documents live in
//! the `tasks` collection; archived executions of retried tasks move to
//! `old_tasks` with suffixed ids.

use crate::clock::zero_time;
use crate::error::ModelError;
use crate::testresult::{self, TestResult};
use chrono::{DateTime, Duration, Utc};
use evg_db::{from_document, to_document, Db, Filter, OpContext};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

pub const COLLECTION: &str = "tasks";
pub const OLD_COLLECTION: &str = "old_tasks";

/// Dependency status requiring any finished state
pub const ALL_STATUSES: &str = "*";
/// Dependency status requiring success (also the default for `""`)
pub const DEP_SUCCESS: &str = "success";
/// Dependency status requiring failure
pub const DEP_FAILED: &str = "failed";

/// Task state machine states, stored as strings in documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TaskStatus {
    #[default]
    #[serde(rename = "undispatched")]
    Undispatched,
    #[serde(rename = "dispatched")]
    Dispatched,
    #[serde(rename = "started")]
    Started,
    #[serde(rename = "succeeded")]
    Succeeded,
    #[serde(rename = "failed")]
    Failed,
    #[serde(rename = "system-failed")]
    SystemFailed,
    #[serde(rename = "setup-failed")]
    SetupFailed,
    #[serde(rename = "inactive")]
    Inactive,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Undispatched => "undispatched",
            TaskStatus::Dispatched => "dispatched",
            TaskStatus::Started => "started",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
            TaskStatus::SystemFailed => "system-failed",
            TaskStatus::SetupFailed => "setup-failed",
            TaskStatus::Inactive => "inactive",
        }
    }

    /// Whether the task has run to completion, successfully or not
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded
                | TaskStatus::Failed
                | TaskStatus::SystemFailed
                | TaskStatus::SetupFailed
        )
    }

    /// Every finished status, for `"*"` dependency filters
    pub fn finished() -> [TaskStatus; 4] {
        [
            TaskStatus::Succeeded,
            TaskStatus::Failed,
            TaskStatus::SystemFailed,
            TaskStatus::SetupFailed,
        ]
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a finished task ended, reported by the agent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEndDetails {
    /// The explicitly reported end status
    #[serde(default)]
    pub status: TaskStatus,
    /// Failure classification: `"system"`, `"setup"`, or `""`
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub timed_out: bool,
    #[serde(default)]
    pub description: String,
}

impl TaskEndDetails {
    /// The status a task ends in, given how it ended
    pub fn finished_status(&self) -> TaskStatus {
        match self.kind.as_str() {
            "system" => TaskStatus::SystemFailed,
            "setup" => TaskStatus::SetupFailed,
            _ if self.timed_out => TaskStatus::Failed,
            _ => self.status,
        }
    }
}

/// An edge in the dependency graph, by task id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub task_id: String,
    /// Required status: `"success"`, `"failed"`, `"*"`, or `""`
    /// (equivalent to `"success"`)
    #[serde(default)]
    pub status: String,
}

impl Dependency {
    pub fn new(task_id: impl Into<String>, status: impl Into<String>) -> Self {
        Self { task_id: task_id.into(), status: status.into() }
    }

    /// Whether a dependency task in the given status satisfies this edge
    pub fn is_satisfied_by(&self, status: TaskStatus) -> bool {
        match self.status.as_str() {
            ALL_STATUSES => status.is_finished(),
            DEP_FAILED => status == TaskStatus::Failed,
            _ => status == TaskStatus::Succeeded,
        }
    }
}

/// A single unit of work on one host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    #[serde(rename = "_id")]
    pub id: String,
    /// Set on archived documents: the id the task ran under
    #[serde(default)]
    pub old_task_id: String,
    /// Retry count; archived executions keep the value they ran with
    #[serde(default)]
    pub execution: i64,

    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub revision: String,
    #[serde(default)]
    pub build_variant: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub requester: String,
    #[serde(default)]
    pub build_id: String,
    #[serde(default)]
    pub version: String,
    /// Host the current execution is assigned to
    #[serde(default)]
    pub host_id: String,

    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub details: TaskEndDetails,
    #[serde(default)]
    pub activated: bool,
    /// Negative values disable the task
    #[serde(default)]
    pub priority: i64,

    #[serde(default)]
    pub depends_on: Vec<Dependency>,
    /// When set, every dependency predicate is considered met
    #[serde(default)]
    pub override_dependencies: bool,

    #[serde(default = "zero_time")]
    pub create_time: DateTime<Utc>,
    #[serde(default = "zero_time")]
    pub scheduled_time: DateTime<Utc>,
    #[serde(default = "zero_time")]
    pub dispatch_time: DateTime<Utc>,
    #[serde(default = "zero_time")]
    pub start_time: DateTime<Utc>,
    #[serde(default = "zero_time")]
    pub finish_time: DateTime<Utc>,

    /// Aggregate "display" task composed of execution tasks
    #[serde(default)]
    pub display_only: bool,
    #[serde(default)]
    pub execution_tasks: Vec<String>,

    /// Back-reference to the display task, resolved by lookup
    #[serde(skip)]
    pub display_task: Option<Box<Task>>,
    /// Test results merged in from the `testresults` collection
    #[serde(skip)]
    pub test_results: Vec<TestResult>,
}

impl Default for Task {
    fn default() -> Self {
        Self::new(String::new())
    }
}

impl Task {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            old_task_id: String::new(),
            execution: 0,
            project: String::new(),
            revision: String::new(),
            build_variant: String::new(),
            display_name: String::new(),
            requester: String::new(),
            build_id: String::new(),
            version: String::new(),
            host_id: String::new(),
            status: TaskStatus::Undispatched,
            details: TaskEndDetails::default(),
            activated: false,
            priority: 0,
            depends_on: Vec::new(),
            override_dependencies: false,
            create_time: zero_time(),
            scheduled_time: zero_time(),
            dispatch_time: zero_time(),
            start_time: zero_time(),
            finish_time: zero_time(),
            display_only: false,
            execution_tasks: Vec::new(),
            display_task: None,
            test_results: Vec::new(),
        }
    }

    pub async fn insert(&self, ctx: &OpContext, db: &Db) -> Result<(), ModelError> {
        db.insert_one(ctx, COLLECTION, to_document(self)?).await?;
        Ok(())
    }

    /// Failed tasks sharing this task's project, requester, display
    /// name and revision, on a different build variant
    pub async fn count_similar_failing_tasks(
        &self,
        ctx: &OpContext,
        db: &Db,
    ) -> Result<u64, ModelError> {
        let filter = Filter::all()
            .eq("project", self.project.clone())
            .eq("requester", self.requester.clone())
            .eq("display_name", self.display_name.clone())
            .eq("revision", self.revision.clone())
            .ne("build_variant", self.build_variant.clone())
            .ne("_id", self.id.clone())
            .eq("status", TaskStatus::Failed.as_str());
        Ok(db.count(ctx, COLLECTION, &filter).await?)
    }

    /// Test results for a display task, gathered from its execution
    /// tasks
    pub async fn test_results_for_display_task(
        &self,
        ctx: &OpContext,
        db: &Db,
    ) -> Result<Vec<TestResult>, ModelError> {
        if !self.display_only {
            return Err(ModelError::InvalidInput(format!(
                "task {} is not a display task",
                self.id
            )));
        }
        let ids: Vec<Value> = self.execution_tasks.iter().map(|id| Value::from(id.clone())).collect();
        testresult::find(ctx, db, &Filter::all().any_of("task_id", ids)).await
    }
}

/// Filter for a task by id
pub fn by_id(id: impl Into<String>) -> Filter {
    Filter::by_id(id)
}

/// Filter for tasks by any of the given ids
pub fn by_ids(ids: &[String]) -> Filter {
    Filter::all().any_of("_id", ids.iter().map(|id| Value::from(id.clone())).collect())
}

pub async fn find_one(
    ctx: &OpContext,
    db: &Db,
    filter: &Filter,
) -> Result<Option<Task>, ModelError> {
    match db.find_one(ctx, COLLECTION, filter).await? {
        Some(doc) => Ok(Some(from_document(doc)?)),
        None => Ok(None),
    }
}

pub async fn find(ctx: &OpContext, db: &Db, filter: &Filter) -> Result<Vec<Task>, ModelError> {
    let docs = db.find(ctx, COLLECTION, filter).await?;
    docs.into_iter()
        .map(|doc| from_document(doc).map_err(ModelError::from))
        .collect()
}

/// Archived executions of a task, oldest first
pub async fn find_old_tasks_by_id(
    ctx: &OpContext,
    db: &Db,
    id: &str,
) -> Result<Vec<Task>, ModelError> {
    let docs = db
        .find(ctx, OLD_COLLECTION, &Filter::all().eq("old_task_id", id))
        .await?;
    let mut tasks: Vec<Task> = docs
        .into_iter()
        .map(|doc| from_document(doc).map_err(ModelError::from))
        .collect::<Result<_, _>>()?;
    tasks.sort_by_key(|t| t.execution);
    Ok(tasks)
}

/// Resolve a task by `(id, execution)`, looking at the live document
/// first and falling back to the archive. Test results are merged in.
pub async fn find_one_id_old_or_new(
    ctx: &OpContext,
    db: &Db,
    id: &str,
    execution: i64,
) -> Result<Option<Task>, ModelError> {
    let task = match find_one(ctx, db, &by_id(id)).await? {
        Some(live) if live.execution == execution => Some(live),
        Some(_) | None => {
            let archived_id = format!("{}_{}", id, execution);
            match db.find_one(ctx, OLD_COLLECTION, &Filter::by_id(archived_id)).await? {
                Some(doc) => Some(from_document(doc)?),
                None => None,
            }
        }
    };
    match task {
        Some(mut task) => {
            merge_test_results(ctx, db, std::slice::from_mut(&mut task), None).await?;
            Ok(Some(task))
        }
        None => Ok(None),
    }
}

/// Attach `testresults` rows to each task by `(task id, execution)`,
/// matching archived tasks under the id they ran with
pub async fn merge_test_results(
    ctx: &OpContext,
    db: &Db,
    tasks: &mut [Task],
    status: Option<&str>,
) -> Result<(), ModelError> {
    let mut ids: Vec<Value> = Vec::new();
    for task in tasks.iter() {
        ids.push(Value::from(task.id.clone()));
        if !task.old_task_id.is_empty() {
            ids.push(Value::from(task.old_task_id.clone()));
        }
    }
    let mut filter = Filter::all().any_of("task_id", ids);
    if let Some(status) = status {
        filter = filter.eq("status", status);
    }
    let results = testresult::find(ctx, db, &filter).await?;

    for task in tasks.iter_mut() {
        task.test_results = results
            .iter()
            .filter(|r| {
                let id_matches = r.task_id == task.id
                    || (!task.old_task_id.is_empty() && r.task_id == task.old_task_id);
                id_matches && r.execution == task.execution
            })
            .cloned()
            .collect();
    }
    Ok(())
}

/// Aggregate result buckets for a set of tasks. Buckets are disjoint;
/// the most specific failure classification wins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResultCounts {
    pub total: usize,
    pub inactive: usize,
    pub unstarted: usize,
    pub started: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub system_failed: usize,
    pub system_unresponsive: usize,
    pub system_timed_out: usize,
    pub test_timed_out: usize,
    pub setup_failed: usize,
}

pub fn get_result_counts(tasks: &[Task]) -> ResultCounts {
    let mut counts = ResultCounts { total: tasks.len(), ..Default::default() };
    for task in tasks {
        match task.status {
            TaskStatus::Undispatched | TaskStatus::Inactive => {
                if task.activated {
                    counts.unstarted += 1;
                } else {
                    counts.inactive += 1;
                }
            }
            TaskStatus::Dispatched | TaskStatus::Started => counts.started += 1,
            TaskStatus::Succeeded => counts.succeeded += 1,
            TaskStatus::Failed | TaskStatus::SystemFailed | TaskStatus::SetupFailed => {
                match task.details.kind.as_str() {
                    "system" => {
                        if task.details.timed_out {
                            if task.details.description == "heartbeat" {
                                counts.system_unresponsive += 1;
                            } else {
                                counts.system_timed_out += 1;
                            }
                        } else {
                            counts.system_failed += 1;
                        }
                    }
                    "setup" => counts.setup_failed += 1,
                    _ if task.details.timed_out => counts.test_timed_out += 1,
                    _ => counts.failed += 1,
                }
            }
        }
    }
    counts
}

/// Per-event status counters, fed one transition at a time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskStatusCount {
    pub succeeded: usize,
    pub failed: usize,
    pub started: usize,
    pub undispatched: usize,
    pub inactive: usize,
    pub timed_out: usize,
}

impl TaskStatusCount {
    pub fn increment_status(&mut self, status: TaskStatus, details: &TaskEndDetails) {
        match status {
            TaskStatus::Succeeded => self.succeeded += 1,
            TaskStatus::Failed | TaskStatus::SetupFailed | TaskStatus::SystemFailed => {
                if details.timed_out && details.description == "heartbeat" {
                    self.timed_out += 1;
                } else {
                    self.failed += 1;
                }
            }
            TaskStatus::Started | TaskStatus::Dispatched => self.started += 1,
            TaskStatus::Undispatched => self.undispatched += 1,
            TaskStatus::Inactive => self.inactive += 1,
        }
    }
}

const DOC_FIELDS: [&str; 24] = [
    "_id",
    "old_task_id",
    "execution",
    "project",
    "revision",
    "build_variant",
    "display_name",
    "requester",
    "build_id",
    "version",
    "host_id",
    "status",
    "details",
    "activated",
    "priority",
    "depends_on",
    "override_dependencies",
    "create_time",
    "scheduled_time",
    "dispatch_time",
    "start_time",
    "finish_time",
    "display_only",
    "execution_tasks",
];

/// Mean difference between two timestamp fields, grouped by a third
/// field. Tasks whose fields do not parse as timestamps are skipped,
/// so non-time fields yield an empty map rather than an error.
pub async fn average_task_time_difference(
    ctx: &OpContext,
    db: &Db,
    field_a: &str,
    field_b: &str,
    group_by: &str,
    cutoff: DateTime<Utc>,
) -> Result<HashMap<String, Duration>, ModelError> {
    for field in [field_a, field_b, group_by] {
        if !DOC_FIELDS.contains(&field) {
            return Err(ModelError::InvalidInput(format!("unknown task field: {field}")));
        }
    }

    let cutoff = serde_json::to_value(cutoff).map_err(evg_db::DbError::from)?;
    let docs = db
        .find(ctx, COLLECTION, &Filter::all().gt(field_a, cutoff))
        .await?;

    let mut sums: HashMap<String, (i64, i64)> = HashMap::new();
    for doc in &docs {
        let (Some(a), Some(b)) = (parse_time(doc, field_a), parse_time(doc, field_b)) else {
            continue;
        };
        let Some(group) = evg_db::query::lookup(doc, group_by).and_then(Value::as_str) else {
            continue;
        };
        let entry = sums.entry(group.to_string()).or_insert((0, 0));
        entry.0 += (b - a).num_seconds();
        entry.1 += 1;
    }

    Ok(sums
        .into_iter()
        .map(|(group, (total, n))| (group, Duration::seconds(total / n)))
        .collect())
}

fn parse_time(doc: &Value, field: &str) -> Option<DateTime<Utc>> {
    let raw = evg_db::query::lookup(doc, field)?.as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
