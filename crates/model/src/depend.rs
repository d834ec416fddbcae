// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dependency resolution over the task graph
//!
//! Two evaluation modes share the predicate logic:
//!
//! - [`Task::dependencies_met`] trusts a caller-owned cache and fetches
//!   whatever is missing from the store. The cache is a hint: stale
//!   entries are believed without re-fetching, which lets batch
//!   planners evaluate many tasks against one pre-loaded snapshot.
//! - [`Task::all_dependencies_satisfied`] is the pure in-memory
//!   variant. It never touches the store and refuses an empty cache
//!   when there are dependencies to check.
//!
//! [`Task::blocked_state`] walks the graph transitively and classifies
//! a task as blocked (an upstream finished in an unsatisfiable state),
//! pending (an upstream has not finished), or unblocked.

use crate::error::ModelError;
use crate::task::{self, Task, TaskStatus};
use evg_db::{Db, Filter, OpContext};
use std::collections::{HashMap, HashSet};

/// Caller-owned snapshot of tasks keyed by id
pub type DependencyCache = HashMap<String, Task>;

/// Derived dependency state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockedState {
    /// All dependencies finished in satisfying states
    Unblocked,
    /// Some dependency has not finished yet
    Pending,
    /// Some dependency finished in a state that cannot satisfy its
    /// required status
    Blocked,
}

impl BlockedState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockedState::Unblocked => "",
            BlockedState::Pending => "pending",
            BlockedState::Blocked => "blocked",
        }
    }
}

impl Task {
    /// Whether every dependency is satisfied, fetching tasks missing
    /// from `cache` out of the store
    ///
    /// Entries already in the cache are trusted as-is. Cache entries
    /// that are not dependencies of this task are ignored.
    pub async fn dependencies_met(
        &self,
        ctx: &OpContext,
        db: &Db,
        cache: &mut DependencyCache,
    ) -> Result<bool, ModelError> {
        if self.depends_on.is_empty() || self.override_dependencies {
            return Ok(true);
        }

        let missing: Vec<String> = self
            .depends_on
            .iter()
            .filter(|dep| !cache.contains_key(&dep.task_id))
            .map(|dep| dep.task_id.clone())
            .collect();
        if !missing.is_empty() {
            for fetched in task::find(ctx, db, &task::by_ids(&missing)).await? {
                cache.insert(fetched.id.clone(), fetched);
            }
        }

        self.check_against(cache)
    }

    /// Pure in-memory dependency check against an authoritative cache
    pub fn all_dependencies_satisfied(
        &self,
        cache: &DependencyCache,
    ) -> Result<bool, ModelError> {
        if self.depends_on.is_empty() || self.override_dependencies {
            return Ok(true);
        }
        if cache.is_empty() {
            return Err(ModelError::InvalidInput(
                "cannot check dependencies with an empty cache".to_string(),
            ));
        }
        self.check_against(cache)
    }

    fn check_against(&self, cache: &DependencyCache) -> Result<bool, ModelError> {
        for dep in &self.depends_on {
            let dep_task = cache
                .get(&dep.task_id)
                .ok_or_else(|| ModelError::not_found("task", dep.task_id.clone()))?;
            if !dep.is_satisfied_by(dep_task.status) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Transitive blocked/pending classification
    ///
    /// A finished dependency is fully classified at its own edge: an
    /// unsatisfying status is blocked, a satisfying one contributes
    /// nothing and its subtree is never entered (matching what
    /// [`Task::dependencies_met`] would dispatch on). The traversal
    /// descends only into unfinished dependencies, iteratively with an
    /// explicit frame stack; the on-path visited set turns a cyclic
    /// dependency definition into [`ModelError::CycleDetected`]
    /// instead of an endless walk.
    pub async fn blocked_state(
        &self,
        ctx: &OpContext,
        db: &Db,
    ) -> Result<BlockedState, ModelError> {
        struct Frame {
            task: Task,
            next_dep: usize,
            pending: bool,
        }

        let mut on_path: HashSet<String> = HashSet::new();
        on_path.insert(self.id.clone());
        let mut frames = vec![Frame {
            task: self.clone(),
            next_dep: 0,
            pending: false,
        }];

        while let Some(frame) = frames.last_mut() {
            if let Some(dep) = frame.task.depends_on.get(frame.next_dep).cloned() {
                frame.next_dep += 1;
                if on_path.contains(&dep.task_id) {
                    return Err(ModelError::CycleDetected);
                }
                let dep_task = task::find_one(ctx, db, &task::by_id(&dep.task_id))
                    .await?
                    .ok_or_else(|| ModelError::not_found("task", dep.task_id.clone()))?;
                if dep_task.status.is_finished() {
                    if !dep.is_satisfied_by(dep_task.status) {
                        return Ok(BlockedState::Blocked);
                    }
                    continue;
                }
                on_path.insert(dep_task.id.clone());
                frames.push(Frame { task: dep_task, next_dep: 0, pending: false });
                continue;
            }

            // Frame exhausted its dependencies. Every non-root frame
            // is an unfinished dependency of its parent, so the parent
            // is at least pending; a blocked subtree already returned
            // above.
            let completed = match frames.pop() {
                Some(completed) => completed,
                None => break,
            };
            on_path.remove(&completed.task.id);

            match frames.last_mut() {
                None => {
                    return Ok(if completed.pending {
                        BlockedState::Pending
                    } else {
                        BlockedState::Unblocked
                    });
                }
                Some(parent) => parent.pending = true,
            }
        }

        Ok(BlockedState::Unblocked)
    }
}

/// Tasks eligible for dispatch: activated, undispatched, not disabled
/// by a negative priority, with every dependency satisfied. Ordered by
/// descending priority.
///
/// All candidates are evaluated against one shared dependency cache,
/// so each upstream task is fetched at most once per planning pass.
pub async fn find_runnable(ctx: &OpContext, db: &Db) -> Result<Vec<Task>, ModelError> {
    let filter = Filter::all()
        .eq("status", TaskStatus::Undispatched.as_str())
        .eq("activated", true)
        .gt("priority", -1);
    let candidates = task::find(ctx, db, &filter).await?;

    let mut cache = DependencyCache::new();
    let mut runnable = Vec::new();
    for candidate in candidates {
        if candidate.dependencies_met(ctx, db, &mut cache).await? {
            runnable.push(candidate);
        }
    }
    runnable.sort_by_key(|t| std::cmp::Reverse(t.priority));
    Ok(runnable)
}

/// The transitive closure of a task's dependency ids
///
/// Traversal is breadth-first over the stored graph; a visited set
/// keeps cyclic definitions from looping.
pub async fn transitive_dependency_ids(
    ctx: &OpContext,
    db: &Db,
    root: &Task,
) -> Result<Vec<String>, ModelError> {
    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(root.id.clone());
    let mut frontier: Vec<String> = root
        .depends_on
        .iter()
        .map(|dep| dep.task_id.clone())
        .collect();
    let mut closure: Vec<String> = Vec::new();

    while !frontier.is_empty() {
        let batch: Vec<String> = frontier
            .drain(..)
            .filter(|id| visited.insert(id.clone()))
            .collect();
        if batch.is_empty() {
            break;
        }
        for fetched in task::find(ctx, db, &task::by_ids(&batch)).await? {
            frontier.extend(fetched.depends_on.iter().map(|dep| dep.task_id.clone()));
        }
        closure.extend(batch);
    }

    Ok(closure)
}

#[cfg(test)]
#[path = "depend_tests.rs"]
mod tests;
