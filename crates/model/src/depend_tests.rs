// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::task::{Dependency, TaskStatus, ALL_STATUSES, DEP_FAILED, DEP_SUCCESS};
use evg_db::MemoryStore;

fn ctx() -> OpContext {
    OpContext::background()
}

fn dep_edges() -> Vec<Dependency> {
    vec![
        Dependency::new("td1", DEP_SUCCESS),
        Dependency::new("td2", DEP_SUCCESS),
        Dependency::new("td3", ""), // default is success
        Dependency::new("td4", DEP_FAILED),
        Dependency::new("td5", ALL_STATUSES),
    ]
}

async fn seed_dep_tasks(db: &Db, statuses: [TaskStatus; 5]) {
    for (i, status) in statuses.iter().enumerate() {
        let mut t = Task::new(format!("td{}", i + 1));
        t.status = *status;
        t.insert(&ctx(), db).await.unwrap();
    }
}

fn satisfied_statuses() -> [TaskStatus; 5] {
    use TaskStatus::*;
    // success, success, default-success, failed, any-finished
    [Succeeded, Succeeded, Succeeded, Failed, Failed]
}

#[tokio::test]
async fn no_dependencies_are_met_with_empty_cache() {
    let db = MemoryStore::shared();
    let t = Task::new("t1");

    let mut cache = DependencyCache::new();
    assert!(t.dependencies_met(&ctx(), &db, &mut cache).await.unwrap());
    assert!(t.all_dependencies_satisfied(&cache).unwrap());
}

#[tokio::test]
async fn overridden_dependencies_are_always_met() {
    let db = MemoryStore::shared();
    let mut t = Task::new("t1");
    t.depends_on = dep_edges();
    t.override_dependencies = true;

    let mut cache = DependencyCache::new();
    assert!(t.dependencies_met(&ctx(), &db, &mut cache).await.unwrap());
    assert!(t.all_dependencies_satisfied(&cache).unwrap());
}

#[tokio::test]
async fn every_predicate_type_can_be_satisfied() {
    let db = MemoryStore::shared();
    seed_dep_tasks(&db, satisfied_statuses()).await;
    let mut t = Task::new("t1");
    t.depends_on = dep_edges();

    let mut cache = DependencyCache::new();
    assert!(t.dependencies_met(&ctx(), &db, &mut cache).await.unwrap());
}

#[tokio::test]
async fn partially_finished_dependencies_are_not_met() {
    let db = MemoryStore::shared();
    use TaskStatus::*;
    // Only the first dependency finished the right way
    seed_dep_tasks(&db, [Succeeded, Undispatched, Undispatched, Undispatched, Undispatched])
        .await;
    let mut t = Task::new("t1");
    t.depends_on = dep_edges();

    let mut cache = DependencyCache::new();
    assert!(!t.dependencies_met(&ctx(), &db, &mut cache).await.unwrap());
}

#[tokio::test]
async fn missing_tasks_are_pulled_into_the_cache() {
    let db = MemoryStore::shared();
    seed_dep_tasks(&db, satisfied_statuses()).await;
    let mut t = Task::new("t1");
    t.depends_on = dep_edges();

    let mut cache = DependencyCache::new();
    assert!(t.dependencies_met(&ctx(), &db, &mut cache).await.unwrap());
    for i in 1..=5 {
        let id = format!("td{i}");
        assert_eq!(cache.get(&id).map(|t| t.id.as_str()), Some(id.as_str()));
    }
}

#[tokio::test]
async fn cached_entries_are_trusted_over_the_store() {
    let db = MemoryStore::shared();
    seed_dep_tasks(&db, satisfied_statuses()).await;
    let mut t = Task::new("t1");
    t.depends_on = dep_edges();

    let mut cache = DependencyCache::new();
    assert!(t.dependencies_met(&ctx(), &db, &mut cache).await.unwrap());

    // Poison the cache; the store still says the dependency succeeded
    let mut poisoned = cache.get("td1").cloned().unwrap();
    assert_eq!(poisoned.status, TaskStatus::Succeeded);
    poisoned.status = TaskStatus::Failed;
    cache.insert("td1".to_string(), poisoned);

    assert!(!t.dependencies_met(&ctx(), &db, &mut cache).await.unwrap());
}

#[tokio::test]
async fn pure_variant_rejects_an_empty_cache() {
    let mut t = Task::new("t1");
    t.depends_on = dep_edges();

    let err = t.all_dependencies_satisfied(&DependencyCache::new()).unwrap_err();
    assert!(matches!(err, ModelError::InvalidInput(_)));
}

#[tokio::test]
async fn extraneous_cache_entries_are_ignored() {
    let db = MemoryStore::shared();
    use TaskStatus::*;
    seed_dep_tasks(&db, [Succeeded, Succeeded, Failed, Undispatched, Undispatched]).await;

    let edges = dep_edges();
    let mut t = Task::new("t1");
    t.depends_on = edges[..3].to_vec();

    let mut cache = DependencyCache::new();
    // td3 failed but its edge requires success
    assert!(!t.dependencies_met(&ctx(), &db, &mut cache).await.unwrap());
    assert!(!t.all_dependencies_satisfied(&cache).unwrap());

    // Drop the failing edge but leave td3 in the cache; it no longer
    // participates
    t.depends_on = edges[..2].to_vec();
    assert!(t.dependencies_met(&ctx(), &db, &mut cache).await.unwrap());
    assert!(t.all_dependencies_satisfied(&cache).unwrap());
}

#[tokio::test]
async fn blocked_state_classifies_a_mixed_chain() {
    let db = MemoryStore::shared();

    let mut t1 = Task::new("t1");
    t1.depends_on = vec![Dependency::new("t2", DEP_SUCCESS)];
    t1.insert(&ctx(), &db).await.unwrap();

    let mut t2 = Task::new("t2");
    t2.status = TaskStatus::Failed;
    t2.depends_on = vec![Dependency::new("t3", DEP_FAILED)];
    t2.insert(&ctx(), &db).await.unwrap();

    let mut t3 = Task::new("t3");
    t3.status = TaskStatus::Undispatched;
    t3.depends_on = vec![Dependency::new("t4", ALL_STATUSES)];
    t3.insert(&ctx(), &db).await.unwrap();

    let mut t4 = Task::new("t4");
    t4.status = TaskStatus::Succeeded;
    t4.insert(&ctx(), &db).await.unwrap();

    assert_eq!(t4.blocked_state(&ctx(), &db).await.unwrap(), BlockedState::Unblocked);
    assert_eq!(t3.blocked_state(&ctx(), &db).await.unwrap(), BlockedState::Unblocked);
    assert_eq!(t2.blocked_state(&ctx(), &db).await.unwrap(), BlockedState::Pending);
    assert_eq!(t1.blocked_state(&ctx(), &db).await.unwrap(), BlockedState::Blocked);
}

#[tokio::test]
async fn blocked_state_detects_cycles() {
    let db = MemoryStore::shared();

    let mut t1 = Task::new("t1");
    t1.status = TaskStatus::Undispatched;
    t1.depends_on = vec![Dependency::new("t2", DEP_SUCCESS)];
    t1.insert(&ctx(), &db).await.unwrap();

    let mut t2 = Task::new("t2");
    t2.status = TaskStatus::Undispatched;
    t2.depends_on = vec![Dependency::new("t1", DEP_SUCCESS)];
    t2.insert(&ctx(), &db).await.unwrap();

    let err = t1.blocked_state(&ctx(), &db).await.unwrap_err();
    assert!(matches!(err, ModelError::CycleDetected));
}

#[tokio::test]
async fn satisfied_dependencies_hide_their_own_history() {
    let db = MemoryStore::shared();

    // t1 depends only on t2, which succeeded; what t2 once depended on
    // is t2's business
    let mut t1 = Task::new("t1");
    t1.depends_on = vec![Dependency::new("t2", DEP_SUCCESS)];
    t1.insert(&ctx(), &db).await.unwrap();

    let mut t2 = Task::new("t2");
    t2.status = TaskStatus::Succeeded;
    t2.depends_on = vec![Dependency::new("t3", DEP_SUCCESS)];
    t2.insert(&ctx(), &db).await.unwrap();

    let mut t3 = Task::new("t3");
    t3.status = TaskStatus::Failed;
    t3.insert(&ctx(), &db).await.unwrap();

    assert_eq!(t1.blocked_state(&ctx(), &db).await.unwrap(), BlockedState::Unblocked);
    // Consistent with direct-dependency evaluation: t1 is dispatchable
    let mut cache = DependencyCache::new();
    assert!(t1.dependencies_met(&ctx(), &db, &mut cache).await.unwrap());

    // t2 itself is blocked on its failed direct dependency
    assert_eq!(t2.blocked_state(&ctx(), &db).await.unwrap(), BlockedState::Blocked);
}

#[tokio::test]
async fn sibling_diamond_is_not_a_cycle() {
    let db = MemoryStore::shared();

    let mut t1 = Task::new("t1");
    t1.status = TaskStatus::Succeeded;
    t1.depends_on = vec![
        Dependency::new("t2", DEP_SUCCESS),
        Dependency::new("t3", DEP_SUCCESS),
    ];
    t1.insert(&ctx(), &db).await.unwrap();

    let mut t2 = Task::new("t2");
    t2.status = TaskStatus::Succeeded;
    t2.depends_on = vec![Dependency::new("t4", DEP_SUCCESS)];
    t2.insert(&ctx(), &db).await.unwrap();

    let mut t3 = Task::new("t3");
    t3.status = TaskStatus::Started;
    t3.depends_on = vec![Dependency::new("t4", DEP_SUCCESS)];
    t3.insert(&ctx(), &db).await.unwrap();

    let mut t4 = Task::new("t4");
    t4.status = TaskStatus::Succeeded;
    t4.insert(&ctx(), &db).await.unwrap();

    assert_eq!(t1.blocked_state(&ctx(), &db).await.unwrap(), BlockedState::Pending);
}

#[tokio::test]
async fn transitive_closure_follows_every_edge_once() {
    let db = MemoryStore::shared();

    let mut one = Task::new("one");
    one.depends_on = vec![
        Dependency::new("two", ""),
        Dependency::new("three", ""),
        Dependency::new("four", ""),
    ];
    one.insert(&ctx(), &db).await.unwrap();
    for (id, deps) in [
        ("two", vec![]),
        ("three", vec![Dependency::new("five", "")]),
        ("four", vec![Dependency::new("five", "")]),
        ("five", vec![]),
        ("six", vec![]),
    ] {
        let mut t = Task::new(id);
        t.depends_on = deps;
        t.insert(&ctx(), &db).await.unwrap();
    }

    let mut ids = transitive_dependency_ids(&ctx(), &db, &one).await.unwrap();
    ids.sort();
    assert_eq!(ids, vec!["five", "four", "three", "two"]);
}

#[tokio::test]
async fn runnable_tasks_are_ready_activated_and_priority_ordered() {
    let db = MemoryStore::shared();

    let mut done = Task::new("done");
    done.status = TaskStatus::Succeeded;
    done.insert(&ctx(), &db).await.unwrap();

    // Ready, low priority
    let mut ready = Task::new("ready");
    ready.activated = true;
    ready.depends_on = vec![Dependency::new("done", DEP_SUCCESS)];
    ready.insert(&ctx(), &db).await.unwrap();

    // Ready, higher priority; sorts first
    let mut urgent = Task::new("urgent");
    urgent.activated = true;
    urgent.priority = 9;
    urgent.insert(&ctx(), &db).await.unwrap();

    // Dependency unfinished
    let mut waiting = Task::new("waiting");
    waiting.activated = true;
    waiting.depends_on = vec![Dependency::new("ready", DEP_SUCCESS)];
    waiting.insert(&ctx(), &db).await.unwrap();

    // Not activated
    let mut dormant = Task::new("dormant");
    dormant.depends_on = vec![Dependency::new("done", DEP_SUCCESS)];
    dormant.insert(&ctx(), &db).await.unwrap();

    // Disabled by priority
    let mut disabled = Task::new("disabled");
    disabled.activated = true;
    disabled.priority = -1;
    disabled.insert(&ctx(), &db).await.unwrap();

    let runnable = find_runnable(&ctx(), &db).await.unwrap();
    let ids: Vec<&str> = runnable.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["urgent", "ready"]);
}

mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn override_always_wins(n_deps in 0usize..6) {
            let mut t = Task::new("t");
            t.depends_on = (0..n_deps)
                .map(|i| Dependency::new(format!("d{i}"), DEP_SUCCESS))
                .collect();
            t.override_dependencies = true;
            prop_assert!(t.all_dependencies_satisfied(&DependencyCache::new()).unwrap());
        }

        #[test]
        fn star_accepts_exactly_the_finished_statuses(status_idx in 0usize..8) {
            use TaskStatus::*;
            let statuses = [
                Undispatched, Dispatched, Started, Succeeded, Failed, SystemFailed,
                SetupFailed, Inactive,
            ];
            let status = statuses[status_idx];
            let dep = Dependency::new("d", ALL_STATUSES);
            prop_assert_eq!(dep.is_satisfied_by(status), status.is_finished());
        }
    }
}
