// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Build triggers: outcome, success, failure

use crate::error::TriggerError;
use crate::handler::EventHandler;
use crate::{TRIGGER_FAILURE, TRIGGER_OUTCOME, TRIGGER_SUCCESS};
use async_trait::async_trait;
use chrono::Duration;
use evg_db::{Db, OpContext};
use evg_model::build::{self, Build, BuildStatus};
use evg_model::event::{BuildEventData, EventData, EventLogEntry};
use evg_model::subscription::{
    Subscriber, SELECTOR_ID, SELECTOR_IN_VERSION, SELECTOR_OBJECT, SELECTOR_PROJECT,
};
use evg_model::task::TaskStatus;
use evg_model::{ModelError, Notification, NotificationPayload, Selector, Subscription, UiConfig};
use serde_json::json;
use tracing::warn;

#[derive(Default)]
pub struct BuildTriggers {
    event_id: String,
    data: BuildEventData,
    build: Build,
    ui_root: String,
}

#[async_trait]
impl EventHandler for BuildTriggers {
    async fn fetch(
        &mut self,
        ctx: &OpContext,
        db: &Db,
        event: &EventLogEntry,
    ) -> Result<(), TriggerError> {
        let EventData::Build(data) = &event.data else {
            return Err(TriggerError::MismatchedEventData {
                event_id: event.id.clone(),
                expected: "build",
            });
        };
        self.event_id = event.id.clone();
        self.data = data.clone();
        self.build = build::find_one_id(ctx, db, &event.resource_id)
            .await?
            .ok_or_else(|| ModelError::not_found("build", event.resource_id.clone()))?;
        self.ui_root = UiConfig::get(ctx, db).await?.url;
        Ok(())
    }

    fn selectors(&self) -> Vec<Selector> {
        vec![
            Selector::new(SELECTOR_ID, self.build.id.clone()),
            Selector::new(SELECTOR_OBJECT, "build"),
            Selector::new(SELECTOR_PROJECT, self.build.project.clone()),
            Selector::new(SELECTOR_IN_VERSION, self.build.version.clone()),
        ]
    }

    fn triggers(&self) -> &'static [&'static str] {
        &[TRIGGER_OUTCOME, TRIGGER_SUCCESS, TRIGGER_FAILURE]
    }

    async fn process(
        &self,
        _ctx: &OpContext,
        _db: &Db,
        subscription: &Subscription,
    ) -> Result<Option<Notification>, TriggerError> {
        let fires = match subscription.trigger.as_str() {
            TRIGGER_OUTCOME => self.data.status.is_finished(),
            TRIGGER_SUCCESS => self.data.status == BuildStatus::Succeeded,
            TRIGGER_FAILURE => self.data.status == BuildStatus::Failed,
            _ => false,
        };
        if !fires {
            return Ok(None);
        }
        Ok(self.generate(subscription))
    }
}

impl BuildTriggers {
    fn build_url(&self) -> String {
        format!("{}/build/{}", self.ui_root, self.build.id)
    }

    fn generate(&self, subscription: &Subscription) -> Option<Notification> {
        let build = &self.build;
        let status = self.data.status;
        let description = task_status_to_desc(build);
        let payload = match &subscription.subscriber {
            Subscriber::EvergreenWebhook(hook) => NotificationPayload::Webhook {
                url: hook.url.clone(),
                secret: hook.secret.clone(),
                body: json!({
                    "id": build.id,
                    "build_variant": build.build_variant,
                    "version": build.version,
                    "status": status,
                }),
            },
            Subscriber::Email(address) => NotificationPayload::Email {
                recipients: vec![address.clone()],
                subject: format!(
                    "Evergreen: build {} in {} has {}",
                    build.build_variant, build.project, status
                ),
                body: format!("{}: {}", self.build_url(), description),
            },
            Subscriber::Slack(target) => NotificationPayload::Slack {
                target: target.clone(),
                msg: format!(
                    "Build <{}|{}> {}: {}",
                    self.build_url(),
                    build.build_variant,
                    status,
                    description
                ),
            },
            Subscriber::GithubPullRequest(gh) => NotificationPayload::GithubStatus {
                owner: gh.owner.clone(),
                repo: gh.repo.clone(),
                git_ref: gh.git_ref.clone(),
                context: format!("evergreen/{}", build.build_variant),
                state: match status {
                    BuildStatus::Succeeded => "success".to_string(),
                    _ => "failure".to_string(),
                },
                description,
                url: self.build_url(),
            },
            Subscriber::JiraComment(issue) => NotificationPayload::JiraComment {
                issue_id: issue.clone(),
                body: format!(
                    "Build [{}|{}] {}: {}",
                    build.build_variant,
                    self.build_url(),
                    status,
                    description
                ),
            },
            Subscriber::JiraIssue(_) => {
                warn!(
                    build_id = %build.id,
                    subscription_id = %subscription.id,
                    "jira issues are not generated for build events"
                );
                return None;
            }
        };
        Some(Notification::new(
            &self.event_id,
            &subscription.id,
            subscription.subscriber.clone(),
            payload,
        ))
    }
}

/// One-line summary of a build's task outcomes, in the shape
/// `"1 succeeded, none failed in 10s"`
pub fn task_status_to_desc(build: &Build) -> String {
    if build.tasks.is_empty() {
        return "no tasks were run".to_string();
    }
    let mut succeeded = 0;
    let mut failed = 0;
    let mut system_errors = 0;
    for cache in &build.tasks {
        match cache.status {
            TaskStatus::Succeeded => succeeded += 1,
            TaskStatus::Failed => failed += 1,
            TaskStatus::SystemFailed => system_errors += 1,
            _ => {}
        }
    }
    let elapsed = fmt_duration(build.finish_time - build.start_time);
    let succeeded = count_phrase(succeeded, "succeeded");
    let failed = count_phrase(failed, "failed");
    if system_errors > 0 {
        format!("{succeeded}, {failed}, {system_errors} internal errors in {elapsed}")
    } else {
        format!("{succeeded}, {failed} in {elapsed}")
    }
}

fn count_phrase(n: usize, verb: &str) -> String {
    if n == 0 {
        format!("none {verb}")
    } else {
        format!("{n} {verb}")
    }
}

/// Render a duration the way Go's `Duration.String` does: `10s`,
/// `2m30s`, `1h0m5s`
fn fmt_duration(elapsed: Duration) -> String {
    let total = elapsed.num_seconds().max(0);
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
#[path = "build_tests.rs"]
mod tests;
