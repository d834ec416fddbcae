// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task triggers: outcome, success, failure, first-failure-in-version,
//! regression, exceeds-duration

use crate::error::TriggerError;
use crate::handler::EventHandler;
use crate::jira::{JiraPayloadBuilder, JiraTemplateData};
use crate::{
    TRIGGER_EXCEEDS_DURATION, TRIGGER_FAILURE, TRIGGER_FIRST_FAILURE_IN_VERSION,
    TRIGGER_OUTCOME, TRIGGER_REGRESSION, TRIGGER_SUCCESS,
};
use async_trait::async_trait;
use evg_db::{Db, Filter, OpContext};
use evg_model::event::{EventData, EventLogEntry, TaskEventData};
use evg_model::subscription::{
    Subscriber, SELECTOR_ID, SELECTOR_IN_BUILD, SELECTOR_IN_VERSION, SELECTOR_OBJECT,
    SELECTOR_PROJECT, SELECTOR_REQUESTER,
};
use evg_model::task::{self, Task, TaskStatus};
use evg_model::{
    build, host, project, version, JiraNotificationsConfig, ModelError, Notification,
    NotificationPayload, Selector, Subscription, UiConfig,
};
use serde_json::{json, Value};
use tracing::warn;

/// Key in a subscription's trigger data holding the runtime threshold
pub const TRIGGER_DATA_DURATION_SECS: &str = "task-duration-secs";

#[derive(Default)]
pub struct TaskTriggers {
    event_id: String,
    data: TaskEventData,
    task: Task,
    ui_root: String,
}

#[async_trait]
impl EventHandler for TaskTriggers {
    async fn fetch(
        &mut self,
        ctx: &OpContext,
        db: &Db,
        event: &EventLogEntry,
    ) -> Result<(), TriggerError> {
        let EventData::Task(data) = &event.data else {
            return Err(TriggerError::MismatchedEventData {
                event_id: event.id.clone(),
                expected: "task",
            });
        };
        self.event_id = event.id.clone();
        self.data = data.clone();
        let mut fetched = task::find_one(ctx, db, &task::by_id(&event.resource_id))
            .await?
            .ok_or_else(|| ModelError::not_found("task", event.resource_id.clone()))?;
        task::merge_test_results(ctx, db, std::slice::from_mut(&mut fetched), None).await?;
        self.task = fetched;
        self.ui_root = UiConfig::get(ctx, db).await?.url;
        Ok(())
    }

    fn selectors(&self) -> Vec<Selector> {
        vec![
            Selector::new(SELECTOR_ID, self.task.id.clone()),
            Selector::new(SELECTOR_OBJECT, "task"),
            Selector::new(SELECTOR_PROJECT, self.task.project.clone()),
            Selector::new(SELECTOR_IN_VERSION, self.task.version.clone()),
            Selector::new(SELECTOR_IN_BUILD, self.task.build_id.clone()),
            Selector::new(SELECTOR_REQUESTER, self.task.requester.clone()),
        ]
    }

    fn triggers(&self) -> &'static [&'static str] {
        &[
            TRIGGER_OUTCOME,
            TRIGGER_SUCCESS,
            TRIGGER_FAILURE,
            TRIGGER_FIRST_FAILURE_IN_VERSION,
            TRIGGER_REGRESSION,
            TRIGGER_EXCEEDS_DURATION,
        ]
    }

    async fn process(
        &self,
        ctx: &OpContext,
        db: &Db,
        subscription: &Subscription,
    ) -> Result<Option<Notification>, TriggerError> {
        let fires = match subscription.trigger.as_str() {
            TRIGGER_OUTCOME => self.data.status.is_finished(),
            TRIGGER_SUCCESS => self.data.status == TaskStatus::Succeeded,
            TRIGGER_FAILURE => self.is_failure(),
            TRIGGER_FIRST_FAILURE_IN_VERSION => {
                self.is_failure() && self.is_first_failure_in_version(ctx, db).await?
            }
            TRIGGER_REGRESSION => self.is_failure() && self.is_regression(ctx, db).await?,
            TRIGGER_EXCEEDS_DURATION => self.exceeds_duration(subscription),
            _ => false,
        };
        if !fires {
            return Ok(None);
        }
        self.generate(ctx, db, subscription).await
    }
}

impl TaskTriggers {
    fn is_failure(&self) -> bool {
        self.data.status.is_finished() && self.data.status != TaskStatus::Succeeded
    }

    /// No other task in the same version has already failed
    async fn is_first_failure_in_version(
        &self,
        ctx: &OpContext,
        db: &Db,
    ) -> Result<bool, TriggerError> {
        let failures: Vec<Value> = TaskStatus::finished()
            .iter()
            .filter(|s| **s != TaskStatus::Succeeded)
            .map(|s| Value::from(s.as_str()))
            .collect();
        let filter = Filter::all()
            .eq("version", self.task.version.clone())
            .eq("project", self.task.project.clone())
            .any_of("status", failures)
            .ne("_id", self.task.id.clone());
        Ok(db.count(ctx, task::COLLECTION, &filter).await? == 0)
    }

    /// The previous execution of this task succeeded
    async fn is_regression(&self, ctx: &OpContext, db: &Db) -> Result<bool, TriggerError> {
        if self.task.execution == 0 {
            return Ok(false);
        }
        let previous = task::find_one_id_old_or_new(
            ctx,
            db,
            &self.task.id,
            self.task.execution - 1,
        )
        .await?;
        Ok(matches!(previous, Some(prev) if prev.status == TaskStatus::Succeeded))
    }

    /// Finished runtime exceeds the subscription's threshold
    fn exceeds_duration(&self, subscription: &Subscription) -> bool {
        if !self.data.status.is_finished() {
            return false;
        }
        let Some(threshold) = subscription
            .trigger_data
            .get(TRIGGER_DATA_DURATION_SECS)
            .and_then(|raw| raw.parse::<i64>().ok())
        else {
            warn!(
                subscription_id = %subscription.id,
                "exceeds-duration subscription without a usable threshold"
            );
            return false;
        };
        let runtime = self.task.finish_time - self.task.start_time;
        runtime.num_seconds() > threshold
    }

    fn task_url(&self) -> String {
        format!(
            "{}/task/{}/{}",
            self.ui_root, self.task.id, self.task.execution
        )
    }

    async fn generate(
        &self,
        ctx: &OpContext,
        db: &Db,
        subscription: &Subscription,
    ) -> Result<Option<Notification>, TriggerError> {
        let task = &self.task;
        let status = self.data.status;
        let payload = match &subscription.subscriber {
            Subscriber::EvergreenWebhook(hook) => NotificationPayload::Webhook {
                url: hook.url.clone(),
                secret: hook.secret.clone(),
                body: json!({
                    "id": task.id,
                    "execution": task.execution,
                    "display_name": task.display_name,
                    "build_variant": task.build_variant,
                    "project": task.project,
                    "status": status,
                }),
            },
            Subscriber::Email(address) => NotificationPayload::Email {
                recipients: vec![address.clone()],
                subject: format!(
                    "Evergreen: task {} on {} has {}",
                    task.display_name, task.build_variant, status
                ),
                body: self.task_url(),
            },
            Subscriber::Slack(target) => NotificationPayload::Slack {
                target: target.clone(),
                msg: format!(
                    "Task <{}|{}> on {} {}",
                    self.task_url(),
                    task.display_name,
                    task.build_variant,
                    status
                ),
            },
            Subscriber::GithubPullRequest(gh) => NotificationPayload::GithubStatus {
                owner: gh.owner.clone(),
                repo: gh.repo.clone(),
                git_ref: gh.git_ref.clone(),
                context: format!("evergreen/{}", task.display_name),
                state: match status {
                    TaskStatus::Succeeded => "success".to_string(),
                    _ => "failure".to_string(),
                },
                description: format!("task {}", status),
                url: self.task_url(),
            },
            Subscriber::JiraComment(issue) => NotificationPayload::JiraComment {
                issue_id: issue.clone(),
                body: format!(
                    "Task [{}|{}] on {} {}",
                    task.display_name,
                    self.task_url(),
                    task.build_variant,
                    status
                ),
            },
            Subscriber::JiraIssue(jira_project) => {
                match self.jira_payload(ctx, db, subscription, jira_project).await {
                    Ok(payload) => payload,
                    Err(TriggerError::Template(message)) => {
                        // Broken operator templates must not block
                        // ticket generation elsewhere
                        tracing::error!(
                            task_id = %task.id,
                            %message,
                            "jira payload rendering failed"
                        );
                        return Ok(None);
                    }
                    Err(err) => return Err(err),
                }
            }
        };
        Ok(Some(Notification::new(
            &self.event_id,
            &subscription.id,
            subscription.subscriber.clone(),
            payload,
        )))
    }

    async fn jira_payload(
        &self,
        ctx: &OpContext,
        db: &Db,
        subscription: &Subscription,
        jira_project: &str,
    ) -> Result<NotificationPayload, TriggerError> {
        let task = &self.task;
        let build = build::find_one_id(ctx, db, &task.build_id)
            .await?
            .ok_or_else(|| ModelError::not_found("build", task.build_id.clone()))?;
        let project_ref = project::find_one_id(ctx, db, &task.project)
            .await?
            .ok_or_else(|| ModelError::not_found("project", task.project.clone()))?;
        let task_version = version::find_one_id(ctx, db, &task.version)
            .await?
            .ok_or_else(|| ModelError::not_found("version", task.version.clone()))?;
        let task_host = if task.host_id.is_empty() {
            None
        } else {
            host::find_one_id(ctx, db, &task.host_id).await?
        };
        let mappings = JiraNotificationsConfig::get(ctx, db).await?;

        let builder = JiraPayloadBuilder {
            jira_project: jira_project.to_string(),
            mappings,
            data: JiraTemplateData {
                ui_root: self.ui_root.clone(),
                subscription_id: subscription.id.clone(),
                event_id: self.event_id.clone(),
                task: task.clone(),
                build,
                host: task_host,
                project: project_ref,
                version: task_version,
            },
        };
        builder.build()
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
