// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Jira issue payload builder
//!
//! Renders the ticket summary, the templated description, and the
//! operator-configured custom fields for a task failure.

use crate::error::TriggerError;
use evg_model::task::{Task, TaskStatus};
use evg_model::testresult::TEST_FAILED;
use evg_model::{Build, Host, JiraNotificationsConfig, ProjectRef, NotificationPayload, Version};
use minijinja::Environment;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::error;

const MAX_SUMMARY_LENGTH: usize = 254;
const MAX_DESCRIPTION_LENGTH: usize = 32767;
const ISSUE_TYPE: &str = "Build Failure";

/// Placeholder a custom field template may use to receive the failed
/// test names as a list instead of rendered text
const FAILED_TEST_NAMES_TMPL: &str = "%%FailedTestNames%%";

const DESCRIPTION_TEMPLATE: &str = "\
h2. [{{ task_name }} failed on {{ build_name }}|{{ task_url }}]
Host: {{ host_line }}
Project: [{{ project_name }}|{{ ui_root }}/waterfall/{{ project_id }}]
Commit: [diff|https://github.com/{{ owner }}/{{ repo }}/commit/{{ revision }}]: {{ commit_message }}
Subscription: {{ subscription_id }}; Event: {{ event_id }}
{% for test in tests %}*{{ test.name }}* - [Logs|{{ test.url }}] | [History|{{ test.history_url }}]
{% endfor %}";

/// Everything a jira template can refer to
pub struct JiraTemplateData {
    pub ui_root: String,
    pub subscription_id: String,
    pub event_id: String,
    pub task: Task,
    pub build: Build,
    pub host: Option<Host>,
    pub project: ProjectRef,
    pub version: Version,
}

pub struct JiraPayloadBuilder {
    /// Jira project key tickets are filed under
    pub jira_project: String,
    pub mappings: JiraNotificationsConfig,
    pub data: JiraTemplateData,
}

/// One failed test as rendered into the description
#[derive(Debug, Clone, Serialize)]
struct JiraTestFailure {
    name: String,
    url: String,
    history_url: String,
}

/// Flattened context handed to minijinja; the same keys are available
/// to operator-supplied custom field templates
#[derive(Serialize)]
struct RenderContext {
    ui_root: String,
    subscription_id: String,
    event_id: String,
    task_id: String,
    task_name: String,
    task_status: String,
    execution: i64,
    build_name: String,
    build_variant: String,
    host_line: String,
    project_id: String,
    project_name: String,
    owner: String,
    repo: String,
    revision: String,
    commit_message: String,
    task_url: String,
    tests: Vec<JiraTestFailure>,
    failed_test_names: Vec<String>,
}

impl JiraPayloadBuilder {
    pub fn build(&self) -> Result<NotificationPayload, TriggerError> {
        let context = self.render_context();
        let summary = self.summary(&context);
        let description = self.description(&context)?;
        let fields = self.custom_fields(&context);

        Ok(NotificationPayload::JiraIssue {
            project: self.jira_project.clone(),
            issue_type: ISSUE_TYPE.to_string(),
            summary,
            description,
            fields,
        })
    }

    /// Ticket subject in the shape
    /// `Failures: name on variant [project @ hash] (test1, test2)`
    fn summary(&self, context: &RenderContext) -> String {
        let failed = &context.failed_test_names;
        let mut subj = String::new();
        subj.push_str(summary_prefix(&self.data.task, failed.len()));
        subj.push_str(&context.task_name);
        subj.push_str(&format!(" on {} ", context.build_name));
        // Revisions come from the store unvalidated; cut by characters,
        // not bytes
        let hash: String = self.data.version.revision.chars().take(8).collect();
        subj.push_str(&format!("[{} @ {}] ", context.project_name, hash));

        if !failed.is_empty() {
            // Leave room for the parens and the +N more marker
            let mut remaining = MAX_SUMMARY_LENGTH as i64 - subj.len() as i64 - 10;
            if remaining < failed[0].len() as i64 {
                return truncate_to(subj, MAX_SUMMARY_LENGTH);
            }
            let mut to_print: Vec<&str> = Vec::new();
            for name in failed {
                if remaining - name.len() as i64 > 0 {
                    to_print.push(name);
                }
                remaining -= name.len() as i64 + 2;
            }
            subj.push('(');
            subj.push_str(&to_print.join(", "));
            let omitted = failed.len() - to_print.len();
            if omitted > 0 {
                subj.push_str(&format!(" +{omitted} more"));
            }
            subj.push(')');
        }

        // Truncated mid-word; a clipped title beats a missing ticket
        truncate_to(subj, MAX_SUMMARY_LENGTH)
    }

    fn description(&self, context: &RenderContext) -> Result<String, TriggerError> {
        let env = Environment::new();
        let template = env.template_from_str(DESCRIPTION_TEMPLATE)?;
        let rendered = template.render(minijinja::Value::from_serialize(context))?;
        Ok(truncate_to(rendered, MAX_DESCRIPTION_LENGTH))
    }

    /// Operator-configured custom fields for the Jira project; a
    /// broken template skips its field but never blocks the ticket
    fn custom_fields(&self, context: &RenderContext) -> BTreeMap<String, Value> {
        let mut out = BTreeMap::new();
        let mappings = match self.mappings.to_map() {
            Ok(mappings) => mappings,
            Err(err) => {
                error!(task_id = %self.data.task.id, %err, "failed to build custom fields");
                return out;
            }
        };
        let Some(fields) = mappings.get(&self.jira_project) else {
            return out;
        };

        let env = Environment::new();
        for (field, template) in fields {
            if template == FAILED_TEST_NAMES_TMPL {
                out.insert(field.clone(), json!(context.failed_test_names));
                continue;
            }
            let rendered = env
                .template_from_str(template)
                .and_then(|t| t.render(minijinja::Value::from_serialize(context)));
            match rendered {
                Ok(value) => {
                    out.insert(field.clone(), json!([value]));
                }
                Err(err) => {
                    error!(
                        jira_project = %self.jira_project,
                        jira_field = %field,
                        %err,
                        "invalid custom field template"
                    );
                }
            }
        }
        out
    }

    fn render_context(&self) -> RenderContext {
        let data = &self.data;
        let failed: Vec<&evg_model::TestResult> = data
            .task
            .test_results
            .iter()
            .filter(|r| r.status == TEST_FAILED)
            .collect();

        let tests: Vec<JiraTestFailure> = failed
            .iter()
            .map(|r| {
                let name = clean_test_name(&r.test_file);
                JiraTestFailure {
                    url: log_url(r, &data.ui_root),
                    history_url: history_url(&data.task, &name, &data.ui_root),
                    name,
                }
            })
            .collect();

        // The display task is the face of the failure when there is one
        let (task_name, url_id, url_execution) = match &data.task.display_task {
            Some(display) => (display.display_name.clone(), display.id.clone(), display.execution),
            None if !data.task.old_task_id.is_empty() => (
                data.task.display_name.clone(),
                data.task.old_task_id.clone(),
                data.task.execution,
            ),
            None => (data.task.display_name.clone(), data.task.id.clone(), data.task.execution),
        };

        RenderContext {
            ui_root: data.ui_root.clone(),
            subscription_id: data.subscription_id.clone(),
            event_id: data.event_id.clone(),
            task_id: data.task.id.clone(),
            task_name,
            task_status: specific_task_status(&data.task).to_string(),
            execution: data.task.execution,
            build_name: data.build.display_name.clone(),
            build_variant: data.build.build_variant.clone(),
            host_line: host_line(data),
            project_id: data.project.identifier.clone(),
            project_name: data.project.display_name.clone(),
            owner: data.project.owner.clone(),
            repo: data.project.repo.clone(),
            revision: data.version.revision.clone(),
            commit_message: data.version.message.clone(),
            task_url: format!("{}/task/{}/{}", data.ui_root, url_id, url_execution),
            tests,
            failed_test_names: failed.iter().map(|r| clean_test_name(&r.test_file)).collect(),
        }
    }
}

/// Parse every configured custom field template, surfacing the first
/// broken one. Run when an admin updates the configuration.
pub fn validate_templates(config: &JiraNotificationsConfig) -> Result<(), TriggerError> {
    let mappings = config.to_map().map_err(TriggerError::from)?;
    let env = Environment::new();
    for (project, fields) in &mappings {
        for (field, template) in fields {
            if template == FAILED_TEST_NAMES_TMPL {
                continue;
            }
            env.template_from_str(template).map_err(|err| {
                TriggerError::Template(format!("{project}-{field}: {err}"))
            })?;
        }
    }
    Ok(())
}

/// Display status of a finished task, ranked by specificity
pub fn specific_task_status(task: &Task) -> &'static str {
    if task.status == TaskStatus::Succeeded {
        return "succeeded";
    }
    if task.details.timed_out {
        return "task-timed-out";
    }
    match task.details.kind.as_str() {
        "system" => "system-failed",
        "setup" => "setup-failed",
        _ => "failed",
    }
}

fn summary_prefix(task: &Task, failed: usize) -> &'static str {
    match specific_task_status(task) {
        "succeeded" => "Succeeded: ",
        "task-timed-out" => "Timed Out: ",
        "system-failed" => "System Failure: ",
        "setup-failed" => "Setup Failure: ",
        _ => match failed {
            1 => "Failure: ",
            n if n > 1 => "Failures: ",
            _ => "Failed: ",
        },
    }
}

/// The last path segment of a test identifier
fn clean_test_name(path: &str) -> String {
    let trimmed = path.trim_end_matches(['/', '\\']);
    let after_unix = trimmed.rsplit('/').next().unwrap_or(trimmed);
    let after_windows = after_unix.rsplit('\\').next().unwrap_or(after_unix);
    after_windows.to_string()
}

/// Link to a test's logs: the internal log viewer when a log id
/// exists, the test's own URL otherwise
fn log_url(test: &evg_model::TestResult, ui_root: &str) -> String {
    if !test.log_id.is_empty() {
        return format!("{}/test_log/{}", ui_root, test.log_id);
    }
    test.url.clone()
}

fn history_url(task: &Task, test_name: &str, ui_root: &str) -> String {
    format!(
        "{}/task_history/{}/{}#{}=fail",
        ui_root, task.project, task.id, test_name
    )
}

fn host_line(data: &JiraTemplateData) -> String {
    match &data.host {
        Some(host) => format!("[{}|{}/host/{}]", host.host, data.ui_root, host.id),
        None => "N/A".to_string(),
    }
}

/// Byte-length cap that respects character boundaries
fn truncate_to(mut s: String, max: usize) -> String {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
    s
}

#[cfg(test)]
#[path = "jira_tests.rs"]
mod tests;
