//! Task-execution service (Taskcluster) client.
//!
//! Lookups here are best effort: tasks expire, and an expired or missing
//! task simply means "no status yet". Every failure is logged and mapped
//! to `None` instead of an error.

use std::fmt;

use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::api::client::check_status;
use crate::error::Result;

/// State of a single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Unscheduled,
    Pending,
    Running,
    Completed,
    Failed,
    Exception,
}

impl TaskState {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Unscheduled => "unscheduled",
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Exception => "exception",
        }
    }

    pub fn is_error(self) -> bool {
        matches!(self, TaskState::Failed | TaskState::Exception)
    }

    pub fn is_in_progress(self) -> bool {
        matches!(
            self,
            TaskState::Unscheduled | TaskState::Pending | TaskState::Running
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatusStructure {
    #[serde(rename = "taskId")]
    pub task_id: String,
    pub state: TaskState,
}

/// Response of `queue/v1/task/{id}/status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub status: TaskStatusStructure,
}

impl TaskStatus {
    pub fn state(&self) -> TaskState {
        self.status.state
    }
}

/// One page of `queue/v1/task-group/{id}/list`.
#[derive(Debug, Clone, Deserialize)]
struct TaskGroupPage {
    #[serde(rename = "taskGroupId")]
    task_group_id: String,
    #[serde(default)]
    tasks: Vec<TaskStatus>,
    #[serde(rename = "continuationToken", default)]
    continuation_token: Option<String>,
}

/// Every task of a task group, across all pages.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskGroup {
    pub task_group_id: String,
    pub tasks: Vec<TaskStatus>,
}

impl TaskGroup {
    pub fn states(&self) -> impl Iterator<Item = TaskState> + '_ {
        self.tasks.iter().map(TaskStatus::state)
    }
}

/// Read-only client for the task queue.
#[derive(Clone)]
pub struct TaskclusterClient {
    http: reqwest::Client,
    root_url: String,
}

impl TaskclusterClient {
    pub fn new(root_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            root_url: root_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn root_url(&self) -> &str {
        &self.root_url
    }

    /// `{root}/api/{service}/{version}{path}`
    pub fn api_url(&self, service: &str, version: &str, path: &str) -> String {
        format!(
            "{}/api/{}/{}/{}",
            self.root_url,
            service,
            version,
            path.trim_start_matches('/')
        )
    }

    /// `{root}{path}`
    pub fn ui_url(&self, path: &str) -> String {
        format!("{}/{}", self.root_url, path.trim_start_matches('/'))
    }

    /// Deep link to a task group in the web UI.
    pub fn task_group_url(&self, task_group_id: &str) -> String {
        self.ui_url(&format!("/tasks/groups/{}", task_group_id))
    }

    /// Status of a task, or `None` when it is missing, expired or unreachable.
    pub async fn task_status(&self, task_id: &str) -> Option<TaskStatus> {
        let url = self.api_url("queue", "v1", &format!("/task/{}/status", task_id));
        match self.fetch::<TaskStatus>(&url, None).await {
            Ok(status) => Some(status),
            Err(err) => {
                counter!("shipit_task_status_expired_total").increment(1);
                debug!(task_id, error = %err, "Task status unavailable; treating as expired");
                None
            }
        }
    }

    /// All tasks of a task group, or `None` when the listing cannot be completed.
    pub async fn task_group(&self, task_group_id: &str) -> Option<TaskGroup> {
        let url = self.api_url(
            "queue",
            "v1",
            &format!("/task-group/{}/list", task_group_id),
        );

        let mut tasks = Vec::new();
        let mut continuation: Option<String> = None;
        let mut group_id = task_group_id.to_string();

        loop {
            let page = match self
                .fetch::<TaskGroupPage>(&url, continuation.as_deref())
                .await
            {
                Ok(page) => page,
                Err(err) => {
                    warn!(task_group_id, error = %err, "Task group listing unavailable");
                    return None;
                }
            };

            group_id = page.task_group_id;
            tasks.extend(page.tasks);

            match page.continuation_token {
                Some(token) if !token.is_empty() => continuation = Some(token),
                _ => break,
            }
        }

        Some(TaskGroup {
            task_group_id: group_id,
            tasks,
        })
    }

    async fn fetch<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        continuation: Option<&str>,
    ) -> Result<T> {
        let mut request = self.http.get(url).header("Accept", "application/json");
        if let Some(token) = continuation {
            request = request.query(&[("continuationToken", token)]);
        }
        let response = check_status(request.send().await?).await?;
        Ok(response.json::<T>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_builders() {
        let tc = TaskclusterClient::new("https://firefox-ci-tc.services.mozilla.com/");
        assert_eq!(
            tc.api_url("queue", "v1", "/task/abc/status"),
            "https://firefox-ci-tc.services.mozilla.com/api/queue/v1/task/abc/status"
        );
        assert_eq!(
            tc.task_group_url("GROUP"),
            "https://firefox-ci-tc.services.mozilla.com/tasks/groups/GROUP"
        );
    }

    #[test]
    fn test_state_classification() {
        assert!(TaskState::Exception.is_error());
        assert!(TaskState::Unscheduled.is_in_progress());
        assert!(!TaskState::Completed.is_in_progress());
        let parsed: TaskState = serde_json::from_str("\"running\"").unwrap();
        assert_eq!(parsed, TaskState::Running);
    }
}
