//! Merge-day automation models

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Lifecycle of a merge automation job.
///
/// Parsed case-insensitively; the backend reports enum names in upper case
/// in some places and lower case in others.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AutomationStatus {
    Pending,
    Scheduled,
    Running,
    Completed,
    Failed,
    Canceled,
    Other(String),
}

impl AutomationStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "pending" => Self::Pending,
            "scheduled" => Self::Scheduled,
            "running" => Self::Running,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "canceled" | "cancelled" => Self::Canceled,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Scheduled => "scheduled",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
            Self::Other(other) => other,
        }
    }
}

impl fmt::Display for AutomationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for AutomationStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AutomationStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

/// A merge automation job as listed by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeAutomation {
    pub id: i64,
    pub product: String,
    pub behavior: String,
    pub revision: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub dry_run: bool,
    pub status: AutomationStatus,
    #[serde(default)]
    pub task_id: Option<String>,
    /// Remaining backend fields, kept so merges do not drop them
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MergeAutomation {
    /// Overlay fields from a fresher copy of the same automation.
    ///
    /// Fields absent from `update` keep their current value.
    pub fn merge_from(&mut self, update: &Value) -> Result<(), serde_json::Error> {
        let Some(fields) = update.as_object() else {
            return Ok(());
        };

        let mut current = serde_json::to_value(&*self)?;
        if let Some(object) = current.as_object_mut() {
            for (key, value) in fields {
                object.insert(key.clone(), value.clone());
            }
        }
        *self = serde_json::from_value(current)?;
        Ok(())
    }
}

/// Body of `POST /merge-automation`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewMergeAutomation {
    pub product: String,
    pub behavior: String,
    pub revision: String,
    #[serde(rename = "dryRun")]
    pub dry_run: bool,
    pub version: String,
    #[serde(rename = "commitMessage")]
    pub commit_message: String,
    #[serde(rename = "commitAuthor")]
    pub commit_author: String,
}

/// Response of `GET /merge-automation/{id}/task-status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationTaskStatus {
    /// Raw automation record, merged into the local copy
    #[serde(default)]
    pub automation: Option<Value>,
    #[serde(rename = "decisionTask", default)]
    pub decision_task: Option<DecisionTaskStatus>,
    #[serde(rename = "taskGroup", default)]
    pub task_group: Option<TaskGroupStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTaskStatus {
    #[serde(rename = "taskId")]
    pub task_id: String,
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskGroupStatus {
    #[serde(rename = "overallStatus")]
    pub overall_status: String,
}

/// A merge behavior offered for a product (e.g. `main-to-beta`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeBehavior {
    #[serde(default)]
    pub behavior: String,
    #[serde(default)]
    pub pretty_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Behaviors arrive either as a list or keyed by behavior name.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum MergeBehaviorsResponse {
    List(Vec<MergeBehavior>),
    Keyed(BTreeMap<String, MergeBehavior>),
}

impl MergeBehaviorsResponse {
    pub(crate) fn into_behaviors(self) -> Vec<MergeBehavior> {
        match self {
            Self::List(list) => list,
            Self::Keyed(keyed) => keyed
                .into_iter()
                .map(|(name, mut behavior)| {
                    if behavior.behavior.is_empty() {
                        behavior.behavior = name;
                    }
                    behavior
                })
                .collect(),
        }
    }
}

/// Candidate revision for a merge, keyed by its hash in the listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeRevision {
    pub revision: String,
    pub date: Option<DateTime<Utc>>,
    pub author: Option<String>,
    pub desc: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawMergeRevision {
    /// Epoch seconds
    #[serde(default)]
    pub date: Option<f64>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub desc: Option<String>,
}

impl RawMergeRevision {
    pub(crate) fn into_revision(self, revision: String) -> MergeRevision {
        MergeRevision {
            revision,
            date: self
                .date
                .and_then(|secs| DateTime::from_timestamp(secs as i64, 0)),
            author: self.author,
            desc: self.desc,
        }
    }
}

/// Details about a candidate revision, needed to submit an automation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeInfo {
    pub version: String,
    #[serde(default)]
    pub commit_message: String,
    #[serde(default)]
    pub commit_author: String,
}
