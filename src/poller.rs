//! # Merge Automation Poller
//!
//! Keeps a local board of merge automations fresh while any of them has a
//! task worth watching. Automations that leave the running/failed states are
//! no longer polled, automations the backend no longer knows (404) are
//! dropped, and any other failure is recorded on the automation itself
//! without stopping the loop.

use std::time::Duration;

use metrics::counter;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::api::ApiClient;
use crate::config::AppConfig;
use crate::error::Result;
use crate::fanout::join_ordered;
use crate::models::{AutomationStatus, AutomationTaskStatus, MergeAutomation};

/// Automations with a task that may still change.
pub fn should_poll(automation: &MergeAutomation) -> bool {
    matches!(
        automation.status,
        AutomationStatus::Running | AutomationStatus::Failed
    ) && automation
        .task_id
        .as_deref()
        .is_some_and(|task_id| !task_id.is_empty())
}

pub fn can_cancel(automation: &MergeAutomation) -> bool {
    matches!(
        automation.status,
        AutomationStatus::Scheduled
            | AutomationStatus::Running
            | AutomationStatus::Pending
            | AutomationStatus::Failed
    )
}

pub fn is_pending(automation: &MergeAutomation) -> bool {
    automation.status == AutomationStatus::Pending
}

/// An automation plus the latest task status seen for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackedAutomation {
    #[serde(flatten)]
    pub automation: MergeAutomation,
    pub task_status: Option<AutomationTaskStatus>,
    pub task_status_error: Option<String>,
}

impl From<MergeAutomation> for TrackedAutomation {
    fn from(automation: MergeAutomation) -> Self {
        Self {
            automation,
            task_status: None,
            task_status_error: None,
        }
    }
}

/// Result of polling one automation.
#[derive(Debug, Clone)]
pub enum PollOutcome {
    Updated(AutomationTaskStatus),
    Deleted,
    Failed(String),
}

/// Local view of a product's merge automations.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AutomationBoard {
    automations: Vec<TrackedAutomation>,
}

impl AutomationBoard {
    pub fn new(automations: Vec<MergeAutomation>) -> Self {
        Self {
            automations: automations.into_iter().map(Into::into).collect(),
        }
    }

    pub fn automations(&self) -> &[TrackedAutomation] {
        &self.automations
    }

    pub fn get(&self, id: i64) -> Option<&TrackedAutomation> {
        self.automations.iter().find(|a| a.automation.id == id)
    }

    /// Ids of automations the next poll cycle will query.
    pub fn polled_ids(&self) -> Vec<i64> {
        self.automations
            .iter()
            .filter(|a| should_poll(&a.automation))
            .map(|a| a.automation.id)
            .collect()
    }

    pub fn remove(&mut self, id: i64) -> bool {
        let before = self.automations.len();
        self.automations.retain(|a| a.automation.id != id);
        before != self.automations.len()
    }

    pub fn apply(&mut self, id: i64, outcome: PollOutcome) {
        match outcome {
            PollOutcome::Deleted => {
                if self.remove(id) {
                    counter!("shipit_automations_removed_total").increment(1);
                    info!(automation_id = id, "Automation no longer exists; removed");
                }
            }
            PollOutcome::Updated(status) => {
                let Some(tracked) = self.automations.iter_mut().find(|a| a.automation.id == id)
                else {
                    return;
                };
                if let Some(fields) = &status.automation
                    && let Err(err) = tracked.automation.merge_from(fields)
                {
                    warn!(automation_id = id, error = %err, "Ignoring malformed automation update");
                    tracked.task_status_error = Some(err.to_string());
                } else {
                    tracked.task_status_error = None;
                }
                tracked.task_status = Some(status);
            }
            PollOutcome::Failed(message) => {
                if let Some(tracked) = self.automations.iter_mut().find(|a| a.automation.id == id)
                {
                    tracked.task_status_error = Some(message);
                }
            }
        }
    }
}

/// Periodic task-status poller for a board of merge automations.
pub struct MergeAutomationPoller {
    api: ApiClient,
    interval: Duration,
    board: watch::Sender<AutomationBoard>,
}

impl MergeAutomationPoller {
    pub fn new(api: ApiClient, board: AutomationBoard, interval: Duration) -> Self {
        let (board, _) = watch::channel(board);
        Self {
            api,
            interval,
            board,
        }
    }

    pub fn from_config(api: ApiClient, board: AutomationBoard, config: &AppConfig) -> Self {
        Self::new(
            api,
            board,
            Duration::from_secs(config.poll_interval_seconds),
        )
    }

    /// Receive a snapshot after every change to the board.
    pub fn subscribe(&self) -> watch::Receiver<AutomationBoard> {
        self.board.subscribe()
    }

    pub fn board(&self) -> AutomationBoard {
        self.board.borrow().clone()
    }

    /// Replace the board, e.g. after re-listing automations.
    pub fn replace(&self, board: AutomationBoard) {
        self.board.send_replace(board);
    }

    /// Poll every qualifying automation once, concurrently.
    ///
    /// Returns how many automations were polled.
    #[instrument(skip(self))]
    pub async fn poll_once(&self) -> Result<usize> {
        let ids = self.board.borrow().polled_ids();
        if ids.is_empty() {
            return Ok(0);
        }

        let polls = ids.iter().copied().map(|id| {
            let api = self.api.clone();
            async move { Ok((id, poll_automation(&api, id).await)) }
        });
        let outcomes = join_ordered(polls).await?;

        self.board.send_modify(|board| {
            for (id, outcome) in outcomes {
                board.apply(id, outcome);
            }
        });

        counter!("shipit_poll_cycles_total").increment(1);
        debug!(polled = ids.len(), "Merge automation poll cycle completed");
        Ok(ids.len())
    }

    /// Poll now, then every interval, until nothing qualifies or `shutdown` fires.
    #[instrument(skip_all)]
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        info!(interval_seconds = self.interval.as_secs(), "Starting merge automation poller");

        loop {
            if self.poll_once().await? == 0 {
                info!("No automations left to poll");
                break;
            }
            if self.board.borrow().polled_ids().is_empty() {
                info!("No automations left to poll");
                break;
            }

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Merge automation poller shutdown requested");
                    break;
                }
                _ = sleep(self.interval) => {}
            }
        }

        info!("Merge automation poller stopped");
        Ok(())
    }

    /// Re-query one automation after a start or cancel action.
    ///
    /// A 404 removes it; any other error is returned so the caller can re-list.
    #[instrument(skip(self))]
    pub async fn refresh_one(&self, id: i64) -> Result<()> {
        match self.api.get_merge_automation_task_status(id).await {
            Ok(status) => {
                self.board
                    .send_modify(|board| board.apply(id, PollOutcome::Updated(status)));
                Ok(())
            }
            Err(err) if err.is_not_found() => {
                self.board
                    .send_modify(|board| board.apply(id, PollOutcome::Deleted));
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

async fn poll_automation(api: &ApiClient, id: i64) -> PollOutcome {
    match api.get_merge_automation_task_status(id).await {
        Ok(status) => PollOutcome::Updated(status),
        Err(err) if err.is_not_found() => PollOutcome::Deleted,
        Err(err) => {
            warn!(automation_id = id, error = %err, "Failed to poll automation task status");
            PollOutcome::Failed(err.to_string())
        }
    }
}
