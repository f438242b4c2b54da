//! # Phase Status
//!
//! Derives a coarse per-phase state from fresh backend and task-queue
//! lookups. Nothing here is stored; every state is recomputed on each call.
//!
//! ```text
//! pending -> skipped | ready | blocked
//! ready   -> submitted(running) -> completed | warning
//! ```

use std::fmt;

use serde::Serialize;

use crate::taskcluster::{TaskGroup, TaskState};

pub mod reconcile;

pub use reconcile::{ReconciledPhase, ReconciledRelease, Reconciler};

/// Task-derived status of a submitted phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TcStatus {
    Unscheduled,
    Pending,
    Running,
    Completed,
    Failed,
    Exception,
    /// The action task completed but part of its task group failed
    Warning,
}

impl From<TaskState> for TcStatus {
    fn from(state: TaskState) -> Self {
        match state {
            TaskState::Unscheduled => TcStatus::Unscheduled,
            TaskState::Pending => TcStatus::Pending,
            TaskState::Running => TcStatus::Running,
            TaskState::Completed => TcStatus::Completed,
            TaskState::Failed => TcStatus::Failed,
            TaskState::Exception => TcStatus::Exception,
        }
    }
}

impl TcStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TcStatus::Unscheduled => "unscheduled",
            TcStatus::Pending => "pending",
            TcStatus::Running => "running",
            TcStatus::Completed => "completed",
            TcStatus::Failed => "failed",
            TcStatus::Exception => "exception",
            TcStatus::Warning => "warning",
        }
    }

    pub fn is_in_progress(self) -> bool {
        matches!(
            self,
            TcStatus::Unscheduled | TcStatus::Pending | TcStatus::Running
        )
    }

    pub fn is_error(self) -> bool {
        matches!(
            self,
            TcStatus::Failed | TcStatus::Exception | TcStatus::Warning
        )
    }
}

impl fmt::Display for TcStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Computed state of one phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "tc_status", rename_all = "lowercase")]
pub enum PhaseState {
    Skipped,
    Ready,
    Blocked,
    /// Submitted; the status is `None` while the task is unknown or expired
    Submitted(Option<TcStatus>),
}

impl PhaseState {
    pub fn is_completed(self) -> bool {
        matches!(self, PhaseState::Submitted(Some(TcStatus::Completed)))
    }

    pub fn tc_status(self) -> Option<TcStatus> {
        match self {
            PhaseState::Submitted(status) => status,
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PhaseState::Skipped => "skipped",
            PhaseState::Ready => "ready",
            PhaseState::Blocked => "blocked",
            PhaseState::Submitted(None) => "submitted",
            PhaseState::Submitted(Some(status)) => status.as_str(),
        }
    }
}

impl fmt::Display for PhaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Status of a phase whose action task is in `decision_state`.
///
/// Once the action task completed, its task group decides: any failure wins
/// over work still in progress.
pub fn aggregate_task_group(decision_state: TaskState, group: Option<&TaskGroup>) -> TcStatus {
    if decision_state != TaskState::Completed {
        return decision_state.into();
    }
    let Some(group) = group else {
        return decision_state.into();
    };

    if group.states().any(TaskState::is_error) {
        TcStatus::Warning
    } else if group.states().any(TaskState::is_in_progress) {
        TcStatus::Running
    } else if group.states().all(|state| state == TaskState::Completed) {
        TcStatus::Completed
    } else {
        decision_state.into()
    }
}

/// A phase that may be scheduled before its predecessor completes, provided
/// the anchor phase leading the release has completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdjacencyException {
    pub phase: &'static str,
    pub predecessor: &'static str,
    pub anchor: &'static str,
}

/// Firefox RC: `push_firefox` may run while `ship_firefox_rc` is pending,
/// once `promote_firefox_rc` is done.
pub const FIREFOX_RC_PUSH: AdjacencyException = AdjacencyException {
    phase: "push_firefox",
    predecessor: "ship_firefox_rc",
    anchor: "promote_firefox_rc",
};

const ADJACENCY_EXCEPTIONS: &[AdjacencyException] = &[FIREFOX_RC_PUSH];

impl AdjacencyException {
    fn applies(&self, phase: &str, earlier: &[(&str, PhaseState)]) -> bool {
        let (Some((predecessor, _)), Some((anchor, anchor_state))) = (earlier.last(), earlier.first())
        else {
            return false;
        };
        phase == self.phase
            && *predecessor == self.predecessor
            && *anchor == self.anchor
            && anchor_state.is_completed()
    }
}

/// Whether an unsubmitted phase can be scheduled now.
///
/// `earlier` holds the name and state of every phase before it, in order.
pub fn schedulable(phase: &str, earlier: &[(&str, PhaseState)], allow_phase_skipping: bool) -> bool {
    let Some((_, previous)) = earlier.last() else {
        return true;
    };

    allow_phase_skipping
        || previous.is_completed()
        || ADJACENCY_EXCEPTIONS
            .iter()
            .any(|exception| exception.applies(phase, earlier))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taskcluster::{TaskStatus, TaskStatusStructure};

    fn group(states: &[TaskState]) -> TaskGroup {
        TaskGroup {
            task_group_id: "G".into(),
            tasks: states
                .iter()
                .enumerate()
                .map(|(i, state)| TaskStatus {
                    status: TaskStatusStructure {
                        task_id: format!("T{}", i),
                        state: *state,
                    },
                })
                .collect(),
        }
    }

    const DONE: PhaseState = PhaseState::Submitted(Some(TcStatus::Completed));
    const RUNNING: PhaseState = PhaseState::Submitted(Some(TcStatus::Running));

    #[test]
    fn test_failure_outranks_running() {
        let g = group(&[TaskState::Running, TaskState::Failed, TaskState::Completed]);
        assert_eq!(
            aggregate_task_group(TaskState::Completed, Some(&g)),
            TcStatus::Warning
        );
        let g = group(&[TaskState::Exception]);
        assert_eq!(
            aggregate_task_group(TaskState::Completed, Some(&g)),
            TcStatus::Warning
        );
    }

    #[test]
    fn test_group_in_progress_and_completed() {
        let g = group(&[TaskState::Completed, TaskState::Unscheduled]);
        assert_eq!(
            aggregate_task_group(TaskState::Completed, Some(&g)),
            TcStatus::Running
        );
        let g = group(&[TaskState::Completed, TaskState::Completed]);
        assert_eq!(
            aggregate_task_group(TaskState::Completed, Some(&g)),
            TcStatus::Completed
        );
    }

    #[test]
    fn test_raw_state_when_decision_incomplete_or_group_missing() {
        let g = group(&[TaskState::Failed]);
        assert_eq!(
            aggregate_task_group(TaskState::Running, Some(&g)),
            TcStatus::Running
        );
        assert_eq!(
            aggregate_task_group(TaskState::Completed, None),
            TcStatus::Completed
        );
        assert_eq!(
            aggregate_task_group(TaskState::Exception, None),
            TcStatus::Exception
        );
    }

    #[test]
    fn test_adjacency_rule() {
        assert!(schedulable("promote", &[], false));
        assert!(schedulable("push", &[("promote", DONE)], false));
        assert!(!schedulable("push", &[("promote", RUNNING)], false));
        assert!(!schedulable("push", &[("promote", PhaseState::Ready)], false));
        assert!(!schedulable(
            "push",
            &[("promote", PhaseState::Submitted(None))],
            false
        ));
    }

    #[test]
    fn test_phase_skipping_makes_everything_ready() {
        let earlier = [("promote", PhaseState::Blocked), ("push", RUNNING)];
        assert!(schedulable("ship", &earlier, true));
    }

    #[test]
    fn test_firefox_rc_push_exception() {
        let earlier = [
            ("promote_firefox_rc", DONE),
            ("ship_firefox_rc", PhaseState::Ready),
        ];
        assert!(schedulable("push_firefox", &earlier, false));

        let earlier = [
            ("promote_firefox_rc", RUNNING),
            ("ship_firefox_rc", PhaseState::Blocked),
        ];
        assert!(!schedulable("push_firefox", &earlier, false));

        let earlier = [("promote_firefox", DONE), ("push_firefox", PhaseState::Ready)];
        assert!(!schedulable("ship_firefox", &earlier, false));
    }

    #[test]
    fn test_state_labels() {
        assert_eq!(PhaseState::Submitted(Some(TcStatus::Warning)).label(), "warning");
        assert_eq!(PhaseState::Submitted(None).label(), "submitted");
        assert!(DONE.is_completed());
        assert_eq!(RUNNING.tc_status(), Some(TcStatus::Running));
    }
}
