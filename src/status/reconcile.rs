//! Release reconciliation: sign-offs, task status and schedulability for
//! every phase of a release.

use metrics::counter;
use serde::Serialize;
use tracing::{debug, instrument};

use super::{PhaseState, TcStatus, aggregate_task_group, schedulable};
use crate::api::{ApiClient, RequestOptions};
use crate::error::Result;
use crate::fanout::join_ordered;
use crate::models::{Phase, Release, ReleaseKind, ReleaseParams, Signoff};
use crate::taskcluster::{TaskState, TaskclusterClient};

/// A phase together with its sign-offs and computed state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciledPhase {
    #[serde(flatten)]
    pub phase: Phase,
    pub signoffs: Vec<Signoff>,
    pub state: PhaseState,
}

impl ReconciledPhase {
    pub fn tc_status(&self) -> Option<TcStatus> {
        self.state.tc_status()
    }

    /// Sign-off is required before the phase can proceed.
    pub fn needs_signoff(&self) -> bool {
        !self.signoffs.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciledRelease {
    pub release: Release,
    pub phases: Vec<ReconciledPhase>,
}

/// Rebuilds phase state from the backend and the task queue on every call.
#[derive(Clone)]
pub struct Reconciler {
    api: ApiClient,
    taskcluster: TaskclusterClient,
}

impl Reconciler {
    pub fn new(api: ApiClient, taskcluster: TaskclusterClient) -> Self {
        Self { api, taskcluster }
    }

    /// Sign-off errors propagate; task lookups degrade to "no status".
    #[instrument(skip(self, release), fields(release = %release.name))]
    pub async fn reconcile_release(&self, release: Release) -> Result<ReconciledRelease> {
        let kind = release.kind();

        let signoff_lookups = release.phases.iter().map(|phase| {
            let api = self.api.clone();
            let release_name = release.name.clone();
            let phase_name = phase.name.clone();
            async move {
                api.get_phase_signoffs(kind, &release_name, &phase_name)
                    .await
            }
        });

        let status_lookups = release.phases.iter().map(|phase| {
            let taskcluster = self.taskcluster.clone();
            let task_id = phase
                .action_task_id
                .clone()
                .filter(|id| phase.submitted && !phase.skipped && !id.is_empty());
            async move {
                Ok(match task_id {
                    Some(task_id) => phase_tc_status(&taskcluster, &task_id).await,
                    None => None,
                })
            }
        });

        let (signoffs, statuses) =
            tokio::try_join!(join_ordered(signoff_lookups), join_ordered(status_lookups))?;

        let states = compute_states(&release.phases, &statuses, release.allow_phase_skipping);
        let phases = release
            .phases
            .iter()
            .cloned()
            .zip(signoffs)
            .zip(states)
            .map(|((phase, signoffs), state)| ReconciledPhase {
                phase,
                signoffs,
                state,
            })
            .collect();

        counter!("shipit_releases_reconciled_total").increment(1);
        Ok(ReconciledRelease { release, phases })
    }

    /// List releases matching `params` and reconcile each one concurrently.
    #[instrument(skip(self))]
    pub async fn pending_releases(
        &self,
        params: &ReleaseParams,
        kind: ReleaseKind,
    ) -> Result<Vec<ReconciledRelease>> {
        // Pending XPI releases are only listed by the admin API.
        let options = match kind {
            ReleaseKind::Product => RequestOptions::PUBLIC,
            ReleaseKind::Xpi => RequestOptions::ANONYMOUS,
        };
        let releases = self.api.get_releases_with(params, kind, options).await?;
        debug!(count = releases.len(), "Reconciling releases");

        let reconciliations = releases.into_iter().map(|release| {
            let reconciler = self.clone();
            async move { reconciler.reconcile_release(release).await }
        });
        join_ordered(reconciliations).await
    }

    pub async fn pending_releases_for_product_branches(
        &self,
        pairs: &[(String, String)],
    ) -> Result<Vec<ReconciledRelease>> {
        let lookups = pairs.iter().map(|(product, branch)| {
            let reconciler = self.clone();
            let params = ReleaseParams::default().for_product_branch(product, branch);
            async move {
                reconciler
                    .pending_releases(&params, ReleaseKind::Product)
                    .await
            }
        });
        Ok(join_ordered(lookups).await?.into_iter().flatten().collect())
    }
}

/// Task-derived status of a phase, or `None` when its task is gone.
async fn phase_tc_status(taskcluster: &TaskclusterClient, task_id: &str) -> Option<TcStatus> {
    let status = taskcluster.task_status(task_id).await?;
    let group = if status.state() == TaskState::Completed {
        taskcluster.task_group(task_id).await
    } else {
        None
    };
    Some(aggregate_task_group(status.state(), group.as_ref()))
}

/// Walk phases in order, deciding each one from the phases before it.
pub(crate) fn compute_states(
    phases: &[Phase],
    statuses: &[Option<TcStatus>],
    allow_phase_skipping: bool,
) -> Vec<PhaseState> {
    let mut earlier: Vec<(&str, PhaseState)> = Vec::with_capacity(phases.len());

    for (phase, tc_status) in phases.iter().zip(statuses) {
        let state = if phase.skipped {
            PhaseState::Skipped
        } else if phase.submitted {
            PhaseState::Submitted(*tc_status)
        } else if schedulable(&phase.name, &earlier, allow_phase_skipping) {
            PhaseState::Ready
        } else {
            PhaseState::Blocked
        };
        earlier.push((phase.name.as_str(), state));
    }

    earlier.into_iter().map(|(_, state)| state).collect()
}
