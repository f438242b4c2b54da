//! Merge-day automation endpoints.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, info, instrument};

use super::client::{ApiClient, RequestOptions};
use super::releases::NO_QUERY;
use crate::error::Result;
use crate::inflight::InflightTracker;
use crate::models::merge_automation::{MergeBehaviorsResponse, RawMergeRevision};
use crate::models::{
    AutomationTaskStatus, MergeAutomation, MergeBehavior, MergeInfo, MergeRevision,
    NewMergeAutomation,
};

impl ApiClient {
    pub async fn get_merge_behaviors(&self, product: &str) -> Result<Vec<MergeBehavior>> {
        let path = format!("/merge-automation/behaviors/{}", product);
        let response: MergeBehaviorsResponse = self.get(&path, RequestOptions::AUTH).await?;
        Ok(response.into_behaviors())
    }

    /// Candidate revisions for a behavior, newest first.
    pub async fn get_merge_revisions(
        &self,
        product: &str,
        behavior: &str,
    ) -> Result<Vec<MergeRevision>> {
        let path = format!("/merge-automation/{}/{}", product, behavior);
        let raw: BTreeMap<String, RawMergeRevision> = self.get(&path, RequestOptions::AUTH).await?;

        let mut revisions: Vec<MergeRevision> = raw
            .into_iter()
            .map(|(revision, raw)| raw.into_revision(revision))
            .collect();
        revisions.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(revisions)
    }

    pub async fn get_merge_info(
        &self,
        product: &str,
        behavior: &str,
        revision: &str,
    ) -> Result<MergeInfo> {
        let path = format!("/merge-automation/{}/{}/{}", product, behavior, revision);
        self.get(&path, RequestOptions::AUTH).await
    }

    #[instrument(skip(self, automation), fields(product = %automation.product, behavior = %automation.behavior))]
    pub async fn submit_merge_automation(&self, automation: &NewMergeAutomation) -> Result<Value> {
        let response = self
            .post("/merge-automation", automation, RequestOptions::AUTH)
            .await?;
        info!(dry_run = automation.dry_run, "Merge automation submitted");
        Ok(response)
    }

    pub async fn get_merge_automations(&self, product: &str) -> Result<Vec<MergeAutomation>> {
        self.get_with_query(
            "/merge-automation",
            &[("product", product)],
            RequestOptions::AUTH,
        )
        .await
    }

    #[instrument(skip(self))]
    pub async fn cancel_merge_automation(&self, id: i64) -> Result<Value> {
        let path = format!("/merge-automation/{}", id);
        self.delete(&path, NO_QUERY, RequestOptions::AUTH).await
    }

    #[instrument(skip(self))]
    pub async fn start_merge_automation(&self, id: i64) -> Result<Value> {
        let path = format!("/merge-automation/{}/start", id);
        self.post(&path, &serde_json::json!({}), RequestOptions::AUTH)
            .await
    }

    pub async fn get_merge_automation_task_status(&self, id: i64) -> Result<AutomationTaskStatus> {
        let path = format!("/merge-automation/{}/task-status", id);
        self.get(&path, RequestOptions::AUTH).await
    }
}

/// Revision and revision-info lookups for the merge form.
///
/// Changing the selected behavior or revision starts a new lookup; answers
/// to the previous selection are discarded.
pub struct RevisionLookup {
    api: ApiClient,
    revisions: InflightTracker,
    info: InflightTracker,
}

impl RevisionLookup {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            revisions: InflightTracker::new(),
            info: InflightTracker::new(),
        }
    }

    /// `Ok(None)` when a newer revision lookup superseded this one.
    pub async fn revisions(
        &self,
        product: &str,
        behavior: &str,
    ) -> Result<Option<Vec<MergeRevision>>> {
        // A new behavior invalidates any revision-info lookup too.
        self.info.cancel();
        let result = self
            .revisions
            .run(self.api.get_merge_revisions(product, behavior))
            .await?;
        if result.is_none() {
            debug!(product, behavior, "Revision listing superseded");
        }
        Ok(result)
    }

    /// `Ok(None)` when a newer info lookup superseded this one.
    pub async fn info(
        &self,
        product: &str,
        behavior: &str,
        revision: &str,
    ) -> Result<Option<MergeInfo>> {
        let result = self
            .info
            .run(self.api.get_merge_info(product, behavior, revision))
            .await?;
        if result.is_none() {
            debug!(product, behavior, revision, "Revision info lookup superseded");
        }
        Ok(result)
    }

    pub fn cancel(&self) {
        self.revisions.cancel();
        self.info.cancel();
    }
}
