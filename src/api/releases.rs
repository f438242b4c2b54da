//! Release backend endpoints: releases, phases, sign-offs, product toggles
//! and the GitHub proxy.

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, instrument};

use super::client::{ApiClient, RequestOptions};
use crate::error::{Result, ShipitError};
use crate::fanout::join_ordered;
use crate::models::release::SignoffsResponse;
use crate::models::{
    DisabledProducts, NewRelease, NewXpiRelease, Release, ReleaseKind, ReleaseParams, Signoff,
};
use crate::vcs::github::{Branch, Commit};

/// Status filter covering every build number already taken.
pub const TAKEN_BUILD_STATUSES: &str = "shipped,aborted,scheduled";

pub(crate) const NO_QUERY: &[(&str, &str)] = &[];

/// Default number of recent releases listed per product branch.
pub const DEFAULT_RECENT_LIMIT: usize = 4;

/// An XPI listed in the manifest repository.
#[derive(Debug, Clone, PartialEq, Deserialize, serde::Serialize)]
pub struct XpiSource {
    pub xpi_name: String,
    pub revision: String,
    pub branch: String,
    pub owner: String,
    pub repo: String,
    #[serde(default)]
    pub manifest_revision: Option<String>,
    #[serde(default)]
    pub directory: Option<String>,
    #[serde(rename = "addon-type", default)]
    pub addon_type: Option<String>,
    #[serde(default)]
    pub install_type: Option<String>,
}

#[derive(Deserialize)]
struct XpisResponse {
    #[serde(default)]
    xpis: Vec<XpiSource>,
}

#[derive(Deserialize)]
struct PackageJson {
    version: String,
}

impl ApiClient {
    /// List releases, newest first.
    #[instrument(skip(self))]
    pub async fn get_releases(
        &self,
        params: &ReleaseParams,
        kind: ReleaseKind,
    ) -> Result<Vec<Release>> {
        self.get_releases_with(params, kind, RequestOptions::PUBLIC)
            .await
    }

    /// Like [`get_releases`](Self::get_releases), routed by `options`.
    pub async fn get_releases_with(
        &self,
        params: &ReleaseParams,
        kind: ReleaseKind,
        options: RequestOptions,
    ) -> Result<Vec<Release>> {
        let mut releases: Vec<Release> = self
            .get_with_query(kind.releases_path(), params, options)
            .await?;
        releases.reverse();
        Ok(releases)
    }

    pub async fn get_build_numbers(&self, product: &str, version: &str) -> Result<Vec<u32>> {
        let params = ReleaseParams {
            product: Some(product.to_string()),
            version: Some(version.to_string()),
            status: Some(TAKEN_BUILD_STATUSES.to_string()),
            ..ReleaseParams::default()
        };
        let releases = self.get_releases(&params, ReleaseKind::Product).await?;
        Ok(releases.iter().map(|r| r.build_number).collect())
    }

    pub async fn get_xpi_build_numbers(&self, xpi_name: &str, xpi_version: &str) -> Result<Vec<u32>> {
        let params = ReleaseParams {
            xpi_name: Some(xpi_name.to_string()),
            xpi_version: Some(xpi_version.to_string()),
            status: Some(TAKEN_BUILD_STATUSES.to_string()),
            ..ReleaseParams::default()
        };
        let releases = self.get_releases(&params, ReleaseKind::Xpi).await?;
        Ok(releases.iter().map(|r| r.build_number).collect())
    }

    /// Shipped releases of a product branch, optionally narrowed to one build.
    pub async fn get_shipped_releases(
        &self,
        product: &str,
        branch: &str,
        version: Option<&str>,
        build_number: Option<u32>,
    ) -> Result<Vec<Release>> {
        let params = ReleaseParams {
            version: version.map(str::to_string),
            build_number,
            ..ReleaseParams::with_status("shipped")
        }
        .for_product_branch(product, branch);
        self.get_releases(&params, ReleaseKind::Product).await
    }

    /// Query every `(product, branch)` pair concurrently and flatten the results.
    ///
    /// `limit` caps the number of releases kept per pair.
    pub async fn get_releases_for_product_branches(
        &self,
        pairs: &[(String, String)],
        params: &ReleaseParams,
        limit: Option<usize>,
    ) -> Result<Vec<Release>> {
        let lookups = pairs.iter().map(|(product, branch)| {
            let client = self.clone();
            let params = params.clone().for_product_branch(product, branch);
            async move {
                let mut releases = client.get_releases(&params, ReleaseKind::Product).await?;
                if let Some(limit) = limit {
                    releases.truncate(limit);
                }
                Ok::<_, ShipitError>(releases)
            }
        });

        Ok(join_ordered(lookups).await?.into_iter().flatten().collect())
    }

    pub async fn get_recent_releases(
        &self,
        pairs: &[(String, String)],
        limit: usize,
    ) -> Result<Vec<Release>> {
        self.get_releases_for_product_branches(
            pairs,
            &ReleaseParams::with_status("shipped"),
            Some(limit),
        )
        .await
    }

    pub async fn get_recent_xpi_releases(&self, limit: usize) -> Result<Vec<Release>> {
        let mut releases = self
            .get_releases(&ReleaseParams::with_status("shipped"), ReleaseKind::Xpi)
            .await?;
        releases.truncate(limit);
        Ok(releases)
    }

    #[instrument(skip(self, release), fields(product = %release.product, version = %release.version))]
    pub async fn submit_release(&self, release: &NewRelease) -> Result<Value> {
        let created = self
            .post("/releases", release, RequestOptions::AUTH)
            .await?;
        info!(build_number = release.build_number, "Release submitted");
        Ok(created)
    }

    #[instrument(skip(self, release), fields(xpi_name = %release.xpi_name))]
    pub async fn submit_xpi_release(&self, release: &NewXpiRelease) -> Result<Value> {
        let created = self
            .post("/xpi/releases", release, RequestOptions::AUTH)
            .await?;
        info!(build_number = release.build_number, "XPI release submitted");
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn schedule_phase(
        &self,
        kind: ReleaseKind,
        release: &str,
        phase: &str,
    ) -> Result<Value> {
        let path = format!("{}/{}/{}", kind.releases_path(), release, phase);
        self.put(&path, &serde_json::json!({}), RequestOptions::AUTH)
            .await
    }

    #[instrument(skip(self))]
    pub async fn cancel_release(&self, kind: ReleaseKind, release: &str) -> Result<Value> {
        let path = format!("{}/{}", kind.releases_path(), release);
        self.delete(&path, NO_QUERY, RequestOptions::AUTH).await
    }

    pub async fn get_phase_signoffs(
        &self,
        kind: ReleaseKind,
        release: &str,
        phase: &str,
    ) -> Result<Vec<Signoff>> {
        let path = format!("{}/{}/{}", kind.signoff_path(), release, phase);
        let response: SignoffsResponse = self.get(&path, RequestOptions::ANONYMOUS).await?;
        Ok(response.signoffs)
    }

    /// Sign off a phase. The body is the sign-off UID as a JSON string.
    #[instrument(skip(self))]
    pub async fn phase_signoff(
        &self,
        kind: ReleaseKind,
        release: &str,
        phase: &str,
        uid: &str,
    ) -> Result<Value> {
        let path = format!("{}/{}/{}", kind.signoff_path(), release, phase);
        self.put(&path, uid, RequestOptions::AUTH).await
    }

    pub async fn get_disabled_products(&self) -> Result<DisabledProducts> {
        self.get("/disabled-products", RequestOptions::PUBLIC).await
    }

    #[instrument(skip(self))]
    pub async fn disable_product(&self, product: &str, branch: &str) -> Result<Value> {
        let body = serde_json::json!({ "product": product, "branch": branch });
        self.post("/disabled-products", &body, RequestOptions::AUTH)
            .await
    }

    #[instrument(skip(self))]
    pub async fn enable_product(&self, product: &str, branch: &str) -> Result<Value> {
        self.delete(
            "/disabled-products",
            &[("product", product), ("branch", branch)],
            RequestOptions::AUTH,
        )
        .await
    }

    pub async fn rebuild_product_details(&self) -> Result<Value> {
        self.post("/product-details", &serde_json::json!({}), RequestOptions::AUTH)
            .await
    }

    pub async fn github_commits(&self, owner: &str, repo: &str, branch: &str) -> Result<Vec<Commit>> {
        let path = format!("/github/commits/{}/{}/{}", owner, repo, branch);
        self.get(&path, RequestOptions::AUTH).await
    }

    pub async fn github_branches(&self, owner: &str, repo: &str) -> Result<Vec<Branch>> {
        let path = format!("/github/branches/{}/{}", owner, repo);
        self.get(&path, RequestOptions::AUTH).await
    }

    /// `version` field of the XPI's `package.json` at `revision`.
    pub async fn github_package_version(
        &self,
        owner: &str,
        repo: &str,
        revision: &str,
    ) -> Result<String> {
        let path = format!("/github/package_json/{}/{}/{}", owner, repo, revision);
        let package: PackageJson = self.get(&path, RequestOptions::AUTH).await?;
        Ok(package.version)
    }

    /// Active XPIs declared by the manifest repository at `revision`.
    pub async fn github_xpis(&self, owner: &str, repo: &str, revision: &str) -> Result<Vec<XpiSource>> {
        let path = format!("/github/xpis/{}/{}/{}", owner, repo, revision);
        let response: XpisResponse = self.get(&path, RequestOptions::AUTH).await?;
        Ok(response.xpis)
    }
}
