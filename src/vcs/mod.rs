//! # VCS Adapter
//!
//! Uniform access to push history, in-tree files and branch lists across
//! the two supported hosts. The host is decided from the repository URL
//! before any request is made; unknown hosts fail fast with
//! [`ShipitError::UnsupportedRepository`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::api::client::{ApiClient, check_status};
use crate::config::AppConfig;
use crate::error::{Result, ShipitError};

pub mod github;
pub mod hg;

pub use github::Branch;

/// Base URLs used to classify repositories and build raw-file URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VcsEndpoints {
    pub hg_base_url: String,
    pub github_base_url: String,
    pub github_raw_base_url: String,
}

impl Default for VcsEndpoints {
    fn default() -> Self {
        Self {
            hg_base_url: "https://hg.mozilla.org".to_string(),
            github_base_url: "https://github.com".to_string(),
            github_raw_base_url: "https://raw.githubusercontent.com".to_string(),
        }
    }
}

impl VcsEndpoints {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            hg_base_url: config.hg_base_url.clone(),
            github_base_url: config.github_base_url.clone(),
            github_raw_base_url: config.github_raw_base_url.clone(),
        }
    }

    fn hg_prefix(&self) -> String {
        format!("{}/", self.hg_base_url.trim_end_matches('/'))
    }

    fn github_prefix(&self) -> String {
        format!("{}/", self.github_base_url.trim_end_matches('/'))
    }
}

/// Hosting backend of a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoHost {
    Mercurial,
    GitHub,
}

impl RepoHost {
    pub fn detect(repo: &str, endpoints: &VcsEndpoints) -> Result<Self> {
        if repo.starts_with(&endpoints.hg_prefix()) {
            Ok(RepoHost::Mercurial)
        } else if repo.starts_with(&endpoints.github_prefix()) {
            Ok(RepoHost::GitHub)
        } else {
            Err(ShipitError::UnsupportedRepository(repo.to_string()))
        }
    }
}

/// A push (or commit) on a branch, newest first in listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Push {
    pub node: String,
    pub date: DateTime<Utc>,
    pub desc: String,
    pub author: String,
}

/// Link to a revision in the hosting service's web UI.
pub fn repo_url_builder(repo: &str, revision: &str) -> String {
    if repo.contains("hg") {
        format!("{}/rev/{}", repo, revision)
    } else {
        format!("{}/commit/{}", repo, revision)
    }
}

/// VCS client. GitHub lookups go through the backend's proxy endpoints.
#[derive(Clone)]
pub struct VcsClient {
    http: reqwest::Client,
    endpoints: VcsEndpoints,
    api: ApiClient,
}

impl VcsClient {
    pub fn new(endpoints: VcsEndpoints, api: ApiClient) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoints,
            api,
        }
    }

    pub fn endpoints(&self) -> &VcsEndpoints {
        &self.endpoints
    }

    /// Latest pushes on `branch`, newest first.
    #[instrument(skip(self))]
    pub async fn get_pushes(&self, repo: &str, branch: &str) -> Result<Vec<Push>> {
        match RepoHost::detect(repo, &self.endpoints)? {
            RepoHost::Mercurial => {
                let url = hg::pushes_url(repo);
                let response = check_status(self.http.get(&url).send().await?).await?;
                let body = response.text().await?;
                hg::parse_pushes(&body)
            }
            RepoHost::GitHub => {
                let (owner, name) = github::owner_and_name(repo)?;
                github::get_commits(&self.api, &owner, &name, branch).await
            }
        }
    }

    /// In-tree display version, or an empty string when the file cannot be read.
    #[instrument(skip(self))]
    pub async fn get_version(
        &self,
        repo: &str,
        revision: &str,
        app_name: &str,
        version_file: Option<&str>,
    ) -> Result<String> {
        let default_path = format!("{}/config/version_display.txt", app_name);
        let path = version_file.unwrap_or(&default_path);
        let url = self.raw_file_url(repo, revision, path)?;

        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            debug!(status = response.status().as_u16(), %url, "Version file unavailable");
            return Ok(String::new());
        }
        Ok(response.text().await?.trim().to_string())
    }

    /// Locales listed in the in-tree l10n changesets file.
    #[instrument(skip(self))]
    pub async fn get_locales(
        &self,
        repo: &str,
        revision: &str,
        app_name: &str,
    ) -> Result<Vec<String>> {
        let path = format!("{}/locales/l10n-changesets.json", app_name);
        let url = self.raw_file_url(repo, revision, &path)?;

        let response = check_status(self.http.get(&url).send().await?).await?;
        let locales: serde_json::Map<String, serde_json::Value> = response.json().await?;
        Ok(locales.into_iter().map(|(locale, _)| locale).collect())
    }

    /// Recently active branches of a GitHub repository.
    #[instrument(skip(self))]
    pub async fn get_branches(&self, repo: &str) -> Result<Vec<Branch>> {
        match RepoHost::detect(repo, &self.endpoints)? {
            RepoHost::GitHub => {
                let (owner, name) = github::owner_and_name(repo)?;
                let branches = github::list_branches(&self.api, &owner, &name).await?;
                Ok(github::select_recent_branches(branches, Utc::now()))
            }
            RepoHost::Mercurial => Err(ShipitError::UnsupportedRepository(repo.to_string())),
        }
    }

    /// URL of a file at a given revision.
    pub fn raw_file_url(&self, repo: &str, revision: &str, path: &str) -> Result<String> {
        match RepoHost::detect(repo, &self.endpoints)? {
            RepoHost::Mercurial => Ok(hg::raw_file_url(repo, revision, path)),
            RepoHost::GitHub => {
                let (owner, name) = github::owner_and_name(repo)?;
                Ok(format!(
                    "{}/{}/{}/{}/{}",
                    self.endpoints.github_raw_base_url.trim_end_matches('/'),
                    owner,
                    name,
                    revision,
                    path
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_hosts() {
        let endpoints = VcsEndpoints::default();
        assert_eq!(
            RepoHost::detect("https://hg.mozilla.org/releases/mozilla-beta", &endpoints).unwrap(),
            RepoHost::Mercurial
        );
        assert_eq!(
            RepoHost::detect("https://github.com/mozilla-mobile/firefox-android", &endpoints)
                .unwrap(),
            RepoHost::GitHub
        );
        for repo in [
            "https://gitlab.com/org/repo",
            "https://hg.mozilla.org.evil.example/x",
            "http://hg.mozilla.org/try",
        ] {
            assert!(matches!(
                RepoHost::detect(repo, &endpoints),
                Err(ShipitError::UnsupportedRepository(_))
            ));
        }
    }

    #[test]
    fn test_repo_url_builder() {
        assert_eq!(
            repo_url_builder(
                "https://hg.mozilla.org/try",
                "c045b4d5e8d5a7f4d3b4f6e2"
            ),
            "https://hg.mozilla.org/try/rev/c045b4d5e8d5a7f4d3b4f6e2"
        );
        assert_eq!(
            repo_url_builder("https://github.com/org/repo", "23de0da7b8a1"),
            "https://github.com/org/repo/commit/23de0da7b8a1"
        );
    }

    #[test]
    fn test_raw_file_urls() {
        let client = VcsClient::new(
            VcsEndpoints::default(),
            ApiClient::new("https://api.example", "https://public.example"),
        );
        assert_eq!(
            client
                .raw_file_url(
                    "https://hg.mozilla.org/releases/mozilla-beta",
                    "abc",
                    "browser/config/version_display.txt"
                )
                .unwrap(),
            "https://hg.mozilla.org/releases/mozilla-beta/raw-file/abc/browser/config/version_display.txt"
        );
        assert_eq!(
            client
                .raw_file_url(
                    "https://github.com/mozilla-mobile/firefox-android",
                    "def",
                    "version.txt"
                )
                .unwrap(),
            "https://raw.githubusercontent.com/mozilla-mobile/firefox-android/def/version.txt"
        );
    }
}
