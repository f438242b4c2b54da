//! GitHub repositories, reached through the backend's `/github/*` proxy.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use super::Push;
use crate::api::client::ApiClient;
use crate::error::{Result, ShipitError};

/// Branches always kept regardless of age.
pub const RECENT_BRANCH_COUNT: usize = 10;
/// Older branches are kept if committed to within this many days.
pub const RECENT_BRANCH_DAYS: i64 = 14;

/// Commit as returned by `/github/commits/{owner}/{repo}/{branch}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub author: String,
    pub committer_date: DateTime<Utc>,
    pub message: String,
    pub revision: String,
}

impl From<Commit> for Push {
    fn from(commit: Commit) -> Self {
        Push {
            node: commit.revision,
            date: commit.committer_date,
            desc: commit.message,
            author: commit.author,
        }
    }
}

/// Branch as returned by `/github/branches/{owner}/{repo}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub name: String,
    pub committer_date: DateTime<Utc>,
}

/// Split `https://github.com/<owner>/<repo>[.git]` into its owner and name.
pub fn owner_and_name(repo: &str) -> Result<(String, String)> {
    let url = Url::parse(repo)?;
    let mut segments = url
        .path_segments()
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty());

    match (segments.next(), segments.next()) {
        (Some(owner), Some(name)) => Ok((
            owner.to_string(),
            name.trim_end_matches(".git").to_string(),
        )),
        _ => Err(ShipitError::UnsupportedRepository(repo.to_string())),
    }
}

pub(crate) async fn get_commits(
    api: &ApiClient,
    owner: &str,
    name: &str,
    branch: &str,
) -> Result<Vec<Push>> {
    let commits = api.github_commits(owner, name, branch).await?;
    Ok(commits.into_iter().map(Push::from).collect())
}

pub(crate) async fn list_branches(api: &ApiClient, owner: &str, name: &str) -> Result<Vec<Branch>> {
    api.github_branches(owner, name).await
}

/// Newest branches first: the top [`RECENT_BRANCH_COUNT`] plus any other
/// branch committed to within [`RECENT_BRANCH_DAYS`] of `now`.
pub fn select_recent_branches(mut branches: Vec<Branch>, now: DateTime<Utc>) -> Vec<Branch> {
    branches.sort_by(|a, b| b.committer_date.cmp(&a.committer_date));
    let cutoff = now - Duration::days(RECENT_BRANCH_DAYS);

    branches
        .into_iter()
        .enumerate()
        .filter(|(idx, branch)| *idx < RECENT_BRANCH_COUNT || branch.committer_date >= cutoff)
        .map(|(_, branch)| branch)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn branch(name: &str, days_ago: i64, now: DateTime<Utc>) -> Branch {
        Branch {
            name: name.to_string(),
            committer_date: now - Duration::days(days_ago),
        }
    }

    #[test]
    fn test_owner_and_name() {
        assert_eq!(
            owner_and_name("https://github.com/mozilla-mobile/firefox-android").unwrap(),
            ("mozilla-mobile".to_string(), "firefox-android".to_string())
        );
        assert_eq!(
            owner_and_name("https://github.com/mozilla-extensions/xpi-manifest.git").unwrap(),
            ("mozilla-extensions".to_string(), "xpi-manifest".to_string())
        );
        assert!(owner_and_name("https://github.com/lonely").is_err());
    }

    #[test]
    fn test_select_recent_branches() {
        let now = Utc::now();
        // 12 fresh branches, then two stale ones.
        let mut branches: Vec<Branch> = (0..12)
            .map(|i| branch(&format!("fresh-{}", i), i, now))
            .collect();
        branches.push(branch("stale-a", 30, now));
        branches.push(branch("stale-b", 60, now));
        branches.reverse();

        let selected = select_recent_branches(branches, now);
        assert_eq!(selected.len(), 12);
        assert_eq!(selected[0].name, "fresh-0");
        assert!(selected.iter().all(|b| !b.name.starts_with("stale")));
    }

    #[test]
    fn test_select_keeps_top_ten_even_when_old() {
        let now = Utc::now();
        let branches: Vec<Branch> = (0..15)
            .map(|i| branch(&format!("old-{}", i), 100 + i, now))
            .collect();

        let selected = select_recent_branches(branches, now);
        assert_eq!(selected.len(), RECENT_BRANCH_COUNT);
        assert_eq!(selected[0].name, "old-0");
        assert_eq!(selected[9].name, "old-9");
    }
}
