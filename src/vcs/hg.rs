//! Mercurial push-log helpers.

use std::collections::BTreeMap;

use chrono::DateTime;
use serde::Deserialize;

use super::Push;
use crate::error::{Result, ShipitError};

#[derive(Debug, Deserialize)]
struct PushLog {
    /// Keyed by push id; numeric keys so the map orders pushes by id
    pushes: BTreeMap<u64, HgPush>,
}

#[derive(Debug, Deserialize)]
struct HgPush {
    /// Epoch seconds
    date: i64,
    #[serde(default)]
    changesets: Vec<HgChangeset>,
}

#[derive(Debug, Deserialize)]
struct HgChangeset {
    node: String,
    #[serde(default)]
    desc: String,
    #[serde(default)]
    author: String,
}

pub fn pushes_url(repo: &str) -> String {
    format!("{}/json-pushes?version=2&full=1&tipsonly=1", repo)
}

pub fn raw_file_url(repo: &str, revision: &str, path: &str) -> String {
    format!("{}/raw-file/{}/{}", repo, revision, path)
}

/// Tip changeset of every push, newest push first.
pub fn parse_pushes(body: &str) -> Result<Vec<Push>> {
    let log: PushLog = serde_json::from_str(body)?;
    let mut pushes = Vec::with_capacity(log.pushes.len());

    for (push_id, push) in log.pushes.into_iter().rev() {
        let Some(tip) = push.changesets.into_iter().next() else {
            continue;
        };
        let date = DateTime::from_timestamp(push.date, 0).ok_or_else(|| {
            ShipitError::Invalid(format!("push {} has an invalid date {}", push_id, push.date))
        })?;
        pushes.push(Push {
            node: tip.node,
            date,
            desc: tip.desc,
            author: tip.author,
        });
    }

    Ok(pushes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pushes_are_ordered_by_numeric_id() {
        // "9" sorts after "10" as a string; push ids must compare as numbers.
        let body = r#"{
            "lastpushid": 10,
            "pushes": {
                "9": {"date": 1590000000, "user": "a", "changesets": [
                    {"node": "nine", "desc": "Bug 9", "author": "A <a@example.com>"}
                ]},
                "10": {"date": 1590000100, "user": "b", "changesets": [
                    {"node": "ten", "desc": "Bug 10", "author": "B <b@example.com>"},
                    {"node": "ignored", "desc": "", "author": ""}
                ]},
                "8": {"date": 1589990000, "user": "c", "changesets": []}
            }
        }"#;

        let pushes = parse_pushes(body).unwrap();
        let nodes: Vec<_> = pushes.iter().map(|p| p.node.as_str()).collect();
        assert_eq!(nodes, vec!["ten", "nine"]);
        assert_eq!(pushes[0].date.timestamp(), 1590000100);
        assert_eq!(pushes[0].author, "B <b@example.com>");
    }
}
