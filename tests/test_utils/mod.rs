//! Shared fixtures for integration tests.
//!
//! Every external service is a path prefix on a single wiremock server:
//! `/api` for the admin backend, `/public` for the public backend, `/hg`
//! for Mercurial repositories, `/raw` for raw GitHub files and `/tc` for the
//! task queue. GitHub repositories sit at the server root so that
//! `{root}/{owner}/{repo}` parses like a real GitHub URL; Mercurial wins
//! the host detection for anything under `/hg`.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::Duration;
use serde_json::{Value, json};
use shipit_admin::{
    api::ApiClient,
    auth::{Session, StaticTokenSource},
    taskcluster::TaskclusterClient,
    vcs::{VcsClient, VcsEndpoints},
};
use wiremock::MockServer;

pub const TEST_TOKEN: &str = "test-access-token";

/// API client with a static bearer token.
pub fn api_client(server: &MockServer) -> ApiClient {
    anonymous_api_client(server).with_session(Arc::new(Session::new(
        Arc::new(StaticTokenSource::new(TEST_TOKEN)),
        Duration::seconds(60),
    )))
}

/// API client without credentials.
pub fn anonymous_api_client(server: &MockServer) -> ApiClient {
    ApiClient::new(
        format!("{}/api", server.uri()),
        format!("{}/public", server.uri()),
    )
}

pub fn vcs_endpoints(server: &MockServer) -> VcsEndpoints {
    VcsEndpoints {
        hg_base_url: format!("{}/hg", server.uri()),
        github_base_url: server.uri(),
        github_raw_base_url: format!("{}/raw", server.uri()),
    }
}

pub fn vcs_client(server: &MockServer) -> VcsClient {
    VcsClient::new(vcs_endpoints(server), api_client(server))
}

pub fn taskcluster_client(server: &MockServer) -> TaskclusterClient {
    TaskclusterClient::new(format!("{}/tc", server.uri()))
}

/// Backend release payload with the given `(name, submitted, actionTaskId)` phases.
pub fn release_json(name: &str, phases: &[(&str, bool, Option<&str>)]) -> Value {
    json!({
        "name": name,
        "product": "firefox",
        "branch": "releases/mozilla-beta",
        "version": "79.0b9",
        "build_number": 1,
        "revision": "c045b4d5e8d5",
        "status": "scheduled",
        "allow_phase_skipping": false,
        "phases": phases
            .iter()
            .map(|(phase, submitted, task_id)| json!({
                "name": phase,
                "submitted": submitted,
                "skipped": false,
                "actionTaskId": task_id,
            }))
            .collect::<Vec<_>>(),
    })
}

pub fn github_repo(server: &MockServer, owner: &str, name: &str) -> String {
    format!("{}/{}/{}", server.uri(), owner, name)
}

/// Shipped release as listed by `GET /releases?status=shipped`.
pub fn shipped_json(version: &str, build_number: u32, revision: &str) -> Value {
    json!({
        "name": format!("Firefox-{}-build{}", version, build_number),
        "product": "firefox",
        "version": version,
        "build_number": build_number,
        "revision": revision,
        "status": "shipped",
        "phases": [],
    })
}

pub fn task_status_json(task_id: &str, state: &str) -> Value {
    json!({ "status": { "taskId": task_id, "state": state } })
}
