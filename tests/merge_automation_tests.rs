use std::time::Duration;

use serde_json::json;
use shipit_admin::{api::RevisionLookup, models::AutomationStatus};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path, query_param},
};

mod test_utils;
use test_utils::api_client;

#[tokio::test]
async fn revisions_are_listed_newest_first() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/merge-automation/firefox/main-to-beta"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "aaa": {"date": 1700000000, "author": "a", "desc": "older"},
            "bbb": {"date": 1700009000, "author": "b", "desc": "newer"}
        })))
        .mount(&server)
        .await;

    let revisions = api_client(&server)
        .get_merge_revisions("firefox", "main-to-beta")
        .await
        .unwrap();
    let ids: Vec<_> = revisions.iter().map(|r| r.revision.as_str()).collect();
    assert_eq!(ids, vec!["bbb", "aaa"]);
    assert_eq!(revisions[0].date.unwrap().timestamp(), 1700009000);
}

#[tokio::test]
async fn behaviors_accept_keyed_payloads() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/merge-automation/behaviors/firefox"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "main-to-beta": {"pretty_name": "Main to Beta"},
            "beta-to-release": {"pretty_name": "Beta to Release"}
        })))
        .mount(&server)
        .await;

    let behaviors = api_client(&server).get_merge_behaviors("firefox").await.unwrap();
    let names: Vec<_> = behaviors.iter().map(|b| b.behavior.as_str()).collect();
    assert_eq!(names, vec!["beta-to-release", "main-to-beta"]);
    assert_eq!(behaviors[1].pretty_name.as_deref(), Some("Main to Beta"));
}

#[tokio::test]
async fn automations_are_listed_per_product() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/merge-automation"))
        .and(query_param("product", "firefox"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": 12,
            "product": "firefox",
            "behavior": "main-to-beta",
            "revision": "abc",
            "dry_run": true,
            "status": "Canceled",
            "task_id": null
        }])))
        .mount(&server)
        .await;

    let automations = api_client(&server)
        .get_merge_automations("firefox")
        .await
        .unwrap();
    assert_eq!(automations.len(), 1);
    assert_eq!(automations[0].status, AutomationStatus::Canceled);
    assert!(automations[0].dry_run);
}

#[tokio::test]
async fn newer_revision_lookup_supersedes_older_one() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/merge-automation/firefox/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"old": {"date": 1}}))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/merge-automation/firefox/fast"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"new": {"date": 2}})))
        .mount(&server)
        .await;

    let lookup = RevisionLookup::new(api_client(&server));
    let (stale, fresh) = tokio::join!(lookup.revisions("firefox", "slow"), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        lookup.revisions("firefox", "fast").await
    });

    assert!(stale.unwrap().is_none());
    let fresh = fresh.unwrap().expect("latest lookup wins");
    assert_eq!(fresh[0].revision, "new");
}

#[tokio::test]
async fn submit_posts_camel_case_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/merge-automation"))
        .and(wiremock::matchers::body_json(json!({
            "product": "firefox",
            "behavior": "main-to-beta",
            "revision": "abc",
            "dryRun": true,
            "version": "80.0a1",
            "commitMessage": "Bug 1 - bump",
            "commitAuthor": "dev"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 5})))
        .expect(1)
        .mount(&server)
        .await;

    let created = api_client(&server)
        .submit_merge_automation(&shipit_admin::models::NewMergeAutomation {
            product: "firefox".to_string(),
            behavior: "main-to-beta".to_string(),
            revision: "abc".to_string(),
            dry_run: true,
            version: "80.0a1".to_string(),
            commit_message: "Bug 1 - bump".to_string(),
            commit_author: "dev".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(created["id"], 5);
}
