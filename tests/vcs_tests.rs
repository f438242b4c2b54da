use serde_json::json;
use shipit_admin::{ShipitError, error::ErrorClass, vcs::repo_url_builder};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{any, header, method, path, query_param},
};

mod test_utils;
use test_utils::{TEST_TOKEN, github_repo, vcs_client};

#[tokio::test]
async fn hg_pushes_take_tip_changesets_newest_first() {
    let server = MockServer::start().await;
    let repo = format!("{}/hg/releases/mozilla-beta", server.uri());

    Mock::given(method("GET"))
        .and(path("/hg/releases/mozilla-beta/json-pushes"))
        .and(query_param("version", "2"))
        .and(query_param("full", "1"))
        .and(query_param("tipsonly", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "lastpushid": 12,
            "pushes": {
                "11": {"date": 1590000000, "user": "a", "changesets": [
                    {"node": "aaa", "desc": "Bug 1 - older", "author": "A <a@example.com>"}
                ]},
                "12": {"date": 1590000500, "user": "b", "changesets": [
                    {"node": "bbb", "desc": "Bug 2 - newer", "author": "B <b@example.com>"}
                ]}
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let pushes = vcs_client(&server)
        .get_pushes(&repo, "releases/mozilla-beta")
        .await
        .unwrap();

    let nodes: Vec<_> = pushes.iter().map(|p| p.node.as_str()).collect();
    assert_eq!(nodes, vec!["bbb", "aaa"]);
    assert_eq!(pushes[0].desc, "Bug 2 - newer");
    assert_eq!(pushes[0].date.timestamp(), 1590000500);
}

#[tokio::test]
async fn github_pushes_go_through_backend_proxy() {
    let server = MockServer::start().await;
    let repo = github_repo(&server, "mozilla-mobile", "firefox-android");

    Mock::given(method("GET"))
        .and(path("/api/github/commits/mozilla-mobile/firefox-android/main"))
        .and(header("authorization", format!("Bearer {}", TEST_TOKEN).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "author": "dev",
                "committer_date": "2024-05-01T10:00:00Z",
                "message": "Bump version",
                "revision": "cafe01"
            }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let pushes = vcs_client(&server).get_pushes(&repo, "main").await.unwrap();
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0].node, "cafe01");
    assert_eq!(pushes[0].author, "dev");
}

#[tokio::test]
async fn version_is_trimmed_and_soft_fails_to_empty() {
    let server = MockServer::start().await;
    let repo = format!("{}/hg/releases/mozilla-beta", server.uri());

    Mock::given(method("GET"))
        .and(path(
            "/hg/releases/mozilla-beta/raw-file/abc123/browser/config/version_display.txt",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_string("79.0b9\n"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(
            "/hg/releases/mozilla-beta/raw-file/missing/browser/config/version_display.txt",
        ))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let vcs = vcs_client(&server);
    assert_eq!(
        vcs.get_version(&repo, "abc123", "browser", None).await.unwrap(),
        "79.0b9"
    );
    assert_eq!(
        vcs.get_version(&repo, "missing", "browser", None).await.unwrap(),
        ""
    );
}

#[tokio::test]
async fn github_version_file_override_uses_raw_host() {
    let server = MockServer::start().await;
    let repo = github_repo(&server, "mozilla-mobile", "firefox-android");

    Mock::given(method("GET"))
        .and(path("/raw/mozilla-mobile/firefox-android/cafe01/version.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("130.0\n"))
        .expect(1)
        .mount(&server)
        .await;

    let version = vcs_client(&server)
        .get_version(&repo, "cafe01", "mobile", Some("version.txt"))
        .await
        .unwrap();
    assert_eq!(version, "130.0");
}

#[tokio::test]
async fn locales_are_the_changeset_file_keys() {
    let server = MockServer::start().await;
    let repo = format!("{}/hg/releases/mozilla-release", server.uri());

    Mock::given(method("GET"))
        .and(path(
            "/hg/releases/mozilla-release/raw-file/abc123/browser/locales/l10n-changesets.json",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "de": {"revision": "default", "platforms": ["linux"]},
            "fr": {"revision": "default", "platforms": ["linux"]}
        })))
        .mount(&server)
        .await;

    let mut locales = vcs_client(&server)
        .get_locales(&repo, "abc123", "browser")
        .await
        .unwrap();
    locales.sort();
    assert_eq!(locales, vec!["de".to_string(), "fr".to_string()]);
}

#[tokio::test]
async fn unsupported_repositories_fail_without_network_calls() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let vcs = vcs_client(&server);
    let err = vcs
        .get_pushes("https://gitlab.example/org/repo", "main")
        .await
        .expect_err("unknown host");
    assert!(matches!(err, ShipitError::UnsupportedRepository(_)));
    assert_eq!(err.class(), ErrorClass::Unsupported);
    assert_eq!(err.to_string(), "Unsupported repo: https://gitlab.example/org/repo");

    let hg_repo = format!("{}/hg/releases/mozilla-beta", server.uri());
    let err = vcs.get_branches(&hg_repo).await.expect_err("hg has no branch listing");
    assert!(matches!(err, ShipitError::UnsupportedRepository(_)));
}

#[test]
fn repo_urls_link_to_the_hosting_ui() {
    assert_eq!(
        repo_url_builder("https://hg.mozilla.org/releases/mozilla-beta", "abc"),
        "https://hg.mozilla.org/releases/mozilla-beta/rev/abc"
    );
    assert_eq!(
        repo_url_builder("https://github.com/mozilla-mobile/firefox-android", "abc"),
        "https://github.com/mozilla-mobile/firefox-android/commit/abc"
    );
}
