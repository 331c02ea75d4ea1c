//! HTTP-level tests for the static file server

use std::path::Path;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use tempfile::TempDir;
use test_case::test_case;
use tower::ServiceExt;

use plusminus_web::StaticServer;

const SECRET: &str = "top secret, outside the root";

/// Lay out `<tmp>/site` as the served root with a secret file next to it.
fn fixture() -> (TempDir, StaticServer) {
    let tmp = tempfile::tempdir().unwrap();
    let site = tmp.path().join("site");
    std::fs::create_dir_all(site.join("plusminus")).unwrap();
    std::fs::create_dir_all(site.join("empty")).unwrap();
    std::fs::write(site.join("index.html"), "<h1>root</h1>").unwrap();
    std::fs::write(site.join("plusminus/index.html"), "<h1>plusminus</h1>").unwrap();
    std::fs::write(site.join("app.js"), "console.log(1);").unwrap();
    std::fs::write(tmp.path().join("secret.txt"), SECRET).unwrap();

    #[cfg(unix)]
    std::os::unix::fs::symlink(tmp.path().join("secret.txt"), site.join("leak.txt")).unwrap();

    let server = StaticServer::new(&site).unwrap();
    (tmp, server)
}

async fn get(server: &StaticServer, uri: &str) -> (StatusCode, Option<String>, String) {
    let response = server
        .router()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|v| v.to_str().unwrap().to_string());
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, content_type, String::from_utf8_lossy(&body).into_owned())
}

#[tokio::test]
async fn serves_index_for_directory_with_trailing_slash() {
    let (_tmp, server) = fixture();

    let (status, content_type, body) = get(&server, "/plusminus/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("text/html; charset=utf-8"));
    assert_eq!(body, "<h1>plusminus</h1>");

    let (status, _, body) = get(&server, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "<h1>root</h1>");
}

#[tokio::test]
async fn directory_without_trailing_slash_is_not_found() {
    let (_tmp, server) = fixture();
    let (status, _, _) = get(&server, "/plusminus").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = get(&server, "/empty/").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = get(&server, "/missing.css").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[test_case("/../secret.txt" ; "parent segment")]
#[test_case("/%2e%2e/secret.txt" ; "encoded parent")]
#[test_case("/%2e%2e%2fsecret.txt" ; "encoded parent and slash")]
#[test_case("/plusminus/..%2f..%2fsecret.txt" ; "nested encoded climb")]
#[test_case("/.%00./secret.txt" ; "nul split parent")]
#[tokio::test]
async fn traversal_is_rejected_without_disclosure(uri: &str) {
    let (_tmp, server) = fixture();
    let (status, _, body) = get(&server, uri).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!body.contains(SECRET));
}

#[cfg(unix)]
#[tokio::test]
async fn symlink_out_of_root_is_rejected() {
    let (_tmp, server) = fixture();
    let (status, _, body) = get(&server, "/leak.txt").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!body.contains(SECRET));
}

#[tokio::test]
async fn bound_server_uses_ephemeral_port_and_disables_caching() {
    let (_tmp, server) = fixture();
    let root: &Path = server.root();
    assert!(root.ends_with("site"));

    let handle = server.bind_loopback().await.unwrap();
    assert_ne!(handle.local_addr().port(), 0);
    assert!(handle.local_addr().ip().is_loopback());

    let response = reqwest::get(format!("{}/app.js?cache=bust", handle.base_url()))
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(
        response.headers()[reqwest::header::CACHE_CONTROL].to_str().unwrap(),
        "no-store"
    );
    assert_eq!(
        response.headers()[reqwest::header::CONTENT_TYPE].to_str().unwrap(),
        "text/javascript; charset=utf-8"
    );
    assert_eq!(response.text().await.unwrap(), "console.log(1);");

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/app.js", handle.base_url()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::METHOD_NOT_ALLOWED);

    handle.shutdown().await.unwrap();
}
