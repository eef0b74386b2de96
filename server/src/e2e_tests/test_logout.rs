//! Test logout.

use axum::http::StatusCode;

use crate::e2e_tests::helpers::*;

#[tokio::test]
async fn test_logout_expires_cookie() {
    let test = TestServer::new();
    test.register("bob@x.com", "bob01", "password123").await;
    let token = test.login("bob@x.com", "password123").await;

    let resp = test
        .send(with_cookie(get("/logout"), "_warden_auth", &token))
        .await;

    assert_eq!(resp.status, StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(resp.location(), Some("/"));
    assert_eq!(resp.cookie("_warden_auth").as_deref(), Some(""));
    let cookie = resp.set_cookie("_warden_auth").unwrap_or_default();
    assert!(cookie.contains("Max-Age=0"));
    assert!(cookie.contains("HttpOnly"));
}

#[tokio::test]
async fn test_logout_without_session() {
    let test = TestServer::new();

    let resp = test.send(get("/logout")).await;
    assert_eq!(resp.status, StatusCode::TEMPORARY_REDIRECT);
    assert!(resp.set_cookie("_warden_auth").is_some());
}
