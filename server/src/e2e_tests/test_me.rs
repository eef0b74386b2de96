//! Test the session-protected `/me` routes.

use axum::http::{Method, StatusCode};
use serde_json::json;

use crate::e2e_tests::helpers::*;

#[tokio::test]
async fn test_me_requires_token() {
    let test = TestServer::new();

    let resp = test.send(get("/me")).await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.code(), "missing_auth");

    let resp = test.send(with_bearer(get("/me"), "garbage")).await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.code(), "invalid_token");
}

#[tokio::test]
async fn test_me_with_bearer_or_cookie() {
    let test = TestServer::new();
    let user = test.register("bob@x.com", "bob01", "password123").await;
    let token = test.login("bob@x.com", "password123").await;

    let resp = test.send(with_bearer(get("/me"), &token)).await;
    assert_eq!(resp.status, StatusCode::OK);
    let body = resp.json();
    assert_eq!(body["id"], user.id.as_str());
    assert_eq!(body["username"], "bob01");
    assert!(body.get("pwd_hash").is_none());
    assert!(body.get("verify_token").is_none());

    let resp = test
        .send(with_cookie(get("/me"), "_warden_auth", &token))
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["id"], user.id.as_str());
}

#[tokio::test]
async fn test_me_bearer_wins_over_cookie() {
    let test = TestServer::new();
    test.register("bob@x.com", "bob01", "password123").await;
    let token = test.login("bob@x.com", "password123").await;

    let resp = test
        .send(with_bearer(
            with_cookie(get("/me"), "_warden_auth", &token),
            "garbage",
        ))
        .await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_update_me_replaces_data() {
    let test = TestServer::new();
    let user = test.register("bob@x.com", "bob01", "password123").await;
    let token = test.login("bob@x.com", "password123").await;

    let resp = test
        .send(with_bearer(
            json_request(Method::PATCH, "/me", &json!({ "theme": "dark", "age": 7 })),
            &token,
        ))
        .await;
    assert_eq!(resp.status, StatusCode::OK, "{}", resp.text());
    assert_eq!(resp.json()["data"], json!({ "theme": "dark", "age": 7 }));

    let stored = test.stored_user(&user.id).await;
    assert_eq!(stored.data.get("theme"), Some(&json!("dark")));

    let resp = test
        .send(json_request(Method::PATCH, "/me", &json!({ "theme": "light" })))
        .await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_change_password() {
    let test = TestServer::new();
    test.register("bob@x.com", "bob01", "password123").await;
    let token = test.login("bob@x.com", "password123").await;

    let resp = test
        .send(with_bearer(
            json_request(Method::POST, "/me/password", &json!({ "password": "short" })),
            &token,
        ))
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.code(), "weak_password");

    let resp = test
        .send(with_bearer(
            json_request(
                Method::POST,
                "/me/password",
                &json!({ "password": "new-password-456" }),
            ),
            &token,
        ))
        .await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);

    let resp = test
        .send(json_request(
            Method::POST,
            "/login",
            &json!({ "email": "bob@x.com", "password": "password123" }),
        ))
        .await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);

    let new_token = test.login("bob@x.com", "new-password-456").await;
    assert!(!new_token.is_empty());
}

#[tokio::test]
async fn test_healthz_is_public() {
    let test = TestServer::new();

    let resp = test.send(get("/healthz")).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json(), json!({ "status": "ok" }));
}
