//! Test password registration over JSON and HTML forms.

use axum::http::{Method, StatusCode};
use serde_json::json;

use crate::e2e_tests::helpers::*;

#[tokio::test]
async fn test_register_json() {
    let test = TestServer::new();

    let resp = test
        .send(json_request(
            Method::POST,
            "/register",
            &json!({ "email": "bob@x.com", "username": "bob01", "password": "password123" }),
        ))
        .await;

    assert_eq!(resp.status, StatusCode::CREATED);
    let body = resp.json();
    assert_eq!(body["username"], "bob01");
    assert_eq!(body["email"], "bob@x.com");
    assert_eq!(body["kind"], "user");
    assert!(body["verified_at"].is_null());
    assert!(body.get("pwd_hash").is_none());
    assert!(body.get("verify_token").is_none());

    // The stored record is unverified and carries the token.
    let stored = test.stored_user(body["id"].as_str().unwrap_or_default()).await;
    assert!(stored.verify_token.is_some());
    assert!(stored.password_hash.is_some());
    assert!(resp.set_cookie("_warden_auth").is_none());
}

#[tokio::test]
async fn test_register_duplicate_email() {
    let test = TestServer::new();
    test.register("bob@x.com", "bob01", "password123").await;

    let resp = test
        .send(json_request(
            Method::POST,
            "/register",
            &json!({ "email": "bob@x.com", "username": "bob02", "password": "password123" }),
        ))
        .await;

    assert_eq!(resp.status, StatusCode::CONFLICT);
    assert_eq!(resp.code(), "conflict");
    assert_eq!(test.t.registry.count_users().await.expect("count"), 1);
}

#[tokio::test]
async fn test_register_invalid_input() {
    let test = TestServer::new();

    let cases = [
        (json!({ "username": "bob01", "password": "password123" }), "invalid_email"),
        (json!({ "email": "bob@x.com", "username": "1bob", "password": "password123" }), "invalid_creds"),
        (json!({ "email": "bob@x.com", "username": "bob01", "password": "short" }), "weak_password"),
        (
            json!({ "email": "bob@x.com", "username": "bob01", "password": "password123", "kind": "robot" }),
            "invalid_kind",
        ),
    ];

    for (body, code) in cases {
        let resp = test.send(json_request(Method::POST, "/register", &body)).await;
        assert_eq!(resp.status, StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(resp.code(), code, "{body}");
    }
    assert_eq!(test.t.registry.count_users().await.expect("count"), 0);
}

#[tokio::test]
async fn test_register_malformed_body() {
    let test = TestServer::new();

    let resp = test
        .send(
            axum::http::Request::builder()
                .method(Method::POST)
                .uri("/register")
                .header("content-type", "application/json")
                .body(axum::body::Body::from("{not json"))
                .expect("request"),
        )
        .await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.code(), "bad_json");
}

#[tokio::test]
async fn test_register_form_redirects() {
    let test = TestServer::with_pages();

    let resp = test
        .send(form_request(
            "/register",
            "email=bob%40x.com&username=bob01&password=password123&redirect_to=%2Fwelcome",
        ))
        .await;
    assert_eq!(resp.status, StatusCode::SEE_OTHER);
    assert_eq!(resp.location(), Some("/welcome"));

    let resp = test
        .send(form_request(
            "/register",
            "email=bob%40x.com&username=bob02&password=password123",
        ))
        .await;
    assert_eq!(resp.status, StatusCode::SEE_OTHER);
    assert_eq!(
        resp.location().map(ToString::to_string),
        Some(format!("{REGISTER_PAGE}?err_code=conflict"))
    );
}

#[tokio::test]
async fn test_register_form_ignores_external_redirect() {
    let test = TestServer::with_pages();

    let cases = [
        ("bob%40x.com", "bob01", "https%3A%2F%2Fevil.example%2F"),
        ("rob%40x.com", "rob01", "%2F%2Fevil.example%2F"),
    ];
    for (email, username, target) in cases {
        let body =
            format!("email={email}&username={username}&password=password123&redirect_to={target}");
        let resp = test.send(form_request("/register", &body)).await;
        assert_eq!(resp.status, StatusCode::SEE_OTHER, "{target}");
        assert_eq!(resp.location(), Some("/"), "{target}");
    }
}
