//! Test password login.

use axum::http::{Method, StatusCode};
use serde_json::json;

use crate::e2e_tests::helpers::*;

#[tokio::test]
async fn test_login_sets_session_cookie() {
    let test = TestServer::new();
    let user = test.register("bob@x.com", "bob01", "password123").await;

    let resp = test
        .send(json_request(
            Method::POST,
            "/login",
            &json!({ "email": "bob@x.com", "password": "password123" }),
        ))
        .await;

    assert_eq!(resp.status, StatusCode::OK);
    let body = resp.json();
    assert_eq!(body["user"]["id"], user.id.as_str());
    assert!(body["user"].get("pwd_hash").is_none());
    assert!(body["expiry"].is_string());

    let token = body["token"].as_str().unwrap_or_default();
    assert!(!token.is_empty());
    assert_eq!(resp.cookie("_warden_auth").as_deref(), Some(token));

    let cookie = resp.set_cookie("_warden_auth").unwrap_or_default();
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("Path=/"));
    assert!(!cookie.contains("Max-Age=0;"));
}

#[tokio::test]
async fn test_login_by_username() {
    let test = TestServer::new();
    let user = test.register("bob@x.com", "bob01", "password123").await;

    let resp = test
        .send(json_request(
            Method::POST,
            "/login",
            &json!({ "username": "bob01", "password": "password123" }),
        ))
        .await;

    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["user"]["id"], user.id.as_str());
}

#[tokio::test]
async fn test_login_failures_are_missing_auth() {
    let test = TestServer::new();
    test.register("bob@x.com", "bob01", "password123").await;

    for body in [
        json!({ "email": "bob@x.com", "password": "password124" }),
        json!({ "email": "eve@x.com", "password": "password123" }),
        json!({ "email": "bob@x.com", "password": "password123", "kind": "admin" }),
    ] {
        let resp = test.send(json_request(Method::POST, "/login", &body)).await;
        assert_eq!(resp.status, StatusCode::UNAUTHORIZED, "{body}");
        assert_eq!(resp.code(), "missing_auth", "{body}");
        assert!(resp.set_cookie("_warden_auth").is_none());
    }
}

#[tokio::test]
async fn test_login_form_redirects() {
    let test = TestServer::with_pages();
    test.register("bob@x.com", "bob01", "password123").await;

    let resp = test
        .send(form_request(
            "/login",
            "email=bob%40x.com&password=password123&redirect_to=%2Fhome",
        ))
        .await;
    assert_eq!(resp.status, StatusCode::SEE_OTHER);
    assert_eq!(resp.location(), Some("/home"));
    assert!(resp.cookie("_warden_auth").is_some());

    let resp = test
        .send(form_request("/login", "email=bob%40x.com&password=wrong-one"))
        .await;
    assert_eq!(resp.status, StatusCode::SEE_OTHER);
    assert_eq!(
        resp.location().map(ToString::to_string),
        Some(format!("{LOGIN_PAGE}?err_code=missing_auth"))
    );
    assert!(resp.set_cookie("_warden_auth").is_none());
}

#[tokio::test]
async fn test_login_form_without_page_gets_json() {
    let test = TestServer::new();

    let resp = test
        .send(form_request("/login", "email=bob%40x.com&password=password123"))
        .await;

    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.code(), "missing_auth");
}

#[tokio::test]
async fn test_login_form_same_origin_redirect() {
    let test = TestServer::with_pages();
    test.register("bob@x.com", "bob01", "password123").await;

    let resp = test
        .send(form_request(
            "/login",
            "email=bob%40x.com&password=password123&redirect_to=http%3A%2F%2Flocalhost%3A3000%2Fapp",
        ))
        .await;
    assert_eq!(resp.status, StatusCode::SEE_OTHER);
    assert_eq!(resp.location(), Some("http://localhost:3000/app"));

    let resp = test
        .send(form_request(
            "/login",
            "email=bob%40x.com&password=password123&redirect_to=https%3A%2F%2Fevil.example%2F",
        ))
        .await;
    assert_eq!(resp.status, StatusCode::SEE_OTHER);
    assert_eq!(resp.location(), Some("/"));
}
