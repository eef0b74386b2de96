//! Test the OAuth2 redirect and callback against the mock provider.

use axum::http::StatusCode;

use crate::e2e_tests::helpers::*;
use crate::store::UserRegistry;
use crate::testing::{MOCK_EMAIL, MOCK_SUBJECT};

const FLOW_COOKIE: &str = "_oauth_state";

/// Start a flow and return the callback `state` and the flow cookie.
async fn start_flow(test: &TestServer, query: &str) -> (String, String) {
    let resp = test.send(get(&format!("/oauth2?{query}"))).await;
    assert_eq!(resp.status, StatusCode::TEMPORARY_REDIRECT, "{}", resp.text());

    let location = resp.location().unwrap_or_default();
    assert!(location.starts_with("https://idp.example/authorize"));
    let state = test.t.state_from(location);
    let cookie = resp.cookie(FLOW_COOKIE).unwrap_or_default();
    assert!(!cookie.is_empty());
    (state, cookie)
}

#[tokio::test]
async fn test_oauth2_login_registers_user() {
    let test = TestServer::new();
    let (state, flow) = start_flow(&test, &format!("p={MOCK_PROVIDER}")).await;

    let resp = test
        .send(with_cookie(
            get(&format!("/oauth2/cb?state={state}&code=abc")),
            FLOW_COOKIE,
            &flow,
        ))
        .await;

    assert_eq!(resp.status, StatusCode::OK, "{}", resp.text());
    let body = resp.json();
    assert_eq!(body["user"]["email"], MOCK_EMAIL);
    assert_eq!(body["user"]["kind"], "user");
    assert_eq!(body["user"]["data"]["name"], "Octo Cat");
    assert_eq!(body["user"]["data"]["nick_name"], "octo");
    assert_eq!(body["user"]["data"]["location"], "San Francisco");
    assert!(!body["token"].as_str().unwrap_or_default().is_empty());
    assert!(resp.cookie("_warden_auth").is_some());

    let cleared = resp.set_cookie(FLOW_COOKIE).unwrap_or_default();
    assert!(cleared.contains("Max-Age=0"));

    let key = format!("{MOCK_PROVIDER}/{MOCK_SUBJECT}");
    let user = test
        .t
        .registry
        .get(&key)
        .await
        .expect("provider key is stored");
    assert_eq!(user.id, body["user"]["id"].as_str().unwrap_or_default());
}

#[tokio::test]
async fn test_oauth2_second_login_reuses_user() {
    let test = TestServer::new();

    let mut ids = Vec::new();
    for name in ["Octo Cat", "Octo Renamed"] {
        test.t.provider.set_name(name);
        let (state, flow) = start_flow(&test, &format!("p={MOCK_PROVIDER}")).await;
        let resp = test
            .send(with_cookie(
                get(&format!("/oauth2/cb?state={state}&code=abc")),
                FLOW_COOKIE,
                &flow,
            ))
            .await;
        assert_eq!(resp.status, StatusCode::OK, "{}", resp.text());
        assert_eq!(resp.json()["user"]["data"]["name"], name);
        ids.push(resp.json()["user"]["id"].as_str().unwrap_or_default().to_string());
    }

    assert_eq!(ids[0], ids[1]);
    assert_eq!(test.t.registry.count_users().await.expect("count"), 1);
}

#[tokio::test]
async fn test_oauth2_state_mismatch_is_rejected() {
    let test = TestServer::new();
    let (_, flow) = start_flow(&test, &format!("p={MOCK_PROVIDER}")).await;

    let resp = test
        .send(with_cookie(
            get("/oauth2/cb?state=forged&code=abc"),
            FLOW_COOKIE,
            &flow,
        ))
        .await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.code(), "invalid_callback");
    assert!(resp.set_cookie(FLOW_COOKIE).is_some());
    assert!(resp.cookie("_warden_auth").is_none());
    assert_eq!(test.t.registry.count_users().await.expect("count"), 0);
}

#[tokio::test]
async fn test_oauth2_callback_needs_flow_cookie() {
    let test = TestServer::new();
    let (state, _) = start_flow(&test, &format!("p={MOCK_PROVIDER}")).await;

    let resp = test
        .send(get(&format!("/oauth2/cb?state={state}&code=abc")))
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.code(), "invalid_callback");

    let resp = test
        .send(with_cookie(
            get(&format!("/oauth2/cb?state={state}&code=abc")),
            FLOW_COOKIE,
            "not-a-signed-state",
        ))
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.code(), "invalid_callback");
    assert_eq!(test.t.registry.count_users().await.expect("count"), 0);
}

#[tokio::test]
async fn test_oauth2_provider_error_is_rejected() {
    let test = TestServer::new();
    let (state, flow) = start_flow(&test, &format!("p={MOCK_PROVIDER}")).await;

    let resp = test
        .send(with_cookie(
            get(&format!("/oauth2/cb?state={state}&error=access_denied")),
            FLOW_COOKIE,
            &flow,
        ))
        .await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.code(), "invalid_callback");
}

#[tokio::test]
async fn test_oauth2_redirect_to_after_login() {
    let test = TestServer::new();
    let (state, flow) = start_flow(
        &test,
        &format!("p={MOCK_PROVIDER}&kind=admin&redirect_to=%2Fdashboard"),
    )
    .await;

    let resp = test
        .send(with_cookie(
            get(&format!("/oauth2/cb?state={state}&code=abc")),
            FLOW_COOKIE,
            &flow,
        ))
        .await;

    assert_eq!(resp.status, StatusCode::SEE_OTHER);
    assert_eq!(resp.location(), Some("/dashboard"));
    let token = resp.cookie("_warden_auth").unwrap_or_default();
    assert!(!token.is_empty());

    let me = test.send(with_bearer(get("/me"), &token)).await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.json()["kind"], "admin");
}

#[tokio::test]
async fn test_oauth2_bad_start() {
    let test = TestServer::new();

    let resp = test.send(get("/oauth2?p=nosuch")).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.code(), "invalid_provider");

    let resp = test
        .send(get(&format!("/oauth2?p={MOCK_PROVIDER}&kind=robot")))
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.code(), "invalid_kind");
}

#[tokio::test]
async fn test_oauth2_errors_redirect_to_login_page() {
    let test = TestServer::with_pages();

    let resp = test.send(get("/oauth2?p=nosuch")).await;
    assert_eq!(resp.status, StatusCode::SEE_OTHER);
    assert_eq!(
        resp.location().map(ToString::to_string),
        Some(format!("{LOGIN_PAGE}?err_code=invalid_provider"))
    );
}

#[tokio::test]
async fn test_oauth2_external_redirect_to_is_not_followed() {
    let test = TestServer::new();
    let (state, flow) = start_flow(
        &test,
        &format!("p={MOCK_PROVIDER}&redirect_to=https%3A%2F%2Fevil.example%2Fphish"),
    )
    .await;

    let resp = test
        .send(with_cookie(
            get(&format!("/oauth2/cb?state={state}&code=abc")),
            FLOW_COOKIE,
            &flow,
        ))
        .await;

    assert_eq!(resp.status, StatusCode::SEE_OTHER);
    assert_eq!(resp.location(), Some("/"));
    assert!(resp.cookie("_warden_auth").is_some());
}
