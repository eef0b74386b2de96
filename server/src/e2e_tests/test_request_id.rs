//! Test request id propagation.

use axum::http::StatusCode;

use crate::auth::gate::REQUEST_ID_HEADER;
use crate::e2e_tests::helpers::*;

fn request_id(resp: &TestResponse) -> String {
    resp.headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let test = TestServer::new();

    let mut req = get("/healthz");
    req.headers_mut()
        .insert(REQUEST_ID_HEADER, "abc-123".parse().expect("header"));
    let resp = test.send(req).await;

    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(request_id(&resp), "abc-123");
}

#[tokio::test]
async fn test_request_id_is_generated() {
    let test = TestServer::new();

    let first = request_id(&test.send(get("/healthz")).await);
    let second = request_id(&test.send(get("/healthz")).await);
    assert_eq!(first.len(), 16);
    assert_ne!(first, second);

    // Rejected requests carry one too.
    let resp = test.send(get("/me")).await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert!(!request_id(&resp).is_empty());
}

#[tokio::test]
async fn test_oversized_request_id_is_replaced() {
    let test = TestServer::new();

    let long = "x".repeat(100);
    let mut req = get("/healthz");
    req.headers_mut()
        .insert(REQUEST_ID_HEADER, long.parse().expect("header"));
    let resp = test.send(req).await;

    assert_ne!(request_id(&resp), long);
    assert_eq!(request_id(&resp).len(), 16);
}
