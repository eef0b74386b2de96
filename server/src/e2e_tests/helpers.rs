//! Common helpers for end-to-end tests.

#![allow(clippy::expect_used)]

use axum::Router;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use serde_json::Value;
use tower::ServiceExt;

use crate::auth::{AuthConfig, router};
use crate::identity::{KEY_KIND_ID, User, new_auth_key};
use crate::store::UserRegistry;
use crate::testing::{TestAuth, test_config};

pub use crate::testing::MOCK_PROVIDER;

/// Login page configured by [`TestServer::with_pages`].
pub const LOGIN_PAGE: &str = "http://localhost:3000/login";
/// Register page configured by [`TestServer::with_pages`].
pub const REGISTER_PAGE: &str = "http://localhost:3000/signup";

/// The auth router over a fresh in-memory registry.
pub struct TestServer {
    pub app: Router,
    pub t: TestAuth,
}

impl TestServer {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    /// A server with login and register pages, so form posts are redirected.
    #[must_use]
    pub fn with_pages() -> Self {
        let mut config = test_config();
        config.login_page_route = Some("/login".to_string());
        config.register_page_route = Some("/signup".to_string());
        Self::with_config(config)
    }

    #[must_use]
    pub fn with_config(config: AuthConfig) -> Self {
        let t = TestAuth::with_config(config);
        let app = router(std::sync::Arc::clone(&t.auth));
        Self { app, t }
    }

    /// Send a request through the router.
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");

        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");

        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// Register `username` through the API and return the stored user,
    /// verify token included.
    pub async fn register(&self, email: &str, username: &str, password: &str) -> User {
        let resp = self
            .send(json_request(
                Method::POST,
                "/register",
                &serde_json::json!({
                    "email": email,
                    "username": username,
                    "password": password,
                }),
            ))
            .await;
        assert_eq!(resp.status, StatusCode::CREATED, "register failed: {}", resp.text());

        let id = resp.json()["id"].as_str().unwrap_or_default().to_string();
        self.stored_user(&id).await
    }

    /// Log in and return the session token.
    pub async fn login(&self, email: &str, password: &str) -> String {
        let resp = self
            .send(json_request(
                Method::POST,
                "/login",
                &serde_json::json!({ "email": email, "password": password }),
            ))
            .await;
        assert_eq!(resp.status, StatusCode::OK, "login failed: {}", resp.text());
        resp.json()["token"].as_str().unwrap_or_default().to_string()
    }

    /// The user as stored, secrets included.
    pub async fn stored_user(&self, id: &str) -> User {
        self.t
            .registry
            .get(&new_auth_key(KEY_KIND_ID, id))
            .await
            .expect("user is stored")
    }
}

/// A buffered response.
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    #[must_use]
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("response body is JSON")
    }

    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Error code of a JSON error body.
    #[must_use]
    pub fn code(&self) -> String {
        self.json()["code"].as_str().unwrap_or_default().to_string()
    }

    #[must_use]
    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
    }

    /// Full `Set-Cookie` value for cookie `name`.
    #[must_use]
    pub fn set_cookie(&self, name: &str) -> Option<String> {
        let prefix = format!("{name}=");
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find(|v| v.starts_with(&prefix))
            .map(ToString::to_string)
    }

    /// Value of cookie `name` as set by the response.
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<String> {
        let set_cookie = self.set_cookie(name)?;
        let (pair, _) = set_cookie.split_once(';').unwrap_or((set_cookie.as_str(), ""));
        pair.split_once('=').map(|(_, value)| value.to_string())
    }
}

#[must_use]
pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

#[must_use]
pub fn json_request(method: Method, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

#[must_use]
pub fn form_request(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .expect("request")
}

/// Add `Authorization: Bearer <token>`.
#[must_use]
pub fn with_bearer(mut request: Request<Body>, token: &str) -> Request<Body> {
    request.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {token}").parse().expect("header"),
    );
    request
}

/// Add a `Cookie` header carrying `name=value`.
#[must_use]
pub fn with_cookie(mut request: Request<Body>, name: &str, value: &str) -> Request<Body> {
    request.headers_mut().append(
        header::COOKIE,
        format!("{name}={value}").parse().expect("header"),
    );
    request
}
