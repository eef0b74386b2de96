//! Response helpers shared by the auth routes.
//!
//! Browser form posts get `303 See Other` redirects, with failures reported
//! as an `err_code` query parameter on the page they came from. Everything
//! else gets JSON.

use std::time::Duration;

use axum::Json;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::Serialize;

use crate::error::Error;

/// Content type of HTML form submissions.
pub const CONTENT_TYPE_FORM: &str = "application/x-www-form-urlencoded";

/// Returns true if the request body is an HTML form.
#[must_use]
pub fn is_form_submit(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains(CONTENT_TYPE_FORM))
}

/// Report `err` to the client.
///
/// Form submissions are redirected to `page` with `err_code` set when a page
/// is known; otherwise the error is rendered as JSON.
#[must_use]
pub fn error_response(form: bool, page: Option<&str>, err: Error) -> Response {
    if form && let Some(mut page) = page.and_then(|p| Url::parse(p).ok()) {
        page.query_pairs_mut().append_pair("err_code", err.code());
        tracing::debug!(error = %err, "form submission failed");
        return see_other(page.as_str());
    }
    err.into_response()
}

/// Report success to the client.
///
/// Form submissions are redirected to `redirect_to` (or `/`); everything
/// else gets `body` as JSON with `status`.
#[must_use]
pub fn success_response<T: Serialize>(
    form: bool,
    redirect_to: Option<&str>,
    status: StatusCode,
    body: &T,
) -> Response {
    if form {
        return see_other(redirect_to.filter(|r| !r.is_empty()).unwrap_or("/"));
    }
    (status, Json(body)).into_response()
}

/// `303 See Other` to `location`.
#[must_use]
pub fn see_other(location: &str) -> Response {
    redirect(StatusCode::SEE_OTHER, location)
}

/// Redirect with the given status.
#[must_use]
pub fn redirect(status: StatusCode, location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(location) => (status, [(header::LOCATION, location)]).into_response(),
        Err(e) => Error::internal()
            .caused_by(e)
            .hint("redirect location is not a valid header")
            .into_response(),
    }
}

/// Attributes of an HTTP-only cookie.
#[derive(Debug, Clone)]
pub struct Cookie<'a> {
    pub name: &'a str,
    pub value: &'a str,
    pub max_age: Duration,
    pub secure: bool,
}

impl Cookie<'_> {
    /// Render as a `Set-Cookie` value.
    #[must_use]
    pub fn render(&self) -> String {
        let expires = Utc::now()
            + chrono::Duration::from_std(self.max_age).unwrap_or_else(|_| chrono::Duration::zero());
        let mut out = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}; Expires={}",
            self.name,
            self.value,
            self.max_age.as_secs(),
            http_date(expires),
        );
        if self.secure {
            out.push_str("; Secure");
        }
        out
    }
}

/// A cookie that deletes `name` on the client.
#[must_use]
pub fn expired_cookie(name: &str, secure: bool) -> String {
    Cookie {
        name,
        value: "",
        max_age: Duration::ZERO,
        secure,
    }
    .render()
}

/// Append a `Set-Cookie` header.
pub fn set_cookie(response: &mut Response, cookie: &str) {
    match HeaderValue::from_str(cookie) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(e) => tracing::error!("dropping cookie that is not a valid header: {e}"),
    }
}

/// Read cookie `name` from the request headers.
#[must_use]
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
