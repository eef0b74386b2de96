//! Request authentication gate.
//!
//! Middlewares that turn the bearer token of a request into a [`Session`] in
//! the request's [`RequestContext`], and extractors that read it back in
//! handlers.
//!
//! - [`trace_requests`]: creates the context (request id, method, path) and
//!   logs every request with its status and latency.
//! - [`attach_session`]: verifies a token when one is present.
//! - [`require_session`]: like `attach_session`, but rejects requests without
//!   a token.
//!
//! # Invariants
//! - A token that is present is always verified; a bad token is rejected even
//!   on routes where authentication is optional.
//! - Rejections for bad tokens are `401`; failures of the verifier itself are
//!   `500`.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::{HeaderMap, HeaderValue, Method, header, request::Parts};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use super::Auth;
use super::respond::read_cookie;
use crate::error::{Error, ErrorKind, Result};
use crate::identity::Session;
use crate::identity::random::rand_alnum;

/// Header carrying the request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

const BEARER_PREFIX: &str = "Bearer ";
const MAX_REQUEST_ID_LEN: usize = 64;

/// Per-request context stored in the request extensions.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub method: Method,
    pub path: String,
    pub session: Option<Session>,
}

impl RequestContext {
    fn for_request(request_id: String, req: &Request) -> Self {
        Self {
            request_id,
            method: req.method().clone(),
            path: req.uri().path().to_string(),
            session: None,
        }
    }

    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }
}

/// Middleware creating the [`RequestContext`] and logging the outcome.
pub async fn trace_requests(mut req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && v.len() <= MAX_REQUEST_ID_LEN)
        .map_or_else(|| rand_alnum(16), ToString::to_string);

    let ctx = RequestContext::for_request(request_id.clone(), &req);
    let method = ctx.method.clone();
    let path = ctx.path.clone();
    req.extensions_mut().insert(ctx);

    let started = Instant::now();
    let mut response = next.run(req).await;
    let status = response.status().as_u16();
    let latency_ms = started.elapsed().as_millis();

    if response.status().is_server_error() {
        tracing::error!(%request_id, %method, %path, status, latency_ms, "request finished");
    } else if response.status().is_client_error() {
        tracing::warn!(%request_id, %method, %path, status, latency_ms, "request finished");
    } else {
        tracing::info!(%request_id, %method, %path, status, latency_ms, "request finished");
    }

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Middleware verifying the request's token when one is present.
pub async fn attach_session(State(auth): State<Arc<Auth>>, mut req: Request, next: Next) -> Response {
    match authenticate_request(&auth, &mut req, false).await {
        Ok(()) => next.run(req).await,
        Err(err) => err.into_response(),
    }
}

/// Middleware rejecting requests without a valid token.
pub async fn require_session(State(auth): State<Arc<Auth>>, mut req: Request, next: Next) -> Response {
    match authenticate_request(&auth, &mut req, true).await {
        Ok(()) => next.run(req).await,
        Err(err) => err.into_response(),
    }
}

async fn authenticate_request(auth: &Auth, req: &mut Request, required: bool) -> Result<()> {
    let Some(token) = extract_token(req.headers(), &auth.config().session_cookie) else {
        if required {
            return Err(Error::missing_auth().hint("request carries no token"));
        }
        return Ok(());
    };

    let session = auth.authenticate(&token).await.map_err(gate_error)?;

    let fallback = RequestContext::for_request(rand_alnum(16), req);
    req.extensions_mut()
        .get_or_insert_with(|| fallback)
        .session = Some(session);
    Ok(())
}

/// Bearer token from the `Authorization` header, else the session cookie.
#[must_use]
pub fn extract_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix(BEARER_PREFIX));

    let token = match bearer {
        Some(token) => token.trim().to_string(),
        None => read_cookie(headers, cookie_name)?.trim().to_string(),
    };
    (!token.is_empty()).then_some(token)
}

fn gate_error(err: Error) -> Error {
    if err.is_any(&[ErrorKind::NotFound, ErrorKind::InvalidInput, ErrorKind::MissingAuth]) {
        let code = if err.is(ErrorKind::MissingAuth) {
            err.code().to_string()
        } else {
            ErrorKind::MissingAuth.code().to_string()
        };
        tracing::debug!(error = %err, "token rejected");
        Error::missing_auth().coded(code)
    } else {
        Error::internal().caused_by(err).hint("token verification failed")
    }
}

/// The session of the request, if any.
#[derive(Debug, Clone)]
pub struct CurrentSession(pub Option<Session>);

impl<S> FromRequestParts<S> for CurrentSession
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let session = parts
            .extensions
            .get::<RequestContext>()
            .and_then(|ctx| ctx.session.clone());
        Ok(Self(session))
    }
}

/// The session of the request; `401` when there is none.
#[derive(Debug, Clone)]
pub struct RequireSession(pub Session);

impl<S> FromRequestParts<S> for RequireSession
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .and_then(|ctx| ctx.session.clone())
            .map(Self)
            .ok_or_else(|| Error::missing_auth().into_response())
    }
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<Self>().cloned().unwrap_or_else(|| Self {
            request_id: rand_alnum(16),
            method: parts.method.clone(),
            path: parts.uri.path().to_string(),
            session: None,
        }))
    }
}
