//! HTTP routes of the auth service.
//!
//! | Route                 | Auth     | Handler           |
//! |-----------------------|----------|-------------------|
//! | `POST /register`      | -        | password sign-up  |
//! | `POST /login`         | -        | password login    |
//! | `GET /logout`         | -        | clears the cookie |
//! | `GET /verify`         | -        | email verification, then login |
//! | `GET /oauth2`         | -        | redirect to provider |
//! | `GET /oauth2/cb`      | -        | provider callback, then login |
//! | `GET /me`             | required | current user      |
//! | `PATCH /me`           | required | replace profile data |
//! | `POST /me/password`   | required | change password   |
//! | `GET /healthz`        | -        | liveness          |
//!
//! Bodies are accepted as HTML forms or JSON. Form submissions are answered
//! with redirects; see [`super::respond`].

use std::sync::Arc;

use axum::extract::{FromRequest, Query, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::gate::{RequireSession, require_session, trace_requests};
use super::respond::{
    Cookie, error_response, expired_cookie, is_form_submit, read_cookie, redirect, see_other,
    set_cookie, success_response,
};
use super::{Auth, AuthConfig, Credentials};
use crate::error::{Error, ErrorKind};
use crate::identity::{KEY_KIND_ID, User, UserData, new_auth_key};
use crate::providers::CallbackParams;

/// Build the router serving the auth endpoints.
pub fn router(auth: Arc<Auth>) -> Router {
    let protected = Router::new()
        .route("/me", get(handle_whoami).patch(handle_update_me))
        .route("/me/password", post(handle_change_password))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&auth),
            require_session,
        ));

    Router::new()
        .route("/register", post(handle_register))
        .route("/login", post(handle_login))
        .route("/logout", get(handle_logout))
        .route("/verify", get(handle_verify))
        .route("/oauth2", get(handle_oauth2_redirect))
        .route("/oauth2/cb", get(handle_oauth2_callback))
        .route("/healthz", get(handle_healthz))
        .merge(protected)
        .layer(middleware::from_fn(trace_requests))
        .with_state(auth)
}

/// A request body sent either as an HTML form or as JSON.
#[derive(Debug)]
pub struct Submission<T>(pub T);

impl<S, T> FromRequest<S> for Submission<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = Error;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if is_form_submit(req.headers()) {
            let Form(value) = Form::<T>::from_request(req, state)
                .await
                .map_err(|e| bad_body().hint(e.body_text()))?;
            return Ok(Self(value));
        }

        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| bad_body().hint(e.body_text()))?;
        Ok(Self(value))
    }
}

fn bad_body() -> Error {
    Error::invalid_input().coded("bad_json")
}

/// Body of a successful login.
#[derive(Debug, Serialize)]
struct LoginResponse<'a> {
    user: User,
    token: &'a str,
    expiry: DateTime<Utc>,
}

async fn handle_register(
    State(auth): State<Arc<Auth>>,
    headers: HeaderMap,
    submission: Result<Submission<Credentials>, Error>,
) -> Response {
    let form = is_form_submit(&headers);
    let page = auth.config().register_page_route.as_deref();

    let result = match submission {
        Ok(Submission(credentials)) => {
            let redirect_to = form_redirect(&auth, &credentials);
            auth.register(credentials).await.map(|user| (user, redirect_to))
        }
        Err(e) => Err(e),
    };

    match result {
        Ok((user, redirect_to)) => success_response(
            form,
            redirect_to.as_deref(),
            StatusCode::CREATED,
            &user.clone_safe(),
        ),
        Err(e) => error_response(form, page, e),
    }
}

async fn handle_login(
    State(auth): State<Arc<Auth>>,
    headers: HeaderMap,
    submission: Result<Submission<Credentials>, Error>,
) -> Response {
    let form = is_form_submit(&headers);
    let page = auth.config().login_page_route.as_deref();

    let Submission(credentials) = match submission {
        Ok(submission) => submission,
        Err(e) => return error_response(form, page, e),
    };
    let redirect_to = form_redirect(&auth, &credentials);

    match auth.login(credentials).await {
        Ok(user) => finish_login(&auth, &user, form, redirect_to.as_deref()),
        Err(e) => error_response(form, page, e),
    }
}

async fn handle_logout(State(auth): State<Arc<Auth>>) -> Response {
    let config = auth.config();
    let mut response = redirect(StatusCode::TEMPORARY_REDIRECT, "/");
    set_cookie(
        &mut response,
        &expired_cookie(&config.session_cookie, config.secure_cookies),
    );
    response
}

#[derive(Debug, Deserialize)]
struct VerifyQuery {
    #[serde(default)]
    id: String,
    #[serde(default)]
    token: String,
}

async fn handle_verify(
    State(auth): State<Arc<Auth>>,
    headers: HeaderMap,
    Query(query): Query<VerifyQuery>,
) -> Response {
    let form = is_form_submit(&headers);
    match auth.verify_user(&query.id, &query.token).await {
        Ok(user) => finish_login(&auth, &user, form, None),
        Err(e) => {
            let e = if e.is(ErrorKind::NotFound) {
                Error::missing_auth().caused_by(e)
            } else {
                e
            };
            error_response(form, auth.config().login_page_route.as_deref(), e)
        }
    }
}

#[derive(Debug, Deserialize)]
struct OAuth2Query {
    #[serde(default)]
    kind: String,
    #[serde(default)]
    p: String,
    #[serde(default)]
    redirect_to: String,
}

async fn handle_oauth2_redirect(
    State(auth): State<Arc<Auth>>,
    Query(query): Query<OAuth2Query>,
) -> Response {
    let config = auth.config();
    let started = auth
        .begin_auth(&query.kind, &query.p, &query.redirect_to)
        .and_then(|(auth_url, state)| Ok((auth_url, auth.encode_flow_state(&state)?)));

    let (auth_url, flow_cookie) = match started {
        Ok(started) => started,
        Err(e) => return error_response(true, config.login_page_route.as_deref(), e),
    };

    tracing::debug!(provider = %query.p, "redirecting to oauth2 provider");
    let mut response = redirect(StatusCode::TEMPORARY_REDIRECT, &auth_url);
    let cookie = Cookie {
        name: AuthConfig::FLOW_STATE_COOKIE,
        value: &flow_cookie,
        max_age: AuthConfig::FLOW_STATE_TTL,
        secure: config.secure_cookies,
    };
    set_cookie(&mut response, &cookie.render());
    response
}

async fn handle_oauth2_callback(
    State(auth): State<Arc<Auth>>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Response {
    let config = auth.config();

    let flow = match read_cookie(&headers, AuthConfig::FLOW_STATE_COOKIE)
        .filter(|v| !v.is_empty())
        .map(|v| auth.decode_flow_state(&v))
        .transpose()
    {
        Ok(flow) => flow,
        Err(e) => {
            let mut response = error_response(true, config.login_page_route.as_deref(), e);
            clear_flow_cookie(&mut response, config);
            return response;
        }
    };
    let redirect_to = flow
        .as_ref()
        .and_then(|f| config.safe_redirect(&f.redirect_to));

    let mut response = match auth.complete_auth(flow, &params).await {
        Ok(user) => match redirect_to {
            Some(target) => match auth.create_session(&user) {
                Ok(session) => {
                    let mut response = see_other(&target);
                    set_cookie(&mut response, &session_cookie(&auth, &session.token));
                    response
                }
                Err(e) => e.into_response(),
            },
            None => finish_login(&auth, &user, false, None),
        },
        Err(e) => error_response(true, config.login_page_route.as_deref(), e),
    };
    clear_flow_cookie(&mut response, config);
    response
}

async fn handle_whoami(
    State(auth): State<Arc<Auth>>,
    RequireSession(session): RequireSession,
) -> Response {
    match current_user(&auth, &session.user_id).await {
        Ok(user) => Json(user.clone_safe()).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn handle_update_me(
    State(auth): State<Arc<Auth>>,
    RequireSession(session): RequireSession,
    submission: Result<Submission<UserData>, Error>,
) -> Response {
    let Submission(data) = match submission {
        Ok(submission) => submission,
        Err(e) => return e.into_response(),
    };

    match auth.set_user_data(&session.user_id, data).await {
        Ok(user) => Json(user.clone_safe()).into_response(),
        Err(e) if e.is(ErrorKind::NotFound) => Error::missing_auth().caused_by(e).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct PasswordChange {
    #[serde(default)]
    password: String,
}

async fn handle_change_password(
    State(auth): State<Arc<Auth>>,
    RequireSession(session): RequireSession,
    submission: Result<Submission<PasswordChange>, Error>,
) -> Response {
    let Submission(change) = match submission {
        Ok(submission) => submission,
        Err(e) => return e.into_response(),
    };

    match auth.set_password(&session.user_id, change.password).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) if e.is(ErrorKind::NotFound) => Error::missing_auth().caused_by(e).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn handle_healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn current_user(auth: &Auth, user_id: &str) -> Result<User, Error> {
    auth.get_user(&new_auth_key(KEY_KIND_ID, user_id))
        .await
        .map_err(|e| {
            if e.is(ErrorKind::NotFound) {
                Error::missing_auth().caused_by(e)
            } else {
                Error::internal().caused_by(e)
            }
        })
}

/// Mint a session for `user`, set the cookie and report the login.
fn finish_login(auth: &Auth, user: &User, form: bool, redirect_to: Option<&str>) -> Response {
    let session = match auth.create_session(user) {
        Ok(session) => session,
        Err(e) => return error_response(form, auth.config().login_page_route.as_deref(), e),
    };

    tracing::info!(user_id = %user.id, "login");
    let body = LoginResponse {
        user: user.clone_safe(),
        token: &session.token,
        expiry: session.expires_at,
    };
    let mut response = success_response(form, redirect_to, StatusCode::OK, &body);
    set_cookie(&mut response, &session_cookie(auth, &session.token));
    response
}

/// The submitted `redirect_to`, if it stays on this service.
fn form_redirect(auth: &Auth, credentials: &Credentials) -> Option<String> {
    credentials
        .redirect_to
        .as_deref()
        .and_then(|target| auth.config().safe_redirect(target))
}

fn session_cookie(auth: &Auth, token: &str) -> String {
    let config = auth.config();
    Cookie {
        name: &config.session_cookie,
        value: token,
        max_age: auth.tokens().ttl(),
        secure: config.secure_cookies,
    }
    .render()
}

fn clear_flow_cookie(response: &mut Response, config: &AuthConfig) {
    set_cookie(
        response,
        &expired_cookie(AuthConfig::FLOW_STATE_COOKIE, config.secure_cookies),
    );
}
