//! Error type shared by every layer of the server.
//!
//! Errors are classified by [`ErrorKind`]. Each error also carries a machine
//! readable code (sent to clients), an optional hint (logged, never sent) and
//! an optional underlying cause.
//!
//! # Invariants
//! - The code of a freshly built error is the default code of its kind.
//! - Only the code and the kind's public message ever leave the process.

use std::borrow::Cow;
use std::fmt;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Boxed cause attached to an [`Error`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The request was malformed or failed validation.
    InvalidInput,
    /// Credentials or a session token were missing or rejected.
    MissingAuth,
    /// The requested entity does not exist.
    NotFound,
    /// A uniqueness constraint would be violated.
    Conflict,
    /// Anything unexpected.
    InternalIssue,
}

impl ErrorKind {
    /// HTTP status returned for this kind.
    #[must_use]
    pub const fn status(self) -> StatusCode {
        match self {
            Self::InvalidInput => StatusCode::BAD_REQUEST,
            Self::MissingAuth => StatusCode::UNAUTHORIZED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::InternalIssue => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Default machine code for this kind.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::MissingAuth => "missing_auth",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::InternalIssue => "internal_error",
        }
    }

    /// Message shown to clients.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::InvalidInput => "Request is not valid",
            Self::MissingAuth => "You are not authenticated",
            Self::NotFound => "Requested entity is not found",
            Self::Conflict => "An entity with same identifier already exists",
            Self::InternalIssue => "Something went wrong on our end",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A classified error with code, hint and cause.
#[derive(Debug, thiserror::Error)]
#[error("{code}{}", detail(.cause, .hint))]
pub struct Error {
    kind: ErrorKind,
    code: Cow<'static, str>,
    hint: Option<String>,
    #[source]
    cause: Option<BoxError>,
}

impl Error {
    /// Create an error of the given kind with its default code.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            code: Cow::Borrowed(kind.code()),
            hint: None,
            cause: None,
        }
    }

    #[must_use]
    pub const fn invalid_input() -> Self {
        Self::new(ErrorKind::InvalidInput)
    }

    #[must_use]
    pub const fn missing_auth() -> Self {
        Self::new(ErrorKind::MissingAuth)
    }

    #[must_use]
    pub const fn not_found() -> Self {
        Self::new(ErrorKind::NotFound)
    }

    #[must_use]
    pub const fn conflict() -> Self {
        Self::new(ErrorKind::Conflict)
    }

    #[must_use]
    pub const fn internal() -> Self {
        Self::new(ErrorKind::InternalIssue)
    }

    /// Replace the machine code.
    #[must_use]
    pub fn coded(mut self, code: impl Into<Cow<'static, str>>) -> Self {
        self.code = code.into();
        self
    }

    /// Attach an internal hint. Hints are logged but never returned to clients.
    #[must_use]
    pub fn hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Attach the underlying cause.
    #[must_use]
    pub fn caused_by(mut self, cause: impl Into<BoxError>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    #[must_use]
    pub fn debug_hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    /// Returns true if the error is of the given kind.
    #[must_use]
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }

    /// Returns true if the error is of any of the given kinds.
    #[must_use]
    pub fn is_any(&self, kinds: &[ErrorKind]) -> bool {
        kinds.contains(&self.kind)
    }
}

fn detail(cause: &Option<BoxError>, hint: &Option<String>) -> String {
    let mut out = String::new();
    if let Some(cause) = cause {
        out.push_str(": ");
        out.push_str(&cause.to_string());
    }
    if let Some(hint) = hint {
        out.push_str(" (");
        out.push_str(hint);
        out.push(')');
    }
    out
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

/// JSON body sent for every failed request.
#[derive(Debug, Serialize)]
pub struct ErrorBody<'a> {
    pub code: &'a str,
    pub message: &'a str,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.kind.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }

        let body = ErrorBody {
            code: &self.code,
            message: self.kind.message(),
        };
        (status, Json(body)).into_response()
    }
}
