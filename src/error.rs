//! Normalized error type returned by every client operation.
//!
//! Every failure path (transport failure, non-success response, client-side
//! exception) is folded into exactly one [`Error`] by
//! [`crate::normalizer::normalize`] before it leaves the client. Raw transport
//! errors never cross the [`crate::EntityClient`] boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure taxonomy.
///
/// The kind is derived from the response status (or the failure kind when no
/// response was received). The machine-readable [`Error::code`] carries the
/// finer-grained server code when one was supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The backend could not be reached: network, DNS or timeout.
    Client,

    /// 400 without field-level detail.
    InvalidRequest,

    /// 422, or any 4xx that carried field-level errors.
    ///
    /// Field messages are exposed through [`Error::field_messages`] for
    /// inline display.
    Validation,

    /// 401. Emits a [`crate::normalizer::HandlingDirective::ClearSessionAndLogin`].
    Unauthenticated,

    /// 403.
    Forbidden,

    /// 404.
    NotFound,

    /// 409: duplicate or stale state.
    Conflict,

    /// 429.
    RateLimited,

    /// Any 5xx.
    Server,

    /// Unmapped status, rejected envelope or client-side exception.
    Unexpected,
}

impl ErrorKind {
    /// Map an HTTP status to its kind.
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => ErrorKind::InvalidRequest,
            401 => ErrorKind::Unauthenticated,
            403 => ErrorKind::Forbidden,
            404 => ErrorKind::NotFound,
            409 => ErrorKind::Conflict,
            422 => ErrorKind::Validation,
            429 => ErrorKind::RateLimited,
            500..=599 => ErrorKind::Server,
            _ => ErrorKind::Unexpected,
        }
    }

    /// True for 401/403 style failures.
    pub fn is_authorization(&self) -> bool {
        matches!(self, ErrorKind::Unauthenticated | ErrorKind::Forbidden)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Client => "Client",
            ErrorKind::InvalidRequest => "Invalid request",
            ErrorKind::Validation => "Validation",
            ErrorKind::Unauthenticated => "Unauthenticated",
            ErrorKind::Forbidden => "Forbidden",
            ErrorKind::NotFound => "Not found",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::RateLimited => "Rate limited",
            ErrorKind::Server => "Server",
            ErrorKind::Unexpected => "Unexpected",
        };
        f.write_str(name)
    }
}

/// One field-level validation failure reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        FieldError {
            field: field.into(),
            message: message.into(),
            code: None,
        }
    }
}

/// Codes whose errors should stay on screen longer.
const CRITICAL_CODES: [&str; 4] = ["401", "403", "ACCOUNT_LOCKED", "TOKEN_EXPIRED"];

/// The single error shape every failure is converted into.
///
/// `message` is pre-localized and never empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Error {
    kind: ErrorKind,
    code: String,
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    field_errors: Vec<FieldError>,
    timestamp: DateTime<Utc>,
}

impl Error {
    /// Create an error stamped with the current time.
    pub fn new(kind: ErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Error {
            kind,
            code: code.into(),
            message: message.into(),
            status: None,
            details: None,
            field_errors: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_field_errors(mut self, field_errors: Vec<FieldError>) -> Self {
        self.field_errors = field_errors;
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Machine-readable code: the server code, the numeric status, or one of
    /// `CLIENT_ERROR`, `UNEXPECTED_ERROR`, `REQUEST_REJECTED`, `NOT_IMPLEMENTED`.
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Response status, when a response was received.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn field_errors(&self) -> &[FieldError] {
        &self.field_errors
    }

    /// Field-level messages keyed by field name, in report order per field.
    pub fn field_messages(&self) -> BTreeMap<String, Vec<String>> {
        let mut by_field: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for err in &self.field_errors {
            by_field
                .entry(err.field.clone())
                .or_default()
                .push(err.message.clone());
        }
        by_field
    }

    /// Whether presentation should treat this error as critical.
    pub fn is_critical(&self) -> bool {
        CRITICAL_CODES.contains(&self.code.as_str())
            || (self.kind.is_authorization() && self.status.is_some())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error [{}]: {}", self.kind, self.code, self.message)
    }
}

impl std::error::Error for Error {}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        crate::normalizer::normalize(e.into())
    }
}
