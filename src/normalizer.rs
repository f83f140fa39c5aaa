//! Conversion of heterogeneous failures into one [`Error`] shape.
//!
//! Transports report failures as [`RawFailure`]. [`normalize`] applies a fixed
//! mapping table to pick the [`ErrorKind`], the machine-readable code and a
//! pre-localized message. [`directive_for`] derives the side-effect directive
//! (clear session, navigate to login) that an external auth collaborator
//! observes; the normalizer never executes it.
//!
//! # Message precedence
//!
//! ```text
//! code override table  →  server message (non-blank)  →  status table  →  generic fallback
//! ```

use crate::error::{Error, ErrorKind, FieldError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Code used when the backend could not be reached.
pub const CLIENT_ERROR: &str = "CLIENT_ERROR";
/// Code used for client-side exceptions (decode failures, panics).
pub const UNEXPECTED_ERROR: &str = "UNEXPECTED_ERROR";
/// Code used for a 2xx envelope carrying `success: false`.
pub const REQUEST_REJECTED: &str = "REQUEST_REJECTED";
/// Code used when a transport does not support an operation.
pub const NOT_IMPLEMENTED: &str = "NOT_IMPLEMENTED";

const NETWORK_MESSAGE: &str = "Connection error. Please check your internet connection.";
const FALLBACK_MESSAGE: &str = "An unexpected error occurred.";
const UNSUPPORTED_MESSAGE: &str = "This operation is not supported.";

/// Error payload the backend sends with a non-success response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub details: Option<Value>,
    #[serde(default)]
    pub errors: Vec<FieldError>,
}

impl ErrorBody {
    pub fn with_code(code: impl Into<String>) -> Self {
        ErrorBody {
            code: Some(code.into()),
            ..Default::default()
        }
    }

    pub fn with_message(message: impl Into<String>) -> Self {
        ErrorBody {
            message: Some(message.into()),
            ..Default::default()
        }
    }
}

/// A failure as reported by a transport, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum RawFailure {
    /// No response was received.
    Network(String),

    /// A non-success response, with its decoded body when there was one.
    Status { status: u16, body: Option<ErrorBody> },

    /// A success response whose envelope said `success: false`.
    Rejected { message: Option<String> },

    /// A client-side exception: undecodable payload, panicked task, etc.
    Exception(String),

    /// The transport does not implement the named operation.
    Unsupported(String),
}

impl RawFailure {
    pub fn status(status: u16) -> Self {
        RawFailure::Status { status, body: None }
    }

    pub fn status_with_body(status: u16, body: ErrorBody) -> Self {
        RawFailure::Status {
            status,
            body: Some(body),
        }
    }
}

impl From<serde_json::Error> for RawFailure {
    fn from(e: serde_json::Error) -> Self {
        RawFailure::Exception(format!("malformed payload: {}", e))
    }
}

/// Default message for a response status.
pub fn status_message(status: u16) -> Option<&'static str> {
    let message = match status {
        400 => "Invalid request. Please check the submitted data.",
        401 => "Not authorized. Please sign in again.",
        403 => "Access denied. You do not have permission to perform this action.",
        404 => "Resource not found.",
        409 => "Conflict. The resource already exists or is in use.",
        422 => "Invalid input data.",
        429 => "Too many requests. Please try again later.",
        500 => "Internal server error. Please try again later.",
        502 => "Server temporarily unavailable.",
        503 => "Service unavailable. We are working on it.",
        504 => "Gateway timeout. Please try again.",
        501 | 505..=599 => "Server error. Please try again later.",
        _ => return None,
    };
    Some(message)
}

/// Message overriding the status-based one when the body carries a known code.
pub fn code_message(code: &str) -> Option<&'static str> {
    let message = match code {
        "VALIDATION_ERROR" => "Please check the data you entered.",
        "DUPLICATE_EMAIL" => "This email address is already registered.",
        "DUPLICATE_RESOURCE" => "A resource with the same identity already exists.",
        "INVALID_CREDENTIALS" => "Invalid credentials. Check your email and password.",
        "ACCOUNT_LOCKED" => "Your account is temporarily locked.",
        "TOKEN_EXPIRED" => "Your session has expired. Please sign in again.",
        "PERMISSION_DENIED" => "You do not have permission to perform this action.",
        "RESOURCE_NOT_FOUND" => "The requested resource does not exist.",
        "RATE_LIMIT_EXCEEDED" => "Too many requests. Wait a moment before trying again.",
        _ => return None,
    };
    Some(message)
}

/// Convert a raw failure into the normalized error shape.
pub fn normalize(failure: RawFailure) -> Error {
    match failure {
        RawFailure::Network(cause) => {
            debug!("Network failure normalized: {}", cause);
            Error::new(ErrorKind::Client, CLIENT_ERROR, NETWORK_MESSAGE)
        }
        RawFailure::Status { status, body } => normalize_status(status, body.unwrap_or_default()),
        RawFailure::Rejected { message } => {
            let message = non_blank(message).unwrap_or_else(|| FALLBACK_MESSAGE.to_string());
            Error::new(ErrorKind::Unexpected, REQUEST_REJECTED, message)
        }
        RawFailure::Exception(cause) => {
            Error::new(ErrorKind::Unexpected, UNEXPECTED_ERROR, FALLBACK_MESSAGE)
                .with_details(Value::String(cause))
        }
        RawFailure::Unsupported(operation) => {
            Error::new(ErrorKind::Unexpected, NOT_IMPLEMENTED, UNSUPPORTED_MESSAGE)
                .with_details(Value::String(operation))
        }
    }
}

fn normalize_status(status: u16, body: ErrorBody) -> Error {
    let mut kind = ErrorKind::from_status(status);
    if kind == ErrorKind::InvalidRequest && !body.errors.is_empty() {
        kind = ErrorKind::Validation;
    }

    let code = non_blank(body.code).unwrap_or_else(|| status.to_string());
    let message = code_message(&code)
        .map(str::to_string)
        .or_else(|| non_blank(body.message))
        .or_else(|| status_message(status).map(str::to_string))
        .unwrap_or_else(|| FALLBACK_MESSAGE.to_string());

    let mut error = Error::new(kind, code, message)
        .with_status(status)
        .with_field_errors(body.errors);
    if let Some(details) = body.details {
        error = error.with_details(details);
    }
    error
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// Side effect an external collaborator should carry out for an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HandlingDirective {
    /// Clear local session state and navigate to the login view.
    ClearSessionAndLogin { reason: &'static str },

    /// Show the access-denied state.
    AccessDenied,
}

/// Derive the handling directive for a normalized error, if any.
pub fn directive_for(error: &Error) -> Option<HandlingDirective> {
    match (error.code(), error.status()) {
        ("TOKEN_EXPIRED", _) | ("401", _) | (_, Some(401)) => {
            Some(HandlingDirective::ClearSessionAndLogin {
                reason: "session_expired",
            })
        }
        ("PERMISSION_DENIED", _) | ("403", _) | (_, Some(403)) => {
            Some(HandlingDirective::AccessDenied)
        }
        _ => None,
    }
}
