//! Maps provider failures onto [`ErrorKind`]s.
//!
//! Only structured signals are consulted: the HTTP status and the error
//! code field of a JSON error body. Free-text messages are carried along
//! for display but never inspected.

use reqwest::StatusCode;
use serde::Deserialize;
use tutor_relay_model::ErrorKind;

use crate::Error;

const OVERLOADED_STATUSES: [u16; 3] = [429, 503, 529];
const OVERLOADED_CODES: [&str; 3] =
    ["service_overloaded", "overloaded_error", "rate_limit_error"];

/// An error body, either the relay's flat shape or the vendor's nested
/// one.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ErrorBody {
    /// `{"type": "error", "error": {"type": "...", "message": "..."}}`
    Nested { error: ErrorDetail },
    /// `{"error": "...", "message": "..."}`
    Flat {
        error: String,
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        details: Option<String>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ErrorDetail {
    #[serde(rename = "type")]
    pub code: String,
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorBody {
    pub fn into_error(self, status: Option<StatusCode>) -> Error {
        let (code, message) = match self {
            ErrorBody::Nested { error } => (error.code, error.message),
            ErrorBody::Flat {
                error,
                message,
                details,
            } => (error, message.or(details)),
        };
        let kind = if is_overloaded_code(&code)
            || status.is_some_and(is_overloaded_status)
        {
            ErrorKind::Overloaded
        } else {
            ErrorKind::Transport
        };
        let message = match (status, message) {
            (Some(status), Some(message)) => {
                format!("{code} ({status}): {message}")
            }
            (Some(status), None) => format!("{code} ({status})"),
            (None, Some(message)) => format!("{code}: {message}"),
            (None, None) => code,
        };
        Error::new(message, kind)
    }
}

#[inline]
pub fn is_overloaded_status(status: StatusCode) -> bool {
    OVERLOADED_STATUSES.contains(&status.as_u16())
}

#[inline]
pub fn is_overloaded_code(code: &str) -> bool {
    OVERLOADED_CODES.contains(&code)
}

/// Builds an error from a raw response body, falling back to the status
/// alone when the body is not a known error shape.
pub fn error_from_body(status: Option<StatusCode>, body: &str) -> Error {
    if let Ok(body) = serde_json::from_str::<ErrorBody>(body) {
        return body.into_error(status);
    }
    let kind = if status.is_some_and(is_overloaded_status) {
        ErrorKind::Overloaded
    } else {
        ErrorKind::Transport
    };
    let message = match status {
        Some(status) => format!("HTTP {status}"),
        None => "unrecognized error payload".to_owned(),
    };
    Error::new(message, kind)
}
