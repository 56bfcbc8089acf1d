//! Chat providers that speak HTTP and stream their answers as
//! server-sent events.
//!
//! Two wire formats are supported: the course relay endpoint
//! ([`RelayProvider`]) and the Anthropic Messages API
//! ([`AnthropicProvider`]). Both translate their payloads into
//! [`ChatEvent`](tutor_relay_model::ChatEvent)s, so format differences
//! never leak past this crate.

#[macro_use]
extern crate tracing;

mod anthropic;
mod classify;
mod config;
mod io;
mod relay;
mod response;

use std::error::Error as StdError;
use std::fmt::{self, Display};

use mime::Mime;
use reqwest::{Response, header};
use tutor_relay_model::{ChatProviderError, ErrorKind};

pub use anthropic::AnthropicProvider;
pub use config::{
    AnthropicConfig, AnthropicConfigBuilder, RelayConfig, RelayConfigBuilder,
};
pub use relay::RelayProvider;
pub use response::SseResponse;

/// Error type for the providers in this crate.
#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Error {
    fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    fn transport(err: reqwest::Error) -> Self {
        Self::new(format!("{err}"), ErrorKind::Transport)
    }

    /// Returns the error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for Error {}

impl ChatProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// Checks that `resp` is a successful event stream, turning error
/// statuses into classified errors.
async fn expect_event_stream(resp: Response) -> Result<Response, Error> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(classify::error_from_body(Some(status), &body));
    }

    let content_type = resp
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let is_event_stream = content_type
        .and_then(|v| v.parse().ok())
        .map(|m: Mime| m.subtype().as_str() == "event-stream")
        .unwrap_or(false);
    if !is_event_stream {
        return Err(Error::new(
            format!("Unexpected content type: {content_type:?}"),
            ErrorKind::InvalidResponse,
        ));
    }

    Ok(resp)
}
