use std::fmt::{self, Display};

use tutor_relay_model::{ChatProviderError, ErrorKind as ProviderErrorKind};

/// The kind of error that ended a send.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The request failed for a reason other than provider overload.
    Transport,
    /// The provider stayed busy, or became busy mid-reply.
    Overloaded,
    /// The provider's reply could not be used.
    StreamParse,
    /// A reply is already streaming into this conversation.
    ConcurrencyViolation,
    /// The caller aborted the send.
    Aborted,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Transport => write!(f, "Transport error"),
            ErrorKind::Overloaded => write!(f, "Provider overloaded"),
            ErrorKind::StreamParse => write!(f, "Unusable response"),
            ErrorKind::ConcurrencyViolation => {
                write!(f, "Reply already in progress")
            }
            ErrorKind::Aborted => write!(f, "Aborted"),
        }
    }
}

impl From<ProviderErrorKind> for ErrorKind {
    fn from(value: ProviderErrorKind) -> Self {
        match value {
            ProviderErrorKind::Overloaded => ErrorKind::Overloaded,
            ProviderErrorKind::Transport => ErrorKind::Transport,
            ProviderErrorKind::InvalidResponse => ErrorKind::StreamParse,
        }
    }
}

/// Describes why a send did not produce a reply.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Error {
    kind: ErrorKind,
    message: String,
}

impl Error {
    /// Creates a new error.
    #[inline]
    pub fn new<S: Into<String>>(kind: ErrorKind, message: S) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    #[inline]
    pub(crate) fn aborted() -> Self {
        Self::new(ErrorKind::Aborted, "the send was aborted")
    }

    #[inline]
    pub(crate) fn concurrency_violation() -> Self {
        Self::new(
            ErrorKind::ConcurrencyViolation,
            "an assistant reply is already streaming",
        )
    }

    pub(crate) fn from_provider<E>(err: &E) -> Self
    where
        E: ChatProviderError + ?Sized,
    {
        Self::new(err.kind().into(), err.to_string())
    }

    /// Returns the kind of this error.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the human-readable message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Error {}
