use std::fmt::{self, Display};

/// The kind of error that occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The provider is temporarily busy (capacity or rate limited).
    ///
    /// This is the only kind that is worth retrying.
    Overloaded,
    /// The request could not be delivered, or the provider rejected it.
    Transport,
    /// The provider answered with something that is not a chat stream.
    InvalidResponse,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Overloaded => write!(f, "Provider overloaded"),
            ErrorKind::Transport => write!(f, "Transport error"),
            ErrorKind::InvalidResponse => write!(f, "Invalid response"),
        }
    }
}
