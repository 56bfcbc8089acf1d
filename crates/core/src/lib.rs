//! Core logic of a tutoring chat session: the message log, retrying
//! streamed turns against a busy provider, and rubric topic tracking.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

pub mod abort;
mod chat_client;
pub mod conversation;
mod cue;
mod error;
pub mod retry;
mod session;
pub mod topic;

pub use cue::is_wrap_up;
pub use error::{Error, ErrorKind};
pub use session::{
    PartialPolicy, Reply, Session, SessionBuilder, SessionSnapshot,
};
pub use tutor_relay_model::{ChatMessage, Role};
