//! An out-of-the-box tutoring chat that assembles a lesson, a chat
//! provider and a session.
//!
//! The crate includes a CLI tool for using in the terminal. And you can also
//! use it as a library to run lessons from your own host apps.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod lesson;
mod settings;

pub use lesson::{Lesson, LessonError};
pub use settings::{ProviderSettings, SettingsError};

/// Re-exports of [`tutor_relay_core`] crate.
pub mod core {
    pub use tutor_relay_core::*;
}

/// Re-exports of [`tutor_relay_http`] crate.
pub mod http {
    pub use tutor_relay_http::*;
}
