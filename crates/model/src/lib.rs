//! An abstraction layer for the chat providers a tutoring session talks to.
//!
//! This crate establishes an unified protocol for streaming one assistant
//! turn from a provider, so that the session logic can switch between the
//! course relay endpoint and a model vendor's API without modifying the
//! core codebase.
//!
//! Types in this crate don't define any behavior, instead they are the
//! constraints that the implementors should adhere to. Wire formats are
//! entirely the business of the implementors: a request only carries the
//! role-tagged history, and a response only yields [`ChatEvent`]s.

#![deny(missing_docs)]

mod error;
mod provider;
mod request;
mod response;

pub use error::*;
pub use provider::*;
pub use request::*;
pub use response::*;
