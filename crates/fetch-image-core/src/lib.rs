//! Core runtime pieces shared by the fetch-image crates.
//!
//! Nothing in here performs I/O. The host supplies a [`UiExecutor`] bound to
//! its UI event loop and everything else is built on top of it.

pub mod collections;
mod error;
mod platform;

pub use error::{LoadError, ResolveError};
pub use platform::{Clock, LocalTask, UiExecutor};

pub use web_time::{Duration, Instant};
