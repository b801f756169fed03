//! The sans-io client engine.
//!
//! [`Engine`] owns every piece of mutable session state. Callers feed it
//! user operations, transport events and timer firings; it returns the
//! ordered list of [`Action`]s to perform. Nothing in here blocks or does
//! I/O, which keeps the whole protocol deterministic under test.

mod actions;
mod engine;

pub use actions::{Action, Notification, TimerId};
pub use engine::Engine;
