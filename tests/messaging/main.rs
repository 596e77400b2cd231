//! Messaging integration tests.

mod support;
mod context;
mod dispatch;
mod registry;
mod signals;

#[cfg(feature = "queue")]
mod queue;
