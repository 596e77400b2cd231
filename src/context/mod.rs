//! Scoped context data that follows a message through pipelines and transports.

mod conqueror_context;
mod data;
mod error;
pub mod formatting;

pub use conqueror_context::{ConquerorContext, ContextScope};
pub use data::{ContextData, ContextDataScope, ContextEntry, ContextValue};
pub use error::ContextError;
pub use formatting::{ContextDirection, WireEntry};

pub(crate) use conqueror_context::new_id;
