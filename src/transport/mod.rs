//! Transports that carry messages between processes.
//!
//! - `http` (feature `http`): axum server router and reqwest client
//! - `queue` (feature `queue`): in-memory request/reply queue

#[cfg(feature = "http")]
pub mod http;
#[cfg(feature = "queue")]
pub mod queue;

/// Header (or metadata key) carrying encoded context data.
pub const CONTEXT_HEADER: &str = "conqueror-context";
/// Header (or metadata key) carrying the trace id.
pub const TRACE_ID_HEADER: &str = "conqueror-trace-id";
/// Header (or metadata key) carrying the message id.
pub const MESSAGE_ID_HEADER: &str = "conqueror-message-id";
