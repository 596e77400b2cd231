//! In-memory request/reply queue transport.
//!
//! Messages travel as bitcode-encoded [`Envelope`]s with context data in their
//! metadata. A background listener (see [`listen`]) consumes envelopes,
//! dispatches them by message name, and answers each with a [`Reply`].
//! Several listeners on the same queue compete for envelopes; each envelope is
//! handled by exactly one of them.
//!
//! ## Example
//!
//! ```ignore
//! let queue = InMemoryQueue::new();
//! let handle = queue::listen(server_messaging, queue.clone());
//!
//! let value = client_messaging
//!     .message::<Increment>()
//!     .with_transport(move |builder| builder.use_queue(&queue))
//!     .handle(Increment { amount: 5 })
//!     .await?;
//!
//! let stats = handle.stop().await;
//! ```

mod client;
mod envelope;
mod in_memory;
mod listener;

pub use client::{QueueTransportClient, QueueTransportClientBuilderExt};
pub use envelope::{Envelope, Reply};
pub use in_memory::{InMemoryQueue, QueueError, DEFAULT_REQUEST_TIMEOUT};
pub use listener::{listen, QueueHandle, TransportStats};

/// Transport name used in [`TransportType`](crate::pipeline::TransportType).
pub const QUEUE_TRANSPORT: &str = "queue";
