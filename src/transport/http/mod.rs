//! HTTP transport.
//!
//! Requires the `http` feature. The server side is an axum router that routes
//! messages by name; the client side is a reqwest-based [`TransportClient`].
//!
//! ## Routes
//!
//! - `POST /:message`: handle a message. Body = JSON message (may be empty for
//!   payload-less messages), `conqueror-context` headers = downstream context.
//! - `GET /health`: returns `{ "ok": true, "messages": [...] }`.
//!
//! ## Example
//!
//! ```ignore
//! // server
//! let messaging = Messaging::new(registry, services);
//! transport::http::serve(messaging, "0.0.0.0:3000").await?;
//!
//! // client
//! let value = client_messaging
//!     .message::<Increment>()
//!     .with_transport(|builder| builder.use_http("http://localhost:3000"))
//!     .handle(Increment { amount: 5 })
//!     .await?;
//! ```
//!
//! [`TransportClient`]: crate::dispatch::TransportClient

mod client;
mod server;

pub use client::{HttpTransportClient, HttpTransportClientBuilderExt};
pub use server::{router, serve};

/// Transport name used in [`TransportType`](crate::pipeline::TransportType).
pub const HTTP_TRANSPORT: &str = "http";
