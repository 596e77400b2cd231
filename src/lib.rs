//! Typed messaging with middleware pipelines and scoped context data.
//!
//! Handlers are registered once in a [`HandlerRegistry`] and reached through a
//! [`Messaging`] instance, either in process or through a transport
//! ([`transport::http`], [`transport::queue`]). Every dispatch runs a
//! [`Pipeline`] of middleware around the handler and carries a
//! [`ConquerorContext`] whose data flows downstream to handlers and upstream
//! back to callers.
//!
//! ## Example
//!
//! ```ignore
//! use conqueror::{HandlerRegistry, Message, Messaging, Services, LoggingPipelineExt};
//!
//! #[derive(Clone, Serialize, Deserialize)]
//! pub struct Increment {
//!     pub amount: i64,
//! }
//!
//! impl Message for Increment {
//!     type Response = i64;
//!     const NAME: &'static str = "counter.increment";
//! }
//!
//! let mut registry = HandlerRegistry::new();
//! registry.register(IncrementHandler)?;
//!
//! let messaging = Messaging::new(registry, Services::new().with(CounterStore::new(10)));
//!
//! let value = messaging
//!     .message::<Increment>()
//!     .with_pipeline(|pipeline| {
//!         pipeline.use_logging();
//!         Ok(())
//!     })
//!     .handle(Increment { amount: 5 })
//!     .await?;
//! assert_eq!(value, 15);
//! ```

pub mod context;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod message;
pub mod middleware;
pub mod pipeline;
pub mod services;
pub mod signal;
pub mod transport;

pub use context::{ConquerorContext, ContextData, ContextDataScope, ContextError, ContextScope};
pub use dispatch::{
    InProcessTransportClient, MessageClients, MessageSender, Messaging, TransportClient,
    TransportClientBuilder,
};
pub use error::{MessagingError, TransportFailure};
pub use handler::{HandlerContext, HandlerRegistry, MessageHandler};
pub use message::{Message, MessageDescriptor, Signal};
pub use middleware::{
    LoggingConfiguration, LoggingMiddleware, LoggingPipelineExt, PayloadLoggingStrategy, Validate,
    ValidationMiddleware, ValidationPipelineExt,
};
pub use pipeline::{Middleware, MiddlewareContext, Pipeline, TransportRole, TransportType};
pub use services::Services;
pub use signal::{BroadcastingStrategy, SequentialErrorHandling, SignalHandler, SignalPublisher};
