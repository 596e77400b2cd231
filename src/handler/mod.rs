//! Message handlers, the per-call handler context and the handler registry.
//!
//! Handlers implement [`MessageHandler`] (or are registered as async closures)
//! and may shape their own pipeline through `configure_pipeline`, which runs
//! fresh on every execution.
//!
//! ## Example
//!
//! ```ignore
//! struct IncrementHandler;
//!
//! #[async_trait]
//! impl MessageHandler for IncrementHandler {
//!     type Message = Increment;
//!
//!     async fn handle(&self, message: Increment, ctx: HandlerContext) -> Result<CounterValue, MessagingError> {
//!         let store = ctx.services().require::<CounterStore>()?;
//!         Ok(CounterValue { new_value: store.add(message.amount) })
//!     }
//!
//!     fn configure_pipeline(pipeline: &mut Pipeline<Increment>) -> Result<(), MessagingError> {
//!         pipeline.use_validation().use_logging();
//!         Ok(())
//!     }
//! }
//!
//! let mut registry = HandlerRegistry::new();
//! registry.register(IncrementHandler)?;
//! ```

mod context;
mod registry;

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::error::MessagingError;
use crate::message::Message;
use crate::pipeline::Pipeline;

pub use context::HandlerContext;
pub use registry::{HandlerRegistration, HandlerRegistry, SignalRegistration};

/// Handles one message type.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    type Message: Message;

    async fn handle(
        &self,
        message: Self::Message,
        ctx: HandlerContext,
    ) -> Result<<Self::Message as Message>::Response, MessagingError>;

    /// Populate the pipeline for one execution. Runs before caller configuration.
    fn configure_pipeline(_pipeline: &mut Pipeline<Self::Message>) -> Result<(), MessagingError> {
        Ok(())
    }
}

pub(crate) type HandleFn<M> = Arc<
    dyn Fn(M, HandlerContext) -> BoxFuture<'static, Result<<M as Message>::Response, MessagingError>>
        + Send
        + Sync,
>;

pub(crate) type ConfigureFn<M> =
    Arc<dyn Fn(&mut Pipeline<M>) -> Result<(), MessagingError> + Send + Sync>;

/// A handler with its pipeline hook, typed for message `M`.
pub(crate) struct RegisteredHandler<M: Message> {
    pub(crate) handle: HandleFn<M>,
    pub(crate) configure: ConfigureFn<M>,
}

impl<M: Message> RegisteredHandler<M> {
    pub(crate) fn new(handle: HandleFn<M>, configure: ConfigureFn<M>) -> Self {
        Self { handle, configure }
    }
}
