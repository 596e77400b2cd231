//! Signals: notifications delivered to every registered signal handler.
//!
//! ## Example
//!
//! ```ignore
//! #[derive(Clone, Serialize, Deserialize)]
//! pub struct CounterIncremented {
//!     pub new_value: i64,
//! }
//!
//! impl Message for CounterIncremented {
//!     type Response = ();
//!     const NAME: &'static str = "counter.incremented";
//! }
//!
//! impl Signal for CounterIncremented {}
//!
//! registry
//!     .register_signal_handler(AuditLog)?
//!     .register_signal_handler(Notifier)?;
//!
//! messaging
//!     .signal::<CounterIncremented>()
//!     .with_broadcasting_strategy(BroadcastingStrategy::parallel())
//!     .publish(CounterIncremented { new_value: 15 })
//!     .await?;
//! ```

mod publisher;
mod strategy;

use async_trait::async_trait;

use crate::error::MessagingError;
use crate::handler::HandlerContext;
use crate::message::Signal;
use crate::pipeline::Pipeline;

pub use publisher::SignalPublisher;
pub use strategy::{BroadcastingStrategy, SequentialErrorHandling};

/// Handles one signal type. Many handlers may observe the same signal.
#[async_trait]
pub trait SignalHandler: Send + Sync + 'static {
    type Signal: Signal;

    async fn handle(&self, signal: Self::Signal, ctx: HandlerContext) -> Result<(), MessagingError>;

    /// Populate this handler's pipeline for one delivery.
    fn configure_pipeline(_pipeline: &mut Pipeline<Self::Signal>) -> Result<(), MessagingError> {
        Ok(())
    }
}
