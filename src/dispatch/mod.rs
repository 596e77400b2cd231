//! Dispatch: sending messages in-process or through a transport client.
//!
//! [`Messaging`] owns the frozen handler registry and the shared services.
//! Callers get typed senders from it:
//!
//! ```ignore
//! let messaging = Messaging::new(registry, Services::new().with(CounterStore::new()));
//!
//! // in-process
//! let value = messaging.message::<Increment>().handle(Increment { amount: 5 }).await?;
//!
//! // remote, with an extra client-side middleware
//! let value = messaging
//!     .message::<Increment>()
//!     .with_pipeline(|pipeline| {
//!         pipeline.use_logging();
//!         Ok(())
//!     })
//!     .with_transport(|builder| builder.use_http("http://counters:3000"))
//!     .handle(Increment { amount: 5 })
//!     .await?;
//! ```

mod receive;
mod sender;
mod transport;

use std::sync::Arc;

use crate::context::ConquerorContext;
use crate::handler::HandlerRegistry;
use crate::message::{Message, Signal};
use crate::services::Services;
use crate::signal::SignalPublisher;

pub use receive::{InboundRequest, TypedWireInvoker, WireInvoker};
pub use sender::MessageSender;
pub use transport::{InProcessTransportClient, TransportClient, TransportClientBuilder};

pub(crate) use sender::PipelineConfiguration;

struct MessagingInner {
    registry: HandlerRegistry,
    services: Services,
}

/// Entry point for sending messages and publishing signals.
///
/// Cheap to clone; all clones share the same registry and services.
#[derive(Clone)]
pub struct Messaging {
    inner: Arc<MessagingInner>,
}

impl Messaging {
    pub fn new(registry: HandlerRegistry, services: Services) -> Self {
        Self {
            inner: Arc::new(MessagingInner { registry, services }),
        }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.inner.registry
    }

    pub fn services(&self) -> &Services {
        &self.inner.services
    }

    /// Clients that start a new root context per operation.
    pub fn clients(&self) -> MessageClients {
        MessageClients {
            messaging: self.clone(),
            parent: None,
        }
    }

    /// Clients whose operations run in child contexts of `parent`.
    pub fn clients_in(&self, parent: &ConquerorContext) -> MessageClients {
        MessageClients {
            messaging: self.clone(),
            parent: Some(parent.clone()),
        }
    }

    /// Shortcut for `self.clients().message::<M>()`.
    pub fn message<M: Message>(&self) -> MessageSender<M> {
        self.clients().message::<M>()
    }

    /// Shortcut for `self.clients().signal::<S>()`.
    pub fn signal<S: Signal>(&self) -> SignalPublisher<S> {
        self.clients().signal::<S>()
    }
}

/// Factory for typed senders and publishers, optionally bound to a parent context.
#[derive(Clone)]
pub struct MessageClients {
    messaging: Messaging,
    parent: Option<ConquerorContext>,
}

impl MessageClients {
    pub fn message<M: Message>(&self) -> MessageSender<M> {
        MessageSender::new(self.messaging.clone(), self.parent.clone())
    }

    pub fn signal<S: Signal>(&self) -> SignalPublisher<S> {
        SignalPublisher::new(self.messaging.clone(), self.parent.clone())
    }

    /// The context new operations are children of, if any.
    pub fn parent(&self) -> Option<&ConquerorContext> {
        self.parent.as_ref()
    }
}
