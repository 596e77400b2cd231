use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::Messaging;
use crate::context::ConquerorContext;
use crate::error::MessagingError;
use crate::message::Message;
use crate::pipeline::{TransportType, IN_PROCESS_TRANSPORT};
use crate::services::Services;

/// Delivers a message to a handler that lives somewhere else.
///
/// Implementations send the context's downstream and bidirectional data along
/// with the message, and write the upstream and bidirectional data they get
/// back into `context` before returning.
#[async_trait]
pub trait TransportClient<M: Message>: Send + Sync {
    /// Name of the transport, e.g. `"http"`.
    fn transport_type_name(&self) -> &str;

    async fn send(
        &self,
        message: M,
        services: &Services,
        context: &ConquerorContext,
        cancellation: CancellationToken,
    ) -> Result<M::Response, MessagingError>;
}

/// Passed to [`MessageSender::with_transport`](super::MessageSender::with_transport)
/// closures to build the transport client for one dispatch.
pub struct TransportClientBuilder {
    messaging: Messaging,
    conqueror_context: ConquerorContext,
}

impl TransportClientBuilder {
    pub(crate) fn new(messaging: Messaging, conqueror_context: ConquerorContext) -> Self {
        Self {
            messaging,
            conqueror_context,
        }
    }

    pub fn services(&self) -> &Services {
        self.messaging.services()
    }

    pub fn conqueror_context(&self) -> &ConquerorContext {
        &self.conqueror_context
    }

    /// Deliver to the in-process handler.
    pub fn use_in_process<M: Message>(&self) -> Result<Box<dyn TransportClient<M>>, MessagingError> {
        Ok(Box::new(InProcessTransportClient::new(self.messaging.clone())))
    }
}

/// Transport client that runs the locally registered handler.
///
/// Senders recognize it and fold the handler pipeline into the caller's
/// pipeline. Called directly, it runs the handler's own pipeline.
pub struct InProcessTransportClient {
    messaging: Messaging,
}

impl InProcessTransportClient {
    pub fn new(messaging: Messaging) -> Self {
        Self { messaging }
    }
}

#[async_trait]
impl<M: Message> TransportClient<M> for InProcessTransportClient {
    fn transport_type_name(&self) -> &str {
        IN_PROCESS_TRANSPORT
    }

    async fn send(
        &self,
        message: M,
        _services: &Services,
        context: &ConquerorContext,
        cancellation: CancellationToken,
    ) -> Result<M::Response, MessagingError> {
        let child = context.create_child();
        self.messaging
            .receive(message, child, TransportType::in_process(), cancellation)
            .await
    }
}
