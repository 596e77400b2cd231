//! Server-side entry points used by transports.

use std::marker::PhantomData;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::Messaging;
use crate::context::ConquerorContext;
use crate::error::MessagingError;
use crate::handler::HandlerContext;
use crate::message::Message;
use crate::pipeline::{Pipeline, Terminal, TransportType};

/// A message received from a transport, before its payload is decoded.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    /// Context with the caller's downstream data already decoded into it.
    pub conqueror_context: ConquerorContext,
    /// Transport the message arrived on, with role [`Server`](crate::pipeline::TransportRole::Server).
    pub transport_type: TransportType,
    pub cancellation: CancellationToken,
}

impl Messaging {
    /// Run the registered handler for `M` on a context received from a transport.
    ///
    /// Only the handler's own pipeline applies. The context is activated for
    /// the duration of the call; its upstream data is left in place for the
    /// transport to send back.
    pub async fn receive<M: Message>(
        &self,
        message: M,
        conqueror_context: ConquerorContext,
        transport_type: TransportType,
        cancellation: CancellationToken,
    ) -> Result<M::Response, MessagingError> {
        let handler = self.registry().handler::<M>()?;
        let _scope = conqueror_context.activate()?;

        tracing::debug!(
            message = M::NAME,
            transport = %transport_type,
            message_id = conqueror_context.message_id().as_deref(),
            trace_id = conqueror_context.trace_id(),
            "received message"
        );

        let mut pipeline = Pipeline::new(
            self.services().clone(),
            conqueror_context.clone(),
            transport_type.clone(),
        );
        (handler.configure)(&mut pipeline)?;

        let messaging = self.clone();
        let handler_context = conqueror_context.clone();
        let terminal: Terminal<M> = Box::new(move |message: M, cancellation: CancellationToken| {
            let ctx = HandlerContext::new(
                messaging.clone(),
                handler_context.clone(),
                transport_type.clone(),
                cancellation,
            );
            (handler.handle)(message, ctx)
        });

        pipeline.execute(message, cancellation, terminal).await
    }
}

/// Type-erased handler invocation for name-based transports.
///
/// One invoker is created per registration; transports look it up by message
/// name and hand it the raw payload.
#[async_trait]
pub trait WireInvoker: Send + Sync {
    /// Decode a JSON body, run the handler and encode the response as JSON.
    ///
    /// An empty body is accepted for messages that provide an empty instance.
    async fn invoke_json(
        &self,
        messaging: &Messaging,
        body: &[u8],
        request: InboundRequest,
    ) -> Result<serde_json::Value, MessagingError>;

    /// Decode a bitcode payload, run the handler and encode the response with bitcode.
    async fn invoke_binary(
        &self,
        messaging: &Messaging,
        payload: &[u8],
        request: InboundRequest,
    ) -> Result<Vec<u8>, MessagingError>;
}

/// [`WireInvoker`] for message type `M`.
pub struct TypedWireInvoker<M> {
    _message: PhantomData<fn() -> M>,
}

impl<M> TypedWireInvoker<M> {
    pub fn new() -> Self {
        Self {
            _message: PhantomData,
        }
    }
}

impl<M> Default for TypedWireInvoker<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<M: Message> WireInvoker for TypedWireInvoker<M> {
    async fn invoke_json(
        &self,
        messaging: &Messaging,
        body: &[u8],
        request: InboundRequest,
    ) -> Result<serde_json::Value, MessagingError> {
        let message = if body.iter().all(u8::is_ascii_whitespace) {
            match M::empty_instance() {
                Some(message) => message,
                None => serde_json::from_slice::<M>(b"null")?,
            }
        } else {
            serde_json::from_slice::<M>(body)?
        };

        let response = messaging
            .receive(
                message,
                request.conqueror_context,
                request.transport_type,
                request.cancellation,
            )
            .await?;
        serde_json::to_value(response).map_err(MessagingError::other)
    }

    async fn invoke_binary(
        &self,
        messaging: &Messaging,
        payload: &[u8],
        request: InboundRequest,
    ) -> Result<Vec<u8>, MessagingError> {
        let message = bitcode::deserialize::<M>(payload)?;

        let response = messaging
            .receive(
                message,
                request.conqueror_context,
                request.transport_type,
                request.cancellation,
            )
            .await?;
        bitcode::serialize(&response).map_err(MessagingError::other)
    }
}
