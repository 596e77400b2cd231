use std::marker::PhantomData;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::envelope::metadata_values;
use super::{Envelope, InMemoryQueue, QueueError, QUEUE_TRANSPORT};
use crate::context::ConquerorContext;
use crate::dispatch::{TransportClient, TransportClientBuilder};
use crate::error::{MessagingError, TransportFailure};
use crate::message::Message;
use crate::pipeline::TransportType;
use crate::services::Services;
use crate::transport::{CONTEXT_HEADER, MESSAGE_ID_HEADER, TRACE_ID_HEADER};

/// Sends messages through an [`InMemoryQueue`] and waits for the reply.
pub struct QueueTransportClient<M> {
    queue: InMemoryQueue,
    _message: PhantomData<fn(M)>,
}

impl<M: Message> QueueTransportClient<M> {
    pub fn new(queue: InMemoryQueue) -> Self {
        Self {
            queue,
            _message: PhantomData,
        }
    }
}

#[async_trait]
impl<M: Message> TransportClient<M> for QueueTransportClient<M> {
    fn transport_type_name(&self) -> &str {
        QUEUE_TRANSPORT
    }

    async fn send(
        &self,
        message: M,
        _services: &Services,
        context: &ConquerorContext,
        cancellation: CancellationToken,
    ) -> Result<M::Response, MessagingError> {
        let transport_type = TransportType::client(QUEUE_TRANSPORT);

        let mut envelope = Envelope::encode(M::NAME, &message)?
            .with_metadata(TRACE_ID_HEADER, context.trace_id());
        if let Some(message_id) = context.message_id() {
            envelope = envelope.with_metadata(MESSAGE_ID_HEADER, message_id);
        }
        if let Some(encoded) = context.encode_downstream() {
            envelope = envelope.with_metadata(CONTEXT_HEADER, encoded);
        }

        let reply = tokio::select! {
            _ = cancellation.cancelled() => return Err(MessagingError::Cancelled),
            reply = self.queue.request(envelope) => reply.map_err(|e| {
                let failure =
                    TransportFailure::new(transport_type.clone(), &message, "queue request failed");
                let failure = match e {
                    QueueError::NoListener => failure.with_status(503),
                    QueueError::TimedOut(_) => failure.with_status(504),
                    _ => failure,
                };
                failure.with_source(e)
            })?,
        };

        if !reply.is_success() {
            let reason = reply.error.unwrap_or_else(|| "request failed".to_string());
            return Err(TransportFailure::new(transport_type, &message, reason)
                .with_status(reply.status)
                .into());
        }

        context.decode_into(metadata_values(&reply.metadata, CONTEXT_HEADER))?;

        bitcode::deserialize::<M::Response>(&reply.payload).map_err(|e| {
            TransportFailure::new(transport_type, &message, "invalid response payload")
                .with_source(e)
                .into()
        })
    }
}

/// Adds `use_queue` to [`TransportClientBuilder`].
pub trait QueueTransportClientBuilderExt {
    fn use_queue<M: Message>(
        &self,
        queue: &InMemoryQueue,
    ) -> Result<Box<dyn TransportClient<M>>, MessagingError>;
}

impl QueueTransportClientBuilderExt for TransportClientBuilder {
    fn use_queue<M: Message>(
        &self,
        queue: &InMemoryQueue,
    ) -> Result<Box<dyn TransportClient<M>>, MessagingError> {
        Ok(Box::new(QueueTransportClient::<M>::new(queue.clone())))
    }
}
