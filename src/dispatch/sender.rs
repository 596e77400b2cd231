use std::sync::Arc;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use super::transport::{TransportClient, TransportClientBuilder};
use super::Messaging;
use crate::context::{new_id, ConquerorContext};
use crate::error::MessagingError;
use crate::handler::HandlerContext;
use crate::message::Message;
use crate::pipeline::{Pipeline, Terminal, TransportType, IN_PROCESS_TRANSPORT};

pub(crate) type PipelineConfiguration<M> =
    Arc<dyn Fn(&mut Pipeline<M>) -> Result<(), MessagingError> + Send + Sync>;

type TransportFactory<M> = Arc<
    dyn Fn(&TransportClientBuilder) -> Result<Box<dyn TransportClient<M>>, MessagingError>
        + Send
        + Sync,
>;

/// Typed sender for message `M`.
///
/// Every call to [`handle`](Self::handle) creates a child context (or a new
/// root), builds a fresh pipeline, runs it, and disposes the context so its
/// upstream data reaches the caller's context.
pub struct MessageSender<M: Message> {
    messaging: Messaging,
    parent: Option<ConquerorContext>,
    configurations: Vec<PipelineConfiguration<M>>,
    transport: Option<TransportFactory<M>>,
}

impl<M: Message> Clone for MessageSender<M> {
    fn clone(&self) -> Self {
        Self {
            messaging: self.messaging.clone(),
            parent: self.parent.clone(),
            configurations: self.configurations.clone(),
            transport: self.transport.clone(),
        }
    }
}

impl<M: Message> MessageSender<M> {
    pub(crate) fn new(messaging: Messaging, parent: Option<ConquerorContext>) -> Self {
        Self {
            messaging,
            parent,
            configurations: Vec::new(),
            transport: None,
        }
    }

    /// Add caller-side pipeline configuration.
    ///
    /// Runs after the handler's own `configure_pipeline` for in-process sends,
    /// and on its own for remote sends. Multiple calls apply in order.
    pub fn with_pipeline<F>(mut self, configure: F) -> Self
    where
        F: Fn(&mut Pipeline<M>) -> Result<(), MessagingError> + Send + Sync + 'static,
    {
        self.configurations.push(Arc::new(configure));
        self
    }

    /// Choose the transport client. Without this the handler runs in-process.
    pub fn with_transport<F>(mut self, factory: F) -> Self
    where
        F: Fn(&TransportClientBuilder) -> Result<Box<dyn TransportClient<M>>, MessagingError>
            + Send
            + Sync
            + 'static,
    {
        self.transport = Some(Arc::new(factory));
        self
    }

    /// Send the message and wait for the response.
    pub async fn handle(&self, message: M) -> Result<M::Response, MessagingError> {
        self.handle_with_cancellation(message, CancellationToken::new())
            .await
    }

    pub async fn handle_with_cancellation(
        &self,
        message: M,
        cancellation: CancellationToken,
    ) -> Result<M::Response, MessagingError> {
        let context = match &self.parent {
            Some(parent) => parent.create_child(),
            None => ConquerorContext::new(),
        };
        let _scope = context.activate()?;
        context.set_message_id(new_id());

        let client = match &self.transport {
            Some(factory) => {
                let builder = TransportClientBuilder::new(self.messaging.clone(), context.clone());
                Some(factory(&builder)?)
            }
            None => None,
        };

        match client {
            Some(client) if client.transport_type_name() != IN_PROCESS_TRANSPORT => {
                self.send_remote(client, message, context, cancellation)
                    .await
            }
            _ => self.send_in_process(message, context, cancellation).await,
        }
    }

    async fn send_in_process(
        &self,
        message: M,
        context: ConquerorContext,
        cancellation: CancellationToken,
    ) -> Result<M::Response, MessagingError> {
        let handler = self.messaging.registry().handler::<M>()?;
        let transport_type = TransportType::in_process();

        tracing::debug!(
            message = M::NAME,
            message_id = context.message_id().as_deref(),
            trace_id = context.trace_id(),
            "dispatching message in-process"
        );

        let mut pipeline = Pipeline::new(
            self.messaging.services().clone(),
            context.clone(),
            transport_type.clone(),
        );
        (handler.configure)(&mut pipeline)?;
        for configure in &self.configurations {
            configure(&mut pipeline)?;
        }

        let messaging = self.messaging.clone();
        let handler_context = context.clone();
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

    async fn send_remote(
        &self,
        client: Box<dyn TransportClient<M>>,
        message: M,
        context: ConquerorContext,
        cancellation: CancellationToken,
    ) -> Result<M::Response, MessagingError> {
        let transport_type = TransportType::client(client.transport_type_name());

        tracing::debug!(
            message = M::NAME,
            transport = %transport_type,
            message_id = context.message_id().as_deref(),
            trace_id = context.trace_id(),
            "dispatching message to transport"
        );

        let mut pipeline = Pipeline::new(
            self.messaging.services().clone(),
            context.clone(),
            transport_type,
        );
        for configure in &self.configurations {
            configure(&mut pipeline)?;
        }

        let client: Arc<dyn TransportClient<M>> = Arc::from(client);
        let services = self.messaging.services().clone();
        let terminal: Terminal<M> = Box::new(move |message: M, cancellation: CancellationToken| {
            let client = client.clone();
            let services = services.clone();
            let context = context.clone();
            async move { client.send(message, &services, &context, cancellation).await }.boxed()
        });

        pipeline.execute(message, cancellation, terminal).await
    }
}
