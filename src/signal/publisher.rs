use std::sync::Arc;

use futures::{FutureExt, StreamExt};
use tokio_util::sync::CancellationToken;

use super::strategy::{collate, BroadcastingStrategy, SequentialErrorHandling};
use crate::context::{new_id, ConquerorContext};
use crate::dispatch::{Messaging, PipelineConfiguration};
use crate::error::MessagingError;
use crate::handler::{HandlerContext, RegisteredHandler};
use crate::message::Signal;
use crate::pipeline::{Pipeline, Terminal, TransportRole, TransportType, IN_PROCESS_TRANSPORT};

/// Typed publisher for signal `S`.
///
/// The publisher's own pipeline wraps the whole broadcast; each handler then
/// runs in its own pipeline and child context.
pub struct SignalPublisher<S: Signal> {
    messaging: Messaging,
    parent: Option<ConquerorContext>,
    configurations: Vec<PipelineConfiguration<S>>,
    strategy: BroadcastingStrategy,
}

impl<S: Signal> Clone for SignalPublisher<S> {
    fn clone(&self) -> Self {
        Self {
            messaging: self.messaging.clone(),
            parent: self.parent.clone(),
            configurations: self.configurations.clone(),
            strategy: self.strategy,
        }
    }
}

impl<S: Signal> SignalPublisher<S> {
    pub(crate) fn new(messaging: Messaging, parent: Option<ConquerorContext>) -> Self {
        Self {
            messaging,
            parent,
            configurations: Vec::new(),
            strategy: BroadcastingStrategy::default(),
        }
    }

    /// Add publisher-side pipeline configuration. Multiple calls apply in order.
    pub fn with_pipeline<F>(mut self, configure: F) -> Self
    where
        F: Fn(&mut Pipeline<S>) -> Result<(), MessagingError> + Send + Sync + 'static,
    {
        self.configurations.push(Arc::new(configure));
        self
    }

    pub fn with_broadcasting_strategy(mut self, strategy: BroadcastingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Deliver the signal to every registered handler.
    pub async fn publish(&self, signal: S) -> Result<(), MessagingError> {
        self.publish_with_cancellation(signal, CancellationToken::new())
            .await
    }

    pub async fn publish_with_cancellation(
        &self,
        signal: S,
        cancellation: CancellationToken,
    ) -> Result<(), MessagingError> {
        self.strategy.validate()?;

        let context = match &self.parent {
            Some(parent) => parent.create_child(),
            None => ConquerorContext::new(),
        };
        let _scope = context.activate()?;
        context.set_message_id(new_id());

        let handlers = self.messaging.registry().signal_handlers::<S>();
        tracing::debug!(
            signal = S::NAME,
            handlers = handlers.len(),
            strategy = ?self.strategy,
            trace_id = context.trace_id(),
            "publishing signal"
        );

        let mut pipeline = Pipeline::new(
            self.messaging.services().clone(),
            context.clone(),
            TransportType::new(IN_PROCESS_TRANSPORT, TransportRole::Client),
        );
        for configure in &self.configurations {
            configure(&mut pipeline)?;
        }

        let broadcast = Arc::new(Broadcast {
            messaging: self.messaging.clone(),
            context,
            handlers,
            strategy: self.strategy,
        });
        let terminal: Terminal<S> = Box::new(move |signal: S, cancellation: CancellationToken| {
            let broadcast = broadcast.clone();
            async move { broadcast.run(signal, cancellation).await }.boxed()
        });

        pipeline.execute(signal, cancellation, terminal).await
    }
}

struct Broadcast<S: Signal> {
    messaging: Messaging,
    context: ConquerorContext,
    handlers: Vec<Arc<RegisteredHandler<S>>>,
    strategy: BroadcastingStrategy,
}

impl<S: Signal> Broadcast<S> {
    async fn run(&self, signal: S, cancellation: CancellationToken) -> Result<(), MessagingError> {
        if self.handlers.is_empty() {
            return Ok(());
        }

        match self.strategy {
            BroadcastingStrategy::Sequential(SequentialErrorHandling::ThrowOnFirstError) => {
                for handler in &self.handlers {
                    self.deliver(handler.clone(), signal.clone(), cancellation.clone())
                        .await?;
                }
                Ok(())
            }
            BroadcastingStrategy::Sequential(SequentialErrorHandling::ThrowAfterAll) => {
                let mut errors = Vec::new();
                for handler in &self.handlers {
                    if let Err(e) = self
                        .deliver(handler.clone(), signal.clone(), cancellation.clone())
                        .await
                    {
                        errors.push(e);
                    }
                }
                collate(errors)
            }
            BroadcastingStrategy::Parallel {
                max_degree_of_parallelism,
            } => {
                let limit = max_degree_of_parallelism.unwrap_or(self.handlers.len());
                let deliveries: Vec<_> = self
                    .handlers
                    .iter()
                    .cloned()
                    .map(|handler| self.deliver(handler, signal.clone(), cancellation.clone()))
                    .collect();
                let results: Vec<Result<(), MessagingError>> = futures::stream::iter(deliveries)
                    .buffer_unordered(limit)
                    .collect()
                    .await;

                collate(results.into_iter().filter_map(Result::err).collect())
            }
        }
    }

    /// Run one handler in its own pipeline and child context.
    async fn deliver(
        &self,
        handler: Arc<RegisteredHandler<S>>,
        signal: S,
        cancellation: CancellationToken,
    ) -> Result<(), MessagingError> {
        let context = self.context.create_child();
        let _scope = context.activate()?;
        context.set_message_id(new_id());
        let transport_type = TransportType::in_process();

        let mut pipeline = Pipeline::new(
            self.messaging.services().clone(),
            context.clone(),
            transport_type.clone(),
        );
        (handler.configure)(&mut pipeline)?;

        let messaging = self.messaging.clone();
        let terminal: Terminal<S> = Box::new(move |signal: S, cancellation: CancellationToken| {
            let ctx = HandlerContext::new(
                messaging.clone(),
                context.clone(),
                transport_type.clone(),
                cancellation,
            );
            (handler.handle)(signal, ctx)
        });

        pipeline.execute(signal, cancellation, terminal).await
    }
}
