//! Handler registry: message type → handler, signal type → handlers.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;

use super::{ConfigureFn, HandleFn, HandlerContext, MessageHandler, RegisteredHandler};
use crate::dispatch::{TypedWireInvoker, WireInvoker};
use crate::error::MessagingError;
use crate::message::{Message, MessageDescriptor, Signal};
use crate::pipeline::Pipeline;
use crate::signal::SignalHandler;

/// Registration record for one message handler.
#[derive(Clone)]
pub struct HandlerRegistration {
    pub descriptor: MessageDescriptor,
    /// Type name of the handler implementation.
    pub handler_type: &'static str,
    typed: Arc<dyn Any + Send + Sync>,
    invoker: Arc<dyn WireInvoker>,
}

impl HandlerRegistration {
    /// Type-erased entry point used by name-based transports.
    pub fn invoker(&self) -> &Arc<dyn WireInvoker> {
        &self.invoker
    }

    pub(crate) fn handler<M: Message>(&self) -> Option<Arc<RegisteredHandler<M>>> {
        self.typed.clone().downcast::<RegisteredHandler<M>>().ok()
    }
}

impl fmt::Debug for HandlerRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistration")
            .field("message", &self.descriptor.name)
            .field("message_type", &self.descriptor.message_type_name)
            .field("response_type", &self.descriptor.response_type_name)
            .field("handler_type", &self.handler_type)
            .finish()
    }
}

/// Registration record for one signal handler.
#[derive(Clone)]
pub struct SignalRegistration {
    pub descriptor: MessageDescriptor,
    pub handler_type: &'static str,
    handler_id: TypeId,
    typed: Arc<dyn Any + Send + Sync>,
}

impl SignalRegistration {
    pub(crate) fn handler<S: Signal>(&self) -> Option<Arc<RegisteredHandler<S>>> {
        self.typed.clone().downcast::<RegisteredHandler<S>>().ok()
    }
}

impl fmt::Debug for SignalRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalRegistration")
            .field("signal", &self.descriptor.name)
            .field("handler_type", &self.handler_type)
            .finish()
    }
}

/// Maps message types to their handlers.
///
/// At most one handler may be registered per message type (and therefore per
/// message/response pair), and message names must be unique so name-based
/// transports can route unambiguously. Signals may have any number of
/// handlers, but each handler type at most once per signal.
#[derive(Default)]
pub struct HandlerRegistry {
    messages: HashMap<(TypeId, TypeId), HandlerRegistration>,
    signals: HashMap<TypeId, Vec<SignalRegistration>>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut messages: Vec<&str> = self
            .messages
            .values()
            .map(|registration| registration.descriptor.name)
            .collect();
        messages.sort_unstable();
        let mut signals: Vec<&str> = self
            .signals
            .values()
            .filter_map(|handlers| handlers.first())
            .map(|registration| registration.descriptor.name)
            .collect();
        signals.sort_unstable();

        f.debug_struct("HandlerRegistry")
            .field("messages", &messages)
            .field("signals", &signals)
            .finish()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a message handler.
    pub fn register<H: MessageHandler>(&mut self, handler: H) -> Result<&mut Self, MessagingError> {
        let handler = Arc::new(handler);
        let handle: HandleFn<H::Message> = Arc::new(move |message: H::Message, ctx: HandlerContext| {
            let handler = handler.clone();
            async move { handler.handle(message, ctx).await }.boxed()
        });
        let configure: ConfigureFn<H::Message> = Arc::new(H::configure_pipeline);

        self.insert(type_name::<H>(), RegisteredHandler::new(handle, configure))
    }

    /// Register an async closure as the handler for `M`.
    pub fn register_fn<M, F, Fut>(&mut self, handler: F) -> Result<&mut Self, MessagingError>
    where
        M: Message,
        F: Fn(M, HandlerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<M::Response, MessagingError>> + Send + 'static,
    {
        self.register_fn_with_pipeline(handler, |_: &mut Pipeline<M>| Ok(()))
    }

    /// Register an async closure together with a pipeline configuration hook.
    pub fn register_fn_with_pipeline<M, F, Fut, C>(
        &mut self,
        handler: F,
        configure: C,
    ) -> Result<&mut Self, MessagingError>
    where
        M: Message,
        F: Fn(M, HandlerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<M::Response, MessagingError>> + Send + 'static,
        C: Fn(&mut Pipeline<M>) -> Result<(), MessagingError> + Send + Sync + 'static,
    {
        let handle: HandleFn<M> =
            Arc::new(move |message: M, ctx: HandlerContext| handler(message, ctx).boxed());
        self.insert(type_name::<F>(), RegisteredHandler::new(handle, Arc::new(configure)))
    }

    fn insert<M: Message>(
        &mut self,
        handler_type: &'static str,
        handler: RegisteredHandler<M>,
    ) -> Result<&mut Self, MessagingError> {
        let descriptor = MessageDescriptor::of::<M>();
        let key = (descriptor.message_type, descriptor.response_type);

        let existing = self.messages.get(&key).or_else(|| {
            self.messages
                .values()
                .find(|registration| registration.descriptor.name == descriptor.name)
        });
        if let Some(existing) = existing {
            return Err(MessagingError::DuplicateRegistration {
                message_type: descriptor.message_type_name.to_string(),
                existing_handler: existing.handler_type.to_string(),
                new_handler: handler_type.to_string(),
            });
        }

        tracing::debug!(
            message = descriptor.name,
            handler = handler_type,
            "registered message handler"
        );

        self.messages.insert(
            key,
            HandlerRegistration {
                descriptor,
                handler_type,
                typed: Arc::new(handler),
                invoker: Arc::new(TypedWireInvoker::<M>::new()),
            },
        );
        Ok(self)
    }

    /// Register a signal handler.
    pub fn register_signal_handler<H: SignalHandler>(
        &mut self,
        handler: H,
    ) -> Result<&mut Self, MessagingError> {
        let handler = Arc::new(handler);
        let handle: HandleFn<H::Signal> = Arc::new(move |signal: H::Signal, ctx: HandlerContext| {
            let handler = handler.clone();
            async move { handler.handle(signal, ctx).await }.boxed()
        });
        let configure: ConfigureFn<H::Signal> = Arc::new(H::configure_pipeline);

        self.insert_signal(
            TypeId::of::<H>(),
            type_name::<H>(),
            RegisteredHandler::new(handle, configure),
        )
    }

    /// Register an async closure as a handler for signal `S`.
    pub fn register_signal_fn<S, F, Fut>(&mut self, handler: F) -> Result<&mut Self, MessagingError>
    where
        S: Signal,
        F: Fn(S, HandlerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), MessagingError>> + Send + 'static,
    {
        let handle: HandleFn<S> =
            Arc::new(move |signal: S, ctx: HandlerContext| handler(signal, ctx).boxed());
        let configure: ConfigureFn<S> = Arc::new(|_: &mut Pipeline<S>| Ok(()));

        self.insert_signal(
            TypeId::of::<F>(),
            type_name::<F>(),
            RegisteredHandler::new(handle, configure),
        )
    }

    fn insert_signal<S: Signal>(
        &mut self,
        handler_id: TypeId,
        handler_type: &'static str,
        handler: RegisteredHandler<S>,
    ) -> Result<&mut Self, MessagingError> {
        let descriptor = MessageDescriptor::of::<S>();
        let handlers = self.signals.entry(descriptor.message_type).or_default();

        if handlers.iter().any(|existing| existing.handler_id == handler_id) {
            return Err(MessagingError::DuplicateRegistration {
                message_type: descriptor.message_type_name.to_string(),
                existing_handler: handler_type.to_string(),
                new_handler: handler_type.to_string(),
            });
        }

        tracing::debug!(
            signal = descriptor.name,
            handler = handler_type,
            "registered signal handler"
        );

        handlers.push(SignalRegistration {
            descriptor,
            handler_type,
            handler_id,
            typed: Arc::new(handler),
        });
        Ok(self)
    }

    /// Registration for message type `M`, if any.
    pub fn registration<M: Message>(&self) -> Option<&HandlerRegistration> {
        self.messages
            .get(&(TypeId::of::<M>(), TypeId::of::<M::Response>()))
    }

    /// Registration for a (message type, response type) pair.
    pub fn registration_by_type(
        &self,
        message_type: TypeId,
        response_type: TypeId,
    ) -> Result<&HandlerRegistration, MessagingError> {
        self.messages
            .get(&(message_type, response_type))
            .ok_or_else(|| MessagingError::HandlerNotFound(format!("{:?}", message_type)))
    }

    /// Registration by wire name, as used by name-based transports.
    pub fn registration_by_name(&self, name: &str) -> Option<&HandlerRegistration> {
        self.messages
            .values()
            .find(|registration| registration.descriptor.name == name)
    }

    /// All message handler registrations, in no particular order.
    pub fn registrations(&self) -> impl Iterator<Item = &HandlerRegistration> {
        self.messages.values()
    }

    /// Signal handler registrations for `S`, in registration order.
    pub fn signal_registrations<S: Signal>(&self) -> &[SignalRegistration] {
        self.signals
            .get(&TypeId::of::<S>())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub(crate) fn handler<M: Message>(&self) -> Result<Arc<RegisteredHandler<M>>, MessagingError> {
        self.registration::<M>()
            .and_then(HandlerRegistration::handler::<M>)
            .ok_or_else(|| MessagingError::HandlerNotFound(M::NAME.to_string()))
    }

    pub(crate) fn signal_handlers<S: Signal>(&self) -> Vec<Arc<RegisteredHandler<S>>> {
        self.signal_registrations::<S>()
            .iter()
            .filter_map(SignalRegistration::handler::<S>)
            .collect()
    }
}
