//! Middleware trait, per-call middleware context and the chain executor.

use std::any::Any;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use super::transport_type::TransportType;
use crate::context::ConquerorContext;
use crate::error::MessagingError;
use crate::message::Message;
use crate::services::Services;

/// Downcasting support for middleware stored as trait objects.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn type_name(&self) -> &'static str;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// One cross-cutting concern wrapped around message execution.
///
/// Implementations receive the message and a continuation. Calling
/// [`MiddlewareContext::proceed`] (or [`MiddlewareContext::next`]) runs the
/// rest of the chain; not calling it short-circuits.
///
/// ```ignore
/// struct Timing;
///
/// #[async_trait]
/// impl<M: Message> Middleware<M> for Timing {
///     async fn execute(&self, ctx: MiddlewareContext<M>) -> Result<M::Response, MessagingError> {
///         let start = Instant::now();
///         let result = ctx.proceed().await;
///         tracing::info!(elapsed_ms = start.elapsed().as_millis() as u64, "done");
///         result
///     }
/// }
/// ```
#[async_trait]
pub trait Middleware<M: Message>: AsAny + Send + Sync {
    async fn execute(&self, ctx: MiddlewareContext<M>) -> Result<M::Response, MessagingError>;
}

pub(crate) type Terminal<M> = Box<
    dyn Fn(M, CancellationToken) -> BoxFuture<'static, Result<<M as Message>::Response, MessagingError>>
        + Send
        + Sync,
>;

pub(crate) struct Chain<M: Message> {
    pub(crate) middlewares: Vec<Box<dyn Middleware<M>>>,
    pub(crate) terminal: Terminal<M>,
    pub(crate) conqueror_context: ConquerorContext,
    pub(crate) transport_type: TransportType,
    pub(crate) services: Services,
}

impl<M: Message> Chain<M> {
    pub(crate) async fn invoke(
        chain: Arc<Chain<M>>,
        index: usize,
        message: M,
        cancellation: CancellationToken,
    ) -> Result<M::Response, MessagingError> {
        match chain.middlewares.get(index) {
            Some(middleware) => {
                let ctx = MiddlewareContext {
                    message,
                    conqueror_context: chain.conqueror_context.clone(),
                    transport_type: chain.transport_type.clone(),
                    services: chain.services.clone(),
                    cancellation,
                    next: Next {
                        chain: chain.clone(),
                        index: index + 1,
                    },
                };
                middleware.execute(ctx).await
            }
            None => (chain.terminal)(message, cancellation).await,
        }
    }
}

/// Continuation into the remainder of the chain.
pub struct Next<M: Message> {
    chain: Arc<Chain<M>>,
    index: usize,
}

impl<M: Message> Clone for Next<M> {
    fn clone(&self) -> Self {
        Self {
            chain: self.chain.clone(),
            index: self.index,
        }
    }
}

impl<M: Message> Next<M> {
    pub fn run(
        &self,
        message: M,
        cancellation: CancellationToken,
    ) -> BoxFuture<'static, Result<M::Response, MessagingError>> {
        Box::pin(Chain::invoke(self.chain.clone(), self.index, message, cancellation))
    }
}

/// Everything a middleware sees for one execution.
pub struct MiddlewareContext<M: Message> {
    pub message: M,
    pub conqueror_context: ConquerorContext,
    pub transport_type: TransportType,
    pub services: Services,
    pub cancellation: CancellationToken,
    next: Next<M>,
}

impl<M: Message> MiddlewareContext<M> {
    /// Run the rest of the chain with a (possibly replaced) message and token.
    pub fn next(
        &self,
        message: M,
        cancellation: CancellationToken,
    ) -> BoxFuture<'static, Result<M::Response, MessagingError>> {
        self.next.run(message, cancellation)
    }

    /// Run the rest of the chain with the current message and token.
    pub fn proceed(self) -> BoxFuture<'static, Result<M::Response, MessagingError>> {
        self.next.run(self.message, self.cancellation)
    }

    /// Returns `true` if the message has a `()` response.
    pub fn has_unit_response(&self) -> bool {
        std::any::TypeId::of::<M::Response>() == std::any::TypeId::of::<()>()
    }
}

/// Middleware built from an async closure, see [`Pipeline::use_fn`](super::Pipeline::use_fn).
pub struct FnMiddleware<M, F> {
    f: F,
    _message: PhantomData<fn(M)>,
}

impl<M, F> FnMiddleware<M, F> {
    pub fn new(f: F) -> Self {
        Self {
            f,
            _message: PhantomData,
        }
    }
}

#[async_trait]
impl<M, F, Fut> Middleware<M> for FnMiddleware<M, F>
where
    M: Message,
    F: Fn(MiddlewareContext<M>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<M::Response, MessagingError>> + Send + 'static,
{
    async fn execute(&self, ctx: MiddlewareContext<M>) -> Result<M::Response, MessagingError> {
        (self.f)(ctx).await
    }
}
