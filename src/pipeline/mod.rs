//! Middleware pipelines.
//!
//! A [`Pipeline`] is an ordered list of middleware for one message type. A
//! fresh pipeline is built for every execution: the handler's
//! `configure_pipeline` hook runs first, then any caller-supplied
//! configuration. The pipeline is then folded into one call chain where the
//! first middleware added is the outermost.
//!
//! ## Example
//!
//! ```ignore
//! fn configure_pipeline(pipeline: &mut Pipeline<Increment>) -> Result<(), MessagingError> {
//!     pipeline.use_validation().use_logging();
//!     pipeline.configure::<LoggingMiddleware<Increment>, _>(|logging| {
//!         logging.configuration.payload_strategy = PayloadLoggingStrategy::IndentedJson;
//!     })?;
//!     Ok(())
//! }
//! ```

mod middleware;
mod transport_type;

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::context::ConquerorContext;
use crate::error::MessagingError;
use crate::message::Message;
use crate::services::Services;

pub use middleware::{AsAny, FnMiddleware, Middleware, MiddlewareContext, Next};
pub use transport_type::{TransportRole, TransportType, IN_PROCESS_TRANSPORT};

pub(crate) use middleware::{Chain, Terminal};

/// Ordered middleware for one execution of message type `M`.
pub struct Pipeline<M: Message> {
    middlewares: Vec<Box<dyn Middleware<M>>>,
    services: Services,
    conqueror_context: ConquerorContext,
    transport_type: TransportType,
}

impl<M: Message> Pipeline<M> {
    pub fn new(
        services: Services,
        conqueror_context: ConquerorContext,
        transport_type: TransportType,
    ) -> Self {
        Self {
            middlewares: Vec::new(),
            services,
            conqueror_context,
            transport_type,
        }
    }

    /// Append a middleware. Insertion order is execution order.
    pub fn use_middleware<T: Middleware<M>>(&mut self, middleware: T) -> &mut Self {
        self.middlewares.push(Box::new(middleware));
        self
    }

    /// Append an async closure as middleware.
    ///
    /// ```ignore
    /// pipeline.use_fn(|ctx| async move {
    ///     tracing::info!("before");
    ///     let response = ctx.proceed().await?;
    ///     tracing::info!("after");
    ///     Ok(response)
    /// });
    /// ```
    pub fn use_fn<F, Fut>(&mut self, f: F) -> &mut Self
    where
        F: Fn(MiddlewareContext<M>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<M::Response, MessagingError>> + Send + 'static,
    {
        self.use_middleware(FnMiddleware::new(f))
    }

    /// Remove every middleware of type `T`. Does nothing if none is present.
    pub fn without<T: Middleware<M>>(&mut self) -> &mut Self {
        self.middlewares
            .retain(|middleware| !(**middleware).as_any().is::<T>());
        self
    }

    /// Mutate every middleware of type `T` in place.
    ///
    /// Fails with [`MessagingError::MiddlewareNotFound`] if the pipeline has none.
    pub fn configure<T, F>(&mut self, mut configure: F) -> Result<&mut Self, MessagingError>
    where
        T: Middleware<M>,
        F: FnMut(&mut T),
    {
        let mut found = false;
        for middleware in self.middlewares.iter_mut() {
            if let Some(typed) = (**middleware).as_any_mut().downcast_mut::<T>() {
                configure(typed);
                found = true;
            }
        }

        if found {
            Ok(self)
        } else {
            Err(MessagingError::MiddlewareNotFound(
                std::any::type_name::<T>().to_string(),
            ))
        }
    }

    /// Returns `true` if a middleware of type `T` is present.
    pub fn contains<T: Middleware<M>>(&self) -> bool {
        self.middlewares
            .iter()
            .any(|middleware| (**middleware).as_any().is::<T>())
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Iterate middleware in execution order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Middleware<M>> {
        self.middlewares.iter().map(|middleware| &**middleware)
    }

    /// Type names of the middleware, in execution order.
    pub fn middleware_names(&self) -> Vec<&'static str> {
        self.iter().map(|middleware| middleware.type_name()).collect()
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn conqueror_context(&self) -> &ConquerorContext {
        &self.conqueror_context
    }

    pub fn transport_type(&self) -> &TransportType {
        &self.transport_type
    }

    /// Fold the pipeline around `terminal` and run it once.
    pub(crate) async fn execute(
        self,
        message: M,
        cancellation: CancellationToken,
        terminal: Terminal<M>,
    ) -> Result<M::Response, MessagingError> {
        tracing::trace!(
            message = M::NAME,
            transport = %self.transport_type,
            middlewares = ?self.middleware_names(),
            "executing pipeline"
        );

        let chain = Arc::new(Chain {
            middlewares: self.middlewares,
            terminal,
            conqueror_context: self.conqueror_context,
            transport_type: self.transport_type,
            services: self.services,
        });
        Chain::invoke(chain, 0, message, cancellation).await
    }
}
