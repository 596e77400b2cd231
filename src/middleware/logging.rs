//! Logging middleware.
//!
//! Logs each message before execution, after success, and on failure through
//! `tracing`. Failures are always returned unchanged.
//!
//! ## Example
//!
//! ```ignore
//! pipeline.use_logging_with(|config| {
//!     config.pre_execution_level = Level::DEBUG;
//!     config.payload_strategy = PayloadLoggingStrategy::IndentedJson;
//!     config.on_exception(|ctx| {
//!         tracing::warn!(trace_id = ctx.trace_id, "counter update failed");
//!         Ok(true)
//!     });
//! });
//! ```

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use tracing::Level;

use super::BoxError;
use crate::error::MessagingError;
use crate::message::Message;
use crate::pipeline::{Middleware, MiddlewareContext, Pipeline, TransportType};
use crate::services::Services;

macro_rules! log_at {
    ($level:expr, $($arg:tt)+) => {
        match $level {
            level if level == Level::ERROR => tracing::error!($($arg)+),
            level if level == Level::WARN => tracing::warn!($($arg)+),
            level if level == Level::INFO => tracing::info!($($arg)+),
            level if level == Level::DEBUG => tracing::debug!($($arg)+),
            _ => tracing::trace!($($arg)+),
        }
    };
}

/// How payloads are rendered in log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayloadLoggingStrategy {
    Omit,
    #[default]
    MinimalJson,
    IndentedJson,
}

/// Data passed to the pre-execution hook.
pub struct PreExecutionContext<'a, M> {
    pub message: &'a M,
    pub message_id: &'a str,
    pub trace_id: &'a str,
    pub transport_type: &'a TransportType,
    pub services: &'a Services,
}

/// Data passed to the post-execution hook.
pub struct PostExecutionContext<'a, M: Message> {
    pub message: &'a M,
    pub response: &'a M::Response,
    pub message_id: &'a str,
    pub trace_id: &'a str,
    pub transport_type: &'a TransportType,
    pub services: &'a Services,
    pub elapsed: Duration,
}

/// Data passed to the exception hook.
pub struct ExceptionContext<'a, M> {
    pub message: &'a M,
    pub error: &'a MessagingError,
    pub message_id: &'a str,
    pub trace_id: &'a str,
    pub transport_type: &'a TransportType,
    pub services: &'a Services,
    pub elapsed: Duration,
}

type PreExecutionHook<M> =
    Arc<dyn Fn(&PreExecutionContext<'_, M>) -> Result<bool, BoxError> + Send + Sync>;
type PostExecutionHook<M> =
    Arc<dyn Fn(&PostExecutionContext<'_, M>) -> Result<bool, BoxError> + Send + Sync>;
type ExceptionHook<M> =
    Arc<dyn Fn(&ExceptionContext<'_, M>) -> Result<bool, BoxError> + Send + Sync>;

/// Settings for [`LoggingMiddleware`].
///
/// Hooks run before the corresponding log event. Returning `Ok(false)` skips
/// the default event; an error or panic in a hook is logged and ignored.
pub struct LoggingConfiguration<M: Message> {
    pub pre_execution_level: Level,
    pub post_execution_level: Level,
    pub exception_level: Level,
    pub payload_strategy: PayloadLoggingStrategy,
    pub response_payload_strategy: PayloadLoggingStrategy,
    pub pre_execution_hook: Option<PreExecutionHook<M>>,
    pub post_execution_hook: Option<PostExecutionHook<M>>,
    pub exception_hook: Option<ExceptionHook<M>>,
}

impl<M: Message> Default for LoggingConfiguration<M> {
    fn default() -> Self {
        Self {
            pre_execution_level: Level::INFO,
            post_execution_level: Level::INFO,
            exception_level: Level::ERROR,
            payload_strategy: PayloadLoggingStrategy::default(),
            response_payload_strategy: PayloadLoggingStrategy::default(),
            pre_execution_hook: None,
            post_execution_hook: None,
            exception_hook: None,
        }
    }
}

impl<M: Message> Clone for LoggingConfiguration<M> {
    fn clone(&self) -> Self {
        Self {
            pre_execution_level: self.pre_execution_level,
            post_execution_level: self.post_execution_level,
            exception_level: self.exception_level,
            payload_strategy: self.payload_strategy,
            response_payload_strategy: self.response_payload_strategy,
            pre_execution_hook: self.pre_execution_hook.clone(),
            post_execution_hook: self.post_execution_hook.clone(),
            exception_hook: self.exception_hook.clone(),
        }
    }
}

impl<M: Message> LoggingConfiguration<M> {
    pub fn on_pre_execution<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&PreExecutionContext<'_, M>) -> Result<bool, BoxError> + Send + Sync + 'static,
    {
        self.pre_execution_hook = Some(Arc::new(hook));
        self
    }

    pub fn on_post_execution<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&PostExecutionContext<'_, M>) -> Result<bool, BoxError> + Send + Sync + 'static,
    {
        self.post_execution_hook = Some(Arc::new(hook));
        self
    }

    pub fn on_exception<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&ExceptionContext<'_, M>) -> Result<bool, BoxError> + Send + Sync + 'static,
    {
        self.exception_hook = Some(Arc::new(hook));
        self
    }
}

/// Middleware that logs message execution.
pub struct LoggingMiddleware<M: Message> {
    pub configuration: LoggingConfiguration<M>,
}

impl<M: Message> LoggingMiddleware<M> {
    pub fn new() -> Self {
        Self {
            configuration: LoggingConfiguration::default(),
        }
    }

    pub fn with_configuration(configuration: LoggingConfiguration<M>) -> Self {
        Self { configuration }
    }
}

impl<M: Message> Default for LoggingMiddleware<M> {
    fn default() -> Self {
        Self::new()
    }
}

fn render<T: Serialize + ?Sized>(value: &T, strategy: PayloadLoggingStrategy) -> Option<String> {
    let rendered = match strategy {
        PayloadLoggingStrategy::Omit => return None,
        PayloadLoggingStrategy::MinimalJson => serde_json::to_string(value),
        PayloadLoggingStrategy::IndentedJson => serde_json::to_string_pretty(value),
    };
    Some(rendered.unwrap_or_else(|e| format!("<unserializable: {}>", e)))
}

/// Run a hook, treating failures as "log normally".
fn run_hook(phase: &'static str, hook: impl FnOnce() -> Result<bool, BoxError>) -> bool {
    match catch_unwind(AssertUnwindSafe(hook)) {
        Ok(Ok(proceed)) => proceed,
        Ok(Err(e)) => {
            tracing::warn!(phase, error = %e, "an error occurred while executing logging hook");
            true
        }
        Err(_) => {
            tracing::warn!(phase, "logging hook panicked");
            true
        }
    }
}

#[async_trait]
impl<M: Message> Middleware<M> for LoggingMiddleware<M> {
    async fn execute(&self, ctx: MiddlewareContext<M>) -> Result<M::Response, MessagingError> {
        let config = &self.configuration;
        let message_id = ctx.conqueror_context.message_id().unwrap_or_default();
        let trace_id = ctx.conqueror_context.trace_id().to_string();
        let transport_type = ctx.transport_type.clone();
        let services = ctx.services.clone();
        let message = ctx.message.clone();

        let transport = (!transport_type.is_in_process()).then(|| transport_type.name().to_string());
        let role = transport.as_ref().map(|_| transport_type.role().to_string());
        let has_payload = M::empty_instance().is_none();

        let proceed = match &config.pre_execution_hook {
            Some(hook) => run_hook("pre-execution", || {
                hook(&PreExecutionContext {
                    message: &message,
                    message_id: &message_id,
                    trace_id: &trace_id,
                    transport_type: &transport_type,
                    services: &services,
                })
            }),
            None => true,
        };
        if proceed {
            let payload = if has_payload && tracing::level_enabled!(config.pre_execution_level) {
                render(&message, config.payload_strategy)
            } else {
                None
            };
            log_at!(
                config.pre_execution_level,
                message_type = M::NAME,
                message_id = %message_id,
                trace_id = %trace_id,
                transport = transport.as_deref(),
                role = role.as_deref(),
                payload = payload.as_deref(),
                "handling message"
            );
        }

        let start = Instant::now();
        let result = ctx.proceed().await;
        let elapsed = start.elapsed();
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;

        match result {
            Ok(response) => {
                let proceed = match &config.post_execution_hook {
                    Some(hook) => run_hook("post-execution", || {
                        hook(&PostExecutionContext {
                            message: &message,
                            response: &response,
                            message_id: &message_id,
                            trace_id: &trace_id,
                            transport_type: &transport_type,
                            services: &services,
                            elapsed,
                        })
                    }),
                    None => true,
                };
                if proceed {
                    let has_response = std::any::TypeId::of::<M::Response>()
                        != std::any::TypeId::of::<()>();
                    let payload = if has_response
                        && tracing::level_enabled!(config.post_execution_level)
                    {
                        render(&response, config.response_payload_strategy)
                    } else {
                        None
                    };
                    log_at!(
                        config.post_execution_level,
                        message_type = M::NAME,
                        message_id = %message_id,
                        trace_id = %trace_id,
                        transport = transport.as_deref(),
                        role = role.as_deref(),
                        response = payload.as_deref(),
                        elapsed_ms,
                        "handled message"
                    );
                }
                Ok(response)
            }
            Err(error) => {
                let proceed = match &config.exception_hook {
                    Some(hook) => run_hook("exception", || {
                        hook(&ExceptionContext {
                            message: &message,
                            error: &error,
                            message_id: &message_id,
                            trace_id: &trace_id,
                            transport_type: &transport_type,
                            services: &services,
                            elapsed,
                        })
                    }),
                    None => true,
                };
                if proceed {
                    log_at!(
                        config.exception_level,
                        message_type = M::NAME,
                        message_id = %message_id,
                        trace_id = %trace_id,
                        transport = transport.as_deref(),
                        role = role.as_deref(),
                        error = %error,
                        elapsed_ms,
                        "an exception occurred while handling message"
                    );
                }
                Err(error)
            }
        }
    }
}

/// Pipeline helpers for [`LoggingMiddleware`].
pub trait LoggingPipelineExt<M: Message> {
    /// Add logging with default settings, unless logging is already present.
    fn use_logging(&mut self) -> &mut Self;

    /// Add logging with custom settings, unless logging is already present.
    fn use_logging_with<F>(&mut self, configure: F) -> &mut Self
    where
        F: FnOnce(&mut LoggingConfiguration<M>);

    /// Change the settings of the logging middleware already in the pipeline.
    fn configure_logging<F>(&mut self, configure: F) -> Result<&mut Self, MessagingError>
    where
        F: FnMut(&mut LoggingConfiguration<M>);

    fn without_logging(&mut self) -> &mut Self;
}

impl<M: Message> LoggingPipelineExt<M> for Pipeline<M> {
    fn use_logging(&mut self) -> &mut Self {
        self.use_logging_with(|_| {})
    }

    fn use_logging_with<F>(&mut self, configure: F) -> &mut Self
    where
        F: FnOnce(&mut LoggingConfiguration<M>),
    {
        if self.contains::<LoggingMiddleware<M>>() {
            return self;
        }
        let mut configuration = LoggingConfiguration::default();
        configure(&mut configuration);
        self.use_middleware(LoggingMiddleware::with_configuration(configuration))
    }

    fn configure_logging<F>(&mut self, mut configure: F) -> Result<&mut Self, MessagingError>
    where
        F: FnMut(&mut LoggingConfiguration<M>),
    {
        self.configure::<LoggingMiddleware<M>, _>(|logging| configure(&mut logging.configuration))
    }

    fn without_logging(&mut self) -> &mut Self {
        self.without::<LoggingMiddleware<M>>()
    }
}
