//! Built-in middleware.

mod logging;
mod validation;

pub use logging::{
    ExceptionContext, LoggingConfiguration, LoggingMiddleware, LoggingPipelineExt,
    PayloadLoggingStrategy, PostExecutionContext, PreExecutionContext,
};
pub use validation::{Validate, ValidationMiddleware, ValidationPipelineExt};

/// Boxed error returned by middleware hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
