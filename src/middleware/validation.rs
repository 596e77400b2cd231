//! Validation middleware.
//!
//! Rejects invalid messages with [`MessagingError::ValidationFailed`] before
//! the rest of the pipeline runs.

use std::marker::PhantomData;

use async_trait::async_trait;

use crate::error::MessagingError;
use crate::message::Message;
use crate::pipeline::{Middleware, MiddlewareContext, Pipeline};

/// Self-validation for messages.
pub trait Validate {
    /// Return a description of what is wrong, if anything.
    fn validate(&self) -> Result<(), String>;
}

/// Middleware that calls [`Validate::validate`] on the message.
pub struct ValidationMiddleware<M> {
    _message: PhantomData<fn(M)>,
}

impl<M> ValidationMiddleware<M> {
    pub fn new() -> Self {
        Self {
            _message: PhantomData,
        }
    }
}

impl<M> Default for ValidationMiddleware<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<M: Message + Validate> Middleware<M> for ValidationMiddleware<M> {
    async fn execute(&self, ctx: MiddlewareContext<M>) -> Result<M::Response, MessagingError> {
        if let Err(reason) = ctx.message.validate() {
            tracing::debug!(message_type = M::NAME, %reason, "message failed validation");
            return Err(MessagingError::ValidationFailed(reason));
        }
        ctx.proceed().await
    }
}

/// Pipeline helpers for [`ValidationMiddleware`].
pub trait ValidationPipelineExt<M: Message + Validate> {
    /// Add validation, unless it is already present.
    fn use_validation(&mut self) -> &mut Self;

    fn without_validation(&mut self) -> &mut Self;
}

impl<M: Message + Validate> ValidationPipelineExt<M> for Pipeline<M> {
    fn use_validation(&mut self) -> &mut Self {
        if self.contains::<ValidationMiddleware<M>>() {
            return self;
        }
        self.use_middleware(ValidationMiddleware::new())
    }

    fn without_validation(&mut self) -> &mut Self {
        self.without::<ValidationMiddleware<M>>()
    }
}
