//! Error types for registration, dispatch and transports.

use std::any::Any;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

use crate::context::ContextError;
use crate::message::Message;
use crate::pipeline::TransportType;

/// Error type for messaging operations.
#[derive(Debug)]
pub enum MessagingError {
    /// A handler is already registered for this message type.
    DuplicateRegistration {
        message_type: String,
        existing_handler: String,
        new_handler: String,
    },
    /// No handler registered for this message type or name.
    HandlerNotFound(String),
    /// `configure` was called for a middleware type that is not in the pipeline.
    MiddlewareNotFound(String),
    /// A strategy or builder was configured with invalid settings.
    InvalidConfiguration(String),
    /// A required service was not registered.
    ServiceNotFound(String),
    /// Context activation or wire data error.
    Context(ContextError),
    /// Payload decode / deserialization failed.
    DecodeFailed(String),
    /// Message validation failed before the handler ran.
    ValidationFailed(String),
    /// Business logic rejected the message.
    Rejected(String),
    /// The operation was cancelled.
    Cancelled,
    /// A transport failed to deliver the message or returned a failure.
    Transport(TransportFailure),
    /// Several errors collected from a broadcast.
    Aggregate(Vec<MessagingError>),
    /// Other error.
    Other(Box<dyn Error + Send + Sync>),
}

impl fmt::Display for MessagingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessagingError::DuplicateRegistration {
                message_type,
                existing_handler,
                new_handler,
            } => write!(
                f,
                "duplicate registration for {}: {} is already registered, cannot add {}",
                message_type, existing_handler, new_handler
            ),
            MessagingError::HandlerNotFound(name) => write!(f, "no handler for {}", name),
            MessagingError::MiddlewareNotFound(name) => {
                write!(f, "middleware {} is not part of the pipeline", name)
            }
            MessagingError::InvalidConfiguration(msg) => {
                write!(f, "invalid configuration: {}", msg)
            }
            MessagingError::ServiceNotFound(name) => write!(f, "service not found: {}", name),
            MessagingError::Context(e) => write!(f, "{}", e),
            MessagingError::DecodeFailed(msg) => write!(f, "decode failed: {}", msg),
            MessagingError::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            MessagingError::Rejected(msg) => write!(f, "rejected: {}", msg),
            MessagingError::Cancelled => write!(f, "operation was cancelled"),
            MessagingError::Transport(failure) => write!(f, "{}", failure),
            MessagingError::Aggregate(errors) => {
                write!(f, "{} errors occurred", errors.len())?;
                for (i, e) in errors.iter().enumerate() {
                    write!(f, "{} {}", if i == 0 { ":" } else { ";" }, e)?;
                }
                Ok(())
            }
            MessagingError::Other(e) => write!(f, "handler error: {}", e),
        }
    }
}

impl Error for MessagingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MessagingError::Context(e) => Some(e),
            MessagingError::Transport(failure) => failure.source(),
            MessagingError::Other(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<ContextError> for MessagingError {
    fn from(err: ContextError) -> Self {
        MessagingError::Context(err)
    }
}

impl From<serde_json::Error> for MessagingError {
    fn from(err: serde_json::Error) -> Self {
        MessagingError::DecodeFailed(err.to_string())
    }
}

impl From<bitcode::Error> for MessagingError {
    fn from(err: bitcode::Error) -> Self {
        MessagingError::DecodeFailed(err.to_string())
    }
}

impl From<TransportFailure> for MessagingError {
    fn from(failure: TransportFailure) -> Self {
        MessagingError::Transport(failure)
    }
}

impl MessagingError {
    /// Map this error to an HTTP-style status code.
    pub fn status_code(&self) -> u16 {
        match self {
            MessagingError::DuplicateRegistration { .. } => 500,
            MessagingError::HandlerNotFound(_) => 404,
            MessagingError::MiddlewareNotFound(_) => 500,
            MessagingError::InvalidConfiguration(_) => 500,
            MessagingError::ServiceNotFound(_) => 500,
            MessagingError::Context(ContextError::FormattedContextDataInvalid) => 400,
            MessagingError::Context(ContextError::InvalidState(_)) => 500,
            MessagingError::DecodeFailed(_) => 400,
            MessagingError::ValidationFailed(_) => 400,
            MessagingError::Rejected(_) => 422,
            MessagingError::Cancelled => 499,
            MessagingError::Transport(failure) => failure.status.unwrap_or(502),
            MessagingError::Aggregate(_) => 500,
            MessagingError::Other(_) => 500,
        }
    }

    /// Returns `true` if this error represents cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, MessagingError::Cancelled)
    }

    /// Wrap any error as [`MessagingError::Other`].
    pub fn other(err: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        MessagingError::Other(err.into())
    }
}

/// Details of a failed transport call.
///
/// Carries the message that was being sent so callers can inspect or retry it.
pub struct TransportFailure {
    /// Transport that failed.
    pub transport_type: TransportType,
    /// Name of the message type that was being sent.
    pub message_type: &'static str,
    /// Status reported by the remote side, if any.
    pub status: Option<u16>,
    /// Human readable reason.
    pub reason: String,
    payload: Arc<dyn Any + Send + Sync>,
    source: Option<Box<dyn Error + Send + Sync>>,
}

impl TransportFailure {
    pub fn new<M: Message>(
        transport_type: TransportType,
        message: &M,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            transport_type,
            message_type: M::NAME,
            status: None,
            reason: reason.into(),
            payload: Arc::new(message.clone()),
            source: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_source(mut self, source: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// The message that failed, if it is of type `M`.
    pub fn payload<M: Message>(&self) -> Option<&M> {
        self.payload.downcast_ref::<M>()
    }

    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn Error + 'static))
    }
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed on transport {}",
            self.message_type, self.transport_type
        )?;
        if let Some(status) = self.status {
            write!(f, " with status {}", status)?;
        }
        write!(f, ": {}", self.reason)
    }
}

impl fmt::Debug for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportFailure")
            .field("transport_type", &self.transport_type)
            .field("message_type", &self.message_type)
            .field("status", &self.status)
            .field("reason", &self.reason)
            .field("source", &self.source)
            .finish()
    }
}
