//! Error types for context data and activation.

use std::error::Error;
use std::fmt;

/// Errors raised by [`ConquerorContext`](super::ConquerorContext) operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    /// The context is in the wrong activation state for the operation.
    InvalidState(String),
    /// Wire-formatted context data could not be parsed.
    ///
    /// Carries no detail about the rejected input.
    FormattedContextDataInvalid,
}

impl fmt::Display for ContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextError::InvalidState(msg) => write!(f, "invalid context state: {}", msg),
            ContextError::FormattedContextDataInvalid => {
                write!(f, "invalid conqueror context data")
            }
        }
    }
}

impl Error for ContextError {}
