use tokio_util::sync::CancellationToken;

use crate::context::ConquerorContext;
use crate::dispatch::{MessageClients, Messaging};
use crate::error::MessagingError;
use crate::pipeline::TransportType;
use crate::services::Services;

/// Everything a handler can reach during one execution.
///
/// Nested messages sent through [`HandlerContext::messages`] run in child
/// contexts of this handler's context.
#[derive(Clone)]
pub struct HandlerContext {
    conqueror_context: ConquerorContext,
    cancellation: CancellationToken,
    transport_type: TransportType,
    messaging: Messaging,
}

impl HandlerContext {
    pub(crate) fn new(
        messaging: Messaging,
        conqueror_context: ConquerorContext,
        transport_type: TransportType,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            conqueror_context,
            cancellation,
            transport_type,
            messaging,
        }
    }

    pub fn conqueror_context(&self) -> &ConquerorContext {
        &self.conqueror_context
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Transport the message arrived on.
    pub fn transport_type(&self) -> &TransportType {
        &self.transport_type
    }

    pub fn services(&self) -> &Services {
        self.messaging.services()
    }

    /// Clients for nested messages and signals, bound to this handler's context.
    pub fn messages(&self) -> MessageClients {
        self.messaging.clients_in(&self.conqueror_context)
    }

    /// Fail with [`MessagingError::Cancelled`] if cancellation was requested.
    pub fn ensure_not_cancelled(&self) -> Result<(), MessagingError> {
        if self.cancellation.is_cancelled() {
            Err(MessagingError::Cancelled)
        } else {
            Ok(())
        }
    }
}
