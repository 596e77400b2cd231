//! Message and signal type descriptors.
//!
//! A message is a plain serde struct that knows its response type and its
//! wire name. Messages whose response is `()` are fire-and-forget from the
//! caller's point of view; signals are messages with a `()` response that are
//! broadcast to every registered signal handler.
//!
//! ## Example
//!
//! ```ignore
//! #[derive(Clone, Serialize, Deserialize)]
//! pub struct Increment {
//!     pub amount: i64,
//! }
//!
//! #[derive(Serialize, Deserialize)]
//! pub struct CounterValue {
//!     pub new_value: i64,
//! }
//!
//! impl Message for Increment {
//!     type Response = CounterValue;
//!     const NAME: &'static str = "counter.increment";
//! }
//! ```

use std::any::{type_name, TypeId};

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A request/response message type.
pub trait Message: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Response type. Use `()` for messages without a response.
    type Response: Serialize + DeserializeOwned + Send + 'static;

    /// Wire name, unique per registry. Used for routing on name-based transports.
    const NAME: &'static str;

    /// Singleton instance for payload-less messages.
    ///
    /// Transports use it when a request arrives without a body.
    fn empty_instance() -> Option<Self> {
        None
    }
}

/// A notification broadcast to zero or more signal handlers.
pub trait Signal: Message<Response = ()> {}

/// Read-only facts about a message type, captured at registration time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDescriptor {
    pub name: &'static str,
    pub message_type: TypeId,
    pub message_type_name: &'static str,
    pub response_type: TypeId,
    pub response_type_name: &'static str,
    /// `false` when the message provides an empty instance.
    pub has_payload: bool,
}

impl MessageDescriptor {
    pub fn of<M: Message>() -> Self {
        Self {
            name: M::NAME,
            message_type: TypeId::of::<M>(),
            message_type_name: type_name::<M>(),
            response_type: TypeId::of::<M::Response>(),
            response_type_name: type_name::<M::Response>(),
            has_payload: M::empty_instance().is_none(),
        }
    }

    /// Returns `true` if the message has no meaningful response.
    pub fn has_unit_response(&self) -> bool {
        self.response_type == TypeId::of::<()>()
    }
}
