use crate::context::new_id;
use crate::error::MessagingError;

/// A message on its way to a queue listener.
#[derive(Clone, Debug)]
pub struct Envelope {
    /// Unique identifier for this envelope
    pub id: String,
    /// Wire name of the message type
    pub message_type: String,
    /// bitcode-serialized message
    pub payload: Vec<u8>,
    /// Headers: trace id, message id, encoded context
    pub metadata: Vec<(String, String)>,
}

impl Envelope {
    pub fn new(message_type: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            id: new_id(),
            message_type: message_type.into(),
            payload,
            metadata: Vec::new(),
        }
    }

    /// Create an envelope with a bitcode-serialized payload.
    pub fn encode<T: serde::Serialize>(
        message_type: impl Into<String>,
        payload: &T,
    ) -> Result<Self, bitcode::Error> {
        let bytes = bitcode::serialize(payload)?;
        Ok(Self::new(message_type, bytes))
    }

    /// Decode the payload from bitcode binary format.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, bitcode::Error> {
        bitcode::deserialize(&self.payload)
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.push((key.into(), value.into()));
        self
    }

    /// First metadata value for `key`.
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// The listener's answer to an [`Envelope`].
#[derive(Clone, Debug)]
pub struct Reply {
    /// HTTP-style status; 200 on success.
    pub status: u16,
    /// bitcode-serialized response (empty on failure)
    pub payload: Vec<u8>,
    /// Headers: encoded upstream context
    pub metadata: Vec<(String, String)>,
    /// Failure description
    pub error: Option<String>,
}

impl Reply {
    pub fn success(payload: Vec<u8>) -> Self {
        Self {
            status: 200,
            payload,
            metadata: Vec::new(),
            error: None,
        }
    }

    pub fn failure(error: &MessagingError) -> Self {
        Self {
            status: error.status_code(),
            payload: Vec::new(),
            metadata: Vec::new(),
            error: Some(error.to_string()),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.push((key.into(), value.into()));
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

/// All values for `key`, in order.
pub(crate) fn metadata_values<'a>(
    metadata: &'a [(String, String)],
    key: &'a str,
) -> impl Iterator<Item = &'a str> + 'a {
    metadata
        .iter()
        .filter(move |(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}
