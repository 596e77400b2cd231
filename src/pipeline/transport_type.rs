use std::fmt;

/// Name of the built-in in-process transport.
pub const IN_PROCESS_TRANSPORT: &str = "in-process";

/// Which side of a transport the current pipeline runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportRole {
    /// Sending side: the pipeline wraps a transport client.
    Client,
    /// Receiving side: the pipeline wraps the handler.
    Server,
}

impl fmt::Display for TransportRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportRole::Client => write!(f, "client"),
            TransportRole::Server => write!(f, "server"),
        }
    }
}

/// The transport delivering a message and the role of the current component.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransportType {
    name: String,
    role: TransportRole,
}

impl TransportType {
    pub fn new(name: impl Into<String>, role: TransportRole) -> Self {
        Self {
            name: name.into(),
            role,
        }
    }

    pub fn client(name: impl Into<String>) -> Self {
        Self::new(name, TransportRole::Client)
    }

    pub fn server(name: impl Into<String>) -> Self {
        Self::new(name, TransportRole::Server)
    }

    /// In-process delivery. The handler runs in the same pipeline as the caller.
    pub fn in_process() -> Self {
        Self::server(IN_PROCESS_TRANSPORT)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> TransportRole {
        self.role
    }

    pub fn is_in_process(&self) -> bool {
        self.name == IN_PROCESS_TRANSPORT
    }

    pub fn is_client(&self) -> bool {
        self.role == TransportRole::Client
    }

    pub fn is_server(&self) -> bool {
        self.role == TransportRole::Server
    }
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
