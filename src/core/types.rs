use serde::{Deserialize, Serialize};

/// Error category enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Script or arguments rejected before anything was executed or forwarded.
    ValidationRejection,
    /// Non-zero interpreter exit or spawn error.
    ExecutionFailure,
    /// Forced termination after the executor deadline.
    TimeoutFailure,
    /// Bridge unreachable, non-2xx status or malformed response.
    TransportFailure,
    /// Child server lacks a capability or returned an unusable listing.
    DiscoveryFailure,
    /// Child process could not be launched or initialized.
    ConnectionFailure,
    ConfigurationError,
    SerializationError,
    IoError,
    InternalError,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Error severity enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Fatal,
    Error,
    Warning,
}

/// Lifecycle of the tool proxy's child connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProxyState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl std::fmt::Display for ProxyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProxyState::Disconnected => write!(f, "disconnected"),
            ProxyState::Connecting => write!(f, "connecting"),
            ProxyState::Connected => write!(f, "connected"),
        }
    }
}
