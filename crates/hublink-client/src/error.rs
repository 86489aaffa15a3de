//! Client error types.

use thiserror::Error;

/// Result type for engine operations that can violate a contract.
pub type EngineResult<T> = Result<T, EngineError>;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Contract violations raised by [`crate::Engine::publish`].
///
/// Connectivity problems are never reported through this type; they
/// surface as a `false` result and a notification.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The service was never registered with this engine.
    #[error("service '{0}' is not registered")]
    ServiceNotRegistered(String),

    /// The event was not added to the service.
    #[error("event '{event_id}' does not exist in service '{service_uuid}'")]
    EventNotExist {
        event_id: String,
        service_uuid: String,
    },
}

/// Errors reported by a [`crate::Transport`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not open the connection.
    #[error("connection failed: {0}")]
    Connect(String),

    /// No open connection.
    #[error("not connected")]
    NotConnected,

    /// A frame could not be written.
    #[error("send failed: {0}")]
    Send(String),
}

/// Errors loading [`crate::EngineSettings`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid hub url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Reasons an inbound function call is not answered.
///
/// Only logged; never returned to the application.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("service '{0}' is not registered")]
    UnknownService(String),

    #[error("function '{function_id}' not found in service '{service_uuid}'")]
    UnknownFunction {
        function_id: String,
        service_uuid: String,
    },

    #[error("parameter '{name}' cannot be converted: {reason}")]
    Parameter { name: String, reason: String },

    #[error("handler failed: {0}")]
    Handler(#[from] hublink_core::HandlerError),

    #[error("handler panicked")]
    Panicked,

    #[error("event '{event_id}' is not a response event of function '{function_id}'")]
    UndeclaredResponse {
        event_id: String,
        function_id: String,
    },
}
