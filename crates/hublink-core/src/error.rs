//! Model, persistence and handler error types.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Result type for configuration persistence.
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Contract violations raised while building a service description.
///
/// These are programming errors: they surface at the call site that
/// assembles the service and are never retried.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The callable's return kind contradicts the declared response events,
    /// or the parameter slot table is malformed.
    #[error("invalid function definition '{function_id}': {reason}")]
    InvalidFunctionDefinition { function_id: String, reason: String },

    /// A function names a response event the service does not own.
    #[error("response event '{event_id}' of service '{service_uuid}' not found")]
    ResponseEventNotFound {
        event_id: String,
        service_uuid: String,
    },

    /// An event with the same id was already added.
    #[error("event '{event_id}' already exists in service '{service_uuid}'")]
    DuplicateEvent {
        event_id: String,
        service_uuid: String,
    },

    /// The event is still referenced as a response event by a function.
    #[error("event '{event_id}' is a response event of function '{function_id}'")]
    EventInUse {
        event_id: String,
        function_id: String,
    },

    /// A raw event description could not be parsed.
    #[error("invalid event description: {0}")]
    InvalidEventDescription(String),

    /// Sub-services can only be attached to gateways.
    #[error("service '{0}' is not a gateway")]
    NotAGateway(String),
}

impl ModelError {
    /// Creates an invalid function definition error.
    pub fn invalid_function(function_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidFunctionDefinition {
            function_id: function_id.into(),
            reason: reason.into(),
        }
    }
}

/// Errors from reading or writing a persisted configuration.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// IO error on the configuration file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The file content is not a valid configuration.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Error returned by a function callable.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// An argument could not be converted to the requested type.
    #[error("argument {position}: {message}")]
    Argument { position: usize, message: String },

    /// The handler ran but failed.
    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    /// Creates a handler failure with the given message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}
