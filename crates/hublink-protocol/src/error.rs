//! Protocol error types.

use thiserror::Error;

use crate::message::MessageType;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding or decoding hub messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// JSON body could not be serialized or parsed.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A structured message arrived without a body.
    #[error("{0:?} message has no payload")]
    MissingPayload(MessageType),

    /// The message is not of the type the decoder handles.
    #[error("expected {expected:?} message, got {found:?}")]
    UnexpectedType {
        expected: MessageType,
        found: MessageType,
    },

    /// Envelope framing is malformed.
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),

    /// `postDate` is not an ISO-8601 timestamp.
    #[error("invalid timestamp '{0}'")]
    InvalidTimestamp(String),
}
