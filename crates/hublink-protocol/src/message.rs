//! Message type vocabulary and classification.
//!
//! A hub message is `TYPE` or `TYPE payload`. The type of an inbound message
//! is the first token, in [`MessageType::CLASSIFICATION_ORDER`], that the
//! upper-cased message starts with.

use crate::error::{ProtocolError, ProtocolResult};

/// Type of a hub message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Registration,
    Event,
    FunctionCallback,
    Configuration,
    Ping,
    IoConnected,
    IoRegistered,
    IoPublished,
    NioAlreadyConnected,
    NioRegistrationError,
    NioUnexpectedRegistrationError,
    NioUnauthorizedConnection,
    NioEventForwardingError,
    NioUnexpectedEventForwardingError,
    Unknown,
}

impl MessageType {
    /// Order in which tokens are tried; the first prefix match wins.
    pub const CLASSIFICATION_ORDER: [MessageType; 14] = [
        Self::Registration,
        Self::Event,
        Self::FunctionCallback,
        Self::Configuration,
        Self::Ping,
        Self::IoConnected,
        Self::IoRegistered,
        Self::IoPublished,
        Self::NioAlreadyConnected,
        Self::NioRegistrationError,
        Self::NioUnexpectedRegistrationError,
        Self::NioUnauthorizedConnection,
        Self::NioEventForwardingError,
        Self::NioUnexpectedEventForwardingError,
    ];

    /// Wire token of this type.
    pub fn token(self) -> &'static str {
        match self {
            Self::Registration => "R",
            Self::Event => "E",
            Self::FunctionCallback => "C",
            Self::Configuration => "K",
            Self::Ping => "PING",
            Self::IoConnected => "IO_CONNECTED",
            Self::IoRegistered => "IO_REGISTERED",
            Self::IoPublished => "IO_PUBLISHED",
            Self::NioAlreadyConnected => "NIO_ALREADY_CONNECTED",
            Self::NioRegistrationError => "NIO_REGISTRATION_ERROR",
            Self::NioUnexpectedRegistrationError => "NIO_UNEXPECTED_REGISTRATION_ERROR",
            Self::NioUnauthorizedConnection => "NIO_UNAUTHORIZED_CONNECTION",
            Self::NioEventForwardingError => "NIO_EVENT_FORWARDING_ERROR",
            Self::NioUnexpectedEventForwardingError => "NIO_UNEXPECTED_EVENT_FORWARDING_ERROR",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Classifies a message by case-insensitive token prefix.
    pub fn classify(message: &str) -> Self {
        let upper = message.to_uppercase();
        Self::CLASSIFICATION_ORDER
            .into_iter()
            .find(|ty| upper.starts_with(ty.token()))
            .unwrap_or(Self::Unknown)
    }

    /// Hub refused the connection handshake.
    pub fn is_connect_rejection(self) -> bool {
        matches!(
            self,
            Self::NioAlreadyConnected | Self::NioUnauthorizedConnection
        )
    }

    /// Hub refused a registration.
    pub fn is_registration_rejection(self) -> bool {
        matches!(
            self,
            Self::NioRegistrationError | Self::NioUnexpectedRegistrationError
        )
    }

    /// Hub refused to forward a published event.
    pub fn is_publish_rejection(self) -> bool {
        matches!(
            self,
            Self::NioEventForwardingError | Self::NioUnexpectedEventForwardingError
        )
    }
}

/// Returns the body that follows the message's type token.
///
/// # Errors
///
/// Returns [`ProtocolError::MissingPayload`] if the message carries nothing
/// after the token.
pub fn payload(message: &str, message_type: MessageType) -> ProtocolResult<&str> {
    let body = message
        .get(message_type.token().len()..)
        .map(str::trim)
        .unwrap_or_default();
    if body.is_empty() {
        return Err(ProtocolError::MissingPayload(message_type));
    }
    Ok(body)
}

/// Joins a type token and a body into a message.
pub fn compose(message_type: MessageType, body: &str) -> String {
    format!("{} {body}", message_type.token())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_structured_messages() {
        assert_eq!(MessageType::classify(r#"R {"uuid":"x"}"#), MessageType::Registration);
        assert_eq!(MessageType::classify(r#"E {"uuid":"x"}"#), MessageType::Event);
        assert_eq!(MessageType::classify(r#"C {"uuid":"x"}"#), MessageType::FunctionCallback);
        assert_eq!(MessageType::classify(r#"K {"uuid":"x"}"#), MessageType::Configuration);
    }

    #[test]
    fn classifies_control_tokens() {
        assert_eq!(MessageType::classify("IO_CONNECTED"), MessageType::IoConnected);
        assert_eq!(MessageType::classify("IO_REGISTERED"), MessageType::IoRegistered);
        assert_eq!(MessageType::classify("IO_PUBLISHED"), MessageType::IoPublished);
        assert_eq!(MessageType::classify("PING"), MessageType::Ping);
        assert_eq!(
            MessageType::classify("NIO_UNEXPECTED_EVENT_FORWARDING_ERROR"),
            MessageType::NioUnexpectedEventForwardingError
        );
        assert_eq!(
            MessageType::classify("NIO_UNAUTHORIZED_CONNECTION"),
            MessageType::NioUnauthorizedConnection
        );
    }

    #[test]
    fn classification_is_case_insensitive() {
        assert_eq!(MessageType::classify("io_connected"), MessageType::IoConnected);
        assert_eq!(MessageType::classify("ping"), MessageType::Ping);
    }

    #[test]
    fn unrecognised_text_is_unknown() {
        assert_eq!(MessageType::classify("hello"), MessageType::Unknown);
        assert_eq!(MessageType::classify(""), MessageType::Unknown);
        assert_eq!(MessageType::classify("pong"), MessageType::Unknown);
    }

    #[test]
    fn every_token_classifies_to_itself() {
        for ty in MessageType::CLASSIFICATION_ORDER {
            assert_eq!(MessageType::classify(ty.token()), ty);
        }
    }

    #[test]
    fn rejection_groups() {
        assert!(MessageType::NioAlreadyConnected.is_connect_rejection());
        assert!(MessageType::NioUnexpectedRegistrationError.is_registration_rejection());
        assert!(MessageType::NioEventForwardingError.is_publish_rejection());
        assert!(!MessageType::IoPublished.is_publish_rejection());
    }

    #[test]
    fn payload_follows_token() {
        assert_eq!(payload(r#"C {"a":1}"#, MessageType::FunctionCallback).unwrap(), r#"{"a":1}"#);
        assert!(matches!(
            payload("C", MessageType::FunctionCallback),
            Err(ProtocolError::MissingPayload(MessageType::FunctionCallback))
        ));
        assert_eq!(compose(MessageType::Event, "{}"), "E {}");
    }
}
