//! Engine notifications and connection state.

use serde_json::{Map, Value};

/// Lifecycle of the hub connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    /// Opening the transport.
    Connecting,
    /// Transport open, waiting for the hub to accept.
    AwaitingHandshake,
    Ready,
    /// Waiting for the next reconnect attempt.
    Reconnecting,
}

impl ConnectionState {
    /// States in which a connect attempt is underway.
    pub fn is_transitional(self) -> bool {
        matches!(self, Self::Connecting | Self::AwaitingHandshake)
    }
}

/// Something the engine reports to its subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// Handshake accepted.
    Connected,
    /// Closed by [`crate::Engine::disconnect`].
    Disconnected,
    /// Closed by the hub or the network.
    ConnectionClosed { code: u16, reason: String },
    /// Handshake refused or timed out.
    ConnectionFailed,
    Registered { service_uuid: String },
    RegistrationFailed { service_uuid: String },
    EventPublished { service_uuid: String, event_id: String },
    EventCached { service_uuid: String, event_id: String },
    EventPublishingFailed { service_uuid: String, event_id: String },
    /// The hub pushed configuration values for a service.
    ConfigurationParameterReceived {
        service_uuid: String,
        parameters: Map<String, Value>,
    },
}
