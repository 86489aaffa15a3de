//! Transport framing of hub messages.
//!
//! In plain mode a frame is the message itself. In envelope mode the hub
//! speaks SockJS over a raw WebSocket:
//!
//! ```text
//! outbound:  ["<message>"]
//! inbound:   o                 open
//!            h                 heartbeat
//!            a["<m1>","<m2>"]  messages
//!            c[<code>,"<why>"] close
//! ```

use crate::error::{ProtocolError, ProtocolResult};

/// How messages are framed on the transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Framing {
    Plain,
    #[default]
    Envelope,
}

/// Decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Zero or more hub messages.
    Messages(Vec<String>),
    /// Session close announced by the server.
    Close { code: u16, reason: String },
}

impl Framing {
    /// Wraps an outbound message.
    pub fn encode(self, message: &str) -> ProtocolResult<String> {
        match self {
            Self::Plain => Ok(message.to_string()),
            Self::Envelope => Ok(serde_json::to_string(&[message])?),
        }
    }

    /// Unwraps an inbound frame.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidEnvelope`] for frames that are not
    /// valid SockJS frames in envelope mode.
    pub fn decode(self, raw: &str) -> ProtocolResult<Frame> {
        if self == Self::Plain {
            return Ok(Frame::Messages(vec![raw.to_string()]));
        }

        let raw = raw.trim();
        let Some(kind) = raw.chars().next() else {
            return Ok(Frame::Messages(Vec::new()));
        };
        let body = &raw[kind.len_utf8()..];
        match kind {
            'o' | 'h' => Ok(Frame::Messages(Vec::new())),
            'a' => parse_messages(body),
            '[' => parse_messages(raw),
            'c' => {
                let (code, reason): (u16, String) = serde_json::from_str(body)
                    .map_err(|e| ProtocolError::InvalidEnvelope(e.to_string()))?;
                Ok(Frame::Close { code, reason })
            }
            other => Err(ProtocolError::InvalidEnvelope(format!(
                "unknown frame type '{other}'"
            ))),
        }
    }
}

fn parse_messages(body: &str) -> ProtocolResult<Frame> {
    let messages: Vec<String> =
        serde_json::from_str(body).map_err(|e| ProtocolError::InvalidEnvelope(e.to_string()))?;
    Ok(Frame::Messages(messages))
}

/// Path suffix selecting the raw WebSocket endpoint of a SockJS server.
pub fn envelope_path(server_id: u16, session_id: &str) -> String {
    format!("websocket/data/{server_id:03}/{session_id}/websocket/")
}
