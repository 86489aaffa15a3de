//! Wire protocol between a hub client and the message hub.
//!
//! # Message Overview
//!
//! Every message is a type token optionally followed by a JSON body:
//!
//! ```text
//! R {"@class":"SmartObject","uuid":...}     registration
//! E {"uuid":...,"eventId":...}              event
//! C {"uuid":...,"functionId":...}           function call
//! K {"uuid":...,"params":{...}}             configuration push
//! IO_CONNECTED                              handshake accepted
//! ```
//!
//! Messages travel either as-is or inside a SockJS envelope, see [`Framing`].
//!
//! # Example
//!
//! ```rust
//! use hublink_protocol::{Framing, Inbound, MessageType, decode_inbound};
//!
//! assert_eq!(MessageType::classify("IO_CONNECTED"), MessageType::IoConnected);
//! assert_eq!(decode_inbound("PING").unwrap(), Inbound::Ping);
//! assert_eq!(Framing::Envelope.encode("pong").unwrap(), r#"["pong"]"#);
//! ```

mod codec;
mod error;
mod framing;
mod message;

pub use codec::{
    ConfigurationPush, EventMessage, Inbound, POST_DATE_FORMAT, PONG, decode_configuration,
    decode_event, decode_function_call, decode_inbound, encode_event, encode_registration,
    format_timestamp, parse_timestamp,
};
pub use error::{ProtocolError, ProtocolResult};
pub use framing::{Frame, Framing, envelope_path};
pub use message::{MessageType, compose, payload};
