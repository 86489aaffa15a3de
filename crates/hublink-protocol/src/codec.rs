//! Encoding and decoding of hub message bodies.

use chrono::{DateTime, Utc};
use hublink_core::{
    Configuration, DataFormat, Event, EventData, EventPriority, Function, FunctionCall, Service,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ProtocolError, ProtocolResult};
use crate::message::{MessageType, compose, payload};

/// `postDate` format: ISO-8601, millisecond precision, `Z` suffix.
pub const POST_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Reply to a hub `PING`.
pub const PONG: &str = "pong";

pub fn format_timestamp(date: &DateTime<Utc>) -> String {
    date.format(POST_DATE_FORMAT).to_string()
}

pub fn parse_timestamp(value: &str) -> ProtocolResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|date| date.with_timezone(&Utc))
        .map_err(|_| ProtocolError::InvalidTimestamp(value.to_string()))
}

#[derive(Serialize)]
struct ServiceBody<'a> {
    #[serde(rename = "@class")]
    class: &'static str,
    uuid: &'a str,
    name: &'a str,
    description: &'a str,
    token: &'a str,
    configuration: &'a Configuration,
    events: &'a [Event],
    functions: Vec<FunctionBody<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    services: Option<Vec<ServiceBody<'a>>>,
}

impl<'a> ServiceBody<'a> {
    fn new(service: &'a Service) -> Self {
        let services = matches!(service.kind, hublink_core::ServiceKind::Gateway { .. })
            .then(|| service.services().iter().map(Self::new).collect());
        Self {
            class: service.kind.class_name(),
            uuid: &service.uuid,
            name: &service.name,
            description: &service.description,
            token: &service.token,
            configuration: service.configuration(),
            events: service.events(),
            functions: service.functions().iter().map(FunctionBody::new).collect(),
            services,
        }
    }
}

#[derive(Serialize)]
struct FunctionBody<'a> {
    #[serde(rename = "functionId")]
    id: &'a str,
    name: &'a str,
    description: &'a str,
    #[serde(rename = "dataFormat")]
    data_format: &'a DataFormat,
    #[serde(rename = "responseEvents")]
    response_events: &'a [u32],
}

impl<'a> FunctionBody<'a> {
    fn new(function: &'a Function) -> Self {
        Self {
            id: &function.id,
            name: &function.name,
            description: &function.description,
            data_format: &function.data_format,
            response_events: &function.response_event_refs,
        }
    }
}

/// Builds the registration message of a service.
///
/// Reference ids must already be assigned (see [`Service::assign_ref_ids`]).
pub fn encode_registration(service: &Service) -> ProtocolResult<String> {
    let body = serde_json::to_string(&ServiceBody::new(service))?;
    Ok(compose(MessageType::Registration, &body))
}

/// Body of an event message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    pub uuid: String,
    #[serde(rename = "eventId")]
    pub event_id: String,
    pub priority: EventPriority,
    #[serde(rename = "postDate")]
    pub post_date: String,
    #[serde(rename = "correlationId")]
    pub correlation_id: String,
    #[serde(rename = "dataObject", default, skip_serializing_if = "Value::is_null")]
    pub data_object: Value,
}

impl EventMessage {
    pub fn new(service_uuid: &str, data: &EventData) -> Self {
        Self {
            uuid: service_uuid.to_string(),
            event_id: data.event.id.clone(),
            priority: data.priority,
            post_date: format_timestamp(&data.publishing_date),
            correlation_id: data.correlation_id.clone(),
            data_object: data.value.clone(),
        }
    }

    pub fn publishing_date(&self) -> ProtocolResult<DateTime<Utc>> {
        parse_timestamp(&self.post_date)
    }

    /// Rebuilds event data against the event description it names.
    pub fn into_event_data(self, event: Event) -> ProtocolResult<EventData> {
        let publishing_date = self.publishing_date()?;
        Ok(EventData::builder(event)
            .correlation_id(self.correlation_id)
            .priority(self.priority)
            .value(self.data_object)
            .publishing_date(publishing_date)
            .build())
    }
}

/// Builds the event message publishing `data` for a service.
pub fn encode_event(service_uuid: &str, data: &EventData) -> ProtocolResult<String> {
    let body = serde_json::to_string(&EventMessage::new(service_uuid, data))?;
    Ok(compose(MessageType::Event, &body))
}

/// Configuration values pushed by the hub.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConfigurationPush {
    #[serde(rename = "uuid")]
    pub service_uuid: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

fn decode_body<T: serde::de::DeserializeOwned>(
    message: &str,
    expected: MessageType,
) -> ProtocolResult<T> {
    let found = MessageType::classify(message);
    if found != expected {
        return Err(ProtocolError::UnexpectedType { expected, found });
    }
    Ok(serde_json::from_str(payload(message, expected)?)?)
}

pub fn decode_event(message: &str) -> ProtocolResult<EventMessage> {
    decode_body(message, MessageType::Event)
}

pub fn decode_function_call(message: &str) -> ProtocolResult<FunctionCall> {
    decode_body(message, MessageType::FunctionCallback)
}

pub fn decode_configuration(message: &str) -> ProtocolResult<ConfigurationPush> {
    decode_body(message, MessageType::Configuration)
}

/// A classified and decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Ping,
    Connected,
    Registered,
    Published,
    ConnectRejected(MessageType),
    RegistrationRejected(MessageType),
    PublishRejected(MessageType),
    FunctionCall(FunctionCall),
    Configuration(ConfigurationPush),
    Event(EventMessage),
    /// Anything a client does not expect to receive.
    Unknown(String),
}

/// Classifies an inbound message and decodes its body.
pub fn decode_inbound(message: &str) -> ProtocolResult<Inbound> {
    let ty = MessageType::classify(message);
    let inbound = match ty {
        MessageType::Ping => Inbound::Ping,
        MessageType::IoConnected => Inbound::Connected,
        MessageType::IoRegistered => Inbound::Registered,
        MessageType::IoPublished => Inbound::Published,
        MessageType::FunctionCallback => Inbound::FunctionCall(decode_function_call(message)?),
        MessageType::Configuration => Inbound::Configuration(decode_configuration(message)?),
        MessageType::Event => Inbound::Event(decode_event(message)?),
        ty if ty.is_connect_rejection() => Inbound::ConnectRejected(ty),
        ty if ty.is_registration_rejection() => Inbound::RegistrationRejected(ty),
        ty if ty.is_publish_rejection() => Inbound::PublishRejected(ty),
        _ => Inbound::Unknown(message.to_string()),
    };
    Ok(inbound)
}
