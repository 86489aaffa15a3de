//! Event descriptions and event data.
//!
//! This module provides:
//! - [`Event`]: an outbound data shape a service can publish
//! - [`EventPriority`]: the priority carried on the wire
//! - [`EventData`]: one concrete occurrence of an event, ready to publish
//! - [`EventDataBuilder`]: builder for [`EventData`]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::schema::DataFormat;

/// Event id of the [`EventData::no_response`] sentinel.
pub const NO_RESPONSE_EVENT_ID: &str = "noresponseevent";

/// An event a service can publish.
///
/// `ref_id` is assigned by the engine each time the owning service is
/// registered; it is the event's position in the service's event list and
/// lets functions reference response events by small integers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "@id", default)]
    pub ref_id: u32,
    #[serde(rename = "eventId")]
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "dataFormat")]
    pub data_format: DataFormat,
}

impl Event {
    /// Creates a new event description.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        data_format: DataFormat,
    ) -> Self {
        Self {
            ref_id: 0,
            id: id.into(),
            name: name.into(),
            description: description.into(),
            data_format,
        }
    }

    /// Creates an event that carries no data.
    pub fn without_data(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self::new(id, name, description, DataFormat::empty())
    }
}

/// Event priority, serialised as its ordinal (`0`, `1`, `2`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum EventPriority {
    #[default]
    Low,
    Medium,
    High,
}

impl From<EventPriority> for u8 {
    fn from(priority: EventPriority) -> Self {
        match priority {
            EventPriority::Low => 0,
            EventPriority::Medium => 1,
            EventPriority::High => 2,
        }
    }
}

impl TryFrom<u8> for EventPriority {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Low),
            1 => Ok(Self::Medium),
            2 => Ok(Self::High),
            other => Err(format!("invalid event priority: {other}")),
        }
    }
}

/// One occurrence of an [`Event`].
#[derive(Debug, Clone, PartialEq)]
pub struct EventData {
    /// The event this data belongs to.
    pub event: Event,
    /// Links a function call to its response event.
    pub correlation_id: String,
    pub priority: EventPriority,
    /// Payload, published as `dataObject`.
    pub value: Value,
    pub publishing_date: DateTime<Utc>,
    /// Whether the engine may cache this event while the hub is unreachable.
    pub should_cache: bool,
}

impl EventData {
    /// Creates event data with a fresh correlation id, low priority, a
    /// `null` value and the current time.
    pub fn new(event: Event) -> Self {
        Self {
            event,
            correlation_id: Uuid::new_v4().to_string(),
            priority: EventPriority::default(),
            value: Value::Null,
            publishing_date: Utc::now(),
            should_cache: true,
        }
    }

    /// Starts a builder for the given event.
    pub fn builder(event: Event) -> EventDataBuilder {
        EventDataBuilder::new(event)
    }

    /// Sentinel returned by a function that has nothing to publish.
    pub fn no_response() -> Self {
        Self::new(Event::without_data(
            NO_RESPONSE_EVENT_ID,
            NO_RESPONSE_EVENT_ID,
            NO_RESPONSE_EVENT_ID,
        ))
    }

    /// Returns true if this is the [`EventData::no_response`] sentinel.
    pub fn is_no_response(&self) -> bool {
        self.event.id == NO_RESPONSE_EVENT_ID
    }
}

/// Builder for [`EventData`].
#[derive(Debug, Clone)]
pub struct EventDataBuilder {
    data: EventData,
}

impl EventDataBuilder {
    /// Creates a builder with the defaults of [`EventData::new`].
    pub fn new(event: Event) -> Self {
        Self {
            data: EventData::new(event),
        }
    }

    /// Builder: set the payload.
    pub fn value(mut self, value: impl Into<Value>) -> Self {
        self.data.value = value.into();
        self
    }

    /// Builder: set the payload from any serialisable value.
    pub fn try_value<T: Serialize>(mut self, value: &T) -> Result<Self, serde_json::Error> {
        self.data.value = serde_json::to_value(value)?;
        Ok(self)
    }

    /// Builder: set the publishing date.
    pub fn publishing_date(mut self, date: DateTime<Utc>) -> Self {
        self.data.publishing_date = date;
        self
    }

    /// Builder: set the correlation id.
    pub fn correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.data.correlation_id = correlation_id.into();
        self
    }

    /// Builder: set the priority.
    pub fn priority(mut self, priority: EventPriority) -> Self {
        self.data.priority = priority;
        self
    }

    /// Builder: set whether the event may be cached.
    pub fn should_cache(mut self, should_cache: bool) -> Self {
        self.data.should_cache = should_cache;
        self
    }

    pub fn build(self) -> EventData {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn temperature() -> Event {
        Event::new(
            "temperature",
            "Temperature",
            "Current temperature",
            DataFormat::primitive("dataObject", "number", Some("double")),
        )
    }

    #[test]
    fn event_data_defaults() {
        let data = EventData::new(temperature());
        assert_eq!(data.priority, EventPriority::Low);
        assert!(data.should_cache);
        assert_eq!(data.value, Value::Null);
        assert!(Uuid::parse_str(&data.correlation_id).is_ok());
    }

    #[test]
    fn fresh_correlation_ids_differ() {
        let a = EventData::new(temperature());
        let b = EventData::new(temperature());
        assert_ne!(a.correlation_id, b.correlation_id);
    }

    #[test]
    fn builder_sets_all_fields() {
        let date = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let data = EventData::builder(temperature())
            .value(21.5)
            .priority(EventPriority::High)
            .correlation_id("corr-1")
            .publishing_date(date)
            .should_cache(false)
            .build();

        assert_eq!(data.value, json!(21.5));
        assert_eq!(data.priority, EventPriority::High);
        assert_eq!(data.correlation_id, "corr-1");
        assert_eq!(data.publishing_date, date);
        assert!(!data.should_cache);
    }

    #[test]
    fn try_value_serialises_structs() {
        #[derive(Serialize)]
        struct Reading {
            celsius: f64,
        }

        let data = EventData::builder(temperature())
            .try_value(&Reading { celsius: 3.0 })
            .unwrap()
            .build();
        assert_eq!(data.value, json!({"celsius": 3.0}));
    }

    #[test]
    fn no_response_sentinel() {
        assert!(EventData::no_response().is_no_response());
        assert!(!EventData::new(temperature()).is_no_response());
    }

    #[test]
    fn priority_is_serialised_as_ordinal() {
        assert_eq!(serde_json::to_value(EventPriority::Medium).unwrap(), json!(1));
        let parsed: EventPriority = serde_json::from_value(json!(2)).unwrap();
        assert_eq!(parsed, EventPriority::High);
        assert!(serde_json::from_value::<EventPriority>(json!(7)).is_err());
    }

    #[test]
    fn event_uses_wire_field_names() {
        let mut event = temperature();
        event.ref_id = 3;
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["@id"], json!(3));
        assert_eq!(value["eventId"], json!("temperature"));
        assert_eq!(value["dataFormat"]["dataObject"]["type"], json!("number"));
    }
}
