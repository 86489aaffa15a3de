//! Function descriptors and the values passed to function callables.
//!
//! A [`Function`] is built once by the application from an explicit
//! parameter-slot table and a callable. The engine never inspects the
//! callable; it binds wire parameters to slots by name and hands the
//! callable an [`Arguments`] list plus a [`FunctionCallInfo`].

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{HandlerError, ModelError, ModelResult};
use crate::event::{Event, EventData};
use crate::schema::DataFormat;
use crate::service::Service;

/// Declared type of a function parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterType {
    /// 32-bit integer.
    Integer,
    /// 64-bit integer.
    Long,
    /// Double precision number.
    Number,
    String,
    Boolean,
    /// Anything else; decoded from JSON by the callable.
    Structured,
}

impl ParameterType {
    /// Returns true for types converted by direct coercion.
    pub fn is_primitive(self) -> bool {
        !matches!(self, Self::Structured)
    }

    /// Default schema of this type.
    pub fn schema(self) -> Value {
        match self {
            Self::Integer => json!({"type": "integer", "format": "int32"}),
            Self::Long => json!({"type": "integer", "format": "int64"}),
            Self::Number => json!({"type": "number", "format": "double"}),
            Self::String => json!({"type": "string"}),
            Self::Boolean => json!({"type": "boolean"}),
            Self::Structured => json!({"type": "object"}),
        }
    }
}

/// One positional parameter of a function.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSlot {
    /// Wire name of the parameter.
    pub name: String,
    pub kind: ParameterType,
    /// Position in the callable's argument list.
    pub position: usize,
    /// Schema override, e.g. produced by a schema mapper for structured types.
    pub schema: Option<Value>,
}

impl ParameterSlot {
    pub fn new(name: impl Into<String>, kind: ParameterType, position: usize) -> Self {
        Self {
            name: name.into(),
            kind,
            position,
            schema: None,
        }
    }

    /// Builder: set the schema advertised for this parameter.
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    fn effective_schema(&self) -> Value {
        self.schema.clone().unwrap_or_else(|| self.kind.schema())
    }
}

/// Callable that produces no event.
pub type ActionFn =
    Arc<dyn Fn(&Arguments, &FunctionCallInfo) -> Result<(), HandlerError> + Send + Sync>;

/// Callable that answers with an event.
pub type ResponderFn =
    Arc<dyn Fn(&Arguments, &FunctionCallInfo) -> Result<EventData, HandlerError> + Send + Sync>;

/// The callable behind a function.
///
/// The variant is the callable's declared return kind and is checked
/// against the function's response events at construction.
#[derive(Clone)]
pub enum Invocable {
    Action(ActionFn),
    Responder(ResponderFn),
}

impl Invocable {
    /// Wraps a callable that returns nothing.
    pub fn action<F>(f: F) -> Self
    where
        F: Fn(&Arguments, &FunctionCallInfo) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        Self::Action(Arc::new(f))
    }

    /// Wraps a callable that returns event data.
    pub fn responder<F>(f: F) -> Self
    where
        F: Fn(&Arguments, &FunctionCallInfo) -> Result<EventData, HandlerError>
            + Send
            + Sync
            + 'static,
    {
        Self::Responder(Arc::new(f))
    }

    /// Calls the wrapped callable.
    pub fn invoke(
        &self,
        args: &Arguments,
        info: &FunctionCallInfo,
    ) -> Result<Option<EventData>, HandlerError> {
        match self {
            Self::Action(f) => f(args, info).map(|()| None),
            Self::Responder(f) => f(args, info).map(Some),
        }
    }

    pub fn returns_event(&self) -> bool {
        matches!(self, Self::Responder(_))
    }
}

impl fmt::Debug for Invocable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Action(_) => f.write_str("Invocable::Action"),
            Self::Responder(_) => f.write_str("Invocable::Responder"),
        }
    }
}

/// An inbound RPC endpoint of a service.
#[derive(Debug, Clone)]
pub struct Function {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Parameter schemas keyed by wire name.
    pub data_format: DataFormat,
    parameters: Vec<ParameterSlot>,
    response_event_ids: Vec<String>,
    /// Reference ids of the response events, filled in at registration.
    pub response_event_refs: Vec<u32>,
    invocable: Invocable,
}

impl Function {
    /// Creates a function descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidFunctionDefinition`] if the callable's
    /// return kind contradicts `response_event_ids`, if slot positions are
    /// not exactly `0..n`, or if two slots share a name.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Vec<ParameterSlot>,
        response_event_ids: Vec<String>,
        invocable: Invocable,
    ) -> ModelResult<Self> {
        let id = id.into();

        match (&invocable, response_event_ids.is_empty()) {
            (Invocable::Responder(_), true) => {
                return Err(ModelError::invalid_function(
                    &id,
                    "callable returns event data but no response events are declared",
                ));
            }
            (Invocable::Action(_), false) => {
                return Err(ModelError::invalid_function(
                    &id,
                    "response events are declared but the callable returns nothing",
                ));
            }
            _ => {}
        }

        let mut positions = HashSet::new();
        let mut names = HashSet::new();
        for slot in &parameters {
            if slot.position >= parameters.len() || !positions.insert(slot.position) {
                return Err(ModelError::invalid_function(
                    &id,
                    format!("parameter '{}' has invalid position {}", slot.name, slot.position),
                ));
            }
            if !names.insert(slot.name.as_str()) {
                return Err(ModelError::invalid_function(
                    &id,
                    format!("duplicate parameter name '{}'", slot.name),
                ));
            }
        }

        let mut data_format = DataFormat::new();
        for slot in &parameters {
            data_format.insert(slot.name.clone(), slot.effective_schema());
        }

        Ok(Self {
            id,
            name: name.into(),
            description: description.into(),
            data_format,
            parameters,
            response_event_ids,
            response_event_refs: Vec::new(),
            invocable,
        })
    }

    pub fn parameters(&self) -> &[ParameterSlot] {
        &self.parameters
    }

    /// Finds a parameter slot by wire name.
    pub fn parameter(&self, name: &str) -> Option<&ParameterSlot> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn response_event_ids(&self) -> &[String] {
        &self.response_event_ids
    }

    pub fn declares_response(&self, event_id: &str) -> bool {
        self.response_event_ids.iter().any(|id| id == event_id)
    }

    pub fn invocable(&self) -> &Invocable {
        &self.invocable
    }
}

/// Positional arguments bound from a function call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    values: Vec<Value>,
}

impl Arguments {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Decodes the argument at `position`.
    pub fn get<T: DeserializeOwned>(&self, position: usize) -> Result<T, HandlerError> {
        let value = self.values.get(position).ok_or_else(|| HandlerError::Argument {
            position,
            message: "missing argument".to_string(),
        })?;
        serde_json::from_value(value.clone()).map_err(|e| HandlerError::Argument {
            position,
            message: e.to_string(),
        })
    }

    /// Returns the raw JSON value at `position`.
    pub fn raw(&self, position: usize) -> Option<&Value> {
        self.values.get(position)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// An inbound function call as sent by the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    #[serde(rename = "uuid")]
    pub service_uuid: String,
    #[serde(rename = "functionId")]
    pub function_id: String,
    #[serde(rename = "correlationId")]
    pub correlation_id: String,
    #[serde(rename = "functionParameters", default)]
    pub parameters: Map<String, Value>,
}

/// Call context handed to a callable as its last argument.
#[derive(Debug, Clone)]
pub struct FunctionCallInfo {
    pub correlation_id: String,
    /// The called service, as registered.
    pub service: Arc<Service>,
    pub function: Function,
    /// Declared response events, keyed by event id.
    pub response_events: HashMap<String, Event>,
}

impl FunctionCallInfo {
    /// Builds the call context for `function` on `service`.
    pub fn new(correlation_id: impl Into<String>, service: Arc<Service>, function: Function) -> Self {
        let response_events = function
            .response_event_ids()
            .iter()
            .filter_map(|id| service.event_by_id(id))
            .map(|event| (event.id.clone(), event.clone()))
            .collect();
        Self {
            correlation_id: correlation_id.into(),
            service,
            function,
            response_events,
        }
    }

    /// Builds response event data carrying this call's correlation id.
    ///
    /// Returns `None` if `event_id` is not a declared response event.
    pub fn respond(&self, event_id: &str, value: impl Into<Value>) -> Option<EventData> {
        let event = self.response_events.get(event_id)?;
        Some(
            EventData::builder(event.clone())
                .correlation_id(self.correlation_id.clone())
                .value(value)
                .build(),
        )
    }
}
