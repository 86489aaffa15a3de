//! Core types: services, events, functions, configuration, tracing

pub mod configuration;
pub mod error;
pub mod event;
pub mod function;
pub mod schema;
pub mod service;
pub mod tracing;

pub use configuration::{Configuration, ConfigurationParameterValue, ConfigurationStore};
pub use error::{HandlerError, ModelError, ModelResult, PersistenceError, PersistenceResult};
pub use event::{Event, EventData, EventDataBuilder, EventPriority, NO_RESPONSE_EVENT_ID};
pub use function::{
    Arguments, Function, FunctionCall, FunctionCallInfo, Invocable, ParameterSlot, ParameterType,
};
pub use schema::{DataFormat, ValueShape, describe_value};
pub use service::{Service, ServiceKind};
pub use self::tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
