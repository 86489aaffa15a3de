//! Hub connection engine.
//!
//! An [`Engine`] connects a set of self-described services to a message
//! hub: it registers them, publishes their events (caching what cannot be
//! delivered), answers function calls routed to them and reconnects when
//! the hub goes away.
//!
//! ```no_run
//! use hublink_client::{Engine, EngineSettings};
//! use hublink_core::{Event, EventData, Service, TracingConfig, init_tracing};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! init_tracing(TracingConfig::daemon().with_env_filter("hublink_client=debug"))?;
//!
//! let mut service = Service::smart_object("7f3c", "Sensor", "Room sensor", "token");
//! let tick = Event::without_data("tick", "Tick", "Periodic tick");
//! service.add_event(tick.clone())?;
//!
//! let engine = Engine::websocket(EngineSettings::new("ws://localhost:8085"));
//! if engine.connect().await && engine.register(&service).await {
//!     engine.publish(&service, EventData::new(tick)).await?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! The engine only emits `tracing` events under the `hublink_client`
//! target; [`hublink_core::init_tracing`] installs a subscriber for them.

mod ack;
pub mod cache;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod notification;
pub mod transport;
pub mod websocket;

pub use cache::{CachedEvent, EventCache};
pub use config::{EngineSettings, MIN_AUTO_RECONNECT_INTERVAL_MS};
pub use engine::Engine;
pub use error::{ConfigError, DispatchError, EngineError, EngineResult, TransportError, TransportResult};
pub use notification::{ConnectionState, Notification};
pub use transport::{BoxFuture, Transport, TransportEvent, TransportEvents};
pub use websocket::WebSocketTransport;
