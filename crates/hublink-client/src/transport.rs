//! The duplex text transport the engine runs over.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;
use url::Url;

use crate::error::TransportResult;

/// A boxed future for transport methods, keeping [`Transport`] object-safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Something that happened on a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    /// One inbound text frame, still framed.
    Message(String),
    Closed { code: u16, reason: String },
    Error(String),
}

/// Sender half handed to [`Transport::open`].
pub type TransportEvents = mpsc::UnboundedSender<TransportEvent>;

/// A text transport to the hub.
///
/// Implementations report everything that happens on the connection
/// through the `events` channel given to [`Transport::open`]; each call to
/// `open` supersedes the previous connection and its channel.
///
/// # Example
///
/// ```rust
/// use hublink_client::{BoxFuture, Transport, TransportEvents, TransportResult};
/// use url::Url;
///
/// struct Loopback;
///
/// impl Transport for Loopback {
///     fn open(&self, _url: Url, _events: TransportEvents) -> BoxFuture<'_, TransportResult<()>> {
///         Box::pin(async { Ok(()) })
///     }
///
///     fn send(&self, _frame: String) -> BoxFuture<'_, TransportResult<()>> {
///         Box::pin(async { Ok(()) })
///     }
///
///     fn close<'a>(&'a self, _reason: &'a str) -> BoxFuture<'a, TransportResult<()>> {
///         Box::pin(async { Ok(()) })
///     }
/// }
/// ```
pub trait Transport: Send + Sync + 'static {
    /// Opens a connection to `url`.
    fn open(&self, url: Url, events: TransportEvents) -> BoxFuture<'_, TransportResult<()>>;

    /// Sends one text frame.
    fn send(&self, frame: String) -> BoxFuture<'_, TransportResult<()>>;

    /// Emits a keep-alive on the open connection.
    ///
    /// The default does nothing, for transports without a keep-alive frame.
    fn keep_alive(&self) -> BoxFuture<'_, TransportResult<()>> {
        Box::pin(async { Ok(()) })
    }

    /// Closes the connection, if any.
    fn close<'a>(&'a self, reason: &'a str) -> BoxFuture<'a, TransportResult<()>>;
}
