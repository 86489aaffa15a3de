//! WebSocket transport over `tokio-tungstenite`.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::{TransportError, TransportResult};
use crate::transport::{BoxFuture, Transport, TransportEvent, TransportEvents};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Close code reported when the connection ends without a close frame.
const ABNORMAL_CLOSURE: u16 = 1006;

/// A [`Transport`] backed by one WebSocket connection at a time.
#[derive(Default)]
pub struct WebSocketTransport {
    sink: Mutex<Option<SplitSink<WsStream, Message>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl WebSocketTransport {
    pub fn new() -> Self {
        Self::default()
    }

    async fn shutdown(&self, reason: &str) {
        if let Some(mut sink) = self.sink.lock().await.take() {
            let frame = CloseFrame {
                code: CloseCode::Normal,
                reason: reason.to_owned().into(),
            };
            if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                debug!(error = %e, "close frame not sent");
            }
            let _ = sink.close().await;
        }
        if let Some(reader) = self.reader.lock().await.take() {
            reader.abort();
        }
    }
}

impl Transport for WebSocketTransport {
    fn open(&self, url: Url, events: TransportEvents) -> BoxFuture<'_, TransportResult<()>> {
        Box::pin(async move {
            self.shutdown("reconnecting").await;

            debug!(url = %url, "opening websocket");
            let (ws, _) = connect_async(url.as_str())
                .await
                .map_err(|e| TransportError::Connect(e.to_string()))?;
            let (sink, stream) = ws.split();

            *self.sink.lock().await = Some(sink);
            *self.reader.lock().await = Some(tokio::spawn(read_loop(stream, events.clone())));
            let _ = events.send(TransportEvent::Opened);
            Ok(())
        })
    }

    fn send(&self, frame: String) -> BoxFuture<'_, TransportResult<()>> {
        Box::pin(async move {
            let mut guard = self.sink.lock().await;
            let sink = guard.as_mut().ok_or(TransportError::NotConnected)?;
            trace!(frame = %frame, "sending frame");
            sink.send(Message::Text(frame.into()))
                .await
                .map_err(|e| TransportError::Send(e.to_string()))
        })
    }

    fn keep_alive(&self) -> BoxFuture<'_, TransportResult<()>> {
        Box::pin(async move {
            let mut guard = self.sink.lock().await;
            let sink = guard.as_mut().ok_or(TransportError::NotConnected)?;
            sink.send(Message::Ping(Default::default()))
                .await
                .map_err(|e| TransportError::Send(e.to_string()))
        })
    }

    fn close<'a>(&'a self, reason: &'a str) -> BoxFuture<'a, TransportResult<()>> {
        Box::pin(async move {
            self.shutdown(reason).await;
            Ok(())
        })
    }
}

async fn read_loop(mut stream: SplitStream<WsStream>, events: TransportEvents) {
    let (code, reason) = loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                if events
                    .send(TransportEvent::Message(text.as_str().to_owned()))
                    .is_err()
                {
                    return;
                }
            }
            Some(Ok(Message::Close(frame))) => {
                break match frame {
                    Some(frame) => (u16::from(frame.code), frame.reason.as_str().to_owned()),
                    None => (u16::from(CloseCode::Status), String::new()),
                };
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!(error = %e, "websocket read failed");
                let _ = events.send(TransportEvent::Error(e.to_string()));
                break (ABNORMAL_CLOSURE, e.to_string());
            }
            None => break (ABNORMAL_CLOSURE, String::new()),
        }
    };
    debug!(code, reason = %reason, "websocket closed");
    let _ = events.send(TransportEvent::Closed { code, reason });
}
