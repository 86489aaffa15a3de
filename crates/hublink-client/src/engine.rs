//! The connection engine.
//!
//! One [`Engine`] owns one hub connection and everything that depends on
//! it: the service registry, the event cache, pending acknowledgements,
//! the heartbeat and the reconnect loop.
//!
//! Every connection attempt gets a new generation number. Transport events
//! and background tasks carry the generation they were started for and are
//! ignored once a newer attempt or an explicit disconnect has superseded it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use hublink_core::{EventData, FunctionCall, Service};
use hublink_protocol::{
    ConfigurationPush, Frame, Framing, Inbound, PONG, decode_inbound, encode_event,
    encode_registration,
};
use tokio::sync::{Mutex, RwLock, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::ack::{AckOutcome, Waiters};
use crate::cache::EventCache;
use crate::config::EngineSettings;
use crate::dispatch;
use crate::error::{EngineError, EngineResult};
use crate::notification::{ConnectionState, Notification};
use crate::transport::{BoxFuture, Transport, TransportEvent};
use crate::websocket::WebSocketTransport;

/// Handle to a hub connection engine.
///
/// Cloning is cheap; all clones drive the same connection.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

struct Inner {
    settings: EngineSettings,
    framing: Framing,
    transport: Arc<dyn Transport>,
    state: watch::Sender<ConnectionState>,
    notifications: broadcast::Sender<Notification>,
    registry: RwLock<HashMap<String, Arc<Service>>>,
    cache: EventCache,
    generation: AtomicU64,
    handshake: Waiters,
    registrations: Waiters,
    publishes: Waiters,
    /// Serialises connect attempts.
    connecting: Mutex<()>,
    /// Cleared by `disconnect`, set by a successful `connect`.
    stay_connected: AtomicBool,
    reconnecting: AtomicBool,
    reconnect_task: Mutex<Option<JoinHandle<()>>>,
    heartbeat_task: Mutex<Option<JoinHandle<()>>>,
    replaying: Mutex<()>,
}

impl Engine {
    /// Creates an engine that talks to the hub over `transport`.
    pub fn new(settings: EngineSettings, transport: Arc<dyn Transport>) -> Self {
        let settings = settings.normalized();
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (notifications, _) = broadcast::channel(settings.notification_capacity);
        Self {
            inner: Arc::new(Inner {
                framing: settings.framing(),
                cache: EventCache::new(settings.event_cache_capacity),
                settings,
                transport,
                state,
                notifications,
                registry: RwLock::new(HashMap::new()),
                generation: AtomicU64::new(0),
                handshake: Waiters::default(),
                registrations: Waiters::default(),
                publishes: Waiters::default(),
                connecting: Mutex::new(()),
                stay_connected: AtomicBool::new(false),
                reconnecting: AtomicBool::new(false),
                reconnect_task: Mutex::new(None),
                heartbeat_task: Mutex::new(None),
                replaying: Mutex::new(()),
            }),
        }
    }

    /// Creates an engine over a [`WebSocketTransport`].
    pub fn websocket(settings: EngineSettings) -> Self {
        Self::new(settings, Arc::new(WebSocketTransport::new()))
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.inner.settings
    }

    /// Subscribes to engine notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.inner.notifications.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Watches connection state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    /// Whether a reconnect loop is running.
    pub fn is_reconnecting(&self) -> bool {
        self.inner.reconnecting.load(Ordering::SeqCst)
    }

    /// The registered copy of a service.
    pub async fn registered_service(&self, uuid: &str) -> Option<Arc<Service>> {
        self.inner.registry.read().await.get(uuid).cloned()
    }

    /// UUIDs of all registered services, sorted.
    pub async fn registered_services(&self) -> Vec<String> {
        let mut uuids: Vec<String> = self.inner.registry.read().await.keys().cloned().collect();
        uuids.sort();
        uuids
    }

    /// Events cached for a service, oldest first.
    pub async fn cached_events(&self, uuid: &str) -> Vec<EventData> {
        self.inner
            .cache
            .snapshot(uuid)
            .await
            .into_iter()
            .map(|entry| entry.data)
            .collect()
    }

    fn notify(&self, notification: Notification) {
        trace!(?notification, "notify");
        // No subscribers is fine.
        let _ = self.inner.notifications.send(notification);
    }

    fn set_state(&self, state: ConnectionState) -> ConnectionState {
        let previous = self.inner.state.send_replace(state);
        if previous != state {
            debug!(from = ?previous, to = ?state, "connection state changed");
        }
        previous
    }

    /// Moves to `to` only if the current state is `from`.
    fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        let changed = self.inner.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        });
        if changed {
            debug!(from = ?from, to = ?to, "connection state changed");
        }
        changed
    }

    fn current_generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    fn next_generation(&self) -> u64 {
        self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    // ---- connection lifecycle -------------------------------------------

    /// Connects to the hub and waits for the handshake.
    ///
    /// Returns `true` once the hub accepted the connection. On success all
    /// registered services are registered again and cached events are
    /// replayed in the background. Returns `false` (and notifies
    /// [`Notification::ConnectionFailed`]) if the transport cannot be
    /// opened or the hub refuses or ignores the handshake.
    pub async fn connect(&self) -> bool {
        let _attempt = self.inner.connecting.lock().await;
        if self.is_connected() {
            debug!("already connected");
            return true;
        }

        let url = match self.inner.settings.connect_url() {
            Ok(url) => url,
            Err(e) => {
                error!(error = %e, "cannot build hub url");
                self.notify(Notification::ConnectionFailed);
                return false;
            }
        };

        let generation = self.next_generation();
        self.set_state(ConnectionState::Connecting);
        info!(url = %url, generation, "connecting to hub");

        let ticket = self.inner.handshake.push(format!("handshake #{generation}")).await;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        tokio::spawn(self.clone().pump(generation, events_rx));

        if let Err(e) = self.inner.transport.open(url, events_tx).await {
            warn!(error = %e, "failed to open transport");
            self.inner.handshake.cancel(&ticket).await;
            self.fail_connect(generation).await;
            return false;
        }
        self.transition(ConnectionState::Connecting, ConnectionState::AwaitingHandshake);

        let outcome = self
            .inner
            .handshake
            .wait(ticket, self.inner.settings.connect_timeout())
            .await;
        if !outcome.is_accepted() || self.current_generation() != generation {
            warn!(?outcome, "handshake failed");
            self.fail_connect(generation).await;
            return false;
        }

        self.set_state(ConnectionState::Ready);
        self.inner.stay_connected.store(true, Ordering::SeqCst);
        info!("connected to hub");
        self.notify(Notification::Connected);
        self.start_heartbeat(generation).await;

        let engine = self.clone();
        tokio::spawn(async move { engine.resume().await });
        true
    }

    async fn fail_connect(&self, generation: u64) {
        // Only tear down if nothing newer took over in the meantime.
        if self
            .inner
            .generation
            .compare_exchange(generation, generation + 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            if let Err(e) = self.inner.transport.close("handshake failed").await {
                debug!(error = %e, "close after failed handshake");
            }
            self.set_state(ConnectionState::Disconnected);
        }
        self.notify(Notification::ConnectionFailed);
    }

    /// Closes the connection and stops reconnecting.
    pub async fn disconnect(&self) {
        self.inner.stay_connected.store(false, Ordering::SeqCst);
        self.stop_reconnect().await;
        self.next_generation();
        self.stop_heartbeat().await;
        self.drop_waiters().await;

        if let Err(e) = self.inner.transport.close("disconnect").await {
            debug!(error = %e, "close on disconnect");
        }
        self.set_state(ConnectionState::Disconnected);
        info!("disconnected from hub");
        self.notify(Notification::Disconnected);
    }

    async fn drop_waiters(&self) {
        self.inner.handshake.clear().await;
        self.inner.registrations.clear().await;
        self.inner.publishes.clear().await;
    }

    async fn handle_close(&self, generation: u64, code: u16, reason: String) {
        if self.current_generation() != generation {
            trace!(generation, "ignoring close of a superseded connection");
            return;
        }
        let previous = self.set_state(ConnectionState::Disconnected);
        self.stop_heartbeat().await;
        self.drop_waiters().await;

        warn!(code, reason = %reason, "connection closed");
        self.notify(Notification::ConnectionClosed { code, reason });

        if previous == ConnectionState::Ready && self.inner.settings.auto_reconnect {
            self.start_reconnect().await;
        }
    }

    // ---- reconnect --------------------------------------------------------

    async fn start_reconnect(&self) {
        if self
            .inner
            .reconnecting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("reconnect loop already running");
            return;
        }
        let engine = self.clone();
        let handle = tokio::spawn(async move { engine.reconnect_loop().await });
        if let Some(previous) = self.inner.reconnect_task.lock().await.replace(handle) {
            // A previous loop has finished or is about to return.
            previous.abort();
        }
    }

    /// Boxed so the spawned future has a nameable `Send` type.
    fn reconnect_loop(self) -> BoxFuture<'static, ()> {
        Box::pin(async move { self.run_reconnect().await })
    }

    async fn run_reconnect(self) {
        let interval = self.inner.settings.auto_reconnect_interval();
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            self.transition(ConnectionState::Disconnected, ConnectionState::Reconnecting);
            info!(attempt, "reconnecting to hub");

            if self.connect().await {
                self.inner.reconnecting.store(false, Ordering::SeqCst);
                // A drop right after connecting found the flag still set.
                if self.is_connected() || !self.inner.stay_connected.load(Ordering::SeqCst) {
                    return;
                }
                if self
                    .inner
                    .reconnecting
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
                {
                    return;
                }
                continue;
            }

            self.transition(ConnectionState::Disconnected, ConnectionState::Reconnecting);
            debug!(attempt, delay_ms = interval.as_millis() as u64, "reconnect failed");
            tokio::time::sleep(interval).await;
        }
    }

    async fn stop_reconnect(&self) {
        if let Some(task) = self.inner.reconnect_task.lock().await.take() {
            task.abort();
        }
        self.inner.reconnecting.store(false, Ordering::SeqCst);
    }

    // ---- heartbeat --------------------------------------------------------

    async fn start_heartbeat(&self, generation: u64) {
        let engine = self.clone();
        let period = self.inner.settings.heartbeat_interval();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if engine.current_generation() != generation || !engine.is_connected() {
                    break;
                }
                if let Err(e) = engine.inner.transport.keep_alive().await {
                    debug!(error = %e, "keep-alive failed");
                }
            }
        });
        if let Some(previous) = self.inner.heartbeat_task.lock().await.replace(handle) {
            previous.abort();
        }
    }

    async fn stop_heartbeat(&self) {
        if let Some(task) = self.inner.heartbeat_task.lock().await.take() {
            task.abort();
        }
    }

    // ---- inbound ------------------------------------------------------------

    async fn pump(self, generation: u64, mut events: mpsc::UnboundedReceiver<TransportEvent>) {
        while let Some(event) = events.recv().await {
            if self.current_generation() != generation {
                break;
            }
            match event {
                TransportEvent::Opened => debug!(generation, "transport open"),
                TransportEvent::Message(raw) => {
                    if let Some((code, reason)) = self.handle_frame(&raw).await {
                        if let Err(e) = self.inner.transport.close(&reason).await {
                            debug!(error = %e, "transport close after close frame failed");
                        }
                        self.handle_close(generation, code, reason).await;
                        break;
                    }
                }
                TransportEvent::Closed { code, reason } => {
                    self.handle_close(generation, code, reason).await;
                    break;
                }
                TransportEvent::Error(e) => warn!(error = %e, "transport error"),
            }
        }
        trace!(generation, "transport event loop finished");
    }

    /// Handles one raw frame; returns the close code and reason if the
    /// frame announced a close.
    async fn handle_frame(&self, raw: &str) -> Option<(u16, String)> {
        trace!(frame = %raw, "received frame");
        match self.inner.framing.decode(raw) {
            Ok(Frame::Messages(messages)) => {
                for message in messages {
                    self.handle_message(&message).await;
                }
                None
            }
            Ok(Frame::Close { code, reason }) => Some((code, reason)),
            Err(e) => {
                warn!(error = %e, "invalid frame");
                None
            }
        }
    }

    async fn handle_message(&self, message: &str) {
        let inbound = match decode_inbound(message) {
            Ok(inbound) => inbound,
            Err(e) => {
                warn!(error = %e, message = %message, "undecodable message");
                return;
            }
        };

        match inbound {
            Inbound::Ping => {
                if !self.send_message(PONG).await {
                    debug!("pong not sent");
                }
            }
            Inbound::Connected => {
                if self.inner.handshake.resolve_oldest(true).await.is_none() {
                    debug!("unexpected handshake acknowledgement");
                }
            }
            Inbound::ConnectRejected(ty) => {
                warn!(reason = ty.token(), "hub refused connection");
                self.inner.handshake.resolve_oldest(false).await;
            }
            Inbound::Registered => {
                if self.inner.registrations.resolve_oldest(true).await.is_none() {
                    debug!("unexpected registration acknowledgement");
                }
            }
            Inbound::RegistrationRejected(ty) => {
                let label = self.inner.registrations.resolve_oldest(false).await;
                warn!(reason = ty.token(), service = ?label, "hub rejected registration");
            }
            Inbound::Published => {
                if self.inner.publishes.resolve_oldest(true).await.is_none() {
                    debug!("unexpected publish acknowledgement");
                }
            }
            Inbound::PublishRejected(ty) => {
                let label = self.inner.publishes.resolve_oldest(false).await;
                warn!(reason = ty.token(), event = ?label, "hub rejected event");
            }
            Inbound::FunctionCall(call) => self.dispatch(call),
            Inbound::Configuration(push) => self.apply_configuration(push).await,
            Inbound::Event(event) => {
                debug!(service = %event.uuid, event_id = %event.event_id, "ignoring echoed event");
            }
            Inbound::Unknown(text) => debug!(message = %text, "ignoring unknown message"),
        }
    }

    fn dispatch(&self, call: FunctionCall) {
        let engine = self.clone();
        tokio::spawn(async move {
            debug!(
                service = %call.service_uuid,
                function_id = %call.function_id,
                correlation_id = %call.correlation_id,
                "function call received"
            );
            let registered = engine.registered_service(&call.service_uuid).await;
            let (service, function) = match dispatch::resolve(registered, &call) {
                Ok(found) => found,
                Err(e) => {
                    warn!(error = %e, "function call not answered");
                    return;
                }
            };
            let response = match dispatch::execute(service.clone(), function, call).await {
                Ok(Some(response)) => response,
                Ok(None) => return,
                Err(e) => {
                    warn!(error = %e, "function call not answered");
                    return;
                }
            };
            if let Err(e) = engine.publish(&service, response).await {
                warn!(error = %e, "response event not published");
            }
        });
    }

    async fn apply_configuration(&self, push: ConfigurationPush) {
        let Some(current) = self.registered_service(&push.service_uuid).await else {
            warn!(service = %push.service_uuid, "configuration for unknown service");
            return;
        };

        let mut updated = Service::clone(&current);
        let params = push.params.clone();
        let updated = match tokio::task::spawn_blocking(move || {
            let persisted = updated.apply_configuration(&params);
            (updated, persisted)
        })
        .await
        {
            Ok((updated, persisted)) => {
                if let Err(e) = persisted {
                    warn!(service = %push.service_uuid, error = %e, "failed to persist configuration");
                }
                updated
            }
            Err(e) => {
                error!(service = %push.service_uuid, error = %e, "configuration update failed");
                return;
            }
        };

        {
            let mut registry = self.inner.registry.write().await;
            match registry.get(&push.service_uuid) {
                Some(entry) if Arc::ptr_eq(entry, &current) => {
                    registry.insert(push.service_uuid.clone(), Arc::new(updated));
                }
                _ => {
                    warn!(service = %push.service_uuid, "service re-registered during configuration update");
                }
            }
        }

        info!(service = %push.service_uuid, count = push.params.len(), "configuration received");
        self.notify(Notification::ConfigurationParameterReceived {
            service_uuid: push.service_uuid,
            parameters: push.params,
        });
    }

    // ---- outbound ---------------------------------------------------------

    async fn send_message(&self, message: &str) -> bool {
        let frame = match self.inner.framing.encode(message) {
            Ok(frame) => frame,
            Err(e) => {
                error!(error = %e, "cannot frame message");
                return false;
            }
        };
        trace!(frame = %frame, "sending frame");
        match self.inner.transport.send(frame).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "send failed");
                false
            }
        }
    }

    /// Registers a service with the hub.
    ///
    /// The service is stored in the registry even when this returns
    /// `false`, so it is registered again after the next connect. A later
    /// registration with the same uuid replaces it.
    pub async fn register(&self, service: &Service) -> bool {
        let mut service = service.clone();
        service.assign_ref_ids();
        let service = Arc::new(service);
        self.inner
            .registry
            .write()
            .await
            .insert(service.uuid.clone(), service.clone());

        if !self.is_connected() {
            debug!(service = %service.uuid, "not connected, registration deferred");
            return false;
        }
        self.send_registration(&service).await
    }

    async fn send_registration(&self, service: &Service) -> bool {
        let message = match encode_registration(service) {
            Ok(message) => message,
            Err(e) => {
                error!(service = %service.uuid, error = %e, "cannot encode registration");
                self.notify(Notification::RegistrationFailed {
                    service_uuid: service.uuid.clone(),
                });
                return false;
            }
        };

        let ticket = self.inner.registrations.push(service.uuid.clone()).await;
        let outcome = if self.send_message(&message).await {
            self.inner
                .registrations
                .wait(ticket, self.inner.settings.registration_timeout())
                .await
        } else {
            self.inner.registrations.cancel(&ticket).await;
            AckOutcome::Dropped
        };

        if outcome.is_accepted() {
            info!(service = %service.uuid, "service registered");
            self.notify(Notification::Registered {
                service_uuid: service.uuid.clone(),
            });
            true
        } else {
            warn!(service = %service.uuid, ?outcome, "registration failed");
            self.notify(Notification::RegistrationFailed {
                service_uuid: service.uuid.clone(),
            });
            false
        }
    }

    /// Publishes an event of a registered service.
    ///
    /// Returns `Ok(true)` once the hub acknowledged the event. An event the
    /// hub rejects or does not acknowledge in time is cached for replay and
    /// `Ok(false)` is returned. While offline the event is cached only when
    /// `should_cache` is set.
    ///
    /// # Errors
    ///
    /// [`EngineError::ServiceNotRegistered`] if `service` was never
    /// registered, [`EngineError::EventNotExist`] if the event is not one
    /// of the service's events.
    pub async fn publish(&self, service: &Service, data: EventData) -> EngineResult<bool> {
        if !self.inner.registry.read().await.contains_key(&service.uuid) {
            return Err(EngineError::ServiceNotRegistered(service.uuid.clone()));
        }
        if !service.has_event(&data.event.id) {
            return Err(EngineError::EventNotExist {
                event_id: data.event.id.clone(),
                service_uuid: service.uuid.clone(),
            });
        }

        if !self.is_connected() {
            if data.should_cache {
                self.cache_event(&service.uuid, data).await;
            } else {
                debug!(service = %service.uuid, event_id = %data.event.id, "not connected, event discarded");
            }
            return Ok(false);
        }

        if self.send_event(&service.uuid, &data).await {
            return Ok(true);
        }
        self.cache_event(&service.uuid, data).await;
        Ok(false)
    }

    async fn cache_event(&self, service_uuid: &str, data: EventData) {
        let event_id = data.event.id.clone();
        if self.inner.cache.push(service_uuid, data).await {
            self.notify(Notification::EventCached {
                service_uuid: service_uuid.to_string(),
                event_id,
            });
        }
    }

    /// Sends one event and waits for its acknowledgement.
    async fn send_event(&self, service_uuid: &str, data: &EventData) -> bool {
        let event_id = data.event.id.clone();
        let message = match encode_event(service_uuid, data) {
            Ok(message) => message,
            Err(e) => {
                error!(service = %service_uuid, event_id = %event_id, error = %e, "cannot encode event");
                return false;
            }
        };

        let ticket = self
            .inner
            .publishes
            .push(format!("{service_uuid}/{event_id}"))
            .await;
        let outcome = if self.send_message(&message).await {
            self.inner
                .publishes
                .wait(ticket, self.inner.settings.publish_timeout())
                .await
        } else {
            self.inner.publishes.cancel(&ticket).await;
            AckOutcome::Dropped
        };

        if outcome.is_accepted() {
            debug!(service = %service_uuid, event_id = %event_id, "event published");
            self.notify(Notification::EventPublished {
                service_uuid: service_uuid.to_string(),
                event_id,
            });
            true
        } else {
            warn!(service = %service_uuid, event_id = %event_id, ?outcome, "event not published");
            self.notify(Notification::EventPublishingFailed {
                service_uuid: service_uuid.to_string(),
                event_id,
            });
            false
        }
    }

    // ---- resume after connect -----------------------------------------------

    async fn resume(&self) {
        let services: Vec<Arc<Service>> =
            self.inner.registry.read().await.values().cloned().collect();
        for service in services {
            if !self.is_connected() {
                return;
            }
            self.send_registration(&service).await;
        }
        self.replay().await;
    }

    /// Publishes cached events again, oldest first per service.
    ///
    /// Entries are removed only once the hub acknowledged them.
    async fn replay(&self) {
        let Ok(_running) = self.inner.replaying.try_lock() else {
            debug!("replay already running");
            return;
        };

        for uuid in self.inner.cache.services().await {
            let entries = self.inner.cache.snapshot(&uuid).await;
            info!(service = %uuid, count = entries.len(), "replaying cached events");
            for entry in entries {
                if !self.is_connected() {
                    debug!("connection lost, replay stopped");
                    return;
                }
                if self.send_event(&uuid, &entry.data).await {
                    self.inner.cache.remove(&uuid, entry.seq).await;
                }
            }
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("url", &self.inner.settings.url)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
