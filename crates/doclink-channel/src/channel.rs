//! The event channel: one physical connection, many subscribers.
//!
//! [`EventChannel`] is a cheap `Clone` handle. All clones share one
//! connection, one subscriber registry, and one report stream. Dropping the
//! last handle aborts the background reader and any pending reconnect timer.
//!
//! Failures never propagate to subscribers. Except for [`EventChannel::connect`]
//! returning [`ChannelError::ConnectFailure`], every failure is logged through
//! `tracing` and published on [`EventChannel::reports`].

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use doclink_core::{ChannelError, ReconnectConfig, Result, decode_event};
use doclink_settings::ChannelSettings;
use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::registry::{self, Scope, Subscriber, SubscriberRegistry, Subscription};
use crate::state::{AfterLoss, ConnectOrigin, ConnectionMachine, ConnectionState};
use crate::transport::{Outbound, Transport, TransportEvent, WebSocketTransport};

/// Buffered reports per receiver before the slowest one starts lagging.
pub const REPORT_CAPACITY: usize = 64;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Channel configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Endpoint to connect to.
    pub url: String,
    /// Reconnect backoff policy.
    pub reconnect: ReconnectConfig,
    /// Connect on the first subscription without an explicit `connect()`.
    pub auto_connect: bool,
}

impl ChannelConfig {
    /// Config for `url` with default backoff and lazy connect enabled.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect: ReconnectConfig::default(),
            auto_connect: true,
        }
    }

    /// Override the backoff policy.
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Enable or disable connect-on-subscribe.
    #[must_use]
    pub fn with_auto_connect(mut self, auto_connect: bool) -> Self {
        self.auto_connect = auto_connect;
        self
    }
}

impl From<&ChannelSettings> for ChannelConfig {
    fn from(settings: &ChannelSettings) -> Self {
        Self::new(settings.endpoint()).with_reconnect(settings.reconnect)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// EventChannel
// ─────────────────────────────────────────────────────────────────────────────

/// Resilient, reconnecting, multiplexing subscription channel.
#[derive(Clone)]
pub struct EventChannel {
    inner: Arc<Inner>,
}

struct Inner {
    config: ChannelConfig,
    transport: Arc<dyn Transport>,
    core: Mutex<Core>,
    registry: Arc<Mutex<SubscriberRegistry>>,
    reports: broadcast::Sender<ChannelError>,
}

/// Connection handle and lifecycle bookkeeping, guarded together.
struct Core {
    machine: ConnectionMachine,
    outbound: Option<mpsc::Sender<Outbound>>,
    reader: Option<JoinHandle<()>>,
    reconnect_timer: Option<JoinHandle<()>>,
    /// Bumped by every teardown; work started under an older value is stale.
    generation: u64,
}

impl EventChannel {
    /// Build a channel over `transport`. Nothing is opened yet.
    pub fn new(config: ChannelConfig, transport: Arc<dyn Transport>) -> Self {
        let (reports, _) = broadcast::channel(REPORT_CAPACITY);
        let machine = ConnectionMachine::new(config.reconnect);
        Self {
            inner: Arc::new(Inner {
                config,
                transport,
                core: Mutex::new(Core {
                    machine,
                    outbound: None,
                    reader: None,
                    reconnect_timer: None,
                    generation: 0,
                }),
                registry: Arc::new(Mutex::new(SubscriberRegistry::new())),
                reports,
            }),
        }
    }

    /// WebSocket channel configured from settings.
    pub fn from_settings(settings: &ChannelSettings) -> Self {
        Self::new(
            ChannelConfig::from(settings),
            Arc::new(WebSocketTransport::from_settings(settings)),
        )
    }

    /// The configuration this channel was built with.
    pub fn config(&self) -> &ChannelConfig {
        &self.inner.config
    }

    // ── Subscriptions ───────────────────────────────────────────────

    /// Receive events for one document.
    pub fn subscribe_to_document<S: Subscriber>(
        &self,
        document_id: impl Into<String>,
        subscriber: S,
    ) -> Subscription {
        self.subscribe(Scope::Document(document_id.into()), Box::new(subscriber))
    }

    /// Receive every event.
    pub fn subscribe_to_all<S: Subscriber>(&self, subscriber: S) -> Subscription {
        self.subscribe(Scope::Global, Box::new(subscriber))
    }

    fn subscribe(&self, scope: Scope, subscriber: Box<dyn Subscriber>) -> Subscription {
        let id = self.inner.registry.lock().insert(scope.clone(), subscriber);
        debug!(subscription = %id, scope = %scope, "subscribed");
        if self.inner.config.auto_connect {
            self.wake();
        }
        Subscription::new(id, scope, Arc::downgrade(&self.inner.registry))
    }

    /// Start connecting in the background if nothing is open or scheduled.
    fn wake(&self) {
        if self.state() != ConnectionState::Disconnected {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let inner = Arc::clone(&self.inner);
                drop(handle.spawn(async move {
                    let _ = inner.connect(ConnectOrigin::Lazy).await;
                }));
            }
            Err(_) => warn!("no tokio runtime, subscription registered without connecting"),
        }
    }

    /// Live registrations across all scopes.
    pub fn subscriber_count(&self) -> usize {
        self.inner.registry.lock().len()
    }

    // ── Outbound ────────────────────────────────────────────────────

    /// Best-effort send of a JSON payload.
    ///
    /// Returns `true` if the frame was handed to an open connection. When the
    /// channel is not connected the payload is dropped, logged at `warn`, and
    /// reported as [`ChannelError::SendDropped`]. Nothing is queued.
    pub fn send<T: Serialize + ?Sized>(&self, payload: &T) -> bool {
        let text = match serde_json::to_string(payload) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "failed to encode outbound payload");
                self.inner.report(ChannelError::Encode(e.to_string()));
                return false;
            }
        };

        let state = {
            let core = self.inner.core.lock();
            if core.machine.state() == ConnectionState::Connected {
                if let Some(outbound) = core.outbound.as_ref() {
                    let bytes = text.len();
                    if outbound.try_send(Outbound::Text(text)).is_ok() {
                        debug!(bytes, "sent outbound frame");
                        return true;
                    }
                }
            }
            core.machine.state()
        };

        warn!(state = %state, "send dropped, channel not connected");
        self.inner.report(ChannelError::SendDropped {
            state: state.to_string(),
        });
        false
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Whether the transport is currently open.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.inner.core.lock().machine.state()
    }

    /// Reconnect attempts since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.core.lock().machine.attempts()
    }

    /// Open the connection.
    ///
    /// Resolves immediately if already connected or connecting. A pending
    /// reconnect is pre-empted and the backoff counter reset. On failure the
    /// reconnect policy still takes over in the background.
    pub async fn connect(&self) -> Result<()> {
        self.inner.connect(ConnectOrigin::Explicit).await
    }

    /// Tear down: cancel any pending reconnect, close the connection, and
    /// drop every subscription.
    ///
    /// The channel stays usable; a later `connect()` opens a fresh link.
    pub fn disconnect(&self) {
        let previous = {
            let mut core = self.inner.core.lock();
            core.generation += 1;
            if let Some(timer) = core.reconnect_timer.take() {
                timer.abort();
            }
            if let Some(outbound) = core.outbound.take() {
                let _ = outbound.try_send(Outbound::Close);
            }
            if let Some(reader) = core.reader.take() {
                reader.abort();
            }
            let previous = core.machine.state();
            core.machine.teardown();
            previous
        };
        let removed = self.inner.registry.lock().clear();
        info!(previous = %previous, removed, "channel torn down");
    }

    /// Stream of everything the channel reports besides `connect()` errors.
    ///
    /// Each receiver sees reports published after it subscribed.
    pub fn reports(&self) -> broadcast::Receiver<ChannelError> {
        self.inner.reports.subscribe()
    }
}

impl fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventChannel")
            .field("url", &self.inner.config.url)
            .field("state", &self.state())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection lifecycle
// ─────────────────────────────────────────────────────────────────────────────

impl Inner {
    async fn connect(self: &Arc<Self>, origin: ConnectOrigin) -> Result<()> {
        let generation = {
            let mut core = self.core.lock();
            if !core.machine.begin_connect(origin) {
                return Ok(());
            }
            if let Some(timer) = core.reconnect_timer.take() {
                // A firing timer is the caller here; detach instead of aborting it.
                if origin != ConnectOrigin::Timer {
                    timer.abort();
                }
            }
            core.generation
        };

        info!(url = %self.config.url, ?origin, "connecting");
        let opened = self.transport.open(&self.config.url).await;

        let mut core = self.core.lock();
        if core.generation != generation {
            drop(core);
            if let Ok(link) = opened {
                let _ = link.outbound.try_send(Outbound::Close);
            }
            debug!(url = %self.config.url, "connect superseded by teardown");
            return Err(ChannelError::Aborted);
        }

        match opened {
            Ok(link) => {
                core.machine.on_open();
                core.outbound = Some(link.outbound);
                core.reader = Some(tokio::spawn(read_loop(
                    Arc::downgrade(self),
                    link.inbound,
                    generation,
                )));
                drop(core);
                info!(url = %self.config.url, "connected");
                Ok(())
            }
            Err(e) => {
                let exhausted = self.on_lost(&mut core);
                drop(core);
                let failure = ChannelError::ConnectFailure {
                    url: self.config.url.clone(),
                    reason: e.to_string(),
                };
                match origin {
                    ConnectOrigin::Timer => warn!(error = %e, "reconnect attempt failed"),
                    ConnectOrigin::Explicit => error!(url = %self.config.url, error = %e, "connect failed"),
                    ConnectOrigin::Lazy => {
                        error!(url = %self.config.url, error = %e, "connect failed");
                        self.report(failure.clone());
                    }
                }
                if let Some(report) = exhausted {
                    self.report(report);
                }
                Err(failure)
            }
        }
    }

    /// The current link ended while connected.
    fn link_lost(self: &Arc<Self>, generation: u64) {
        let mut core = self.core.lock();
        if core.generation != generation || core.machine.state() != ConnectionState::Connected {
            return;
        }
        warn!(url = %self.config.url, "connection lost");
        let exhausted = self.on_lost(&mut core);
        drop(core);
        if let Some(report) = exhausted {
            self.report(report);
        }
    }

    /// Drop the link and arm the next reconnect, or give up.
    fn on_lost(self: &Arc<Self>, core: &mut Core) -> Option<ChannelError> {
        core.outbound = None;
        core.reader = None;
        match core.machine.on_lost() {
            AfterLoss::Retry { attempt, delay } => {
                let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                info!(attempt, delay_ms, "scheduling reconnect");
                core.reconnect_timer = Some(tokio::spawn(reconnect_after(Arc::downgrade(self), delay)));
                None
            }
            AfterLoss::GiveUp { attempts } => {
                error!(attempts, url = %self.config.url, "reconnect abandoned");
                Some(ChannelError::ReconnectExhausted { attempts })
            }
        }
    }

    /// Decode one inbound frame and dispatch it.
    fn handle_frame(&self, text: &str) {
        match decode_event(text) {
            Ok(event) => {
                for fault in registry::dispatch(&self.registry, &event) {
                    self.report(fault);
                }
            }
            Err(e) => {
                warn!(error = %e, frame_len = text.len(), "discarding malformed event");
                self.report(ChannelError::Decode(e));
            }
        }
    }

    fn report(&self, report: ChannelError) {
        // No receivers is fine; tracing already has it.
        let _ = self.reports.send(report);
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let core = self.core.get_mut();
        if let Some(timer) = core.reconnect_timer.take() {
            timer.abort();
        }
        if let Some(reader) = core.reader.take() {
            reader.abort();
        }
        if let Some(outbound) = core.outbound.take() {
            let _ = outbound.try_send(Outbound::Close);
        }
    }
}

/// Pump one link's inbound queue until it ends.
///
/// Holds the channel weakly between frames so an abandoned channel can drop.
async fn read_loop(
    inner: Weak<Inner>,
    mut inbound: mpsc::Receiver<TransportEvent>,
    generation: u64,
) {
    while let Some(event) = inbound.recv().await {
        let Some(channel) = inner.upgrade() else {
            return;
        };
        match event {
            TransportEvent::Message(text) => channel.handle_frame(&text),
            TransportEvent::Error(reason) => warn!(error = %reason, "transport error"),
            TransportEvent::Closed => break,
        }
    }
    if let Some(channel) = inner.upgrade() {
        channel.link_lost(generation);
    }
}

/// Sleep out the backoff delay, then try again.
///
/// Boxed because it re-enters `connect`, which spawns it.
fn reconnect_after(inner: Weak<Inner>, delay: Duration) -> BoxFuture<'static, ()> {
    async move {
        tokio::time::sleep(delay).await;
        let Some(inner) = inner.upgrade() else {
            return;
        };
        let _ = inner.connect(ConnectOrigin::Timer).await;
    }
    .boxed()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
