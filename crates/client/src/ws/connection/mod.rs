//! A single household channel: one logical socket with state tracking,
//! bounded auto-reconnect and an embedded [`EventBus`].
//!
//! The socket itself sits behind the [`Transport`] trait so the state machine
//! can be driven by a fake in tests and by tokio-tungstenite at runtime.
//!
//! ```text
//! Disconnected --open()--> Connecting --opened--> Connected
//!      ^                       |                      |
//!      |                 failure/close             close()
//!      |                       |                      v
//!      +--- (backoff timer) ---+             Closing --closed--> Disconnected
//! ```

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use familyplanner_shared::{ClientAction, HouseholdId, MessageKind, ServerMessage};
use tokio::sync::watch;
use url::Url;

use super::bus::{self, ChannelEvent, EventBus, EventKind, SubscriberId};
use super::reconnect::{ReconnectPolicy, ReconnectState};
use super::scheduler::{Scheduler, TimerId};

mod connection_native;
pub use connection_native::{WsTransport, WsTransportFactory};

/// Connection state of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

/// The three real-time feeds a household dashboard subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChannelKind {
    Dashboard,
    Weather,
    Calendar,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 3] = [
        ChannelKind::Dashboard,
        ChannelKind::Weather,
        ChannelKind::Calendar,
    ];

    /// Path segment of the channel's endpoint.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Dashboard => "dashboard",
            ChannelKind::Weather => "weather",
            ChannelKind::Calendar => "calendar",
        }
    }

    /// Server messages this channel is expected to carry.
    pub fn message_kinds(&self) -> &'static [MessageKind] {
        match self {
            ChannelKind::Dashboard => &[
                MessageKind::DashboardData,
                MessageKind::DashboardUpdate,
                MessageKind::WidgetUpdate,
                MessageKind::Error,
            ],
            ChannelKind::Weather => &[
                MessageKind::WeatherData,
                MessageKind::WeatherUpdate,
                MessageKind::Error,
            ],
            ChannelKind::Calendar => &[
                MessageKind::CalendarEvents,
                MessageKind::CalendarUpdate,
                MessageKind::Error,
            ],
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which feed, for which household.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId {
    pub kind: ChannelKind,
    pub household: HouseholdId,
}

impl ChannelId {
    pub fn new(kind: ChannelKind, household: HouseholdId) -> Self {
        Self { kind, household }
    }

    /// `<ws-base>/ws/<channel>/<household>/`
    pub fn endpoint(&self, ws_base: &Url) -> String {
        format!(
            "{}/ws/{}/{}/",
            ws_base.as_str().trim_end_matches('/'),
            self.kind,
            self.household
        )
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.household)
    }
}

/// What a transport reports back about its socket.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Opened,
    Frame(String),
    Closed { reason: Option<String> },
    Error(String),
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("socket is not open")]
    NotOpen,
    #[error("{0}")]
    Io(String),
}

/// A socket that can be opened, written and closed.
///
/// Implementations report progress through the [`TransportSink`] given to
/// `open`, and must never call it from inside `open`, `send` or `close`.
pub trait Transport {
    /// Start connecting, tearing down any socket this transport still holds.
    fn open(&mut self, url: &str, sink: TransportSink);
    fn send(&mut self, frame: String) -> Result<(), TransportError>;
    /// Begin a graceful close; the sink later receives `Closed`.
    fn close(&mut self);
}

pub trait TransportFactory {
    fn create(&self, id: &ChannelId) -> Box<dyn Transport>;
}

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("channel {channel} is not connected, `{action}` was dropped")]
    NotConnected {
        channel: ChannelId,
        action: &'static str,
    },
    #[error("no {kind} channel is active")]
    NoChannel { kind: ChannelKind },
    #[error("dashboard not loaded yet")]
    DashboardNotLoaded,
    #[error("failed to encode `{action}`")]
    Encode {
        action: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("transport rejected `{action}`")]
    Transport {
        action: &'static str,
        #[source]
        source: TransportError,
    },
}

/// Callback handle given to a transport for one connection attempt.
///
/// Events delivered through a sink from an earlier attempt are ignored.
#[derive(Clone)]
pub struct TransportSink {
    channel: Weak<RefCell<ChannelInner>>,
    generation: u64,
}

impl TransportSink {
    pub fn deliver(&self, event: TransportEvent) {
        if let Some(inner) = self.channel.upgrade() {
            Channel { inner }.handle_transport_event(self.generation, event);
        }
    }
}

impl fmt::Debug for TransportSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportSink")
            .field("generation", &self.generation)
            .field("live", &(self.channel.strong_count() > 0))
            .finish()
    }
}

struct ChannelInner {
    id: ChannelId,
    url: String,
    state: ConnectionState,
    attempts: u32,
    exhausted: bool,
    intentionally_closed: bool,
    reconnect_timer: Option<TimerId>,
    /// Bumped on every connect so late events from an old socket can be told apart.
    generation: u64,
    transport: Box<dyn Transport>,
    bus: EventBus,
    policy: ReconnectPolicy,
    scheduler: Rc<dyn Scheduler>,
    status: watch::Sender<ConnectionState>,
}

impl ChannelInner {
    fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
        self.status.send_replace(state);
    }

    fn cancel_reconnect(&mut self) {
        if let Some(timer) = self.reconnect_timer.take() {
            self.scheduler.cancel(timer);
        }
    }
}

/// Cheap-to-clone handle to one channel.
#[derive(Clone)]
pub struct Channel {
    inner: Rc<RefCell<ChannelInner>>,
}

/// Non-owning [`Channel`] handle for use inside the channel's own subscribers.
#[derive(Clone)]
pub struct WeakChannel {
    inner: Weak<RefCell<ChannelInner>>,
}

impl WeakChannel {
    pub fn upgrade(&self) -> Option<Channel> {
        self.inner.upgrade().map(|inner| Channel { inner })
    }
}

impl Channel {
    pub fn new(
        id: ChannelId,
        url: String,
        transport: Box<dyn Transport>,
        policy: ReconnectPolicy,
        scheduler: Rc<dyn Scheduler>,
    ) -> Self {
        let (status, _) = watch::channel(ConnectionState::Disconnected);
        let inner = ChannelInner {
            id,
            url,
            state: ConnectionState::Disconnected,
            attempts: 0,
            exhausted: false,
            intentionally_closed: false,
            reconnect_timer: None,
            generation: 0,
            transport,
            bus: EventBus::new(),
            policy,
            scheduler,
            status,
        };
        Self {
            inner: Rc::new(RefCell::new(inner)),
        }
    }

    pub fn id(&self) -> ChannelId {
        self.inner.borrow().id
    }

    pub fn url(&self) -> String {
        self.inner.borrow().url.clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.borrow().state
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Receiver that observes every state transition.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.borrow().status.subscribe()
    }

    pub fn reconnect_state(&self) -> ReconnectState {
        let inner = self.inner.borrow();
        ReconnectState::new(&inner.policy, inner.attempts)
    }

    /// True once automatic reconnects have given up; `open()` starts over.
    pub fn is_exhausted(&self) -> bool {
        self.inner.borrow().exhausted
    }

    pub fn downgrade(&self) -> WeakChannel {
        WeakChannel {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn on<F>(&self, kind: impl Into<EventKind>, callback: F) -> SubscriberId
    where
        F: Fn(&ChannelEvent) -> anyhow::Result<()> + 'static,
    {
        self.inner.borrow_mut().bus.on(kind, callback)
    }

    pub fn off(&self, kind: impl Into<EventKind>, id: Option<SubscriberId>) -> usize {
        self.inner.borrow_mut().bus.off(kind, id)
    }

    pub fn subscriber_count(&self, kind: impl Into<EventKind>) -> usize {
        self.inner.borrow().bus.subscriber_count(kind)
    }

    /// Connect with a fresh retry budget. No-op while connecting or connected.
    pub fn open(&self) {
        let was_closing;
        {
            let mut inner = self.inner.borrow_mut();
            if matches!(
                inner.state,
                ConnectionState::Connecting | ConnectionState::Connected
            ) {
                tracing::debug!(channel = %inner.id, state = ?inner.state, "open ignored");
                return;
            }
            inner.intentionally_closed = false;
            inner.attempts = 0;
            inner.exhausted = false;
            inner.cancel_reconnect();
            was_closing = inner.state == ConnectionState::Closing;
            if was_closing {
                // The closing socket is replaced below; its own `Closed` will be stale.
                inner.set_state(ConnectionState::Disconnected);
            }
        }
        if was_closing {
            self.emit(ChannelEvent::Disconnected);
        }
        self.connect();
    }

    /// Close on purpose: cancels any pending reconnect and suppresses new ones.
    pub fn close(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.intentionally_closed = true;
        inner.cancel_reconnect();
        match inner.state {
            ConnectionState::Connected => {
                tracing::info!(channel = %inner.id, "closing");
                inner.set_state(ConnectionState::Closing);
                inner.transport.close();
            }
            ConnectionState::Connecting => {
                // The pending handshake becomes stale; its events are dropped.
                tracing::info!(channel = %inner.id, "abandoning connection attempt");
                inner.generation += 1;
                inner.set_state(ConnectionState::Disconnected);
                inner.transport.close();
            }
            ConnectionState::Closing | ConnectionState::Disconnected => {}
        }
    }

    pub fn reconnect(&self) {
        self.close();
        self.open();
    }

    /// Close and detach every subscriber.
    pub fn dispose(&self) {
        self.close();
        self.inner.borrow_mut().bus.clear();
    }

    /// Encode and write `action`.
    ///
    /// When the channel is down the action is dropped, and unless it was
    /// closed on purpose a reconnect is started right away.
    pub fn send(&self, action: &ClientAction) -> Result<(), SendError> {
        let name = action.name();
        let mut inner = self.inner.borrow_mut();
        if inner.state.is_connected() {
            let frame = action.encode().map_err(|source| SendError::Encode {
                action: name,
                source,
            })?;
            tracing::debug!(channel = %inner.id, action = name, "sending");
            return inner
                .transport
                .send(frame)
                .map_err(|source| SendError::Transport {
                    action: name,
                    source,
                });
        }

        let channel = inner.id;
        let retry = inner.state == ConnectionState::Disconnected && !inner.intentionally_closed;
        tracing::warn!(%channel, action = name, state = ?inner.state, "channel not connected, dropping message");
        if retry {
            inner.cancel_reconnect();
            inner.exhausted = false;
        }
        drop(inner);
        if retry {
            self.connect();
        }
        Err(SendError::NotConnected {
            channel,
            action: name,
        })
    }

    fn connect(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.generation += 1;
        let sink = TransportSink {
            channel: Rc::downgrade(&self.inner),
            generation: inner.generation,
        };
        inner.set_state(ConnectionState::Connecting);
        tracing::info!(channel = %inner.id, url = %inner.url, attempt = inner.attempts, "connecting");
        let url = inner.url.clone();
        inner.transport.open(&url, sink);
    }

    fn handle_transport_event(&self, generation: u64, event: TransportEvent) {
        let mut inner = self.inner.borrow_mut();
        if generation != inner.generation {
            tracing::debug!(channel = %inner.id, ?event, "ignoring event from stale socket");
            return;
        }

        match event {
            TransportEvent::Opened => {
                if inner.state != ConnectionState::Connecting {
                    return;
                }
                inner.attempts = 0;
                inner.exhausted = false;
                inner.set_state(ConnectionState::Connected);
                tracing::info!(channel = %inner.id, "connected");
                drop(inner);
                self.emit(ChannelEvent::Connected);
            }
            TransportEvent::Frame(text) => {
                if inner.state != ConnectionState::Connected {
                    return;
                }
                let channel = inner.id;
                drop(inner);
                match ServerMessage::decode(&text) {
                    Ok(message) => self.emit(ChannelEvent::Message(message)),
                    Err(err) => tracing::warn!(%channel, "dropping frame: {err}"),
                }
            }
            TransportEvent::Closed { .. } | TransportEvent::Error(_) => {
                let previous = inner.state;
                if previous == ConnectionState::Disconnected {
                    return;
                }
                inner.set_state(ConnectionState::Disconnected);
                if previous == ConnectionState::Closing || inner.intentionally_closed {
                    tracing::info!(channel = %inner.id, "closed");
                } else {
                    match &event {
                        TransportEvent::Error(err) => {
                            tracing::warn!(channel = %inner.id, "connection failed: {err}")
                        }
                        _ => tracing::warn!(channel = %inner.id, ?event, "connection lost"),
                    }
                    self.schedule_reconnect(&mut inner);
                }
                drop(inner);
                if matches!(
                    previous,
                    ConnectionState::Connected | ConnectionState::Closing
                ) {
                    self.emit(ChannelEvent::Disconnected);
                }
            }
        }
    }

    fn schedule_reconnect(&self, inner: &mut ChannelInner) {
        if !inner.policy.should_retry(inner.attempts) {
            inner.exhausted = true;
            tracing::error!(
                channel = %inner.id,
                "giving up after {} reconnect attempts",
                inner.attempts
            );
            return;
        }

        let delay = inner.policy.next_delay(inner.attempts);
        tracing::info!(
            channel = %inner.id,
            "Reconnecting in {}ms (attempt {}/{})",
            delay.as_millis(),
            inner.attempts + 1,
            inner.policy.max_attempts
        );
        let weak = self.downgrade();
        let timer = inner.scheduler.schedule(
            delay,
            Box::new(move || {
                if let Some(channel) = weak.upgrade() {
                    channel.fire_reconnect();
                }
            }),
        );
        inner.reconnect_timer = Some(timer);
    }

    fn fire_reconnect(&self) {
        {
            let mut inner = self.inner.borrow_mut();
            inner.reconnect_timer = None;
            if inner.intentionally_closed || inner.state != ConnectionState::Disconnected {
                return;
            }
            inner.attempts += 1;
        }
        self.connect();
    }

    fn emit(&self, event: ChannelEvent) {
        let (channel, callbacks) = {
            let inner = self.inner.borrow();
            (inner.id, inner.bus.snapshot(event.kind()))
        };
        let _span = tracing::debug_span!("dispatch", %channel).entered();
        bus::dispatch(&callbacks, &event);
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Channel")
            .field("id", &inner.id)
            .field("state", &inner.state)
            .field("attempts", &inner.attempts)
            .finish()
    }
}
