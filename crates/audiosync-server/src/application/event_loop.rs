//! The broadcast event loop: single serialization point for all server state.
//!
//! Every asynchronous callback in the server is turned into a [`ServerEvent`]
//! and queued on one unbounded channel.  A single task, running
//! [`BroadcastCore::run`], pops events one at a time and applies them:
//!
//! ```text
//!  acceptor ──► Accepted ─────────────┐
//!  monitors ──► ConnectionStateChanged┤
//!  sends ─────► SendCompleted ────────┼──► BroadcastCore ──► watch<ServerStatus>
//!  source ────► Frame ────────────────┤       (registry,        (observers)
//!  control ───► Capturing/TestMode/…──┘        engine)
//! ```
//!
//! Because the core is the only code that touches the registry, `register`,
//! `mark_disconnected`, `remove` and the snapshot taken for each frame can
//! never interleave, and no lock is needed.
//!
//! After every change that an observer can see, the core publishes a fresh
//! [`ServerStatus`] on a `watch` channel.

use std::net::SocketAddr;

use audiosync_core::{AudioFrame, ClientId, ClientInfo};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::application::broadcast::{BroadcastEngine, ChannelError};
use crate::application::manage_clients::{ClientRegistry, SharedChannel};

/// Sending half of the event queue.
pub type EventSender = mpsc::UnboundedSender<ServerEvent>;

/// Receiving half of the event queue, consumed by [`BroadcastCore::run`].
pub type EventReceiver = mpsc::UnboundedReceiver<ServerEvent>;

/// Lifecycle of the listening socket.
///
/// ```text
/// Idle ──► Starting ──► Ready ──► Failed
///                         └─────► Cancelled
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ListenerState {
    /// No listener exists.
    #[default]
    Idle,
    /// Bind in progress.
    Starting,
    /// Accepting connections.
    Ready,
    /// Bind or accept failed; the server stops itself.
    Failed(String),
    /// Cancelled by an explicit stop.
    Cancelled,
}

/// Lifecycle of one accepted connection.
///
/// ```text
/// Connecting ──► Ready ──► Failed
///                  └─────► Cancelled
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Accepted, not yet confirmed.
    Connecting,
    /// Connected; the entry is live.
    Ready,
    /// The transport failed or the peer closed the stream.
    Failed(String),
    /// Torn down locally.
    Cancelled,
}

impl ConnectionState {
    /// `true` for states after which the channel can carry no more data.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::Cancelled)
    }
}

/// Observable server state, published after every visible change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerStatus {
    /// Connected clients in connection order.
    pub clients: Vec<ClientInfo>,
    /// `true` between a successful source start and a stop.
    pub is_capturing: bool,
    /// `true` when the synthetic tone replaces live capture.
    pub is_test_mode: bool,
    /// Current listener lifecycle state.
    pub listener: ListenerState,
    /// Address the listener is bound to while it is ready.
    pub local_addr: Option<SocketAddr>,
}

/// Everything the event loop reacts to.
pub enum ServerEvent {
    /// The acceptor has a new connection; the core registers it and replies
    /// with the assigned id.
    Accepted {
        channel: SharedChannel,
        reply: oneshot::Sender<ClientId>,
    },
    /// A connection monitor observed a state transition.
    ConnectionStateChanged { id: ClientId, state: ConnectionState },
    /// One send started by the broadcast engine finished.
    SendCompleted {
        id: ClientId,
        result: Result<(), ChannelError>,
    },
    /// The audio source produced a frame.
    Frame(AudioFrame),
    /// The listener changed state.
    ListenerStateChanged {
        state: ListenerState,
        local_addr: Option<SocketAddr>,
    },
    /// An audio source started or stopped.
    CapturingChanged(bool),
    /// Test mode was toggled.
    TestModeChanged(bool),
    /// The UI selected or deselected a client.
    SelectionChanged { id: ClientId, selected: bool },
    /// Drop every client and stop capturing; `done` fires once applied.
    Reset { done: oneshot::Sender<()> },
}

/// Push handle through which an audio source delivers frames.
///
/// Cheap to clone and safe to call from a real-time audio thread: `push`
/// never blocks.
#[derive(Clone)]
pub struct FrameSink {
    events: EventSender,
}

impl FrameSink {
    pub fn new(events: EventSender) -> Self {
        Self { events }
    }

    /// Queues a frame for broadcast.  Returns `false` once the server is gone.
    pub fn push(&self, frame: AudioFrame) -> bool {
        self.events.send(ServerEvent::Frame(frame)).is_ok()
    }
}

/// State owned by the event loop.
pub struct BroadcastCore {
    registry: ClientRegistry,
    engine: BroadcastEngine,
    is_capturing: bool,
    is_test_mode: bool,
    listener: ListenerState,
    local_addr: Option<SocketAddr>,
    frames_broadcast: u64,
    status_tx: watch::Sender<ServerStatus>,
}

impl BroadcastCore {
    /// Creates the core and returns it with a receiver for published status.
    pub fn new(events: &EventSender, is_test_mode: bool) -> (Self, watch::Receiver<ServerStatus>) {
        let initial = ServerStatus {
            is_test_mode,
            ..ServerStatus::default()
        };
        let (status_tx, status_rx) = watch::channel(initial);
        let core = Self {
            registry: ClientRegistry::new(),
            engine: BroadcastEngine::new(events),
            is_capturing: false,
            is_test_mode,
            listener: ListenerState::Idle,
            local_addr: None,
            frames_broadcast: 0,
            status_tx,
        };
        (core, status_rx)
    }

    /// Processes events until every sender has been dropped.
    pub async fn run(mut self, mut events: EventReceiver) {
        while let Some(event) = events.recv().await {
            self.handle_event(event);
        }
        self.engine.clear();
        let dropped = self.registry.clear();
        debug!("event loop finished; released {dropped} client(s)");
    }

    /// Applies a single event.
    pub fn handle_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Accepted { channel, reply } => self.on_accepted(channel, reply),
            ServerEvent::ConnectionStateChanged { id, state } => {
                self.on_connection_state(id, state)
            }
            ServerEvent::SendCompleted { id, result } => self.on_send_completed(id, result),
            ServerEvent::Frame(frame) => self.on_frame(frame),
            ServerEvent::ListenerStateChanged { state, local_addr } => {
                debug!("listener state: {state:?}");
                self.listener = state;
                self.local_addr = local_addr;
                self.publish();
            }
            ServerEvent::CapturingChanged(capturing) => {
                self.is_capturing = capturing;
                self.publish();
            }
            ServerEvent::TestModeChanged(enabled) => {
                self.is_test_mode = enabled;
                self.publish();
            }
            ServerEvent::SelectionChanged { id, selected } => {
                if self.registry.set_selected(id, selected) {
                    self.publish();
                }
            }
            ServerEvent::Reset { done } => {
                self.engine.clear();
                let removed = self.registry.clear();
                self.is_capturing = false;
                info!("roster cleared ({removed} client(s) released)");
                self.publish();
                let _ = done.send(());
            }
        }
    }

    /// Read access to the roster, for tests and diagnostics.
    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    /// Number of frames handed to the broadcast engine so far.
    pub fn frames_broadcast(&self) -> u64 {
        self.frames_broadcast
    }

    fn on_accepted(&mut self, channel: SharedChannel, reply: oneshot::Sender<ClientId>) {
        let peer = channel.describe();
        let id = self.registry.register(channel);
        let name = self
            .registry
            .get(id)
            .map(|c| c.name)
            .unwrap_or_default();
        info!("{name} connected from {peer} ({id})");

        if reply.send(id).is_err() {
            // Nobody will monitor this connection, so nobody would ever remove it.
            warn!("acceptor went away before {id} was confirmed; dropping it");
            self.remove_client(id);
        }
        self.publish();
    }

    fn on_connection_state(&mut self, id: ClientId, state: ConnectionState) {
        match state {
            ConnectionState::Connecting => debug!("client {id} connecting"),
            ConnectionState::Ready => debug!("client {id} ready"),
            ConnectionState::Failed(reason) => {
                if self.remove_client(id) {
                    info!("client {id} removed: {reason}");
                    self.publish();
                }
            }
            ConnectionState::Cancelled => {
                if self.remove_client(id) {
                    info!("client {id} removed: cancelled");
                    self.publish();
                }
            }
        }
    }

    fn remove_client(&mut self, id: ClientId) -> bool {
        self.engine.forget(id);
        self.registry.remove(id)
    }

    fn on_send_completed(&mut self, id: ClientId, result: Result<(), ChannelError>) {
        let Err(e) = result else {
            return;
        };
        if self.registry.mark_disconnected(id) {
            warn!("send to client {id} failed: {e}; excluding it from further frames");
            self.publish();
        }
    }

    fn on_frame(&mut self, frame: AudioFrame) {
        if !self.is_capturing {
            debug!("dropping frame ts={} (not capturing)", frame.timestamp());
            return;
        }
        let snapshot = self.registry.snapshot();
        self.engine.broadcast(&snapshot, &frame);
        self.frames_broadcast += 1;
    }

    fn publish(&self) {
        self.status_tx.send_replace(ServerStatus {
            clients: self.registry.infos(),
            is_capturing: self.is_capturing,
            is_test_mode: self.is_test_mode,
            listener: self.listener.clone(),
            local_addr: self.local_addr,
        });
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
