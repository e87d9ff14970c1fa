//! The broadcast server: control surface over the event loop.
//!
//! [`AudioSyncServer`] composes the pieces into the object the UI and the
//! binary talk to:
//!
//! ```text
//!  start() ──► bind listener ──► spawn acceptor ──► announce service
//!          └─► start audio source (live or synthetic, by test mode)
//!
//!  stop()  ──► stop source ──► cancel listener ──► Reset (clear roster)
//! ```
//!
//! Control calls are serialized by an async mutex around the lifecycle
//! (listener, sources, advertisement).  Everything the UI can observe lives in
//! the event loop and is read back through [`AudioSyncServer::status`] or
//! [`AudioSyncServer::subscribe`].
//!
//! # Failure policy
//!
//! - Bind failure: `start` returns [`ServerError::Listener`]; nothing runs.
//! - Accept failure after start: the server stops itself.
//! - Audio source failure: `start` returns [`ServerError::AudioSource`];
//!   capturing stays off but the listener keeps accepting clients.  A later
//!   `start` retries only the source.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Weak,
};

use audiosync_core::{ClientId, ToneSpec};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tracing::{error, info, warn};

use crate::application::event_loop::{
    BroadcastCore, EventSender, FrameSink, ListenerState, ServerEvent, ServerStatus,
};
use crate::infrastructure::audio_source::{
    live::{LiveCapture, DEFAULT_BUFFER_FRAMES},
    synthetic::SyntheticGenerator,
    AudioSource, SourceError, SourceKind,
};
use crate::infrastructure::network::{
    advertisement::{ServiceAdvertisement, SERVICE_NAME, SERVICE_TYPE},
    listener::{bind_listener, spawn_acceptor, ListenerError, ListenerHandle},
};

/// Default TCP service port.
pub const DEFAULT_PORT: u16 = 12345;

/// Error type for server control operations.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("server is already running")]
    AlreadyRunning,
    #[error(transparent)]
    Listener(#[from] ListenerError),
    #[error(transparent)]
    AudioSource(#[from] SourceError),
    #[error("event loop has shut down")]
    EventLoopClosed,
}

/// Runtime settings for one server instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub bind_address: IpAddr,
    pub port: u16,
    pub reuse_address: bool,
    /// Live capture buffer size in frames.
    pub buffer_frames: u32,
    /// Test-mode tone.
    pub tone: ToneSpec,
    pub start_in_test_mode: bool,
    pub service_name: String,
    pub service_type: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            reuse_address: true,
            buffer_frames: DEFAULT_BUFFER_FRAMES,
            tone: ToneSpec::default(),
            start_in_test_mode: false,
            service_name: SERVICE_NAME.to_string(),
            service_type: SERVICE_TYPE.to_string(),
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}

struct Lifecycle {
    listener: Option<ListenerHandle>,
    advertisement: Option<ServiceAdvertisement>,
    live: Box<dyn AudioSource>,
    synthetic: SyntheticGenerator,
    active: Option<SourceKind>,
}

impl Lifecycle {
    fn source(&mut self, kind: SourceKind) -> &mut dyn AudioSource {
        match kind {
            SourceKind::Live => self.live.as_mut(),
            SourceKind::Synthetic => &mut self.synthetic,
        }
    }
}

struct Inner {
    config: ServerConfig,
    events: EventSender,
    status_rx: watch::Receiver<ServerStatus>,
    test_mode: Arc<AtomicBool>,
    lifecycle: Mutex<Lifecycle>,
}

/// Handle to a running broadcast server.  Cheap to clone.
#[derive(Clone)]
pub struct AudioSyncServer {
    inner: Arc<Inner>,
}

impl AudioSyncServer {
    /// Creates a server that captures from the default input device.
    ///
    /// Must be called from within a Tokio runtime: the event loop is spawned
    /// immediately.  Nothing is bound until [`start`](Self::start).
    pub fn new(config: ServerConfig) -> Self {
        let live = Box::new(LiveCapture::new(config.buffer_frames));
        Self::with_live_source(config, live)
    }

    /// Creates a server with a custom live source (e.g. a mock in tests).
    pub fn with_live_source(config: ServerConfig, live: Box<dyn AudioSource>) -> Self {
        let (events, events_rx) = mpsc::unbounded_channel();
        let test_mode = Arc::new(AtomicBool::new(config.start_in_test_mode));
        let (core, status_rx) = BroadcastCore::new(&events, config.start_in_test_mode);
        tokio::spawn(core.run(events_rx));

        let lifecycle = Lifecycle {
            listener: None,
            advertisement: None,
            live,
            synthetic: SyntheticGenerator::new(config.tone, Arc::clone(&test_mode)),
            active: None,
        };
        Self {
            inner: Arc::new(Inner {
                config,
                events,
                status_rx,
                test_mode,
                lifecycle: Mutex::new(lifecycle),
            }),
        }
    }

    /// Binds the listener (if not already listening) and starts the audio
    /// source selected by the current test mode.
    ///
    /// # Errors
    ///
    /// - [`ServerError::AlreadyRunning`] if a source is already capturing.
    /// - [`ServerError::Listener`] if the port cannot be bound.
    /// - [`ServerError::AudioSource`] if the source fails to start; the
    ///   listener stays up in that case.
    pub async fn start(&self) -> Result<(), ServerError> {
        let mut life = self.inner.lifecycle.lock().await;
        if life.active.is_some() {
            return Err(ServerError::AlreadyRunning);
        }

        if life.listener.is_none() {
            let (handle, advertisement) = self.start_listener()?;
            life.listener = Some(handle);
            life.advertisement = Some(advertisement);
        }

        self.start_source(&mut life)
    }

    /// Stops capturing, closes the listener and drops every client.
    ///
    /// Safe to call when nothing is running.  Returns once the event loop has
    /// cleared the roster.
    pub async fn stop(&self) -> Result<(), ServerError> {
        let mut life = self.inner.lifecycle.lock().await;
        if let Some(kind) = life.active.take() {
            life.source(kind).stop();
            info!("{kind} stopped");
        }
        if let Some(handle) = life.listener.take() {
            handle.cancel().await;
        }
        if let Some(advertisement) = life.advertisement.take() {
            advertisement.withdraw();
        }

        let (done, done_rx) = oneshot::channel();
        self.emit(ServerEvent::Reset { done })?;
        done_rx.await.map_err(|_| ServerError::EventLoopClosed)?;
        info!("server stopped");
        Ok(())
    }

    /// Flips test mode and returns the new value.
    ///
    /// While capturing, the active source is swapped for the one matching the
    /// new mode.  If the new source fails to start, capturing ends and the
    /// error is returned; test mode keeps its new value.
    pub async fn toggle_test_mode(&self) -> Result<bool, ServerError> {
        let mut life = self.inner.lifecycle.lock().await;
        let enabled = !self.inner.test_mode.load(Ordering::SeqCst);
        self.inner.test_mode.store(enabled, Ordering::SeqCst);
        self.emit(ServerEvent::TestModeChanged(enabled))?;
        info!("test mode {}", if enabled { "enabled" } else { "disabled" });

        if let Some(active) = life.active {
            if active != SourceKind::for_test_mode(enabled) {
                life.source(active).stop();
                life.active = None;
                self.emit(ServerEvent::CapturingChanged(false))?;
                self.start_source(&mut life)?;
            }
        }
        Ok(enabled)
    }

    /// Sets the UI-only selection flag of a client.
    pub fn select_client(&self, id: ClientId, selected: bool) -> Result<(), ServerError> {
        self.emit(ServerEvent::SelectionChanged { id, selected })
    }

    /// Latest published state.
    pub fn status(&self) -> ServerStatus {
        self.inner.status_rx.borrow().clone()
    }

    /// A receiver that is notified on every published state change.
    pub fn subscribe(&self) -> watch::Receiver<ServerStatus> {
        self.inner.status_rx.clone()
    }

    /// Address the listener is bound to, once it is ready.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.status_rx.borrow().local_addr
    }

    pub fn is_test_mode(&self) -> bool {
        self.inner.test_mode.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// The advertisement currently announced, if listening.
    pub async fn advertisement(&self) -> Option<ServiceAdvertisement> {
        self.inner.lifecycle.lock().await.advertisement.clone()
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn start_listener(&self) -> Result<(ListenerHandle, ServiceAdvertisement), ServerError> {
        let config = &self.inner.config;
        let addr = config.socket_addr();
        self.emit(ServerEvent::ListenerStateChanged {
            state: ListenerState::Starting,
            local_addr: None,
        })?;

        let listener = match bind_listener(addr, config.reuse_address) {
            Ok(listener) => listener,
            Err(e) => {
                error!("{e}");
                self.emit(ServerEvent::ListenerStateChanged {
                    state: ListenerState::Failed(e.to_string()),
                    local_addr: None,
                })?;
                return Err(e.into());
            }
        };

        let (failure_tx, failure_rx) = oneshot::channel();
        let handle = spawn_acceptor(listener, self.inner.events.clone(), failure_tx)?;
        self.stop_on_listener_failure(failure_rx);

        let advertisement = ServiceAdvertisement::new(
            config.service_name.clone(),
            config.service_type.clone(),
            handle.local_addr().port(),
        );
        advertisement.announce();
        Ok((handle, advertisement))
    }

    fn start_source(&self, life: &mut Lifecycle) -> Result<(), ServerError> {
        let kind = SourceKind::for_test_mode(self.inner.test_mode.load(Ordering::SeqCst));
        let sink = FrameSink::new(self.inner.events.clone());

        // Queued ahead of the source's first frame so the event loop accepts it.
        self.emit(ServerEvent::CapturingChanged(true))?;
        match life.source(kind).start(sink) {
            Ok(()) => {
                life.active = Some(kind);
                info!("capturing from {kind}");
                Ok(())
            }
            Err(e) => {
                error!("failed to start {kind}: {e}");
                self.emit(ServerEvent::CapturingChanged(false))?;
                Err(e.into())
            }
        }
    }

    /// Spawns a watcher that fully stops the server if the accept loop fails.
    fn stop_on_listener_failure(&self, failure_rx: oneshot::Receiver<ListenerError>) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            // A dropped sender means the listener was cancelled normally.
            let Ok(e) = failure_rx.await else {
                return;
            };
            let Some(inner) = weak.upgrade() else {
                return;
            };
            (AudioSyncServer { inner }).fail_listener(e).await;
        });
    }

    /// Stops everything, then publishes the listener failure as final state.
    async fn fail_listener(&self, e: ListenerError) {
        warn!("listener failed ({e}); stopping server");
        if let Err(stop_err) = self.stop().await {
            error!("automatic stop failed: {stop_err}");
        }
        let _ = self.emit(ServerEvent::ListenerStateChanged {
            state: ListenerState::Failed(e.to_string()),
            local_addr: None,
        });
    }

    fn emit(&self, event: ServerEvent) -> Result<(), ServerError> {
        self.inner
            .events
            .send(event)
            .map_err(|_| ServerError::EventLoopClosed)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::audio_source::mock::MockAudioSource;
    use std::time::Duration;

    fn loopback_config() -> ServerConfig {
        ServerConfig {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            ..ServerConfig::default()
        }
    }

    async fn wait_for(
        server: &AudioSyncServer,
        mut predicate: impl FnMut(&ServerStatus) -> bool,
    ) -> ServerStatus {
        let mut rx = server.subscribe();
        let status = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| predicate(s)))
            .await
            .expect("timed out waiting for status")
            .expect("status channel closed");
        status.clone()
    }

    #[test]
    fn test_default_config_listens_on_all_interfaces_port_12345() {
        let config = ServerConfig::default();
        assert_eq!(config.socket_addr(), "0.0.0.0:12345".parse().unwrap());
        assert!(config.reuse_address);
        assert_eq!(config.buffer_frames, 1024);
    }

    #[tokio::test]
    async fn test_start_with_mock_source_sets_capturing() {
        // Arrange
        let mock = MockAudioSource::new();
        let server = AudioSyncServer::with_live_source(loopback_config(), Box::new(mock.clone()));

        // Act
        server.start().await.expect("start");

        // Assert
        let status = wait_for(&server, |s| s.is_capturing).await;
        assert_eq!(status.listener, ListenerState::Ready);
        assert!(status.local_addr.is_some());
        assert_eq!(mock.start_count(), 1);
    }

    #[tokio::test]
    async fn test_second_start_reports_already_running() {
        let server =
            AudioSyncServer::with_live_source(loopback_config(), Box::new(MockAudioSource::new()));
        server.start().await.expect("start");

        assert!(matches!(
            server.start().await,
            Err(ServerError::AlreadyRunning)
        ));
    }

    #[tokio::test]
    async fn test_source_failure_keeps_listener_up_and_capturing_off() {
        // Arrange
        let server = AudioSyncServer::with_live_source(
            loopback_config(),
            Box::new(MockAudioSource::failing()),
        );

        // Act
        let result = server.start().await;

        // Assert: the toggle is queued after the capturing rollback, so once
        // it is visible the rollback has been applied too.
        assert!(matches!(result, Err(ServerError::AudioSource(_))));
        server.toggle_test_mode().await.expect("toggle");
        let status = wait_for(&server, |s| s.is_test_mode).await;
        assert_eq!(status.listener, ListenerState::Ready);
        assert!(!status.is_capturing);
    }

    #[tokio::test]
    async fn test_start_after_source_failure_retries_only_the_source() {
        // Arrange
        let mock = MockAudioSource::failing();
        let server = AudioSyncServer::with_live_source(loopback_config(), Box::new(mock.clone()));
        let _ = server.start().await;
        let first_addr = wait_for(&server, |s| s.local_addr.is_some()).await.local_addr;

        // Act
        let _ = server.start().await;

        // Assert: same listener, second source attempt
        assert_eq!(mock.start_count(), 2);
        assert_eq!(server.local_addr(), first_addr);
    }

    #[tokio::test]
    async fn test_stop_clears_state_and_is_idempotent() {
        // Arrange
        let server =
            AudioSyncServer::with_live_source(loopback_config(), Box::new(MockAudioSource::new()));
        server.start().await.expect("start");

        // Act
        server.stop().await.expect("first stop");
        server.stop().await.expect("second stop");

        // Assert
        let status = server.status();
        assert!(!status.is_capturing);
        assert!(status.clients.is_empty());
        assert_eq!(status.listener, ListenerState::Cancelled);
        assert!(server.advertisement().await.is_none());
    }

    #[tokio::test]
    async fn test_toggle_test_mode_while_idle_only_flips_flag() {
        let mock = MockAudioSource::new();
        let server = AudioSyncServer::with_live_source(loopback_config(), Box::new(mock.clone()));

        assert!(server.toggle_test_mode().await.expect("toggle on"));
        assert!(!server.toggle_test_mode().await.expect("toggle off"));

        assert_eq!(mock.start_count(), 0);
        assert!(!server.is_test_mode());
    }

    #[tokio::test]
    async fn test_toggle_test_mode_while_capturing_swaps_source() {
        // Arrange
        let mock = MockAudioSource::new();
        let server = AudioSyncServer::with_live_source(loopback_config(), Box::new(mock.clone()));
        server.start().await.expect("start");

        // Act
        let enabled = server.toggle_test_mode().await.expect("toggle");

        // Assert
        assert!(enabled);
        assert!(!mock.is_running(), "live source must be released");
        let status = wait_for(&server, |s| s.is_test_mode && s.is_capturing).await;
        assert!(status.is_test_mode);
    }

    #[tokio::test]
    async fn test_bind_failure_is_returned_and_nothing_runs() {
        // Arrange: occupy a port
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let config = ServerConfig {
            port: occupied.local_addr().unwrap().port(),
            ..loopback_config()
        };
        let mock = MockAudioSource::new();
        let server = AudioSyncServer::with_live_source(config, Box::new(mock.clone()));

        // Act
        let result = server.start().await;

        // Assert
        assert!(matches!(result, Err(ServerError::Listener(_))));
        assert_eq!(mock.start_count(), 0);
        let status = wait_for(&server, |s| matches!(s.listener, ListenerState::Failed(_))).await;
        assert!(!status.is_capturing);
    }

    #[tokio::test]
    async fn test_advertisement_uses_bound_port() {
        let server =
            AudioSyncServer::with_live_source(loopback_config(), Box::new(MockAudioSource::new()));
        server.start().await.expect("start");

        let ad = server.advertisement().await.expect("advertised");
        let addr = wait_for(&server, |s| s.local_addr.is_some()).await.local_addr;

        assert_eq!(Some(ad.port), addr.map(|a| a.port()));
        assert_eq!(ad.instance_name(), "AudioSyncService._audiosync._tcp.local.");
    }

    #[tokio::test]
    async fn test_accept_failure_stops_source_and_clears_roster() {
        // Arrange
        let mock = MockAudioSource::new();
        let server = AudioSyncServer::with_live_source(loopback_config(), Box::new(mock.clone()));
        server.start().await.expect("start");
        let addr = wait_for(&server, |s| s.local_addr.is_some())
            .await
            .local_addr
            .expect("bound");
        let _client = tokio::net::TcpStream::connect(addr).await.expect("connect");
        wait_for(&server, |s| s.is_capturing && s.clients.len() == 1).await;

        // Act: the accept loop reports a fatal error
        let (failure_tx, failure_rx) = oneshot::channel();
        server.stop_on_listener_failure(failure_rx);
        let err = std::io::Error::new(std::io::ErrorKind::Other, "too many open files");
        failure_tx
            .send(ListenerError::Accept(err))
            .expect("watcher waiting");

        // Assert
        let status = wait_for(&server, |s| matches!(s.listener, ListenerState::Failed(_))).await;
        assert!(status.clients.is_empty());
        assert!(!status.is_capturing);
        assert_eq!(status.local_addr, None);
        assert!(!mock.is_running());
        assert!(server.advertisement().await.is_none());
    }
}
