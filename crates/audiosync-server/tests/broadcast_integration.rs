//! Integration tests for the broadcast server over real loopback TCP.
//!
//! # Purpose
//!
//! These tests drive `AudioSyncServer` through its public API exactly as the
//! binary and the UI bridge do, with real `TcpStream` receivers on
//! `127.0.0.1`.  They verify:
//!
//! - Frames reach every connected receiver as `timestamp (8 bytes BE) ++ payload`.
//! - Test mode streams the 0.2 s / 440 Hz tone without any audio device.
//! - A source that refuses to start leaves the listener up and sends nothing.
//! - A receiver that hangs up is removed from the roster.
//! - `stop` closes every receiver's socket and empties the roster.
//!
//! # Port selection
//!
//! Every server binds port 0 so tests can run in parallel; the bound port is
//! read back from the published status.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use audiosync_core::{AudioFrame, PacketDecoder};
use audiosync_server::infrastructure::audio_source::mock::MockAudioSource;
use audiosync_server::{AudioSyncServer, ListenerState, ServerConfig, ServerError, ServerStatus};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

/// Payload size of the default test tone: 8820 samples × 2 bytes.
const TONE_PAYLOAD: usize = 17_640;
const TIMEOUT: Duration = Duration::from_secs(5);

// ── Helpers ───────────────────────────────────────────────────────────────────

fn loopback_config() -> ServerConfig {
    ServerConfig {
        bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        ..ServerConfig::default()
    }
}

fn mock_server(mock: &MockAudioSource) -> AudioSyncServer {
    AudioSyncServer::with_live_source(loopback_config(), Box::new(mock.clone()))
}

/// Waits until the published status satisfies `predicate`.
async fn wait_for(
    server: &AudioSyncServer,
    mut predicate: impl FnMut(&ServerStatus) -> bool,
) -> ServerStatus {
    let mut rx = server.subscribe();
    let status = tokio::time::timeout(TIMEOUT, rx.wait_for(|s| predicate(s)))
        .await
        .expect("timed out waiting for server status")
        .expect("status channel closed");
    status.clone()
}

async fn bound_addr(server: &AudioSyncServer) -> SocketAddr {
    wait_for(server, |s| s.local_addr.is_some())
        .await
        .local_addr
        .expect("listener address")
}

/// Connects `n` receivers and waits until all of them are registered.
async fn connect_clients(server: &AudioSyncServer, n: usize) -> Vec<TcpStream> {
    let addr = bound_addr(server).await;
    let mut streams = Vec::with_capacity(n);
    for _ in 0..n {
        streams.push(TcpStream::connect(addr).await.expect("connect"));
    }
    wait_for(server, |s| s.clients.len() == n).await;
    streams
}

/// Reads from `stream` until `decoder` yields one whole packet.
///
/// A single `read` can return several coalesced packets, so the decoder must
/// live as long as the stream; bytes past the returned frame stay buffered
/// for the next call.
async fn read_frame(stream: &mut TcpStream, decoder: &mut PacketDecoder) -> AudioFrame {
    let mut buf = [0u8; 4096];
    tokio::time::timeout(TIMEOUT, async {
        loop {
            if let Some(frame) = decoder.next_frame() {
                return frame;
            }
            let n = stream.read(&mut buf).await.expect("read");
            assert!(n > 0, "server closed the stream before a full packet");
            decoder.push(&buf[..n]);
        }
    })
    .await
    .expect("timed out waiting for a frame")
}

// ── Delivery ──────────────────────────────────────────────────────────────────

/// Scenario: three receivers, one injected frame; every receiver gets the
/// exact wire bytes `00 00 00 00 00 00 00 01 10 20`.
#[tokio::test]
async fn test_injected_frame_reaches_every_receiver_byte_for_byte() {
    // Arrange
    let mock = MockAudioSource::new();
    let server = mock_server(&mock);
    server.start().await.expect("start");
    wait_for(&server, |s| s.is_capturing).await;
    let mut receivers = connect_clients(&server, 3).await;

    // Act
    assert!(mock.inject(AudioFrame::new(1, vec![0x10, 0x20])));

    // Assert
    for stream in &mut receivers {
        let mut wire = [0u8; 10];
        tokio::time::timeout(TIMEOUT, stream.read_exact(&mut wire))
            .await
            .expect("timed out")
            .expect("read");
        assert_eq!(wire, [0, 0, 0, 0, 0, 0, 0, 1, 0x10, 0x20]);
    }
}

#[tokio::test]
async fn test_frames_arrive_in_production_order() {
    let mock = MockAudioSource::new();
    let server = mock_server(&mock);
    server.start().await.expect("start");
    wait_for(&server, |s| s.is_capturing).await;
    let mut receivers = connect_clients(&server, 1).await;

    for ts in 1..=5u64 {
        mock.inject(AudioFrame::new(ts, vec![ts as u8; 4]));
    }

    let stream = &mut receivers[0];
    let mut decoder = PacketDecoder::new(4);
    for ts in 1..=5u64 {
        let frame = read_frame(stream, &mut decoder).await;
        assert_eq!(frame.timestamp(), ts);
        assert_eq!(frame.payload(), &[ts as u8; 4]);
    }
}

#[tokio::test]
async fn test_receivers_are_named_in_connection_order() {
    let server = mock_server(&MockAudioSource::new());
    server.start().await.expect("start");

    let _receivers = connect_clients(&server, 2).await;

    let names: Vec<String> = server.status().clients.into_iter().map(|c| c.name).collect();
    assert_eq!(names, vec!["Client 1", "Client 2"]);
}

// ── Test mode ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_test_mode_streams_tone_without_audio_device() {
    // Arrange: the live source would fail if it were ever used
    let mock = MockAudioSource::failing();
    let config = ServerConfig {
        start_in_test_mode: true,
        ..loopback_config()
    };
    let server = AudioSyncServer::with_live_source(config, Box::new(mock.clone()));

    // Act
    server.start().await.expect("start in test mode");
    let mut receivers = connect_clients(&server, 1).await;
    let mut decoder = PacketDecoder::new(TONE_PAYLOAD);
    let first = read_frame(&mut receivers[0], &mut decoder).await;
    let second = read_frame(&mut receivers[0], &mut decoder).await;

    // Assert
    assert_eq!(mock.start_count(), 0);
    assert_eq!(first.payload().len(), TONE_PAYLOAD);
    assert_eq!(first.payload(), second.payload());
    assert!(second.timestamp() > first.timestamp());
}

#[tokio::test]
async fn test_test_mode_with_no_receivers_keeps_capturing() {
    let config = ServerConfig {
        start_in_test_mode: true,
        ..loopback_config()
    };
    let server = AudioSyncServer::with_live_source(config, Box::new(MockAudioSource::new()));

    server.start().await.expect("start");
    tokio::time::sleep(Duration::from_millis(500)).await;

    let status = server.status();
    assert!(status.is_capturing);
    assert!(status.is_test_mode);
    assert!(status.clients.is_empty());
}

#[tokio::test]
async fn test_toggling_test_mode_while_capturing_switches_to_tone() {
    // Arrange
    let mock = MockAudioSource::new();
    let server = mock_server(&mock);
    server.start().await.expect("start");
    let mut receivers = connect_clients(&server, 1).await;

    // Act
    assert!(server.toggle_test_mode().await.expect("toggle"));

    // Assert
    let mut decoder = PacketDecoder::new(TONE_PAYLOAD);
    let frame = read_frame(&mut receivers[0], &mut decoder).await;
    assert_eq!(frame.payload().len(), TONE_PAYLOAD);
    assert!(!mock.inject(AudioFrame::new(9, vec![9])), "live source released");
}

// ── Failures ──────────────────────────────────────────────────────────────────

/// Scenario: live mode, source start fails → `start` returns the failure,
/// capturing stays false, connected receivers get nothing.
#[tokio::test]
async fn test_source_failure_broadcasts_nothing() {
    // Arrange
    let server = mock_server(&MockAudioSource::failing());

    // Act
    let result = server.start().await;

    // Assert
    assert!(matches!(result, Err(ServerError::AudioSource(_))));
    let mut receivers = connect_clients(&server, 1).await;
    assert!(!server.status().is_capturing);

    let mut buf = [0u8; 16];
    let read = tokio::time::timeout(Duration::from_millis(300), receivers[0].read(&mut buf)).await;
    assert!(read.is_err(), "no bytes may arrive while not capturing");
}

/// A source may deliver its first frame before `start` returns; that frame
/// must reach receivers connected while the source was down.
#[tokio::test]
async fn test_frame_pushed_during_source_start_is_broadcast() {
    // Arrange: listener up, source down, one receiver connected
    let mock = MockAudioSource::failing();
    let server = mock_server(&mock);
    assert!(server.start().await.is_err());
    let mut receivers = connect_clients(&server, 1).await;
    mock.set_failing(false);
    mock.emit_on_start(AudioFrame::new(3, vec![0xAB, 0xCD]));

    // Act
    server.start().await.expect("retry source");

    // Assert
    let mut decoder = PacketDecoder::new(2);
    let frame = read_frame(&mut receivers[0], &mut decoder).await;
    assert_eq!(frame.timestamp(), 3);
    assert_eq!(frame.payload(), &[0xAB, 0xCD]);
}

#[tokio::test]
async fn test_bind_failure_on_occupied_port() {
    // Arrange
    let occupied = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let config = ServerConfig {
        port: occupied.local_addr().unwrap().port(),
        ..loopback_config()
    };
    let server = AudioSyncServer::with_live_source(config, Box::new(MockAudioSource::new()));

    // Act
    let result = server.start().await;

    // Assert
    assert!(matches!(result, Err(ServerError::Listener(_))));
    let status = wait_for(&server, |s| matches!(s.listener, ListenerState::Failed(_))).await;
    assert!(!status.is_capturing);
    assert!(status.local_addr.is_none());
}

#[tokio::test]
async fn test_receiver_hang_up_removes_it_from_roster() {
    // Arrange
    let server = mock_server(&MockAudioSource::new());
    server.start().await.expect("start");
    let mut receivers = connect_clients(&server, 2).await;

    // Act
    drop(receivers.remove(0));

    // Assert
    let status = wait_for(&server, |s| s.clients.len() == 1).await;
    assert_eq!(status.clients[0].name, "Client 2");
    assert!(status.clients[0].is_connected);
}

// ── Stop ──────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_stop_closes_receivers_and_empties_roster() {
    // Arrange
    let server = mock_server(&MockAudioSource::new());
    server.start().await.expect("start");
    let addr = bound_addr(&server).await;
    let mut receivers = connect_clients(&server, 2).await;

    // Act
    server.stop().await.expect("stop");

    // Assert
    let status = server.status();
    assert!(status.clients.is_empty());
    assert!(!status.is_capturing);
    for stream in &mut receivers {
        let mut buf = [0u8; 8];
        let n = tokio::time::timeout(TIMEOUT, stream.read(&mut buf))
            .await
            .expect("timed out waiting for close")
            .unwrap_or(0);
        assert_eq!(n, 0, "socket must be closed after stop");
    }
    assert!(TcpStream::connect(addr).await.is_err(), "listener must be gone");
}

#[tokio::test]
async fn test_server_can_restart_after_stop() {
    let mock = MockAudioSource::new();
    let server = mock_server(&mock);
    server.start().await.expect("first start");
    server.stop().await.expect("stop");

    server.start().await.expect("second start");

    wait_for(&server, |s| s.is_capturing && s.listener == ListenerState::Ready).await;
    assert_eq!(mock.start_count(), 2);
}
