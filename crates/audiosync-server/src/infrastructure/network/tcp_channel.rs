//! Per-client TCP channel and connection monitor.
//!
//! An accepted `TcpStream` is split in two:
//!
//! ```text
//!                ┌── write half ──► TcpClientChannel (registry entry, sends)
//!  TcpStream ────┤
//!                └── read half ───► monitor task (EOF / error / cancel)
//! ```
//!
//! The write half sits behind an async mutex so that two in-flight sends to
//! the same client never interleave their bytes.  The read half is drained
//! and discarded; its only purpose is to notice when the peer goes away.
//!
//! The monitor reports exactly one terminal [`ConnectionState`] per
//! connection:
//!
//! | Trigger                      | Reported state            |
//! |------------------------------|---------------------------|
//! | peer closed the stream (EOF) | `Failed("peer closed …")` |
//! | read error                   | `Failed(error text)`      |
//! | `ClientChannel::cancel`      | `Cancelled`               |

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use audiosync_core::ClientId;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, watch, Mutex};
use tracing::{debug, trace, warn};

use crate::application::broadcast::{ChannelError, ClientChannel};
use crate::application::event_loop::{ConnectionState, EventSender, ServerEvent};

const READ_CHUNK: usize = 1024;

/// [`ClientChannel`] backed by the write half of a TCP stream.
pub struct TcpClientChannel {
    peer: SocketAddr,
    writer: Mutex<OwnedWriteHalf>,
    cancel_tx: watch::Sender<bool>,
}

impl TcpClientChannel {
    fn new(peer: SocketAddr, writer: OwnedWriteHalf, cancel_tx: watch::Sender<bool>) -> Self {
        Self {
            peer,
            writer: Mutex::new(writer),
            cancel_tx,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }
}

#[async_trait]
impl ClientChannel for TcpClientChannel {
    async fn send(&self, packet: Bytes) -> Result<(), ChannelError> {
        if self.is_cancelled() {
            return Err(ChannelError::Closed);
        }
        let mut writer = self.writer.lock().await;
        writer.write_all(&packet).await?;
        Ok(())
    }

    fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    fn describe(&self) -> String {
        self.peer.to_string()
    }
}

/// Hands a freshly accepted stream to the event loop and starts its monitor.
///
/// The `Accepted` event is queued before this function returns, so it is
/// ordered ahead of anything the caller queues afterwards.  Returns `false`
/// if the event loop is gone.
pub fn accept_connection(stream: TcpStream, peer: SocketAddr, events: &EventSender) -> bool {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("could not set TCP_NODELAY for {peer}: {e}");
    }
    let (reader, writer) = stream.into_split();
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let channel = Arc::new(TcpClientChannel::new(peer, writer, cancel_tx));

    let (reply, reply_rx) = oneshot::channel();
    if events
        .send(ServerEvent::Accepted { channel, reply })
        .is_err()
    {
        return false;
    }
    tokio::spawn(monitor_connection(
        peer,
        reader,
        reply_rx,
        cancel_rx,
        events.clone(),
    ));
    true
}

/// Waits for the assigned id, confirms the connection, then watches it until
/// it ends and reports how.
async fn monitor_connection(
    peer: SocketAddr,
    mut reader: OwnedReadHalf,
    reply: oneshot::Receiver<ClientId>,
    mut cancel_rx: watch::Receiver<bool>,
    events: EventSender,
) {
    let Ok(id) = reply.await else {
        debug!("connection from {peer} was dropped before registration");
        return;
    };
    let _ = events.send(ServerEvent::ConnectionStateChanged {
        id,
        state: ConnectionState::Ready,
    });

    let state = watch_stream(&mut reader, &mut cancel_rx).await;
    if let ConnectionState::Failed(reason) = &state {
        warn!("connection to {peer} ended: {reason}");
    }
    let _ = events.send(ServerEvent::ConnectionStateChanged { id, state });
}

async fn watch_stream(
    reader: &mut OwnedReadHalf,
    cancel_rx: &mut watch::Receiver<bool>,
) -> ConnectionState {
    let mut scratch = [0u8; READ_CHUNK];
    loop {
        if *cancel_rx.borrow_and_update() {
            return ConnectionState::Cancelled;
        }
        tokio::select! {
            changed = cancel_rx.changed() => {
                if changed.is_err() {
                    // The channel itself is gone; nothing can send any more.
                    return ConnectionState::Cancelled;
                }
            }
            read = reader.read(&mut scratch) => match read {
                Ok(0) => return ConnectionState::Failed("peer closed the connection".to_string()),
                Ok(n) => trace!("discarded {n} inbound byte(s)"),
                Err(e) => return ConnectionState::Failed(e.to_string()),
            },
        }
    }
}
