//! BroadcastUseCase: fan-out of one encoded frame to every healthy client.
//!
//! For each frame the engine:
//!
//! 1. Encodes the frame **once** into a [`Bytes`] buffer.
//! 2. Walks the registry snapshot in order, skipping clients whose
//!    `is_connected` flag is already `false`.
//! 3. Queues the buffer on each remaining client's delivery queue.  Every
//!    client has its own delivery task, so a slow listener never delays a
//!    fast one, and packets reach each client in production order.
//! 4. The delivery task reports each outcome back to the event loop as a
//!    [`ServerEvent::SendCompleted`].  After a failure it stops; the packet
//!    is never retried.
//!
//! ```text
//!                     ┌─► queue A ─► task A ─► channel A ─┐
//!  frame ─► encode ───┼─► queue B ─► task B ─► channel B ─┼─► SendCompleted
//!                     └─► queue C ─► task C ─► channel C ─┘
//! ```
//!
//! There is no backpressure: if frames arrive faster than a client can take
//! them, packets pile up in that client's queue.
//!
//! # Testability
//!
//! The [`ClientChannel`] trait lets unit tests swap the TCP channel for
//! [`mock::MockChannel`], which records packets and can be told to fail.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use audiosync_core::{encode_frame, AudioFrame, ClientId};
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedSender, WeakUnboundedSender};
use tracing::{debug, trace};

use crate::application::event_loop::ServerEvent;
use crate::application::manage_clients::{ClientSnapshot, SharedChannel};

pub mod mock;

/// Error type for a single packet delivery.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The underlying stream rejected the write.
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),
    /// The channel was cancelled before or during the send.
    #[error("channel closed")]
    Closed,
}

/// A reliable byte-stream endpoint owned by one registry entry.
///
/// The production implementation wraps the write half of a TCP stream; tests
/// use [`mock::MockChannel`].
#[async_trait]
pub trait ClientChannel: Send + Sync {
    /// Writes one encoded packet as a single logical write.
    async fn send(&self, packet: Bytes) -> Result<(), ChannelError>;

    /// Requests the connection be torn down.  Must be idempotent.
    fn cancel(&self);

    /// Short human-readable description (usually the peer address) for logs.
    fn describe(&self) -> String;
}

/// Fans frames out to clients and reports each send's outcome.
pub struct BroadcastEngine {
    // Weak so the event loop's own queue can still close when every external
    // sender is dropped.
    events: WeakUnboundedSender<ServerEvent>,
    queues: HashMap<ClientId, UnboundedSender<Bytes>>,
}

impl BroadcastEngine {
    /// Creates an engine that reports send outcomes on `events`.
    pub fn new(events: &UnboundedSender<ServerEvent>) -> Self {
        Self {
            events: events.downgrade(),
            queues: HashMap::new(),
        }
    }

    /// Queues `frame` for every connected client in `clients` and returns
    /// how many clients it was queued for.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn broadcast(&mut self, clients: &[ClientSnapshot], frame: &AudioFrame) -> usize {
        if self.events.upgrade().is_none() {
            return 0;
        }
        let packet = Bytes::from(encode_frame(frame));

        // Queues of clients that left or failed are no longer fed.
        self.queues
            .retain(|id, _| clients.iter().any(|c| c.id == *id && c.is_connected));

        let mut dispatched = 0;
        for client in clients.iter().filter(|c| c.is_connected) {
            let queue = self.queues.entry(client.id).or_insert_with(|| {
                spawn_delivery(client.id, Arc::clone(&client.channel), self.events.clone())
            });
            if queue.send(packet.clone()).is_ok() {
                dispatched += 1;
            }
        }

        trace!(
            "frame ts={} ({} bytes) queued for {dispatched}/{} clients",
            frame.timestamp(),
            packet.len(),
            clients.len()
        );
        dispatched
    }

    /// Drops the delivery queue of a client that left the roster.
    ///
    /// Packets still queued for it are discarded.
    pub fn forget(&mut self, id: ClientId) {
        self.queues.remove(&id);
    }

    /// Drops every delivery queue.
    pub fn clear(&mut self) {
        self.queues.clear();
    }

    /// Number of clients with a live delivery queue.
    pub fn active_queues(&self) -> usize {
        self.queues.len()
    }
}

/// Spawns the task that writes one client's packets in order.
fn spawn_delivery(
    id: ClientId,
    channel: SharedChannel,
    events: WeakUnboundedSender<ServerEvent>,
) -> UnboundedSender<Bytes> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();
    tokio::spawn(async move {
        while let Some(packet) = rx.recv().await {
            let result = channel.send(packet).await;
            let failed = result.is_err();
            // The loop may already be gone during shutdown.
            let delivered = events
                .upgrade()
                .is_some_and(|events| events.send(ServerEvent::SendCompleted { id, result }).is_ok());
            if failed || !delivered {
                break;
            }
        }
        debug!("delivery to {} ({id}) finished", channel.describe());
    });
    tx
}

// ── Tests ─────────────────────────────────────────────────────────────────────
