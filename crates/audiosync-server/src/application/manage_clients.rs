//! ManageClientsUseCase: the connection registry.
//!
//! The `ClientRegistry` is the server's in-memory roster of every client that
//! is currently connected.  Each entry tracks:
//!
//! - The client's UUID and display name (`"Client {n}"`).
//! - The channel used to push packets to it.
//! - Whether the last send succeeded (`is_connected`) and the UI-only
//!   selection flag.
//!
//! # Two liveness signals (for beginners)
//!
//! A client can stop being useful in two different ways:
//!
//! ```text
//!   send fails ──► mark_disconnected()   entry stays, excluded from traffic
//!   socket ends ──► remove()             entry deleted, channel released
//! ```
//!
//! A failed send only flips `is_connected`.  The entry lingers until the
//! connection monitor reports that the socket has actually closed, at which
//! point `remove` deletes it.  `remove` is idempotent, so a terminal event that
//! fires twice is harmless.
//!
//! The registry has no internal locking.  It is owned by the event loop, which
//! is the only writer, so every mutation and every snapshot is serialized.

use std::sync::Arc;

use audiosync_core::domain::client::display_name;
use audiosync_core::{ClientId, ClientInfo};
use uuid::Uuid;

use crate::application::broadcast::ClientChannel;

/// A channel handle shared between the registry and in-flight sends.
pub type SharedChannel = Arc<dyn ClientChannel>;

/// One roster entry.
struct ClientEntry {
    id: ClientId,
    name: String,
    channel: SharedChannel,
    is_connected: bool,
    is_selected: bool,
}

impl ClientEntry {
    fn info(&self) -> ClientInfo {
        ClientInfo {
            id: self.id,
            name: self.name.clone(),
            is_connected: self.is_connected,
            is_selected: self.is_selected,
        }
    }
}

/// Point-in-time copy of an entry, as iterated by the broadcast engine.
#[derive(Clone)]
pub struct ClientSnapshot {
    pub id: ClientId,
    pub name: String,
    pub is_connected: bool,
    pub channel: SharedChannel,
}

/// Ordered registry of connected clients.
///
/// # Vec choice
///
/// Insertion order is connection order and the UI shows clients in that
/// order, so entries live in a `Vec`.  Lookups by id are linear, which is
/// fine for the tens of listeners a LAN stream serves.
#[derive(Default)]
pub struct ClientRegistry {
    clients: Vec<ClientEntry>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a client and returns its new id.
    ///
    /// The display name is `"Client {n}"` with `n` = current count + 1.  Names
    /// can repeat after removals; ids never do.
    pub fn register(&mut self, channel: SharedChannel) -> ClientId {
        let id = Uuid::new_v4();
        let name = display_name(self.clients.len() + 1);
        self.clients.push(ClientEntry {
            id,
            name,
            channel,
            is_connected: true,
            is_selected: false,
        });
        id
    }

    /// Flags a client as no longer receiving traffic.
    ///
    /// Returns `true` if the flag changed.
    pub fn mark_disconnected(&mut self, id: ClientId) -> bool {
        match self.clients.iter_mut().find(|c| c.id == id) {
            Some(client) if client.is_connected => {
                client.is_connected = false;
                true
            }
            _ => false,
        }
    }

    /// Deletes a client and releases its channel.
    ///
    /// Removing an unknown id is a no-op; returns `true` only when an entry
    /// was actually removed.
    pub fn remove(&mut self, id: ClientId) -> bool {
        let Some(index) = self.clients.iter().position(|c| c.id == id) else {
            return false;
        };
        let entry = self.clients.remove(index);
        entry.channel.cancel();
        true
    }

    /// Sets the UI-only selection flag.  Returns `true` if the flag changed.
    pub fn set_selected(&mut self, id: ClientId, selected: bool) -> bool {
        match self.clients.iter_mut().find(|c| c.id == id) {
            Some(client) if client.is_selected != selected => {
                client.is_selected = selected;
                true
            }
            _ => false,
        }
    }

    /// Removes every client, cancelling its channel.  Returns how many were removed.
    pub fn clear(&mut self) -> usize {
        let count = self.clients.len();
        for entry in self.clients.drain(..) {
            entry.channel.cancel();
        }
        count
    }

    /// Returns a consistent ordered copy of all entries, channels included.
    pub fn snapshot(&self) -> Vec<ClientSnapshot> {
        self.clients
            .iter()
            .map(|c| ClientSnapshot {
                id: c.id,
                name: c.name.clone(),
                is_connected: c.is_connected,
                channel: Arc::clone(&c.channel),
            })
            .collect()
    }

    /// Returns the observer view of all entries, in connection order.
    pub fn infos(&self) -> Vec<ClientInfo> {
        self.clients.iter().map(ClientEntry::info).collect()
    }

    /// Returns the observer view of a single client.
    pub fn get(&self, id: ClientId) -> Option<ClientInfo> {
        self.clients.iter().find(|c| c.id == id).map(ClientEntry::info)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
