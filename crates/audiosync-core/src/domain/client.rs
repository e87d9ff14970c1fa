//! Client identity and roster view.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a connected client, derived from UUID v4.
///
/// Identifiers are never reused for the lifetime of a server process.
pub type ClientId = Uuid;

/// Read-only view of one roster entry, as published to observers.
///
/// This is what the control surface renders in its client list.  It carries
/// no channel handle, so holding one never keeps a connection alive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Stable identity of the client.
    pub id: ClientId,
    /// Display label, `"Client {n}"`.
    pub name: String,
    /// `false` once a send to this client has failed.
    pub is_connected: bool,
    /// UI-only selection flag.
    pub is_selected: bool,
}

/// Formats the display label for the `ordinal`-th client.
pub fn display_name(ordinal: usize) -> String {
    format!("Client {ordinal}")
}
