//! Network infrastructure for the broadcast server.
//!
//! # Sub-modules
//!
//! - **`listener`** – Binds the TCP service port with address reuse and runs
//!   the accept loop.  Every accepted socket is handed to the event loop as a
//!   new client; a failed accept ends the loop and reports the failure so the
//!   server can stop itself.
//!
//! - **`tcp_channel`** – The per-client [`ClientChannel`] implementation over
//!   a TCP write half, plus the connection monitor that watches the read half
//!   for EOF, errors and local cancellation.
//!
//! - **`advertisement`** – Metadata announced alongside the listener so LAN
//!   receivers can find the service (`AudioSyncService`, `_audiosync._tcp`).
//!
//! [`ClientChannel`]: crate::application::broadcast::ClientChannel

pub mod advertisement;
pub mod listener;
pub mod tcp_channel;
