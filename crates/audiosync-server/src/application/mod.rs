//! Application layer use cases for the broadcast server.
//!
//! # What is the "application" layer? (for beginners)
//!
//! In Clean Architecture the *application* layer sits between the domain
//! (plain data and rules, in `audiosync-core`) and the infrastructure
//! (sockets, audio devices, files).
//!
//! Code in this layer:
//!
//! - **Orchestrates** domain objects to fulfil a goal (e.g., "deliver this
//!   frame to every healthy listener").
//! - **Depends on abstractions** (the [`broadcast::ClientChannel`] trait)
//!   rather than concrete TCP sockets, so tests can use in-memory channels.
//! - **Contains no OS calls, no network I/O, no file system access**.
//!
//! # Sub-modules
//!
//! - **`manage_clients`** – The ordered roster of connected clients and their
//!   health flags.
//!
//! - **`broadcast`** – Encodes a frame once and fans it out to every connected
//!   client without waiting on any single one.
//!
//! - **`event_loop`** – The single serializing worker that owns the roster and
//!   applies every accept, state change, send result and frame in order.

pub mod broadcast;
pub mod event_loop;
pub mod manage_clients;
