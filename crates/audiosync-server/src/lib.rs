//! audiosync-server library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.

pub mod application;
pub mod infrastructure;
pub mod server;

pub use application::event_loop::{ListenerState, ServerStatus};
pub use server::{AudioSyncServer, ServerConfig, ServerError};
