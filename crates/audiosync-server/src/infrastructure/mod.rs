//! Infrastructure layer for the broadcast server.
//!
//! Contains OS-facing adapters: audio capture devices and timers, TCP
//! sockets, service advertisement, file-system storage, and the UI command
//! bridge.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `audiosync_core`, but MUST NOT be imported by the `application` layer.

pub mod audio_source;
pub mod network;
pub mod storage;
pub mod ui_bridge;
