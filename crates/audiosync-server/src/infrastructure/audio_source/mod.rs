//! Audio source adapters for the broadcast server.
//!
//! An audio source produces [`AudioFrame`](audiosync_core::AudioFrame)s on its
//! own execution context and pushes them into the event loop through a
//! [`FrameSink`].  Two production variants exist:
//!
//! - **`live`** – [`live::LiveCapture`] reads the default input device on a
//!   dedicated OS thread (requires the `live-capture` feature).
//! - **`synthetic`** – [`synthetic::SyntheticGenerator`] emits a fixed sine
//!   tone on a Tokio timer while test mode is enabled.
//!
//! The server picks one of the two from its test-mode flag each time it
//! starts capturing.
//!
//! # Testability
//!
//! The `AudioSource` trait lets tests substitute [`mock::MockAudioSource`],
//! which can refuse to start and lets the test inject frames by hand.

use std::fmt;

use thiserror::Error;

use crate::application::event_loop::FrameSink;

pub mod live;
pub mod mock;
pub mod synthetic;

/// Error type for audio source operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The host has no default input device.
    #[error("no default audio input device")]
    NoDevice,
    /// The device exists but could not be opened (busy, unplugged, denied).
    #[error("audio input device unavailable: {0}")]
    DeviceUnavailable(String),
    /// The device does not offer the sample format the server needs.
    #[error("unsupported input format: {0}")]
    UnsupportedFormat(String),
    /// The stream was built but refused to start.
    #[error("failed to start audio stream: {0}")]
    StreamStart(String),
    /// Live capture was not compiled into this build.
    #[error("live capture is not available in this build (enable the `live-capture` feature)")]
    Unavailable,
    /// The synthetic generator was started while test mode is off.
    #[error("test mode is disabled")]
    TestModeDisabled,
    /// `start` was called on a source that is already producing frames.
    #[error("audio source is already running")]
    AlreadyRunning,
}

/// Which kind of source is producing frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Live,
    Synthetic,
}

impl SourceKind {
    /// The variant matching the given test-mode flag.
    pub fn for_test_mode(is_test_mode: bool) -> Self {
        if is_test_mode {
            Self::Synthetic
        } else {
            Self::Live
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Live => f.write_str("live capture"),
            Self::Synthetic => f.write_str("synthetic tone"),
        }
    }
}

/// Trait abstracting audio frame production.
///
/// `start` must not block for longer than it takes to open the device; frame
/// delivery happens on the source's own thread or task.
pub trait AudioSource: Send {
    /// Begins producing frames into `sink`.
    fn start(&mut self, sink: FrameSink) -> Result<(), SourceError>;
    /// Stops producing frames and releases the device.  Safe to call when idle.
    fn stop(&mut self);
    /// `true` while frames are being produced.
    fn is_running(&self) -> bool;
    /// Short human-readable name, used in logs.
    fn name(&self) -> &'static str;
}
