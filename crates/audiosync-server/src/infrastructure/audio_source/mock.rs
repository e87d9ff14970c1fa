//! Mock audio source for unit and integration testing.
//!
//! Lets tests push hand-made frames through the real event loop without an
//! audio device, and simulate a device that refuses to start.
//!
//! The mock is `Clone`: the server owns one handle (boxed as
//! `dyn AudioSource`) while the test keeps another to inject frames.

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};

use audiosync_core::AudioFrame;

use super::{AudioSource, SourceError};
use crate::application::event_loop::FrameSink;

#[derive(Default)]
struct MockState {
    sink: Mutex<Option<FrameSink>>,
    fail_start: AtomicBool,
    start_count: AtomicUsize,
    on_start: Mutex<Option<AudioFrame>>,
}

/// A mock implementation of [`AudioSource`].
#[derive(Clone, Default)]
pub struct MockAudioSource {
    state: Arc<MockState>,
}

impl MockAudioSource {
    /// Creates a mock that starts successfully.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mock whose `start` fails with
    /// [`SourceError::DeviceUnavailable`].
    pub fn failing() -> Self {
        let mock = Self::new();
        mock.state.fail_start.store(true, Ordering::SeqCst);
        mock
    }

    /// Injects a frame as if it had been captured.
    ///
    /// Returns `false` if the source is not started or the server is gone.
    pub fn inject(&self, frame: AudioFrame) -> bool {
        let guard = self.state.sink.lock().expect("lock poisoned");
        match guard.as_ref() {
            Some(sink) => sink.push(frame),
            None => false,
        }
    }

    /// Makes later `start` calls fail (`true`) or succeed (`false`).
    pub fn set_failing(&self, failing: bool) {
        self.state.fail_start.store(failing, Ordering::SeqCst);
    }

    /// Pushes `frame` from inside the next successful `start`, before it
    /// returns.
    pub fn emit_on_start(&self, frame: AudioFrame) {
        *self.state.on_start.lock().expect("lock poisoned") = Some(frame);
    }

    /// Returns how many times `start` has been called, successful or not.
    pub fn start_count(&self) -> usize {
        self.state.start_count.load(Ordering::SeqCst)
    }
}

impl AudioSource for MockAudioSource {
    fn start(&mut self, sink: FrameSink) -> Result<(), SourceError> {
        self.state.start_count.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_start.load(Ordering::SeqCst) {
            return Err(SourceError::DeviceUnavailable(
                "mock device refused to start".to_string(),
            ));
        }
        let mut guard = self.state.sink.lock().expect("lock poisoned");
        if guard.is_some() {
            return Err(SourceError::AlreadyRunning);
        }
        if let Some(frame) = self.state.on_start.lock().expect("lock poisoned").take() {
            sink.push(frame);
        }
        *guard = Some(sink);
        Ok(())
    }

    fn stop(&mut self) {
        *self.state.sink.lock().expect("lock poisoned") = None;
    }

    fn is_running(&self) -> bool {
        self.state.sink.lock().expect("lock poisoned").is_some()
    }

    fn name(&self) -> &'static str {
        "mock source"
    }
}
