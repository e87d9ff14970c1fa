//! Test-mode tone generator.
//!
//! While test mode is on, the generator emits one pre-rendered tone every
//! `tone.duration`: by default 0.2 s of 440 Hz, mono, 16-bit big-endian PCM at
//! 44.1 kHz.  Each frame is stamped with wall-clock microseconds at emission.
//!
//! The timer task re-arms after every emission and checks the shared test-mode
//! flag on each tick, so turning test mode off ends the task at the next tick
//! even if nobody calls [`SyntheticGenerator::stop`].

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{SystemTime, UNIX_EPOCH};

use audiosync_core::{AudioFrame, ToneSpec};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

use super::{AudioSource, SourceError};
use crate::application::event_loop::FrameSink;

/// Emits a fixed tone on a timer while test mode is enabled.
pub struct SyntheticGenerator {
    tone: ToneSpec,
    enabled: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl SyntheticGenerator {
    /// Creates a generator gated by `enabled` (the server's test-mode flag).
    pub fn new(tone: ToneSpec, enabled: Arc<AtomicBool>) -> Self {
        Self {
            tone,
            enabled,
            task: None,
        }
    }

    pub fn tone(&self) -> &ToneSpec {
        &self.tone
    }
}

impl AudioSource for SyntheticGenerator {
    fn start(&mut self, sink: FrameSink) -> Result<(), SourceError> {
        if self.is_running() {
            return Err(SourceError::AlreadyRunning);
        }
        if !self.enabled.load(Ordering::SeqCst) {
            return Err(SourceError::TestModeDisabled);
        }
        let runtime = Handle::try_current()
            .map_err(|e| SourceError::StreamStart(format!("no async runtime: {e}")))?;

        let payload = self.tone.render_be();
        info!(
            "test tone: {} Hz, {} samples every {:?}",
            self.tone.frequency_hz,
            self.tone.sample_count(),
            self.tone.duration
        );
        self.task = Some(runtime.spawn(emit_tones(
            payload,
            self.tone,
            Arc::clone(&self.enabled),
            sink,
        )));
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn name(&self) -> &'static str {
        "synthetic tone"
    }
}

impl Drop for SyntheticGenerator {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn emit_tones(payload: Vec<u8>, tone: ToneSpec, enabled: Arc<AtomicBool>, sink: FrameSink) {
    let mut ticker = time::interval(tone.duration);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if !enabled.load(Ordering::SeqCst) {
            debug!("test mode disabled; tone generator exiting");
            break;
        }
        if !sink.push(AudioFrame::new(wall_clock_us(), payload.clone())) {
            debug!("frame sink closed; tone generator exiting");
            break;
        }
    }
}

/// Microseconds since the Unix epoch, or 0 if the clock is before it.
fn wall_clock_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}
