//! Live capture from the default input device.
//!
//! The device stream is driven by the platform audio backend (via `cpal`) on a
//! dedicated OS thread.  That thread:
//!
//! 1. Opens the default input device and asks for f32 samples with a fixed
//!    buffer of `buffer_frames` frames.
//! 2. Reports success or failure back to [`LiveCapture::start`].
//! 3. Keeps the stream alive until `stop` signals it, then drops it.
//!
//! Every delivered buffer becomes one frame: the samples are converted to
//! 16-bit signed big-endian, still interleaved by channel, and stamped with
//! the device capture time in microseconds relative to the first buffer.
//!
//! # Why a dedicated thread?
//!
//! `cpal::Stream` is not `Send` on every platform, so it cannot live inside a
//! Tokio task or be stored in the server.  The thread owns it for its entire
//! lifetime and only a stop channel crosses the boundary.
//!
//! Without the `live-capture` feature, [`LiveCapture::start`] always fails
//! with [`SourceError::Unavailable`].

use std::sync::mpsc;
use std::thread::JoinHandle;

use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::task;
use tracing::{debug, info};

use super::{AudioSource, SourceError};
use crate::application::event_loop::FrameSink;

/// Default buffer size in frames.
pub const DEFAULT_BUFFER_FRAMES: u32 = 1024;

struct CaptureThread {
    stop_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// Captures from the system's default input device.
pub struct LiveCapture {
    buffer_frames: u32,
    worker: Option<CaptureThread>,
}

impl LiveCapture {
    pub fn new(buffer_frames: u32) -> Self {
        Self {
            buffer_frames,
            worker: None,
        }
    }

    pub fn buffer_frames(&self) -> u32 {
        self.buffer_frames
    }
}

impl Default for LiveCapture {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_FRAMES)
    }
}

impl AudioSource for LiveCapture {
    fn start(&mut self, sink: FrameSink) -> Result<(), SourceError> {
        if self.is_running() {
            return Err(SourceError::AlreadyRunning);
        }
        // Reap a thread whose stream died on its own.
        self.stop();

        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let (stop_tx, stop_rx) = mpsc::channel();
        let buffer_frames = self.buffer_frames;

        let handle = std::thread::Builder::new()
            .name("audiosync-capture".to_string())
            .spawn(move || device::run_capture(buffer_frames, sink, ready_tx, stop_rx))
            .map_err(|e| SourceError::StreamStart(format!("failed to spawn capture thread: {e}")))?;

        match off_runtime(|| ready_rx.recv()) {
            Ok(Ok(())) => {
                info!("live capture started ({buffer_frames}-frame buffers)");
                self.worker = Some(CaptureThread { stop_tx, handle });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(SourceError::StreamStart(
                    "capture thread exited before reporting".to_string(),
                ))
            }
        }
    }

    fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(());
            if off_runtime(|| worker.handle.join()).is_err() {
                debug!("capture thread panicked during shutdown");
            }
            info!("live capture stopped");
        }
    }

    fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|w| !w.handle.is_finished())
    }

    fn name(&self) -> &'static str {
        "live capture"
    }
}

/// Runs a blocking wait on the capture thread.
///
/// On a multi-threaded Tokio worker the wait is moved off the scheduler with
/// `block_in_place` so other tasks keep running; elsewhere it blocks directly.
fn off_runtime<T>(wait: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            task::block_in_place(wait)
        }
        _ => wait(),
    }
}

impl Drop for LiveCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(feature = "live-capture")]
mod device {
    use std::sync::mpsc;
    use std::time::Duration;

    use audiosync_core::{encode_f32_be, AudioFrame};
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{BufferSize, InputCallbackInfo, SampleFormat, StreamInstant};
    use tracing::{debug, error, info};

    use crate::application::event_loop::FrameSink;
    use crate::infrastructure::audio_source::SourceError;

    pub(super) fn run_capture(
        buffer_frames: u32,
        sink: FrameSink,
        ready: mpsc::SyncSender<Result<(), SourceError>>,
        stop: mpsc::Receiver<()>,
    ) {
        let stream = match open_stream(buffer_frames, sink) {
            Ok(stream) => stream,
            Err(e) => {
                let _ = ready.send(Err(e));
                return;
            }
        };
        if let Err(e) = stream.play() {
            let _ = ready.send(Err(SourceError::StreamStart(e.to_string())));
            return;
        }
        let _ = ready.send(Ok(()));

        // Blocks until `stop` is signalled or the owner is dropped.
        let _ = stop.recv();
        drop(stream);
        debug!("capture stream released");
    }

    fn open_stream(buffer_frames: u32, sink: FrameSink) -> Result<cpal::Stream, SourceError> {
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or(SourceError::NoDevice)?;
        let device_name = device.name().unwrap_or_else(|_| "<unnamed>".to_string());

        let supported = device
            .default_input_config()
            .map_err(|e| SourceError::DeviceUnavailable(e.to_string()))?;
        if supported.sample_format() != SampleFormat::F32 {
            return Err(SourceError::UnsupportedFormat(format!(
                "{:?} (need f32)",
                supported.sample_format()
            )));
        }

        let mut config = supported.config();
        config.buffer_size = BufferSize::Fixed(buffer_frames);
        info!(
            "opening '{device_name}': {} Hz, {} channel(s)",
            config.sample_rate.0, config.channels
        );

        let mut anchor: Option<StreamInstant> = None;
        device
            .build_input_stream(
                &config,
                move |data: &[f32], info: &InputCallbackInfo| {
                    let captured = info.timestamp().capture;
                    let start = *anchor.get_or_insert(captured);
                    let timestamp = captured
                        .duration_since(&start)
                        .unwrap_or(Duration::ZERO)
                        .as_micros() as u64;
                    sink.push(AudioFrame::new(timestamp, encode_f32_be(data)));
                },
                |e| error!("audio input stream error: {e}"),
                None,
            )
            .map_err(|e| SourceError::DeviceUnavailable(e.to_string()))
    }
}

#[cfg(not(feature = "live-capture"))]
mod device {
    use std::sync::mpsc;

    use crate::application::event_loop::FrameSink;
    use crate::infrastructure::audio_source::SourceError;

    pub(super) fn run_capture(
        _buffer_frames: u32,
        _sink: FrameSink,
        ready: mpsc::SyncSender<Result<(), SourceError>>,
        _stop: mpsc::Receiver<()>,
    ) {
        let _ = ready.send(Err(SourceError::Unavailable));
    }
}
