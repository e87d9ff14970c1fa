//! Sine tone synthesis for test mode.

use std::f64::consts::PI;
use std::time::Duration;

use crate::audio::pcm::encode_i16_be;

/// Parameters of the mono test tone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneSpec {
    /// Tone pitch in hertz.
    pub frequency_hz: f64,
    /// Samples per second.
    pub sample_rate: u32,
    /// Length of one emitted tone.
    pub duration: Duration,
}

impl Default for ToneSpec {
    /// 0.2 s of A4 (440 Hz) at 44.1 kHz.
    fn default() -> Self {
        Self {
            frequency_hz: 440.0,
            sample_rate: 44_100,
            duration: Duration::from_millis(200),
        }
    }
}

impl ToneSpec {
    /// Number of samples in one tone.
    pub fn sample_count(&self) -> usize {
        (self.sample_rate as f64 * self.duration.as_secs_f64()).round() as usize
    }

    /// Renders the tone as full-scale 16-bit samples.
    pub fn render(&self) -> Vec<i16> {
        let rate = self.sample_rate as f64;
        (0..self.sample_count())
            .map(|i| {
                let phase = 2.0 * PI * self.frequency_hz * i as f64 / rate;
                (phase.sin() * i16::MAX as f64) as i16
            })
            .collect()
    }

    /// Renders the tone as 16-bit big-endian PCM bytes.
    pub fn render_be(&self) -> Vec<u8> {
        encode_i16_be(&self.render())
    }
}
