//! Sample format conversion.
//!
//! Capture devices deliver 32-bit float samples in `[-1.0, 1.0]`.  The wire
//! format carries 16-bit signed integers in network (big-endian) byte order,
//! interleaved by channel: `L0 R0 L1 R1 ...` for stereo.

/// Converts one float sample to a 16-bit signed integer.
///
/// Values outside `[-1.0, 1.0]` are clamped; NaN maps to silence.
pub fn f32_to_i16(sample: f32) -> i16 {
    if sample.is_nan() {
        return 0;
    }
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// Encodes interleaved float samples as 16-bit big-endian PCM.
pub fn encode_f32_be(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        out.extend_from_slice(&f32_to_i16(sample).to_be_bytes());
    }
    out
}

/// Encodes 16-bit samples in big-endian byte order.
pub fn encode_i16_be(samples: &[i16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        out.extend_from_slice(&sample.to_be_bytes());
    }
    out
}
