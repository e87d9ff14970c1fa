//! The audio frame: one timestamped unit of PCM audio.

/// One timestamped buffer of PCM audio in transit from a source to the clients.
///
/// The payload holds 16-bit signed big-endian samples, interleaved by channel.
/// A frame is immutable once created; the server encodes it exactly once and
/// shares the encoded bytes between all clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    timestamp: u64,
    payload: Vec<u8>,
}

impl AudioFrame {
    /// Creates a frame from a timestamp (device clock or wall-clock µs) and
    /// its raw payload bytes.
    pub fn new(timestamp: u64, payload: Vec<u8>) -> Self {
        Self { timestamp, payload }
    }

    /// Monotonic device time or wall-clock microseconds at capture.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Raw PCM bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Consumes the frame and returns its payload.
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_frame_exposes_timestamp_and_payload() {
        // Arrange / Act
        let frame = AudioFrame::new(42, vec![1, 2, 3]);

        // Assert
        assert_eq!(frame.timestamp(), 42);
        assert_eq!(frame.payload(), &[1, 2, 3]);
    }

    #[test]
    fn test_into_payload_returns_owned_bytes() {
        let frame = AudioFrame::new(0, vec![0xAA, 0xBB]);
        assert_eq!(frame.into_payload(), vec![0xAA, 0xBB]);
    }

    #[test]
    fn test_empty_payload_is_allowed() {
        let frame = AudioFrame::new(7, Vec::new());
        assert!(frame.payload().is_empty());
    }
}
