//! Binary codec for AudioSync audio packets.
//!
//! Wire format:
//! ```text
//! [timestamp:8][payload:N]
//! ```
//! The timestamp is a big-endian `u64`.  The payload is the frame's PCM bytes,
//! copied verbatim.  There is **no** length prefix and no delimiter: each
//! packet is sent as one logical write on a TCP stream.
//!
//! # Known limitation: no message boundaries
//!
//! TCP is a byte stream, so a receiver cannot tell where one packet ends and
//! the next begins from the bytes alone.  A conformant receiver must do one of:
//!
//! - Know the payload size in advance and cut the stream into
//!   `HEADER_SIZE + payload_len` chunks ([`PacketDecoder`]).
//! - Assume each read returns exactly one packet ([`decode_packet`]).  This
//!   works on a quiet LAN but breaks as soon as the kernel coalesces or splits
//!   writes.

use thiserror::Error;

use crate::domain::frame::AudioFrame;

/// Size of the timestamp header that precedes every payload.
pub const HEADER_SIZE: usize = 8;

/// Errors that can occur while decoding a packet.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The byte slice is shorter than the fixed timestamp header.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes an [`AudioFrame`] into its wire representation.
///
/// Encoding is total: every finite payload, including an empty one, produces
/// `HEADER_SIZE + payload.len()` bytes.
///
/// # Examples
///
/// ```rust
/// use audiosync_core::{encode_frame, AudioFrame};
///
/// let frame = AudioFrame::new(1, vec![0x10, 0x20]);
/// assert_eq!(encode_frame(&frame), vec![0, 0, 0, 0, 0, 0, 0, 1, 0x10, 0x20]);
/// ```
pub fn encode_frame(frame: &AudioFrame) -> Vec<u8> {
    let payload = frame.payload();
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&frame.timestamp().to_be_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// Decodes `bytes` as exactly one packet.
///
/// Everything after the 8-byte header is taken as the payload.
///
/// # Errors
///
/// Returns [`ProtocolError::InsufficientData`] if `bytes` is shorter than
/// [`HEADER_SIZE`].
///
/// # Examples
///
/// ```rust
/// use audiosync_core::decode_packet;
///
/// let frame = decode_packet(&[0, 0, 0, 0, 0, 0, 0, 9, 0xFF]).unwrap();
/// assert_eq!(frame.timestamp(), 9);
/// assert_eq!(frame.payload(), &[0xFF]);
/// ```
pub fn decode_packet(bytes: &[u8]) -> Result<AudioFrame, ProtocolError> {
    if bytes.len() < HEADER_SIZE {
        return Err(ProtocolError::InsufficientData {
            needed: HEADER_SIZE,
            available: bytes.len(),
        });
    }
    let timestamp = read_timestamp(bytes);
    Ok(AudioFrame::new(timestamp, bytes[HEADER_SIZE..].to_vec()))
}

fn read_timestamp(bytes: &[u8]) -> u64 {
    let mut header = [0u8; HEADER_SIZE];
    header.copy_from_slice(&bytes[..HEADER_SIZE]);
    u64::from_be_bytes(header)
}

// ── Stream reassembly ─────────────────────────────────────────────────────────

/// Reassembles packets of a known, fixed payload size from a byte stream.
///
/// Feed it whatever chunks the socket returns with [`push`](Self::push) and
/// drain complete frames with [`next_frame`](Self::next_frame).  Partial
/// packets stay buffered until the rest arrives.
///
/// # Examples
///
/// ```rust
/// use audiosync_core::{encode_frame, AudioFrame, PacketDecoder};
///
/// let bytes = encode_frame(&AudioFrame::new(5, vec![1, 2, 3, 4]));
/// let mut decoder = PacketDecoder::new(4);
/// decoder.push(&bytes[..6]);
/// assert!(decoder.next_frame().is_none());
/// decoder.push(&bytes[6..]);
/// assert_eq!(decoder.next_frame().unwrap().timestamp(), 5);
/// ```
#[derive(Debug)]
pub struct PacketDecoder {
    payload_len: usize,
    buffer: Vec<u8>,
}

impl PacketDecoder {
    /// Creates a decoder for packets whose payload is `payload_len` bytes.
    pub fn new(payload_len: usize) -> Self {
        Self {
            payload_len,
            buffer: Vec::new(),
        }
    }

    /// Total size of one packet on the wire.
    pub fn packet_len(&self) -> usize {
        HEADER_SIZE + self.payload_len
    }

    /// Appends raw bytes read from the stream.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Number of buffered bytes not yet returned as a frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Removes and returns the next complete frame, if one is buffered.
    pub fn next_frame(&mut self) -> Option<AudioFrame> {
        let packet_len = self.packet_len();
        if self.buffer.len() < packet_len {
            return None;
        }
        let rest = self.buffer.split_off(packet_len);
        let packet = std::mem::replace(&mut self.buffer, rest);
        let timestamp = read_timestamp(&packet);
        Some(AudioFrame::new(timestamp, packet[HEADER_SIZE..].to_vec()))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
