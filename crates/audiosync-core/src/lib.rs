//! # audiosync-core
//!
//! Shared library for AudioSync containing the audio frame model, the wire
//! packet codec, and PCM sample helpers.
//!
//! This crate is used by the broadcast server and by any Rust receiver that
//! wants to decode the stream.  It has zero dependencies on OS APIs, audio
//! devices, UI frameworks, or network sockets.
//!
//! # Architecture overview (for beginners)
//!
//! AudioSync streams live audio from one machine to many listeners over TCP.
//! One audio source produces timestamped frames; the server encodes every frame
//! once and writes the same bytes to every connected client.
//!
//! This crate (`audiosync-core`) is the shared foundation.  It defines:
//!
//! - **`domain`** – The data that flows through the system: an [`AudioFrame`]
//!   (timestamp + PCM bytes) and the public view of a connected client.
//!
//! - **`protocol`** – How a frame travels over the network: an 8-byte
//!   big-endian timestamp followed by the raw payload, with no length prefix.
//!
//! - **`audio`** – Sample conversion (float → 16-bit big-endian) and the test
//!   tone synthesizer used by the server's test mode.

pub mod audio;
pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `audiosync_core::AudioFrame` instead of `audiosync_core::domain::frame::AudioFrame`.
pub use audio::{encode_f32_be, encode_i16_be, f32_to_i16, ToneSpec};
pub use domain::client::{ClientId, ClientInfo};
pub use domain::frame::AudioFrame;
pub use protocol::packet::{decode_packet, encode_frame, PacketDecoder, ProtocolError, HEADER_SIZE};
