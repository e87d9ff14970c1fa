//! PCM helpers shared by the audio sources.
//!
//! - **`pcm`**  – Converts floating-point samples to the 16-bit signed
//!   big-endian representation carried on the wire.
//! - **`tone`** – Renders the fixed sine tone emitted in test mode.

pub mod pcm;
pub mod tone;

pub use pcm::{encode_f32_be, encode_i16_be, f32_to_i16};
pub use tone::ToneSpec;
