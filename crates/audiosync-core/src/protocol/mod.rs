//! Protocol module containing the audio packet codec.

pub mod packet;

pub use packet::{decode_packet, encode_frame, PacketDecoder, ProtocolError, HEADER_SIZE};
