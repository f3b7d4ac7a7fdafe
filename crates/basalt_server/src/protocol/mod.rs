//! # Wire Protocol
//!
//! All multi-byte fields are little-endian. The TCP side is a framed
//! request stream with length-prefixed mesh payload responses; the UDP
//! side is fixed-layout datagrams.

mod codec;
mod packets;

pub use codec::{
    decode_collision_payload, decode_datagram, decode_render_payload, encode_block_break,
    encode_chunk_response, encode_entity_update, encode_position_ack, FrameWriter,
};
pub use packets::{
    BlockBreakBody, Datagram, EntityUpdateBody, PlayerPositionBody, PositionAckBody,
    TcpPacketType, UdpPacketType,
};

/// Wire-level failure.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WireError {
    /// The packet type byte names nothing we know.
    #[error("unknown packet type {0}")]
    UnknownPacket(u8),

    /// The payload ended before its declared length.
    #[error("truncated payload: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Bytes the layout requires.
        expected: usize,
        /// Bytes present.
        actual: usize,
    },

    /// A length prefix exceeded the 100 MB payload cap.
    #[error("payload of {0} bytes exceeds the cap")]
    Oversized(usize),
}
