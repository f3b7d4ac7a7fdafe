//! # Packet Definitions
//!
//! Fixed-size bodies are `Pod` structs in `repr(C, packed)` layout so the
//! byte image *is* the wire format (no padding, field order as declared,
//! little-endian on every supported target). Each body excludes the
//! leading packet-type byte.

use bytemuck::{Pod, Zeroable};

/// Request types on the TCP stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum TcpPacketType {
    /// Client asks for one chunk's meshes. Body: `[i32 cx][i32 cy][i32 cz]`.
    ChunkRequest = 0,
    /// Client breaks a block. Body: `[i32 x][i32 y][i32 z]`.
    BlockBreak = 1,
}

impl TcpPacketType {
    /// Decodes the type byte.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::ChunkRequest),
            1 => Some(Self::BlockBreak),
            _ => None,
        }
    }
}

/// Packet types on the datagram bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum UdpPacketType {
    /// Client reports its state. 38 bytes total.
    PlayerPosition = 1,
    /// Reserved input channel; currently a no-op.
    PlayerInput = 2,
    /// Server tells a client about another player. 38 bytes total.
    EntityUpdate = 3,
    /// Echoed back verbatim, any payload.
    KeepAlive = 4,
    /// Server acknowledges (or corrects) a position. 37 bytes total.
    PositionAck = 5,
    /// Reserved; the TCP path is authoritative for edits. 13 bytes total.
    BlockBreak = 6,
}

impl UdpPacketType {
    /// Decodes the type byte.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::PlayerPosition),
            2 => Some(Self::PlayerInput),
            3 => Some(Self::EntityUpdate),
            4 => Some(Self::KeepAlive),
            5 => Some(Self::PositionAck),
            6 => Some(Self::BlockBreak),
            _ => None,
        }
    }
}

/// `PlayerPosition` body (37 bytes; 38 on the wire with the type byte).
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C, packed)]
pub struct PlayerPositionBody {
    /// Client sequence number.
    pub seq: u32,
    /// Position X.
    pub x: f32,
    /// Position Y.
    pub y: f32,
    /// Position Z.
    pub z: f32,
    /// Velocity X.
    pub vx: f32,
    /// Velocity Y.
    pub vy: f32,
    /// Velocity Z.
    pub vz: f32,
    /// View yaw in degrees.
    pub yaw: f32,
    /// View pitch in degrees.
    pub pitch: f32,
    /// Bit 0: grounded.
    pub flags: u8,
}

impl PlayerPositionBody {
    /// Body size in bytes.
    pub const SIZE: usize = 37;

    /// Grounded flag bit.
    pub const FLAG_GROUNDED: u8 = 1 << 0;

    /// True when the grounded bit is set.
    #[inline]
    #[must_use]
    pub const fn is_grounded(&self) -> bool {
        self.flags & Self::FLAG_GROUNDED != 0
    }
}

/// `EntityUpdate` body (37 bytes; 38 on the wire with the type byte).
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C, packed)]
pub struct EntityUpdateBody {
    /// Stable server-assigned player identity.
    pub player_id: u32,
    /// Position X.
    pub x: f32,
    /// Position Y.
    pub y: f32,
    /// Position Z.
    pub z: f32,
    /// Velocity X.
    pub vx: f32,
    /// Velocity Y.
    pub vy: f32,
    /// Velocity Z.
    pub vz: f32,
    /// View yaw in degrees.
    pub yaw: f32,
    /// View pitch in degrees.
    pub pitch: f32,
    /// 1 when grounded.
    pub grounded: u8,
}

impl EntityUpdateBody {
    /// Body size in bytes.
    pub const SIZE: usize = 37;
}

/// `PositionAck` body (36 bytes; 37 on the wire with the type byte).
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C, packed)]
pub struct PositionAckBody {
    /// Sequence number being acknowledged.
    pub acked_seq: u32,
    /// Server-accepted position X.
    pub x: f32,
    /// Server-accepted position Y.
    pub y: f32,
    /// Server-accepted position Z.
    pub z: f32,
    /// Server-accepted velocity X.
    pub vx: f32,
    /// Server-accepted velocity Y.
    pub vy: f32,
    /// Server-accepted velocity Z.
    pub vz: f32,
    /// Server-accepted yaw.
    pub yaw: f32,
    /// Server-accepted pitch.
    pub pitch: f32,
}

impl PositionAckBody {
    /// Body size in bytes.
    pub const SIZE: usize = 36;
}

/// `BlockBreak` body (12 bytes; 13 on the wire with the type byte).
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C, packed)]
pub struct BlockBreakBody {
    /// World voxel X.
    pub x: i32,
    /// World voxel Y.
    pub y: i32,
    /// World voxel Z.
    pub z: i32,
}

impl BlockBreakBody {
    /// Body size in bytes.
    pub const SIZE: usize = 12;
}

/// One decoded datagram.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Datagram {
    /// Client state report.
    PlayerPosition(PlayerPositionBody),
    /// Reserved input channel.
    PlayerInput,
    /// Another player's state (outbound; decoded for symmetry).
    EntityUpdate(EntityUpdateBody),
    /// Echo request; the bus reflects the raw bytes.
    KeepAlive,
    /// Position acknowledgement (outbound; decoded for symmetry).
    PositionAck(PositionAckBody),
    /// Reserved edit channel; ignored on ingest.
    BlockBreak(BlockBreakBody),
}
