//! # Encoding & Decoding
//!
//! The TCP response side builds length-prefixed payloads into a reusable
//! heap buffer (mesh payloads dwarf any fixed MTU); the UDP side casts
//! fixed-layout `Pod` bodies. Both directions enforce the 100 MB payload
//! cap.

use basalt_core::{Vec3, MAX_PAYLOAD_BYTES};
use basalt_mesh::{CollisionMesh, RenderMesh, FLOATS_PER_VERTEX};

use super::packets::{
    BlockBreakBody, Datagram, EntityUpdateBody, PlayerPositionBody, PositionAckBody,
    TcpPacketType, UdpPacketType,
};
use super::WireError;

/// Little-endian frame builder, reusable across responses.
#[derive(Debug, Default)]
pub struct FrameWriter {
    buf: Vec<u8>,
}

impl FrameWriter {
    /// Creates an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears the buffer for reuse, keeping its allocation.
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    /// Bytes written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True when nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// The written bytes.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Writes a single byte.
    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    /// Writes an `i32`, little-endian.
    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes an `f32`, little-endian.
    pub fn write_f32(&mut self, value: f32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Appends the render-mesh payload:
    /// `[i32 payload_len][i32 vertex_count][vertex_count * 7 * f32]`.
    pub fn write_render_payload(&mut self, mesh: &RenderMesh) -> Result<(), WireError> {
        let payload_len = 4 + mesh.data.len() * 4;
        if payload_len > MAX_PAYLOAD_BYTES {
            return Err(WireError::Oversized(payload_len));
        }
        self.write_i32(payload_len as i32);
        self.write_i32(mesh.vertex_count() as i32);
        for &value in &mesh.data {
            self.write_f32(value);
        }
        Ok(())
    }

    /// Appends the collision-mesh payload:
    /// `[i32 payload_len][i32 vertex_count][i32 index_count]`
    /// `[vertex_count * 3 * f32][index_count * i32]`.
    pub fn write_collision_payload(&mut self, mesh: &CollisionMesh) -> Result<(), WireError> {
        let payload_len = 8 + mesh.vertices.len() * 12 + mesh.indices.len() * 4;
        if payload_len > MAX_PAYLOAD_BYTES {
            return Err(WireError::Oversized(payload_len));
        }
        self.write_i32(payload_len as i32);
        self.write_i32(mesh.vertices.len() as i32);
        self.write_i32(mesh.indices.len() as i32);
        for v in &mesh.vertices {
            self.write_f32(v.x);
            self.write_f32(v.y);
            self.write_f32(v.z);
        }
        for &index in &mesh.indices {
            self.write_i32(index as i32);
        }
        Ok(())
    }
}

/// Encodes the full two-payload response to a `ChunkRequest`.
pub fn encode_chunk_response(
    render: &RenderMesh,
    collision: &CollisionMesh,
) -> Result<Vec<u8>, WireError> {
    let mut writer = FrameWriter::new();
    writer.write_render_payload(render)?;
    writer.write_collision_payload(collision)?;
    Ok(writer.buf)
}

/// Encodes the TCP block-break broadcast `[u8 1][i32 x][i32 y][i32 z]`.
#[must_use]
pub fn encode_block_break(x: i32, y: i32, z: i32) -> [u8; 13] {
    let mut out = [0u8; 13];
    out[0] = TcpPacketType::BlockBreak as u8;
    out[1..5].copy_from_slice(&x.to_le_bytes());
    out[5..9].copy_from_slice(&y.to_le_bytes());
    out[9..13].copy_from_slice(&z.to_le_bytes());
    out
}

/// Encodes an `EntityUpdate` datagram.
#[must_use]
pub fn encode_entity_update(body: &EntityUpdateBody) -> [u8; 38] {
    let mut out = [0u8; 38];
    out[0] = UdpPacketType::EntityUpdate as u8;
    out[1..].copy_from_slice(bytemuck::bytes_of(body));
    out
}

/// Encodes a `PositionAck` datagram.
#[must_use]
pub fn encode_position_ack(body: &PositionAckBody) -> [u8; 37] {
    let mut out = [0u8; 37];
    out[0] = UdpPacketType::PositionAck as u8;
    out[1..].copy_from_slice(bytemuck::bytes_of(body));
    out
}

/// Decodes one inbound datagram.
pub fn decode_datagram(data: &[u8]) -> Result<Datagram, WireError> {
    let Some((&type_byte, body)) = data.split_first() else {
        return Err(WireError::Truncated { expected: 1, actual: 0 });
    };
    let Some(packet_type) = UdpPacketType::from_u8(type_byte) else {
        return Err(WireError::UnknownPacket(type_byte));
    };

    match packet_type {
        UdpPacketType::PlayerPosition => Ok(Datagram::PlayerPosition(read_body(body)?)),
        UdpPacketType::PlayerInput => Ok(Datagram::PlayerInput),
        UdpPacketType::EntityUpdate => Ok(Datagram::EntityUpdate(read_body(body)?)),
        UdpPacketType::KeepAlive => Ok(Datagram::KeepAlive),
        UdpPacketType::PositionAck => Ok(Datagram::PositionAck(read_body(body)?)),
        UdpPacketType::BlockBreak => Ok(Datagram::BlockBreak(read_body(body)?)),
    }
}

/// Reads a fixed-layout body, rejecting short datagrams.
fn read_body<T: bytemuck::Pod>(body: &[u8]) -> Result<T, WireError> {
    let expected = std::mem::size_of::<T>();
    if body.len() < expected {
        return Err(WireError::Truncated {
            expected,
            actual: body.len(),
        });
    }
    Ok(bytemuck::pod_read_unaligned(&body[..expected]))
}

/// Reads an `i32` at `offset`, little-endian.
fn read_i32(data: &[u8], offset: usize) -> Result<i32, WireError> {
    let end = offset + 4;
    if data.len() < end {
        return Err(WireError::Truncated {
            expected: end,
            actual: data.len(),
        });
    }
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&data[offset..end]);
    Ok(i32::from_le_bytes(raw))
}

/// Reads an `f32` at `offset`, little-endian.
fn read_f32(data: &[u8], offset: usize) -> Result<f32, WireError> {
    Ok(f32::from_bits(read_i32(data, offset)? as u32))
}

/// Reads a length field, rejecting negative values.
fn read_len(data: &[u8], offset: usize) -> Result<usize, WireError> {
    usize::try_from(read_i32(data, offset)?).map_err(|_| WireError::Truncated {
        expected: offset + 4,
        actual: data.len(),
    })
}

/// Decodes a render-mesh payload (the client side of the protocol; the
/// integration tests consume responses through this).
pub fn decode_render_payload(data: &[u8]) -> Result<(RenderMesh, usize), WireError> {
    let payload_len = read_len(data, 0)?;
    if payload_len > MAX_PAYLOAD_BYTES {
        return Err(WireError::Oversized(payload_len));
    }
    let vertex_count = read_len(data, 4)?;
    let expected = 4 + payload_len;
    if payload_len != 4 + vertex_count * FLOATS_PER_VERTEX * 4 || data.len() < expected {
        return Err(WireError::Truncated {
            expected,
            actual: data.len(),
        });
    }

    let mut mesh = RenderMesh::default();
    mesh.data.reserve(vertex_count * FLOATS_PER_VERTEX);
    for i in 0..vertex_count * FLOATS_PER_VERTEX {
        mesh.data.push(read_f32(data, 8 + i * 4)?);
    }
    Ok((mesh, expected))
}

/// Decodes a collision-mesh payload. Returns the mesh and bytes consumed.
pub fn decode_collision_payload(data: &[u8]) -> Result<(CollisionMesh, usize), WireError> {
    let payload_len = read_len(data, 0)?;
    if payload_len > MAX_PAYLOAD_BYTES {
        return Err(WireError::Oversized(payload_len));
    }
    let vertex_count = read_len(data, 4)?;
    let index_count = read_len(data, 8)?;
    let expected = 4 + payload_len;
    if payload_len != 8 + vertex_count * 12 + index_count * 4 || data.len() < expected {
        return Err(WireError::Truncated {
            expected,
            actual: data.len(),
        });
    }

    let mut mesh = CollisionMesh::default();
    for i in 0..vertex_count {
        let base = 12 + i * 12;
        mesh.vertices.push(Vec3::new(
            read_f32(data, base)?,
            read_f32(data, base + 4)?,
            read_f32(data, base + 8)?,
        ));
    }
    let index_base = 12 + vertex_count * 12;
    for i in 0..index_count {
        mesh.indices.push(read_i32(data, index_base + i * 4)? as u32);
    }
    Ok((mesh, expected))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_meshes() -> (RenderMesh, CollisionMesh) {
        let render = RenderMesh {
            data: vec![
                0.0, 1.0, 2.0, 0.0, 1.0, 0.0, 3.0, //
                4.0, 5.0, 6.0, 0.0, 1.0, 0.0, 3.0, //
                7.0, 8.0, 9.0, 0.0, 1.0, 0.0, 3.0,
            ],
        };
        let collision = CollisionMesh {
            vertices: vec![
                Vec3::new(0.0, 1.0, 2.0),
                Vec3::new(4.0, 5.0, 6.0),
                Vec3::new(7.0, 8.0, 9.0),
            ],
            indices: vec![0, 1, 2],
        };
        (render, collision)
    }

    #[test]
    fn test_chunk_response_round_trip() {
        let (render, collision) = sample_meshes();
        let bytes = encode_chunk_response(&render, &collision).unwrap();

        let (decoded_render, consumed) = decode_render_payload(&bytes).unwrap();
        assert_eq!(decoded_render, render);

        let (decoded_collision, rest) = decode_collision_payload(&bytes[consumed..]).unwrap();
        assert_eq!(decoded_collision, collision);
        assert_eq!(consumed + rest, bytes.len());
    }

    #[test]
    fn test_empty_meshes_encode_as_valid_payloads() {
        let bytes =
            encode_chunk_response(&RenderMesh::default(), &CollisionMesh::default()).unwrap();
        // [len=4][count=0] + [len=8][vcount=0][icount=0]
        assert_eq!(bytes.len(), 8 + 12);

        let (render, consumed) = decode_render_payload(&bytes).unwrap();
        assert_eq!(render.vertex_count(), 0);
        let (collision, _) = decode_collision_payload(&bytes[consumed..]).unwrap();
        assert!(collision.is_empty());
    }

    #[test]
    fn test_block_break_layout() {
        let bytes = encode_block_break(16, -30, 2_000_000);
        assert_eq!(bytes[0], 1);
        assert_eq!(i32::from_le_bytes(bytes[1..5].try_into().unwrap()), 16);
        assert_eq!(i32::from_le_bytes(bytes[5..9].try_into().unwrap()), -30);
        assert_eq!(i32::from_le_bytes(bytes[9..13].try_into().unwrap()), 2_000_000);
    }

    #[test]
    fn test_datagram_round_trip() {
        let body = PlayerPositionBody {
            seq: 42,
            x: 1.5,
            y: 60.0,
            z: -3.25,
            vx: 0.1,
            vy: -9.8,
            vz: 0.0,
            yaw: 180.0,
            pitch: -15.0,
            flags: PlayerPositionBody::FLAG_GROUNDED,
        };

        let mut wire = vec![UdpPacketType::PlayerPosition as u8];
        wire.extend_from_slice(bytemuck::bytes_of(&body));
        assert_eq!(wire.len(), 38);

        match decode_datagram(&wire).unwrap() {
            Datagram::PlayerPosition(decoded) => {
                assert_eq!({ decoded.seq }, 42);
                assert_eq!({ decoded.y }, 60.0);
                assert!(decoded.is_grounded());
            }
            other => panic!("wrong variant {other:?}"),
        }
    }

    #[test]
    fn test_short_datagram_rejected() {
        let wire = [UdpPacketType::PlayerPosition as u8, 1, 2, 3];
        assert!(matches!(
            decode_datagram(&wire),
            Err(WireError::Truncated { .. })
        ));
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert_eq!(decode_datagram(&[99u8]), Err(WireError::UnknownPacket(99)));
        assert!(matches!(
            decode_datagram(&[]),
            Err(WireError::Truncated { .. })
        ));
    }

    #[test]
    fn test_keepalive_any_payload() {
        assert!(matches!(
            decode_datagram(&[UdpPacketType::KeepAlive as u8]),
            Ok(Datagram::KeepAlive)
        ));
        assert!(matches!(
            decode_datagram(&[UdpPacketType::KeepAlive as u8, 1, 2, 3, 4, 5]),
            Ok(Datagram::KeepAlive)
        ));
    }

    #[test]
    fn test_ack_encoding_layout() {
        let ack = PositionAckBody {
            acked_seq: 7,
            x: 1.0,
            ..Default::default()
        };
        let wire = encode_position_ack(&ack);
        assert_eq!(wire.len(), 37);
        assert_eq!(wire[0], 5);
        assert_eq!(u32::from_le_bytes(wire[1..5].try_into().unwrap()), 7);
        assert_eq!(f32::from_le_bytes(wire[5..9].try_into().unwrap()), 1.0);
    }

    #[test]
    fn test_oversized_payload_rejected_on_decode() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(200 * 1024 * 1024i32).to_le_bytes());
        bytes.extend_from_slice(&0i32.to_le_bytes());
        assert!(matches!(
            decode_render_payload(&bytes),
            Err(WireError::Oversized(_))
        ));
    }
}
