//! Node position buffer codec.
//!
//! Node 0 travels as three `f32`; every other node as three `i16` offsets
//! from node 0 in units of `1/300 m`; wheel angular positions follow as
//! `f32`. All values are little-endian.

use glam::Vec3;

use crate::stream::StreamError;

/// Delta quantisation, steps per metre.
pub const NODE_DELTA_SCALE: f32 = 300.0;

/// Declared shape of a vehicle's node buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeBufferLayout {
    pub node_count: usize,
    pub wheel_count: usize,
}

impl NodeBufferLayout {
    pub fn new(node_count: usize, wheel_count: usize) -> Self {
        Self {
            node_count,
            wheel_count,
        }
    }

    /// Encoded size in bytes.
    pub fn byte_len(&self) -> usize {
        if self.node_count == 0 {
            return self.wheel_count * 4;
        }
        12 + (self.node_count - 1) * 6 + self.wheel_count * 4
    }
}

/// Append the encoded buffer to `out`.
///
/// Deltas beyond the `i16` range saturate; such vehicles are larger than
/// the format supports.
pub fn encode_node_buffer(positions: &[Vec3], wheel_rotations: &[f32], out: &mut Vec<u8>) {
    if let Some((&reference, rest)) = positions.split_first() {
        for c in reference.to_array() {
            out.extend_from_slice(&c.to_le_bytes());
        }
        for p in rest {
            let delta = (*p - reference) * NODE_DELTA_SCALE;
            for c in delta.to_array() {
                let q = c.clamp(i16::MIN as f32, i16::MAX as f32) as i16;
                out.extend_from_slice(&q.to_le_bytes());
            }
        }
    }
    for rp in wheel_rotations {
        out.extend_from_slice(&rp.to_le_bytes());
    }
}

/// Decode a buffer that must match `layout` exactly.
pub fn decode_node_buffer(
    bytes: &[u8],
    layout: NodeBufferLayout,
) -> Result<(Vec<Vec3>, Vec<f32>), StreamError> {
    let expected = layout.byte_len();
    if bytes.len() != expected {
        return Err(StreamError::SizeMismatch {
            expected,
            actual: bytes.len(),
        });
    }

    let mut cursor = 0usize;
    let mut read4 = |bytes: &[u8]| {
        let v = [
            bytes[cursor],
            bytes[cursor + 1],
            bytes[cursor + 2],
            bytes[cursor + 3],
        ];
        cursor += 4;
        v
    };

    let mut positions = Vec::with_capacity(layout.node_count);
    if layout.node_count > 0 {
        let x = f32::from_le_bytes(read4(bytes));
        let y = f32::from_le_bytes(read4(bytes));
        let z = f32::from_le_bytes(read4(bytes));
        let reference = Vec3::new(x, y, z);
        positions.push(reference);

        let deltas = &bytes[12..12 + (layout.node_count - 1) * 6];
        for chunk in deltas.chunks_exact(6) {
            let dx = i16::from_le_bytes([chunk[0], chunk[1]]) as f32;
            let dy = i16::from_le_bytes([chunk[2], chunk[3]]) as f32;
            let dz = i16::from_le_bytes([chunk[4], chunk[5]]) as f32;
            positions.push(reference + Vec3::new(dx, dy, dz) / NODE_DELTA_SCALE);
        }
    }

    let wheel_start = expected - layout.wheel_count * 4;
    let wheels = bytes[wheel_start..]
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    Ok((positions, wheels))
}
