//! Vehicle stream frames: OOB header followed by the node buffer, wrapped in
//! the compression envelope.
//!
//! A sender first announces a [`StreamRegistration`] so receivers know the
//! buffer layout; every later frame must match it byte for byte.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::compression::{CompressionConfig, CompressionError, compress_payload, decompress_payload};
use crate::node_buffer::{NodeBufferLayout, decode_node_buffer, encode_node_buffer};
use crate::oob::VehicleStateHeader;

/// Announcement of a streamed vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamRegistration {
    pub name: String,
    pub node_count: u32,
    pub wheel_count: u32,
}

impl StreamRegistration {
    pub fn layout(&self) -> NodeBufferLayout {
        NodeBufferLayout::new(self.node_count as usize, self.wheel_count as usize)
    }

    /// Size of an uncompressed frame for this vehicle.
    pub fn frame_size(&self) -> usize {
        VehicleStateHeader::SIZE + self.layout().byte_len()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, StreamError> {
        postcard::to_allocvec(self).map_err(StreamError::Registration)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StreamError> {
        postcard::from_bytes(bytes).map_err(StreamError::Registration)
    }
}

/// One decoded vehicle state.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamFrame {
    pub header: VehicleStateHeader,
    pub positions: Vec<Vec3>,
    pub wheel_rotations: Vec<f32>,
}

/// Errors raised while decoding stream data.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The payload does not match the declared layout.
    #[error("stream buffer size {actual} does not match declared {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error(transparent)]
    Compression(#[from] CompressionError),

    #[error("invalid stream registration: {0}")]
    Registration(#[source] postcard::Error),
}

/// Encode `frame` into a wire payload.
pub fn encode_stream_frame(frame: &StreamFrame, config: &CompressionConfig) -> Vec<u8> {
    let layout = NodeBufferLayout::new(frame.positions.len(), frame.wheel_rotations.len());
    let mut raw = Vec::with_capacity(VehicleStateHeader::SIZE + layout.byte_len());
    raw.extend_from_slice(frame.header.as_bytes());
    encode_node_buffer(&frame.positions, &frame.wheel_rotations, &mut raw);
    compress_payload(&raw, config)
}

/// Decode a wire payload that must match `layout`.
pub fn decode_stream_frame(
    payload: &[u8],
    layout: NodeBufferLayout,
) -> Result<StreamFrame, StreamError> {
    let raw = decompress_payload(payload)?;
    let expected = VehicleStateHeader::SIZE + layout.byte_len();
    if raw.len() != expected {
        tracing::debug!(expected, actual = raw.len(), "stream frame size mismatch");
        return Err(StreamError::SizeMismatch {
            expected,
            actual: raw.len(),
        });
    }
    let header = VehicleStateHeader::read_from(&raw).ok_or(StreamError::SizeMismatch {
        expected,
        actual: raw.len(),
    })?;
    let (positions, wheel_rotations) =
        decode_node_buffer(&raw[VehicleStateHeader::SIZE..], layout)?;
    Ok(StreamFrame {
        header,
        positions,
        wheel_rotations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oob::NetMask;

    fn sample_frame(nodes: usize) -> StreamFrame {
        StreamFrame {
            header: VehicleStateHeader {
                time: 4200,
                engine_speed: 2500.0,
                engine_force: 0.75,
                engine_clutch: 1.0,
                engine_gear: 3,
                hydrodirstate: -0.4,
                brake: 0.0,
                wheelspeed: 17.5,
                flagmask: (NetMask::LIGHTS | NetMask::ENGINE_RUN | NetMask::ENGINE_MODE_AUTOMATIC).0,
            },
            positions: (0..nodes)
                .map(|i| Vec3::new(10.0 + i as f32 * 0.1, 2.0, -5.0))
                .collect(),
            wheel_rotations: vec![1.5, 1.6],
        }
    }

    #[test]
    fn test_header_fields_survive_exactly() {
        let frame = sample_frame(120);
        let payload = encode_stream_frame(&frame, &CompressionConfig::default());
        let decoded = decode_stream_frame(&payload, NodeBufferLayout::new(120, 2)).unwrap();
        assert_eq!(decoded.header, frame.header);
        assert_eq!(decoded.wheel_rotations, frame.wheel_rotations);
        assert_eq!(decoded.positions[0], frame.positions[0]);
    }

    #[test]
    fn test_wrong_layout_is_size_mismatch() {
        let frame = sample_frame(10);
        let payload = encode_stream_frame(&frame, &CompressionConfig::default());
        let err = decode_stream_frame(&payload, NodeBufferLayout::new(11, 2)).unwrap_err();
        assert!(matches!(err, StreamError::SizeMismatch { .. }));
    }

    #[test]
    fn test_registration_bytes() {
        let reg = StreamRegistration {
            name: "pickup".to_string(),
            node_count: 120,
            wheel_count: 2,
        };
        let back = StreamRegistration::from_bytes(&reg.to_bytes().unwrap()).unwrap();
        assert_eq!(back, reg);
        assert_eq!(reg.frame_size(), 36 + 12 + 119 * 6 + 8);
    }

    #[test]
    fn test_garbage_registration() {
        assert!(matches!(
            StreamRegistration::from_bytes(&[0xFF]),
            Err(StreamError::Registration(_))
        ));
    }
}
