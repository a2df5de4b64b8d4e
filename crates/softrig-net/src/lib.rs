//! Wire formats for vehicle state: the fixed OOB header, the node delta
//! buffer, payload compression, remote-vehicle interpolation and the
//! `ROR2DV1` replay file.

pub mod compression;
pub mod interpolation;
pub mod node_buffer;
pub mod oob;
pub mod replay_file;
pub mod stream;

pub use compression::{CompressionConfig, CompressionError, PayloadFlag, compress_payload, decompress_payload};
pub use interpolation::{InterpolatedState, NetworkInterpolator};
pub use node_buffer::{NODE_DELTA_SCALE, NodeBufferLayout, decode_node_buffer, encode_node_buffer};
pub use oob::{NetEngineMode, NetMask, VehicleStateHeader};
pub use replay_file::{
    REPLAY_MAGIC, ReplayEntry, ReplayEntryKind, ReplayFileError, ReplayReader, ReplayWriter,
    RigDescriptor, WheelSetup,
};
pub use stream::{StreamError, StreamFrame, StreamRegistration, decode_stream_frame, encode_stream_frame};
