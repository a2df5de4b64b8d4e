//! `ROR2DV1` replay recordings.
//!
//! ```text
//! "ROR2DV1\0"                       8 bytes magic
//! rig count                         u32
//! per rig: len u32 + postcard(RigDescriptor)
//! entries until END:
//!   ReplayEntry header              16 bytes (type, rig_num, time_ms, phys_frame)
//!   FRAME / EVENT: len u32 + bytes  (FRAME carries an encoded node buffer)
//! ```

use std::io::{Read, Write};

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use static_assertions::assert_eq_size;

/// File magic, NUL padded to eight bytes.
pub const REPLAY_MAGIC: &[u8; 8] = b"ROR2DV1\0";

/// Largest payload accepted when reading, to reject corrupt lengths early.
const MAX_PAYLOAD: u32 = 64 * 1024 * 1024;

/// Wheel geometry needed to rebuild rims from angular positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WheelSetup {
    pub radius: f32,
    pub rim_nodes: u32,
}

/// Static description of one recorded vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigDescriptor {
    pub name: String,
    pub node_count: u32,
    pub beam_count: u32,
    pub wheels: Vec<WheelSetup>,
}

/// Record kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ReplayEntryKind {
    Null = 0,
    Frame = 1,
    Event = 2,
    End = 3,
}

impl ReplayEntryKind {
    fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Null),
            1 => Some(Self::Frame),
            2 => Some(Self::Event),
            3 => Some(Self::End),
            _ => None,
        }
    }

    fn has_payload(self) -> bool {
        matches!(self, Self::Frame | Self::Event)
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct RawEntryHeader {
    kind: u32,
    rig_num: i32,
    time_ms: u32,
    phys_frame: u32,
}

assert_eq_size!(RawEntryHeader, [u8; 16]);

/// One record of a replay file.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayEntry {
    pub kind: ReplayEntryKind,
    pub rig_num: i32,
    pub time_ms: u32,
    pub phys_frame: u32,
    pub payload: Vec<u8>,
}

/// Errors raised while reading or writing replay files.
#[derive(Debug, thiserror::Error)]
pub enum ReplayFileError {
    #[error("replay I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a ROR2DV1 replay file")]
    BadMagic,

    #[error("invalid rig descriptor: {0}")]
    Descriptor(#[source] postcard::Error),

    #[error("unknown replay entry type {0}")]
    UnknownEntryType(u32),

    #[error("replay payload of {0} bytes exceeds limit")]
    PayloadTooLarge(u32),

    #[error("entry references rig {rig} but file declares {count}")]
    UnknownRig { rig: i32, count: usize },
}

/// Streams entries into a replay file.
pub struct ReplayWriter<W: Write> {
    out: W,
    rig_count: usize,
    finished: bool,
}

impl<W: Write> ReplayWriter<W> {
    /// Write the file header and rig descriptors.
    pub fn new(mut out: W, rigs: &[RigDescriptor]) -> Result<Self, ReplayFileError> {
        out.write_all(REPLAY_MAGIC)?;
        out.write_all(&(rigs.len() as u32).to_le_bytes())?;
        for rig in rigs {
            let bytes = postcard::to_allocvec(rig).map_err(ReplayFileError::Descriptor)?;
            out.write_all(&(bytes.len() as u32).to_le_bytes())?;
            out.write_all(&bytes)?;
        }
        Ok(Self {
            out,
            rig_count: rigs.len(),
            finished: false,
        })
    }

    /// Append a node-buffer frame for `rig_num`.
    pub fn write_frame(
        &mut self,
        rig_num: i32,
        time_ms: u32,
        phys_frame: u32,
        node_buffer: &[u8],
    ) -> Result<(), ReplayFileError> {
        self.write_entry(ReplayEntryKind::Frame, rig_num, time_ms, phys_frame, node_buffer)
    }

    /// Append an opaque event record for `rig_num`.
    pub fn write_event(
        &mut self,
        rig_num: i32,
        time_ms: u32,
        phys_frame: u32,
        data: &[u8],
    ) -> Result<(), ReplayFileError> {
        self.write_entry(ReplayEntryKind::Event, rig_num, time_ms, phys_frame, data)
    }

    fn write_entry(
        &mut self,
        kind: ReplayEntryKind,
        rig_num: i32,
        time_ms: u32,
        phys_frame: u32,
        payload: &[u8],
    ) -> Result<(), ReplayFileError> {
        if kind != ReplayEntryKind::End && (rig_num < 0 || rig_num as usize >= self.rig_count) {
            return Err(ReplayFileError::UnknownRig {
                rig: rig_num,
                count: self.rig_count,
            });
        }
        let header = RawEntryHeader {
            kind: kind as u32,
            rig_num,
            time_ms,
            phys_frame,
        };
        self.out.write_all(bytemuck::bytes_of(&header))?;
        if kind.has_payload() {
            self.out.write_all(&(payload.len() as u32).to_le_bytes())?;
            self.out.write_all(payload)?;
        }
        Ok(())
    }

    /// Write the END record and flush; returns the inner writer.
    pub fn finish(mut self, time_ms: u32, phys_frame: u32) -> Result<W, ReplayFileError> {
        self.write_entry(ReplayEntryKind::End, -1, time_ms, phys_frame, &[])?;
        self.out.flush()?;
        self.finished = true;
        Ok(self.out)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Reads a replay file entry by entry.
pub struct ReplayReader<R: Read> {
    input: R,
    rigs: Vec<RigDescriptor>,
    done: bool,
}

impl<R: Read> ReplayReader<R> {
    pub fn new(mut input: R) -> Result<Self, ReplayFileError> {
        let mut magic = [0u8; 8];
        input.read_exact(&mut magic)?;
        if &magic != REPLAY_MAGIC {
            return Err(ReplayFileError::BadMagic);
        }
        let count = read_u32(&mut input)?;
        let mut rigs = Vec::with_capacity(count.min(1024) as usize);
        for _ in 0..count {
            let bytes = read_payload(&mut input)?;
            rigs.push(postcard::from_bytes(&bytes).map_err(ReplayFileError::Descriptor)?);
        }
        Ok(Self {
            input,
            rigs,
            done: false,
        })
    }

    pub fn rigs(&self) -> &[RigDescriptor] {
        &self.rigs
    }

    /// Next entry, or `None` after the END record.
    pub fn next_entry(&mut self) -> Result<Option<ReplayEntry>, ReplayFileError> {
        if self.done {
            return Ok(None);
        }
        let mut raw = [0u8; 16];
        self.input.read_exact(&mut raw)?;
        let header: RawEntryHeader = bytemuck::pod_read_unaligned(&raw);
        let kind = ReplayEntryKind::from_raw(header.kind)
            .ok_or(ReplayFileError::UnknownEntryType(header.kind))?;
        let payload = if kind.has_payload() {
            read_payload(&mut self.input)?
        } else {
            Vec::new()
        };
        if kind == ReplayEntryKind::End {
            self.done = true;
        }
        Ok(Some(ReplayEntry {
            kind,
            rig_num: header.rig_num,
            time_ms: header.time_ms,
            phys_frame: header.phys_frame,
            payload,
        }))
    }
}

fn read_u32<R: Read>(input: &mut R) -> Result<u32, ReplayFileError> {
    let mut buf = [0u8; 4];
    input.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_payload<R: Read>(input: &mut R) -> Result<Vec<u8>, ReplayFileError> {
    let len = read_u32(input)?;
    if len > MAX_PAYLOAD {
        return Err(ReplayFileError::PayloadTooLarge(len));
    }
    let mut bytes = vec![0u8; len as usize];
    input.read_exact(&mut bytes)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node_buffer::{NodeBufferLayout, decode_node_buffer, encode_node_buffer};
    use glam::Vec3;
    use std::io::Cursor;

    fn rigs() -> Vec<RigDescriptor> {
        vec![RigDescriptor {
            name: "cube".to_string(),
            node_count: 2,
            beam_count: 1,
            wheels: vec![WheelSetup {
                radius: 0.4,
                rim_nodes: 12,
            }],
        }]
    }

    #[test]
    fn test_file_layout_starts_with_magic() {
        let writer = ReplayWriter::new(Vec::new(), &rigs()).unwrap();
        let bytes = writer.finish(0, 0).unwrap();
        assert_eq!(&bytes[..7], b"ROR2DV1");
    }

    #[test]
    fn test_frames_and_events_read_back() {
        let mut buffer = Vec::new();
        encode_node_buffer(&[Vec3::new(0.0, 10.0, 0.0), Vec3::new(1.0, 10.0, 0.0)], &[0.25], &mut buffer);

        let mut writer = ReplayWriter::new(Vec::new(), &rigs()).unwrap();
        writer.write_frame(0, 0, 0, &buffer).unwrap();
        writer.write_event(0, 16, 32, b"beam_broken:3").unwrap();
        writer.write_frame(0, 33, 66, &buffer).unwrap();
        let bytes = writer.finish(50, 100).unwrap();

        let mut reader = ReplayReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.rigs(), rigs().as_slice());

        let first = reader.next_entry().unwrap().unwrap();
        assert_eq!(first.kind, ReplayEntryKind::Frame);
        let (positions, wheels) =
            decode_node_buffer(&first.payload, NodeBufferLayout::new(2, 1)).unwrap();
        assert_eq!(positions[0], Vec3::new(0.0, 10.0, 0.0));
        assert_eq!(wheels, vec![0.25]);

        let event = reader.next_entry().unwrap().unwrap();
        assert_eq!(event.kind, ReplayEntryKind::Event);
        assert_eq!(event.phys_frame, 32);
        assert_eq!(event.payload, b"beam_broken:3");

        let third = reader.next_entry().unwrap().unwrap();
        assert_eq!(third.time_ms, 33);
        let end = reader.next_entry().unwrap().unwrap();
        assert_eq!(end.kind, ReplayEntryKind::End);
        assert!(reader.next_entry().unwrap().is_none());
    }

    #[test]
    fn test_bad_magic() {
        let result = ReplayReader::new(Cursor::new(b"RORXXXX\0\0\0\0\0".to_vec()));
        assert!(matches!(result, Err(ReplayFileError::BadMagic)));
    }

    #[test]
    fn test_unknown_rig_rejected() {
        let mut writer = ReplayWriter::new(Vec::new(), &rigs()).unwrap();
        let err = writer.write_frame(3, 0, 0, &[]).unwrap_err();
        assert!(matches!(err, ReplayFileError::UnknownRig { rig: 3, count: 1 }));
    }

    #[test]
    fn test_truncated_file_is_io_error() {
        let mut writer = ReplayWriter::new(Vec::new(), &rigs()).unwrap();
        writer.write_frame(0, 0, 0, &[1, 2, 3, 4]).unwrap();
        let mut bytes = writer.finish(0, 0).unwrap();
        bytes.truncate(bytes.len() - 20);
        let mut reader = ReplayReader::new(Cursor::new(bytes)).unwrap();
        assert!(matches!(reader.next_entry(), Err(ReplayFileError::Io(_))));
    }

    #[test]
    fn test_writes_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.rorreplay");
        let file = std::fs::File::create(&path).unwrap();
        let writer = ReplayWriter::new(std::io::BufWriter::new(file), &rigs()).unwrap();
        writer.finish(0, 0).unwrap();
        let reader = ReplayReader::new(std::fs::File::open(&path).unwrap()).unwrap();
        assert_eq!(reader.rigs().len(), 1);
    }
}
