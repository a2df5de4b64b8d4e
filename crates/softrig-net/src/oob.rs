//! Fixed-size out-of-band vehicle state header.
//!
//! ```text
//! offset  field           type
//!  0      time            i32   (ms)
//!  4      engine_speed    f32   (rpm)
//!  8      engine_force    f32   (accelerator 0..1)
//! 12      engine_clutch   f32
//! 16      engine_gear     i32
//! 20      hydrodirstate   f32
//! 24      brake           f32
//! 28      wheelspeed      f32   (m/s)
//! 32      flagmask        u32   (see [`NetMask`])
//! ```
//!
//! The layout is kept byte-compatible with existing streams, so the struct
//! is `#[repr(C)]` and cast directly with `bytemuck`.

use bytemuck::{Pod, Zeroable};
use static_assertions::assert_eq_size;

/// Header sent in front of every node buffer.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct VehicleStateHeader {
    pub time: i32,
    pub engine_speed: f32,
    pub engine_force: f32,
    pub engine_clutch: f32,
    pub engine_gear: i32,
    pub hydrodirstate: f32,
    pub brake: f32,
    pub wheelspeed: f32,
    pub flagmask: u32,
}

assert_eq_size!(VehicleStateHeader, [u8; 36]);

impl VehicleStateHeader {
    /// Size of the encoded header in bytes.
    pub const SIZE: usize = std::mem::size_of::<VehicleStateHeader>();

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    /// Read a header from the start of `bytes`; `None` if too short.
    pub fn read_from(bytes: &[u8]) -> Option<Self> {
        let head = bytes.get(..Self::SIZE)?;
        Some(bytemuck::pod_read_unaligned(head))
    }

    pub fn flags(&self) -> NetMask {
        NetMask(self.flagmask)
    }
}

const fn bit(x: u32) -> u32 {
    1 << (x - 1)
}

/// Flag bits carried in [`VehicleStateHeader::flagmask`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct NetMask(pub u32);

impl NetMask {
    pub const HORN: NetMask = NetMask(bit(1));
    pub const LIGHTS: NetMask = NetMask(bit(2));
    pub const BRAKES: NetMask = NetMask(bit(3));
    pub const REVERSE: NetMask = NetMask(bit(4));
    pub const BEACONS: NetMask = NetMask(bit(5));
    pub const BLINK_LEFT: NetMask = NetMask(bit(6));
    pub const BLINK_RIGHT: NetMask = NetMask(bit(7));
    pub const BLINK_WARN: NetMask = NetMask(bit(8));
    pub const CLIGHT1: NetMask = NetMask(bit(9));
    pub const CLIGHT2: NetMask = NetMask(bit(10));
    pub const CLIGHT3: NetMask = NetMask(bit(11));
    pub const CLIGHT4: NetMask = NetMask(bit(12));
    pub const POLICEAUDIO: NetMask = NetMask(bit(13));
    pub const PARTICLE: NetMask = NetMask(bit(14));
    pub const PBRAKE: NetMask = NetMask(bit(15));
    pub const TC_ACTIVE: NetMask = NetMask(bit(16));
    pub const ALB_ACTIVE: NetMask = NetMask(bit(17));
    pub const ENGINE_CONT: NetMask = NetMask(bit(18));
    pub const ENGINE_RUN: NetMask = NetMask(bit(19));
    pub const ENGINE_MODE_AUTOMATIC: NetMask = NetMask(bit(20));
    pub const ENGINE_MODE_SEMIAUTO: NetMask = NetMask(bit(21));
    pub const ENGINE_MODE_MANUAL: NetMask = NetMask(bit(22));
    pub const ENGINE_MODE_MANUAL_STICK: NetMask = NetMask(bit(23));
    pub const ENGINE_MODE_MANUAL_RANGES: NetMask = NetMask(bit(24));

    pub const fn empty() -> Self {
        NetMask(0)
    }

    pub const fn contains(self, other: NetMask) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: NetMask) {
        self.0 |= other.0;
    }

    pub fn set(&mut self, other: NetMask, on: bool) {
        if on {
            self.0 |= other.0;
        } else {
            self.0 &= !other.0;
        }
    }

    /// Engine mode encoded in the mask. When several mode bits are set the
    /// first one in the order automatic, semi-auto, manual, stick, ranges
    /// wins.
    pub fn engine_mode(self) -> Option<NetEngineMode> {
        NetEngineMode::ALL
            .into_iter()
            .find(|mode| self.contains(mode.mask()))
    }
}

impl std::ops::BitOr for NetMask {
    type Output = NetMask;

    fn bitor(self, rhs: NetMask) -> NetMask {
        NetMask(self.0 | rhs.0)
    }
}

/// Gearbox mode as transported in the flag mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NetEngineMode {
    Automatic,
    SemiAuto,
    Manual,
    ManualStick,
    ManualRanges,
}

impl NetEngineMode {
    /// Decode priority order.
    pub const ALL: [NetEngineMode; 5] = [
        NetEngineMode::Automatic,
        NetEngineMode::SemiAuto,
        NetEngineMode::Manual,
        NetEngineMode::ManualStick,
        NetEngineMode::ManualRanges,
    ];

    pub const fn mask(self) -> NetMask {
        match self {
            NetEngineMode::Automatic => NetMask::ENGINE_MODE_AUTOMATIC,
            NetEngineMode::SemiAuto => NetMask::ENGINE_MODE_SEMIAUTO,
            NetEngineMode::Manual => NetMask::ENGINE_MODE_MANUAL,
            NetEngineMode::ManualStick => NetMask::ENGINE_MODE_MANUAL_STICK,
            NetEngineMode::ManualRanges => NetMask::ENGINE_MODE_MANUAL_RANGES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_field_offsets() {
        let header = VehicleStateHeader {
            time: 1234,
            engine_gear: -1,
            flagmask: 0xDEAD_BEEF,
            ..Default::default()
        };
        let bytes = header.as_bytes();
        assert_eq!(bytes.len(), 36);
        assert_eq!(&bytes[0..4], &1234i32.to_le_bytes());
        assert_eq!(&bytes[16..20], &(-1i32).to_le_bytes());
        assert_eq!(&bytes[32..36], &0xDEAD_BEEFu32.to_le_bytes());
    }

    #[test]
    fn test_header_read_from_unaligned() {
        let header = VehicleStateHeader {
            time: 99,
            engine_speed: 812.5,
            brake: 0.25,
            wheelspeed: 13.0,
            ..Default::default()
        };
        let mut buf = vec![0u8];
        buf.extend_from_slice(header.as_bytes());
        assert_eq!(VehicleStateHeader::read_from(&buf[1..]), Some(header));
        assert_eq!(VehicleStateHeader::read_from(&buf[..10]), None);
    }

    #[test]
    fn test_flag_bit_positions() {
        assert_eq!(NetMask::HORN.0, 1);
        assert_eq!(NetMask::LIGHTS.0, 2);
        assert_eq!(NetMask::ENGINE_RUN.0, 1 << 18);
        assert_eq!(NetMask::ENGINE_MODE_MANUAL_RANGES.0, 1 << 23);
    }

    #[test]
    fn test_engine_mode_first_bit_wins() {
        let mask = NetMask::ENGINE_MODE_MANUAL | NetMask::ENGINE_MODE_SEMIAUTO | NetMask::LIGHTS;
        assert_eq!(mask.engine_mode(), Some(NetEngineMode::SemiAuto));
        assert_eq!(NetMask::HORN.engine_mode(), None);
    }

    #[test]
    fn test_set_and_clear() {
        let mut mask = NetMask::empty();
        mask.set(NetMask::PBRAKE, true);
        mask.insert(NetMask::ALB_ACTIVE);
        assert!(mask.contains(NetMask::PBRAKE | NetMask::ALB_ACTIVE));
        mask.set(NetMask::PBRAKE, false);
        assert!(!mask.contains(NetMask::PBRAKE));
    }
}
