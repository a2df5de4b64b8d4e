//! Conditional LZ4 compression of stream payloads.
//!
//! Every payload starts with one [`PayloadFlag`] byte. Node buffers above the
//! threshold are LZ4 blocks with their decoded size in front; small ones are
//! sent as they are.

use lz4_flex::{compress_prepend_size, decompress_size_prepended};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PayloadFlag {
    Raw = 0,
    Lz4 = 1,
}

impl TryFrom<u8> for PayloadFlag {
    type Error = CompressionError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0 => Ok(Self::Raw),
            1 => Ok(Self::Lz4),
            other => Err(CompressionError::UnknownFlag(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionConfig {
    /// Payloads shorter than this many bytes stay raw.
    pub threshold: usize,
    pub enabled: bool,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            threshold: 256,
            enabled: true,
        }
    }
}

impl CompressionConfig {
    fn flag_for(&self, len: usize) -> PayloadFlag {
        if self.enabled && len >= self.threshold {
            PayloadFlag::Lz4
        } else {
            PayloadFlag::Raw
        }
    }
}

pub fn compress_payload(data: &[u8], config: &CompressionConfig) -> Vec<u8> {
    let flag = config.flag_for(data.len());
    let body = match flag {
        PayloadFlag::Raw => std::borrow::Cow::Borrowed(data),
        PayloadFlag::Lz4 => std::borrow::Cow::Owned(compress_prepend_size(data)),
    };
    let mut out = Vec::with_capacity(body.len() + 1);
    out.push(flag as u8);
    out.extend_from_slice(&body);
    out
}

pub fn decompress_payload(data: &[u8]) -> Result<Vec<u8>, CompressionError> {
    let Some((&first, body)) = data.split_first() else {
        return Err(CompressionError::EmptyPayload);
    };
    match PayloadFlag::try_from(first)? {
        PayloadFlag::Raw => Ok(body.to_vec()),
        PayloadFlag::Lz4 => decompress_size_prepended(body).map_err(|e| CompressionError::Lz4(e.to_string())),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CompressionError {
    #[error("payload is empty")]
    EmptyPayload,
    #[error("corrupt LZ4 body: {0}")]
    Lz4(String),
    #[error("payload flag {0:#04x} is not recognised")]
    UnknownFlag(u8),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resting_deltas() -> Vec<u8> {
        [0x10u8, 0x00, 0xF0, 0xFF, 0x2C, 0x01].repeat(400)
    }

    #[test]
    fn test_short_buffer_goes_out_raw() {
        let payload = compress_payload(b"abc", &CompressionConfig::default());
        assert_eq!(payload, [0, b'a', b'b', b'c']);
    }

    #[test]
    fn test_resting_vehicle_compresses_well() {
        let deltas = resting_deltas();
        let payload = compress_payload(&deltas, &CompressionConfig::default());
        assert_eq!(payload[0], PayloadFlag::Lz4 as u8);
        assert!(payload.len() * 4 < deltas.len());
        assert_eq!(decompress_payload(&payload).unwrap(), deltas);
    }

    #[test]
    fn test_disabled_keeps_large_buffers_raw() {
        let config = CompressionConfig {
            enabled: false,
            ..CompressionConfig::default()
        };
        let deltas = resting_deltas();
        let payload = compress_payload(&deltas, &config);
        assert_eq!(payload.len(), deltas.len() + 1);
        assert_eq!(decompress_payload(&payload).unwrap(), deltas);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let config = CompressionConfig {
            threshold: 4,
            enabled: true,
        };
        assert_eq!(compress_payload(&[7; 3], &config)[0], PayloadFlag::Raw as u8);
        assert_eq!(compress_payload(&[7; 4], &config)[0], PayloadFlag::Lz4 as u8);
    }

    #[test]
    fn test_bad_payloads() {
        assert!(matches!(decompress_payload(&[]), Err(CompressionError::EmptyPayload)));
        assert!(matches!(decompress_payload(&[9, 1]), Err(CompressionError::UnknownFlag(9))));
        assert!(matches!(
            decompress_payload(&[1, 0x10, 0x00, 0x00, 0x00, 0xF0]),
            Err(CompressionError::Lz4(_))
        ));
    }
}
