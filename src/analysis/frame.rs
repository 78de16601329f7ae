//! Binary Frame Metadata Extraction
//!
//! Best-effort parsing of the fixed-offset telemetry frame header that
//! prefixes well-formed submissions. Parsing is deliberately tolerant:
//! malformed or truncated input yields a `parse_error` marker in the
//! metadata map instead of an error, because metadata extraction must never
//! abort a pipeline run.

use crate::types::{MetaValue, MetadataMap};

/// Fixed big-endian frame header layout.
///
/// ```text
/// offset  size  field
///      0     4  magic       (u32)
///      4     2  version     (u16)
///      6     2  flags       (u16)
///      8     8  timestamp   (f64, seconds since epoch)
///     16     8  device_id   (u64)
///     24     4  seq_num     (u32)
/// ```
#[derive(Debug, Clone, Copy)]
pub struct FrameSchema {
    /// Expected magic value, checked when set.
    pub expected_magic: Option<u32>,
}

/// Minimum bytes required for one complete frame header.
pub const FRAME_HEADER_SIZE: usize = 28;

impl Default for FrameSchema {
    fn default() -> Self {
        Self {
            expected_magic: None,
        }
    }
}

impl FrameSchema {
    /// Extract frame header fields into a metadata map.
    ///
    /// Never fails: short input or a magic mismatch produces a map holding
    /// only a `parse_error: true` marker.
    pub fn extract(&self, data: &[u8]) -> MetadataMap {
        let mut map = MetadataMap::new();

        if data.len() < FRAME_HEADER_SIZE {
            map.insert("parse_error".into(), MetaValue::Bool(true));
            return map;
        }

        let magic = read_u32(data, 0);
        if let Some(expected) = self.expected_magic {
            if magic != expected {
                map.insert("parse_error".into(), MetaValue::Bool(true));
                return map;
            }
        }

        map.insert("magic".into(), MetaValue::Unsigned(magic as u64));
        map.insert(
            "version".into(),
            MetaValue::Unsigned(read_u16(data, 4) as u64),
        );
        map.insert(
            "flags".into(),
            MetaValue::Unsigned(read_u16(data, 6) as u64),
        );
        map.insert("timestamp".into(), MetaValue::Float(read_f64(data, 8)));
        map.insert(
            "device_id".into(),
            MetaValue::Unsigned(read_u64(data, 16)),
        );
        map.insert(
            "seq_num".into(),
            MetaValue::Unsigned(read_u32(data, 24) as u64),
        );
        map
    }
}

fn read_u16(data: &[u8], offset: usize) -> u16 {
    let mut buf = [0u8; 2];
    buf.copy_from_slice(&data[offset..offset + 2]);
    u16::from_be_bytes(buf)
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&data[offset..offset + 4]);
    u32::from_be_bytes(buf)
}

fn read_u64(data: &[u8], offset: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&data[offset..offset + 8]);
    u64::from_be_bytes(buf)
}

fn read_f64(data: &[u8], offset: usize) -> f64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&data[offset..offset + 8]);
    f64::from_be_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a valid 28-byte frame header followed by `payload_len` bytes.
    fn sample_frame(magic: u32, payload_len: usize) -> Vec<u8> {
        let mut buf = Vec::with_capacity(FRAME_HEADER_SIZE + payload_len);
        buf.extend_from_slice(&magic.to_be_bytes());
        buf.extend_from_slice(&3u16.to_be_bytes()); // version
        buf.extend_from_slice(&0x0001u16.to_be_bytes()); // flags
        buf.extend_from_slice(&1_700_000_000.5f64.to_be_bytes()); // timestamp
        buf.extend_from_slice(&0xDEAD_BEEF_u64.to_be_bytes()); // device_id
        buf.extend_from_slice(&42u32.to_be_bytes()); // seq_num
        buf.extend(std::iter::repeat(0xAA).take(payload_len));
        buf
    }

    #[test]
    fn extracts_all_header_fields() {
        let frame = sample_frame(0x1234_5678, 64);
        let map = FrameSchema::default().extract(&frame);

        assert_eq!(map.get("magic"), Some(&MetaValue::Unsigned(0x1234_5678)));
        assert_eq!(map.get("version"), Some(&MetaValue::Unsigned(3)));
        assert_eq!(map.get("seq_num"), Some(&MetaValue::Unsigned(42)));
        assert_eq!(
            map.get("device_id"),
            Some(&MetaValue::Unsigned(0xDEAD_BEEF))
        );
        assert!(map.get("parse_error").is_none());
    }

    #[test]
    fn short_input_yields_marker_not_error() {
        let map = FrameSchema::default().extract(&[0x01, 0x02, 0x03]);
        assert_eq!(map.get("parse_error"), Some(&MetaValue::Bool(true)));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn magic_mismatch_yields_marker() {
        let frame = sample_frame(0x0BAD_CAFE, 0);
        let schema = FrameSchema {
            expected_magic: Some(0x1234_5678),
        };
        let map = schema.extract(&frame);
        assert_eq!(map.get("parse_error"), Some(&MetaValue::Bool(true)));
    }
}
