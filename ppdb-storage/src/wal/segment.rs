//! WAL segment header and filename conventions (§4.4, §6).

use bytes::{Buf, BufMut, BytesMut};
use ppdb_core::{Error, Result};

/// `"PWAL"` read as a little-endian u32.
pub const MAGIC: u32 = 0x4C41_5750;

pub const WAL_FORMAT_VERSION: u32 = 1;

/// Segment header size on disk.
pub const SEGMENT_HEADER_SIZE: usize = 16;

/// Segment ids are zero-padded to 10 digits and never exceed this value.
pub const MAX_SEGMENT_ID: u64 = 1_000_000_000;

/// Maximum length, in bytes, of a joined WAL segment path (§6).
pub const MAX_PATH_LEN: usize = 512;

/// Formats a segment id as `%010u.log` (§6).
pub fn segment_filename(id: u64) -> String {
    format!("{:010}.log", id)
}

/// Parses a segment filename back into its numeric id. Returns `None` for
/// anything that doesn't match the `%010u.log` convention (e.g. files left
/// behind in the WAL directory by something else).
pub fn parse_segment_id(filename: &str) -> Option<u64> {
    let stem = filename.strip_suffix(".log")?;
    if stem.len() != 10 || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

/// The 16-byte little-endian header at the start of every segment file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    pub segment_size: u32,
}

impl SegmentHeader {
    pub fn new(segment_size: u32) -> Self {
        Self { segment_size }
    }

    pub fn encode(&self) -> [u8; SEGMENT_HEADER_SIZE] {
        let mut buf = BytesMut::with_capacity(SEGMENT_HEADER_SIZE);
        buf.put_u32_le(MAGIC);
        buf.put_u32_le(WAL_FORMAT_VERSION);
        buf.put_u32_le(self.segment_size);
        buf.put_u32_le(0); // reserved
        let mut out = [0u8; SEGMENT_HEADER_SIZE];
        out.copy_from_slice(&buf);
        out
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < SEGMENT_HEADER_SIZE {
            return Err(Error::Corrupted("segment header truncated".into()));
        }
        let mut cursor = data;
        let magic = cursor.get_u32_le();
        if magic != MAGIC {
            return Err(Error::Corrupted(format!("bad segment magic {:#x}", magic)));
        }
        let version = cursor.get_u32_le();
        if version != WAL_FORMAT_VERSION {
            return Err(Error::Corrupted(format!(
                "unsupported WAL version {version}"
            )));
        }
        let segment_size = cursor.get_u32_le();
        let _reserved = cursor.get_u32_le();
        Ok(Self { segment_size })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_round_trips() {
        let name = segment_filename(42);
        assert_eq!(name, "0000000042.log");
        assert_eq!(parse_segment_id(&name), Some(42));
    }

    #[test]
    fn header_round_trips() {
        let header = SegmentHeader::new(64 * 1024 * 1024);
        let encoded = header.encode();
        let decoded = SegmentHeader::decode(&encoded).unwrap();
        assert_eq!(header, decoded);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut encoded = SegmentHeader::new(100).encode();
        encoded[0] ^= 0xFF;
        assert!(matches!(
            SegmentHeader::decode(&encoded),
            Err(Error::Corrupted(_))
        ));
    }
}
