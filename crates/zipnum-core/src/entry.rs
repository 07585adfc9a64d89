//! Secondary Index Entry
//!
//! This module defines `IndexEntry` - one line of the secondary (summary) index.
//!
//! ## What is an Index Entry?
//! A ZipNum cluster stores its CDX records in shards made of many independently
//! gzipped blocks. The secondary index holds one line per block:
//!
//! ```text
//! com,example)/ 20140101000000\tpart-00001.gz\t4096\t1830\t42
//! └──────────── key ─────────┘ └── shard ──┘ └off┘ └len┘ └line┘
//! ```
//!
//! - **key**: the first sort key stored in the block
//! - **shard**: which shard file holds the block
//! - **offset / length**: byte range of the gzip member inside the shard
//! - **line_number**: dense 0-based position of this line in the index, used
//!   for pagination math
//!
//! Lines are sorted by key, so the block that may contain a key `K` is the last
//! line whose key is `< K`.
//!
//! ## Example
//! ```ignore
//! let entry = IndexEntry::parse(b"com,example)/ 2014\tpart-00001.gz\t4096\t1830\t42")?;
//! assert_eq!(entry.shard, "part-00001.gz");
//! assert_eq!(entry.end_offset(), 4096 + 1830);
//! ```

use bytes::Bytes;

use crate::error::{Error, Result};

/// Number of tab-separated fields in a secondary index line.
const FIELD_COUNT: usize = 5;

/// A parsed secondary index line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// First sort key in the block
    pub key: Bytes,

    /// Shard identifier
    pub shard: String,

    /// Byte offset of the block within the shard
    pub offset: u64,

    /// Compressed length of the block in bytes (always > 0)
    pub length: u64,

    /// Position of this line within the secondary index
    pub line_number: u64,
}

impl IndexEntry {
    /// Parse one secondary index line (without its trailing newline).
    pub fn parse(line: &[u8]) -> Result<Self> {
        let fields: Vec<&[u8]> = line.split(|b| *b == b'\t').collect();
        if fields.len() != FIELD_COUNT {
            return Err(Error::malformed(
                line,
                format!("expected {} fields, found {}", FIELD_COUNT, fields.len()),
            ));
        }

        let shard = std::str::from_utf8(fields[1])
            .map_err(|_| Error::malformed(line, "shard id is not valid UTF-8"))?;
        if shard.is_empty() {
            return Err(Error::malformed(line, "empty shard id"));
        }

        let offset = parse_u64(line, fields[2], "offset")?;
        let length = parse_u64(line, fields[3], "length")?;
        let line_number = parse_u64(line, fields[4], "line number")?;

        if length == 0 {
            return Err(Error::malformed(line, "block length must be positive"));
        }
        if offset.checked_add(length).is_none() {
            return Err(Error::malformed(line, "byte range overflows"));
        }

        Ok(Self {
            key: Bytes::copy_from_slice(fields[0]),
            shard: shard.to_string(),
            offset,
            length,
            line_number,
        })
    }

    /// Byte position just past the end of this block
    ///
    /// Parsed entries never overflow; hand-built ones saturate.
    pub fn end_offset(&self) -> u64 {
        self.offset.saturating_add(self.length)
    }
}

fn parse_u64(line: &[u8], field: &[u8], name: &str) -> Result<u64> {
    std::str::from_utf8(field)
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .ok_or_else(|| Error::malformed(line, format!("invalid {}", name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_entry() {
        let entry =
            IndexEntry::parse(b"com,example)/ 20140101000000\tpart-00001.gz\t4096\t1830\t42")
                .unwrap();

        assert_eq!(entry.key, Bytes::from_static(b"com,example)/ 20140101000000"));
        assert_eq!(entry.shard, "part-00001.gz");
        assert_eq!(entry.offset, 4096);
        assert_eq!(entry.length, 1830);
        assert_eq!(entry.line_number, 42);
        assert_eq!(entry.end_offset(), 5926);
    }

    #[test]
    fn test_parse_wrong_field_count() {
        let err = IndexEntry::parse(b"com,example)/\tpart-00001.gz\t0\t10").unwrap_err();
        assert!(matches!(err, Error::MalformedEntry { .. }));
        assert!(err.to_string().contains("expected 5 fields, found 4"));
    }

    #[test]
    fn test_parse_bad_numbers() {
        for line in [
            &b"k\tshard\tabc\t10\t0"[..],
            b"k\tshard\t0\t-5\t0",
            b"k\tshard\t0\t10\tline",
        ] {
            let err = IndexEntry::parse(line).unwrap_err();
            assert!(matches!(err, Error::MalformedEntry { .. }), "{:?}", err);
        }
    }

    #[test]
    fn test_parse_zero_length() {
        let err = IndexEntry::parse(b"k\tshard\t0\t0\t0").unwrap_err();
        assert!(err.to_string().contains("positive"));
    }

    #[test]
    fn test_parse_overflowing_range() {
        let err = IndexEntry::parse(b"k1\tpart-0\t18446744073709551600\t100\t0").unwrap_err();
        assert!(matches!(err, Error::MalformedEntry { .. }));
        assert!(err.to_string().contains("byte range overflows"));

        // The last representable range is still accepted
        let entry = IndexEntry::parse(b"k1\tpart-0\t18446744073709551515\t100\t0").unwrap();
        assert_eq!(entry.end_offset(), u64::MAX);
    }

    #[test]
    fn test_parse_empty_shard() {
        assert!(IndexEntry::parse(b"k\t\t0\t10\t0").is_err());
    }
}
