//! Block Fetch Descriptors
//!
//! `ZipBlocks` describes one byte-range request against a shard. It covers one
//! or more gzip blocks that were compressed independently but happen to sit
//! next to each other in the shard, so they can be fetched with a single I/O
//! call and split apart again before decompression.
//!
//! ```text
//! shard part-00001.gz
//! ┌────────┬──────┬──────────┐
//! │ blk 7  │ blk 8│  blk 9   │
//! └────────┴──────┴──────────┘
//! offset=100   length = 50 + 30 + 70
//! ranges = [50, 30, 70], count = 3
//! ```

use crate::entry::IndexEntry;

/// A coalesced fetch over byte-adjacent blocks of one shard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipBlocks {
    /// Shard identifier
    pub shard: String,

    /// Start of the first block
    pub offset: u64,

    /// Total length of all blocks
    pub length: u64,

    /// Length of each original block, in shard order
    pub ranges: Vec<u64>,
}

impl ZipBlocks {
    /// Start a descriptor from a single index entry.
    pub fn from_entry(entry: &IndexEntry) -> Self {
        Self {
            shard: entry.shard.clone(),
            offset: entry.offset,
            length: entry.length,
            ranges: vec![entry.length],
        }
    }

    /// Number of original blocks covered
    pub fn count(&self) -> usize {
        self.ranges.len()
    }

    /// Byte position just past the last block, `None` if it overflows
    pub fn end_offset(&self) -> Option<u64> {
        self.offset.checked_add(self.length)
    }

    /// Whether `entry` starts exactly where this descriptor ends in the same
    /// shard, with the combined range still representable.
    pub fn is_contiguous(&self, entry: &IndexEntry) -> bool {
        self.shard == entry.shard
            && self.end_offset() == Some(entry.offset)
            && entry.offset.checked_add(entry.length).is_some()
    }

    /// Append `entry` as another block. Returns false, leaving the descriptor
    /// unchanged, if the combined length would overflow.
    pub fn push(&mut self, entry: &IndexEntry) -> bool {
        match self.length.checked_add(entry.length) {
            Some(length) => {
                self.length = length;
                self.ranges.push(entry.length);
                true
            }
            None => false,
        }
    }
}
