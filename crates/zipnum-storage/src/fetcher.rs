//! Block Fetching and Decoding
//!
//! Turns a [`ZipBlocks`] descriptor into the CDX records it holds within the
//! query range.
//!
//! ## Fetch
//!
//! ```text
//! ZipBlocks { shard: part-00001.gz, offset: 100, length: 80, ranges: [50, 30] }
//!     ↓ resolve
//! [/mnt/cdx/part-00001.gz, http://mirror/cdx/part-00001.gz]
//!     ↓ try in order until one range read succeeds
//! 80 bytes
//! ```
//!
//! A failed candidate is logged and the next one is tried. Only the range read
//! is retried: resolution errors and decode errors are final.
//!
//! ## Decode
//!
//! The fetched bytes are split at the original block boundaries (`ranges`) and
//! each chunk is decompressed as its own gzip member, one chunk at a time and
//! only when the previous one is used up. Lines sorting before `key` are
//! skipped; the first line at or past `end_key` ends the iterator, so chunks
//! past the range are never decompressed.

use bytes::Bytes;
use flate2::read::GzDecoder;
use std::io::Read;
use std::sync::Arc;
use zipnum_core::ZipBlocks;

use crate::error::{Error, Result};
use crate::loader::BlockLoader;
use crate::resolver::ShardLookup;

/// Fetches coalesced blocks from the first reachable shard location
#[derive(Clone)]
pub struct BlockFetcher {
    loader: Arc<dyn BlockLoader>,
}

impl BlockFetcher {
    pub fn new(loader: Arc<dyn BlockLoader>) -> Self {
        Self { loader }
    }

    /// Read the raw bytes of `blocks`, trying each candidate location in order.
    pub async fn fetch(&self, lookup: &dyn ShardLookup, blocks: &ZipBlocks) -> Result<Bytes> {
        let locations = lookup.resolve(&blocks.shard)?;
        let mut last_error = None;

        for location in &locations {
            tracing::debug!(
                shard = %blocks.shard,
                location = %location,
                offset = blocks.offset,
                length = blocks.length,
                "Loading {} blocks",
                blocks.count()
            );

            match self.loader.load(location, blocks.offset, blocks.length).await {
                Ok(data) => return Ok(data),
                Err(e) => {
                    tracing::warn!(
                        shard = %blocks.shard,
                        location = %location,
                        error = %e,
                        "Failed to load blocks, trying next location"
                    );
                    last_error = Some(e);
                }
            }
        }

        let source = last_error.unwrap_or_else(|| Error::NoLocations(blocks.shard.clone()));
        Err(Error::Unreachable {
            shard: blocks.shard.clone(),
            source: Box::new(source),
        })
    }

    /// Fetch `blocks` and decode the records in `[key, end_key)`.
    pub async fn fetch_lines(
        &self,
        lookup: &dyn ShardLookup,
        blocks: ZipBlocks,
        key: Bytes,
        end_key: Bytes,
    ) -> Result<BlockLines> {
        let data = self.fetch(lookup, &blocks).await?;
        Ok(BlockLines::new(blocks, data, key, end_key))
    }
}

/// Lazily decompressed, range-clipped lines of one fetched [`ZipBlocks`]
pub struct BlockLines {
    shard: String,
    data: Bytes,
    ranges: std::vec::IntoIter<u64>,

    /// Start of the next undecoded chunk, relative to `data`
    next_chunk: usize,

    /// Shard offset of `data`
    base_offset: u64,

    /// Decompressed chunk being read, and the read position within it
    current: Bytes,
    cursor: usize,

    key: Bytes,
    end_key: Bytes,
    started: bool,
    done: bool,
}

impl BlockLines {
    pub fn new(blocks: ZipBlocks, data: Bytes, key: Bytes, end_key: Bytes) -> Self {
        Self {
            shard: blocks.shard,
            data,
            ranges: blocks.ranges.into_iter(),
            next_chunk: 0,
            base_offset: blocks.offset,
            current: Bytes::new(),
            cursor: 0,
            key,
            end_key,
            started: false,
            done: false,
        }
    }

    /// Decompress the next chunk into `current`. Returns false when none are left.
    fn decode_next_chunk(&mut self) -> Result<bool> {
        let Some(range) = self.ranges.next() else {
            return Ok(false);
        };

        let offset = self.base_offset.saturating_add(self.next_chunk as u64);
        let start = self.next_chunk;
        let end = start.saturating_add(usize::try_from(range).unwrap_or(usize::MAX));

        if end > self.data.len() {
            return Err(Error::CorruptBlock {
                shard: self.shard.clone(),
                offset,
                message: format!(
                    "block of {} bytes extends past fetched data ({} bytes)",
                    range,
                    self.data.len()
                ),
            });
        }

        let mut decompressed = Vec::new();
        GzDecoder::new(&self.data[start..end])
            .read_to_end(&mut decompressed)
            .map_err(|e| Error::CorruptBlock {
                shard: self.shard.clone(),
                offset,
                message: e.to_string(),
            })?;

        self.next_chunk = end;
        self.current = Bytes::from(decompressed);
        self.cursor = 0;
        Ok(true)
    }

    /// Next decompressed line across chunk boundaries, without its newline.
    fn next_raw_line(&mut self) -> Result<Option<Bytes>> {
        loop {
            if self.cursor < self.current.len() {
                let rest = &self.current[self.cursor..];
                let (line_len, consumed) = match rest.iter().position(|&b| b == b'\n') {
                    Some(pos) => (pos, pos + 1),
                    None => (rest.len(), rest.len()),
                };

                let mut line = self.current.slice(self.cursor..self.cursor + line_len);
                self.cursor += consumed;

                if line.last() == Some(&b'\r') {
                    line.truncate(line.len() - 1);
                }
                if line.is_empty() {
                    continue;
                }
                return Ok(Some(line));
            }

            if !self.decode_next_chunk()? {
                return Ok(None);
            }
        }
    }
}

impl Iterator for BlockLines {
    type Item = Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let line = match self.next_raw_line() {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };

            if !self.started {
                if line.as_ref() < self.key.as_ref() {
                    continue;
                }
                self.started = true;
            }

            if line.as_ref() >= self.end_key.as_ref() {
                break;
            }
            return Some(Ok(line));
        }

        self.done = true;
        None
    }
}
