//! Block Coalescing
//!
//! Merges byte-adjacent index entries of the same shard into a single
//! [`ZipBlocks`] fetch, so one range request replaces several.
//!
//! ```text
//! entries:  shard-a 100+50   shard-a 150+30   shard-a 300+20   shard-b 180+40
//!           └──── contiguous ─────┘            gap              other shard
//! fetches:  shard-a 100+80 [50,30]   shard-a 300+20 [20]   shard-b 180+40 [40]
//! ```
//!
//! Entries merge only if they are in the same shard, start exactly where the
//! current fetch ends, and the fetch holds fewer than `max_blocks` blocks.
//! The merge is a single streaming pass holding one accumulator, so order is
//! preserved and memory does not grow with the page size.

use futures::stream::{self, Stream, StreamExt};
use zipnum_core::{IndexEntry, ZipBlocks};

use crate::error::Result;

/// Greedy accumulator for [`ZipBlocks`]
#[derive(Debug)]
pub struct Coalescer {
    max_blocks: usize,
    current: Option<ZipBlocks>,
}

impl Coalescer {
    pub fn new(max_blocks: u64) -> Self {
        Self {
            max_blocks: usize::try_from(max_blocks).unwrap_or(usize::MAX).max(1),
            current: None,
        }
    }

    /// Add an entry; returns the previous fetch if this entry could not extend it.
    pub fn push(&mut self, entry: &IndexEntry) -> Option<ZipBlocks> {
        if let Some(blocks) = self.current.as_mut() {
            if blocks.is_contiguous(entry)
                && blocks.count() < self.max_blocks
                && blocks.push(entry)
            {
                return None;
            }
        }
        self.current.replace(ZipBlocks::from_entry(entry))
    }

    /// Take the fetch still being accumulated.
    pub fn finish(&mut self) -> Option<ZipBlocks> {
        self.current.take()
    }
}

/// Coalesce an in-memory sequence of entries.
pub fn coalesce<'a, I>(entries: I, max_blocks: u64) -> Vec<ZipBlocks>
where
    I: IntoIterator<Item = &'a IndexEntry>,
{
    let mut coalescer = Coalescer::new(max_blocks);
    let mut fetches: Vec<ZipBlocks> = entries
        .into_iter()
        .filter_map(|entry| coalescer.push(entry))
        .collect();
    fetches.extend(coalescer.finish());
    fetches
}

/// Coalesce a stream of entries lazily.
///
/// An error from the input ends the output after being passed through.
pub fn coalesce_stream<S>(entries: S, max_blocks: u64) -> impl Stream<Item = Result<ZipBlocks>>
where
    S: Stream<Item = Result<IndexEntry>> + Unpin,
{
    let state = Some((entries, Coalescer::new(max_blocks)));

    stream::unfold(state, |state| async move {
        let (mut entries, mut coalescer) = state?;
        loop {
            match entries.next().await {
                Some(Ok(entry)) => {
                    if let Some(blocks) = coalescer.push(&entry) {
                        return Some((Ok(blocks), Some((entries, coalescer))));
                    }
                }
                Some(Err(e)) => return Some((Err(e), None)),
                None => return coalescer.finish().map(|blocks| (Ok(blocks), None)),
            }
        }
    })
}
