//! Binary Search over Sorted Line Files
//!
//! The secondary index is a plain text file sorted by line. We never load it
//! into memory; instead we binary-search it block by block and then read
//! forward line by line.
//!
//! ## Search Strategy
//!
//! ```text
//! file:  |  block 0  |  block 1  |  block 2  |  block 3  | ...
//!                         ▲
//!            first full line of block 1 < key <= first full line of block 2
//!
//! 1. Binary search blocks: seek to block start, skip the partial line,
//!    compare the first full line against the key
//! 2. Seek to the chosen block and read forward until line >= key
//! 3. Keep the last `prev_size` lines seen on the way (look-back)
//! ```
//!
//! Look-back matters for block indexes: each line holds the *first* key of a
//! block, so the block that may contain `key` is the line just before the
//! first line `>= key`.
//!
//! Lines are compared as raw bytes and returned without the trailing newline.

use bytes::Bytes;
use std::collections::VecDeque;
use std::io::{self, SeekFrom};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};

/// Default search block size (8 KiB)
pub const DEFAULT_BLOCK_SIZE: u64 = 8192;

/// A sorted, newline-delimited file opened for searching
pub struct SortedFile {
    reader: BufReader<File>,
    len: u64,
    block_size: u64,
}

impl SortedFile {
    /// Open a sorted file
    pub async fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path).await?;
        let len = file.metadata().await?.len();

        Ok(Self {
            reader: BufReader::new(file),
            len,
            block_size: DEFAULT_BLOCK_SIZE,
        })
    }

    /// Override the search block size (must be positive)
    pub fn with_block_size(mut self, block_size: u64) -> Self {
        self.block_size = block_size.max(1);
        self
    }

    /// File length in bytes
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read the next line from the current position, without its newline.
    pub async fn next_line(&mut self) -> io::Result<Option<Bytes>> {
        let mut buf = Vec::new();
        if self.reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(None);
        }
        trim_newline(&mut buf);
        Ok(Some(Bytes::from(buf)))
    }

    async fn seek(&mut self, pos: u64) -> io::Result<()> {
        self.reader.seek(SeekFrom::Start(pos)).await?;
        Ok(())
    }

    async fn skip_partial_line(&mut self) -> io::Result<()> {
        let mut scratch = Vec::new();
        self.reader.read_until(b'\n', &mut scratch).await?;
        Ok(())
    }

    /// Find the start of the block from which a forward scan reaches the
    /// first line `>= key`.
    async fn binsearch_offset(&mut self, key: &[u8]) -> io::Result<u64> {
        let mut min = 0u64;
        let mut max = self.len / self.block_size;

        while max - min > 1 {
            let mid = min + (max - min) / 2;
            self.seek(mid * self.block_size).await?;
            self.skip_partial_line().await?;

            let line = self.next_line().await?.unwrap_or_default();
            if key > line.as_ref() {
                min = mid;
            } else {
                max = mid;
            }
        }

        Ok(min * self.block_size)
    }

    /// Position the reader just after the first line `>= key`.
    ///
    /// Returns up to `prev_size` lines preceding the match followed by the
    /// match itself, or `None` if every line sorts before `key`. Subsequent
    /// lines are read with [`SortedFile::next_line`].
    pub async fn search(
        &mut self,
        key: &[u8],
        prev_size: usize,
    ) -> io::Result<Option<VecDeque<Bytes>>> {
        let start = self.binsearch_offset(key).await?;
        self.seek(start).await?;
        if start > 0 {
            self.skip_partial_line().await?;
        }

        let mut lines = VecDeque::with_capacity(prev_size + 1);
        while let Some(line) = self.next_line().await? {
            if line.as_ref() >= key {
                lines.push_back(line);
                return Ok(Some(lines));
            }
            if prev_size > 0 {
                if lines.len() == prev_size {
                    lines.pop_front();
                }
                lines.push_back(line);
            }
        }

        Ok(None)
    }

    /// Scan lines from the first line `>= key` (plus look-back) up to, but
    /// excluding, the first line `>= end_key`.
    pub async fn iter_range(
        mut self,
        key: &[u8],
        end_key: &[u8],
        prev_size: usize,
    ) -> io::Result<LineScan> {
        let pending = self.search(key, prev_size).await?;

        Ok(LineScan {
            done: pending.is_none(),
            pending: pending.unwrap_or_default(),
            end_key: Bytes::copy_from_slice(end_key),
            file: self,
        })
    }

    /// Read the last non-empty line of the file.
    pub async fn read_last_line(&mut self) -> io::Result<Option<Bytes>> {
        let mut window = self.block_size;

        loop {
            let start = self.len.saturating_sub(window);
            self.seek(start).await?;
            if start > 0 {
                self.skip_partial_line().await?;
            }

            let mut last = None;
            while let Some(line) = self.next_line().await? {
                if !line.is_empty() {
                    last = Some(line);
                }
            }

            if last.is_some() || start == 0 {
                return Ok(last);
            }
            window = window.saturating_mul(2);
        }
    }
}

/// Forward scan over a key range of a [`SortedFile`]
///
/// Owns the file; dropping the scan closes it.
pub struct LineScan {
    file: SortedFile,
    pending: VecDeque<Bytes>,
    end_key: Bytes,
    done: bool,
}

impl LineScan {
    /// Next line `< end_key`, or `None` once the range is exhausted.
    pub async fn next_line(&mut self) -> io::Result<Option<Bytes>> {
        if self.done {
            return Ok(None);
        }

        let line = match self.pending.pop_front() {
            Some(line) => Some(line),
            None => self.file.next_line().await?,
        };

        match line {
            Some(line) if line.as_ref() < self.end_key.as_ref() => Ok(Some(line)),
            _ => {
                self.done = true;
                Ok(None)
            }
        }
    }
}

fn trim_newline(buf: &mut Vec<u8>) {
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
}
