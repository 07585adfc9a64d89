//! Storage Error Types
//!
//! This module defines all error types that can occur while querying a cluster.
//!
//! ## Error Categories
//!
//! ### Lookup Errors
//! - `KeyNotFound`: No secondary index line matches the start of the query range
//! - `ShardNotFound`: The location mapping has no entry for a shard
//! - `InvalidPage`: Requested page is outside `0..=last_page`
//!
//! ### Fetch Errors
//! - `Unreachable`: Every candidate location for a shard failed; carries the last cause
//! - `ShortRead`: A range fetch returned fewer bytes than requested
//! - `ObjectStoreError`: Low-level object store operation failed
//!
//! ### Data Errors
//! - `Core`: Malformed index entry or invalid query (from `zipnum_core`)
//! - `CorruptBlock`: A gzip block failed to decompress
//! - `MalformedLocation`: A location mapping line or location string is unusable
//!
//! ## Retry Policy
//!
//! Only fetch errors are retried, and only across the candidate locations of
//! one shard. Data errors abort the query immediately.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("No index entries found for key: {0}")]
    KeyNotFound(String),

    #[error("Shard not found in location map: {0}")]
    ShardNotFound(String),

    #[error("Page {page} invalid: First Page is 0, Last Page is {last_page}")]
    InvalidPage { page: u64, last_page: u64 },

    #[error("No reachable location for shard {shard}: {source}")]
    Unreachable {
        shard: String,
        #[source]
        source: Box<Error>,
    },

    #[error("No locations configured for shard: {0}")]
    NoLocations(String),

    #[error("Short read from {location}: expected {expected} bytes, got {actual}")]
    ShortRead {
        location: String,
        expected: u64,
        actual: u64,
    },

    #[error("Corrupt block in shard {shard} at offset {offset}: {message}")]
    CorruptBlock {
        shard: String,
        offset: u64,
        message: String,
    },

    #[error("Malformed location: {0}")]
    MalformedLocation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Core(#[from] zipnum_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Object store error: {0}")]
    ObjectStoreError(#[from] object_store::Error),
}

impl From<regex::Error> for Error {
    fn from(e: regex::Error) -> Self {
        Error::Config(format!("invalid shard location pattern: {}", e))
    }
}
