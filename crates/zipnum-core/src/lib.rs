//! ZipNum Core Types
//!
//! Shared data model for querying ZipNum clusters: sharded, gzip-block
//! compressed CDX indexes with a small sorted secondary index on top.
//!
//! - [`IndexEntry`]: one parsed secondary index line
//! - [`ZipBlocks`]: a coalesced byte-range fetch over adjacent blocks
//! - [`Query`]: key range plus pagination options
//! - [`PageInfo`]: page metadata returned by page-count queries

pub mod blocks;
pub mod entry;
pub mod error;
pub mod query;

pub use blocks::ZipBlocks;
pub use entry::IndexEntry;
pub use error::{Error, Result};
pub use query::{PageInfo, Query};
