//! ZipNum Query Engine
//!
//! This crate answers key-range queries over ZipNum clusters: large sorted CDX
//! indexes split into gzip-compressed shards, with a small sorted secondary
//! index holding one line per compressed block.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────┐
//! │    Query     │  [key, end_key) + page options
//! └──────┬───────┘
//!        ▼
//! ┌──────────────────┐
//! │  Page Planner    │  binary search secondary index, pick page of lines
//! └────────┬─────────┘
//!          │ index entries
//!          ▼
//! ┌──────────────────┐
//! │ Block Coalescer  │  merge adjacent blocks of one shard
//! └────────┬─────────┘
//!          │ ZipBlocks
//!          ▼
//! ┌──────────────────┐     ┌───────────────────┐
//! │  Block Fetcher   │ ◄── │ Location Resolver │  shard id → locations
//! └────────┬─────────┘     └───────────────────┘
//!          │ decompressed, clipped lines
//!          ▼
//! ┌──────────────┐
//! │ CDX records  │
//! └──────────────┘
//! ```
//!
//! ## Main Components
//!
//! - [`Cluster`]: query entry point; page counts, index lines or records
//! - [`planner`]: secondary index search and pagination
//! - [`coalesce`]: merging of byte-adjacent blocks into single fetches
//! - [`resolver`]: mapping-file and prefix-rule shard location strategies
//! - [`fetcher`]: location fallback, gzip decoding and range clipping
//! - [`loader`]: byte-range reads through `object_store`
//! - [`binsearch`]: block-wise binary search over sorted text files
//!
//! ## Usage Example
//!
//! ```ignore
//! use futures::TryStreamExt;
//! use zipnum_core::Query;
//! use zipnum_storage::{Cluster, ClusterConfig};
//!
//! let cluster = Cluster::open("/data/cdx/cluster.idx", ClusterConfig::default()).await?;
//!
//! let info = cluster.page_info(&Query::prefix("com,example)/")).await?;
//! for page in 0..info.pages {
//!     let query = Query::prefix("com,example)/").with_page(page);
//!     let records: Vec<_> = cluster.load(&query).await?.try_collect().await?;
//! }
//! ```

pub mod binsearch;
pub mod cluster;
pub mod coalesce;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod loader;
pub mod planner;
pub mod resolver;

pub use binsearch::SortedFile;
pub use cluster::Cluster;
pub use coalesce::{coalesce, coalesce_stream, Coalescer};
pub use config::{ClusterConfig, LocationSource};
pub use error::{Error, Result};
pub use fetcher::{BlockFetcher, BlockLines};
pub use loader::{BlockLoader, MemoryLoader, ObjectStoreLoader};
pub use planner::{compute_page_range, count_pages, IndexPage, PageCount};
pub use resolver::{
    build_resolver, LocationMap, LocationResolver, MapResolver, PrefixResolver, ShardLookup,
};
