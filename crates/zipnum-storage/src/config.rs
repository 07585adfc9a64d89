//! Cluster Configuration
//!
//! This module defines configuration for a ZipNum cluster.
//!
//! ## ClusterConfig
//!
//! - **shard_index_loc**: Where shard locations come from. Either a prefix rule
//!   `{ match, replace }` applied to the secondary index directory, or the path
//!   of a tab-delimited location mapping file. Unset means the mapping file next
//!   to the secondary index (`<summary>.loc`).
//! - **max_blocks**: Maximum blocks merged into one fetch, and default page size (default: 10)
//! - **reload_interval**: Minutes between mapping reloads (default: 10). Advisory:
//!   the mapping is reloaded whenever its mtime changes, checked once per query.
//! - **fetch_concurrency**: Block fetches in flight per query (default: 1)
//!
//! ## Usage
//!
//! ```ignore
//! use zipnum_storage::{ClusterConfig, LocationSource};
//!
//! // Shards live next to the summary
//! let config = ClusterConfig {
//!     shard_index_loc: Some(LocationSource::Prefix {
//!         pattern: "().*".to_string(),
//!         replace: "/data/shards/".to_string(),
//!     }),
//!     ..Default::default()
//! };
//! ```
//!
//! The same config in TOML:
//!
//! ```toml
//! max_blocks = 10
//!
//! [shard_index_loc]
//! match = "^/index/"
//! replace = "http://archive.example.org/cdx/"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Pattern used when a prefix rule has no `match`; replaces the whole directory.
pub const DEFAULT_LOCATION_MATCH: &str = "().*";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Shard location source (prefix rule or mapping file)
    #[serde(default, alias = "shard_location_source")]
    pub shard_index_loc: Option<LocationSource>,

    /// Maximum blocks coalesced per fetch (default: 10)
    #[serde(default = "default_max_blocks")]
    pub max_blocks: u64,

    /// Mapping reload interval in minutes (default: 10)
    #[serde(default = "default_reload_interval")]
    pub reload_interval: u64,

    /// Block fetches in flight per query (default: 1)
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,
}

/// Where shard locations come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LocationSource {
    /// Regex rule applied to the secondary index directory to build a fixed prefix
    Prefix {
        #[serde(rename = "match", default = "default_location_match")]
        pattern: String,
        replace: String,
    },

    /// Tab-delimited `shard \t location...` file
    MapFile(PathBuf),
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            shard_index_loc: None,
            max_blocks: default_max_blocks(),
            reload_interval: default_reload_interval(),
            fetch_concurrency: default_fetch_concurrency(),
        }
    }
}

impl ClusterConfig {
    pub fn reload_interval(&self) -> Duration {
        Duration::from_secs(self.reload_interval * 60)
    }
}

fn default_max_blocks() -> u64 {
    10
}

fn default_reload_interval() -> u64 {
    10 // minutes
}

fn default_fetch_concurrency() -> usize {
    1
}

fn default_location_match() -> String {
    DEFAULT_LOCATION_MATCH.to_string()
}
