//! Shard Location Resolution
//!
//! The secondary index names shards by id (`part-00001.gz`). Before fetching,
//! each id is mapped to one or more candidate locations, tried in order.
//!
//! ## Strategies
//!
//! ### Mapping file ([`MapResolver`])
//! A tab-delimited file, one shard per line:
//!
//! ```text
//! part-00000.gz\t/mnt/cdx/part-00000.gz\thttp://mirror.example.org/cdx/part-00000.gz
//! part-00001.gz\t/mnt/cdx/part-00001.gz
//! ```
//!
//! The file is re-read whenever its mtime changes, checked once at the start of
//! each query. Defaults to the secondary index path with a `.loc` extension.
//!
//! ### Prefix rule ([`PrefixResolver`])
//! A regex `match`/`replace` rule is applied once to the directory of the
//! secondary index (with a trailing `/`). Every shard resolves to
//! `prefix + shard`. Replacement strings use `regex` syntax (`$1`, `${name}`).
//!
//! ## Snapshots
//!
//! Each query calls [`LocationResolver::snapshot`] once and resolves every
//! shard through the returned [`ShardLookup`]. Reloads build a complete new map
//! and swap the `Arc`, so a query never sees a half-loaded mapping and never
//! switches mappings midway.

use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::{Mutex, RwLock};

use crate::config::LocationSource;
use crate::error::{Error, Result};

/// Shard id → candidate locations, fixed for one query
pub trait ShardLookup: Send + Sync {
    /// Candidate locations for `shard`, in the order they should be tried.
    fn resolve(&self, shard: &str) -> Result<Vec<String>>;
}

/// Source of [`ShardLookup`] snapshots
#[async_trait]
pub trait LocationResolver: Send + Sync + fmt::Display {
    /// Reload the backing source if it changed, then return the lookup to use
    /// for a single query.
    async fn snapshot(&self) -> Result<Arc<dyn ShardLookup>>;
}

/// Build the resolver for a cluster from its configured location source.
///
/// A prefix rule selects [`PrefixResolver`]; a path or nothing selects
/// [`MapResolver`] (defaulting to `<summary>.loc`).
pub async fn build_resolver(
    summary: &Path,
    source: Option<&LocationSource>,
) -> Result<Arc<dyn LocationResolver>> {
    match source {
        Some(LocationSource::Prefix { pattern, replace }) => {
            Ok(Arc::new(PrefixResolver::new(summary, pattern, replace)?))
        }
        Some(LocationSource::MapFile(path)) => Ok(Arc::new(MapResolver::open(path).await?)),
        None => Ok(Arc::new(
            MapResolver::open(MapResolver::default_path(summary)).await?,
        )),
    }
}

/// Parsed location mapping
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LocationMap {
    shards: HashMap<String, Vec<String>>,
}

impl LocationMap {
    /// Parse `shard \t location...` lines. Blank lines are skipped.
    pub fn parse(text: &str) -> Result<Self> {
        let mut shards = HashMap::new();

        for line in text.lines() {
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }

            let mut parts = line.split('\t');
            let shard = parts.next().unwrap_or_default();
            if shard.is_empty() {
                return Err(Error::MalformedLocation(format!(
                    "mapping line without shard id: {:?}",
                    line
                )));
            }

            let locations = parts
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect();
            shards.insert(shard.to_string(), locations);
        }

        Ok(Self { shards })
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }
}

impl ShardLookup for LocationMap {
    fn resolve(&self, shard: &str) -> Result<Vec<String>> {
        self.shards
            .get(shard)
            .cloned()
            .ok_or_else(|| Error::ShardNotFound(shard.to_string()))
    }
}

/// Resolver backed by a location mapping file, reloaded on mtime change
pub struct MapResolver {
    path: PathBuf,

    /// Current mapping; replaced wholesale on reload
    current: RwLock<Arc<LocationMap>>,

    /// mtime of the loaded file; the lock also serializes reloads
    loaded_mtime: Mutex<Option<SystemTime>>,
}

impl MapResolver {
    /// Open and load a mapping file. Fails if the file cannot be read.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let resolver = Self {
            path: path.into(),
            current: RwLock::new(Arc::new(LocationMap::default())),
            loaded_mtime: Mutex::new(None),
        };
        resolver.reload_if_changed().await?;
        Ok(resolver)
    }

    /// `<summary>.loc` for a secondary index at `summary`
    pub fn default_path(summary: &Path) -> PathBuf {
        summary.with_extension("loc")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn reload_if_changed(&self) -> Result<Arc<LocationMap>> {
        let mut loaded_mtime = self.loaded_mtime.lock().await;

        let mtime = tokio::fs::metadata(&self.path).await?.modified()?;
        if *loaded_mtime == Some(mtime) {
            return Ok(self.current.read().await.clone());
        }

        tracing::debug!(path = %self.path.display(), "Loading shard location map");

        let text = tokio::fs::read_to_string(&self.path).await?;
        let map = Arc::new(LocationMap::parse(&text)?);

        *self.current.write().await = map.clone();
        *loaded_mtime = Some(mtime);

        tracing::debug!(
            path = %self.path.display(),
            shard_count = map.len(),
            "Shard location map loaded"
        );

        Ok(map)
    }
}

#[async_trait]
impl LocationResolver for MapResolver {
    async fn snapshot(&self) -> Result<Arc<dyn ShardLookup>> {
        let map: Arc<dyn ShardLookup> = self.reload_if_changed().await?;
        Ok(map)
    }
}

impl fmt::Display for MapResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LocMap: {}", self.path.display())
    }
}

/// Fixed prefix prepended to every shard id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationPrefix(String);

impl ShardLookup for LocationPrefix {
    fn resolve(&self, shard: &str) -> Result<Vec<String>> {
        Ok(vec![format!("{}{}", self.0, shard)])
    }
}

/// Resolver deriving one prefix from the secondary index directory
pub struct PrefixResolver {
    prefix: Arc<LocationPrefix>,
}

impl PrefixResolver {
    /// Apply `pattern` → `replace` to the directory of `summary` (first match only).
    pub fn new(summary: &Path, pattern: &str, replace: &str) -> Result<Self> {
        let dir = summary
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dir = format!("{}/", dir);

        let prefix = Regex::new(pattern)?.replace(&dir, replace).into_owned();

        Ok(Self {
            prefix: Arc::new(LocationPrefix(prefix)),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix.0
    }
}

#[async_trait]
impl LocationResolver for PrefixResolver {
    async fn snapshot(&self) -> Result<Arc<dyn ShardLookup>> {
        let prefix: Arc<dyn ShardLookup> = self.prefix.clone();
        Ok(prefix)
    }
}

impl fmt::Display for PrefixResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LocPrefix: {}", self.prefix.0)
    }
}
