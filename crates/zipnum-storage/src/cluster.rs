//! ZipNum Cluster Queries
//!
//! A [`Cluster`] ties the secondary index, the shard location resolver and the
//! block fetcher together into one query entry point.
//!
//! ## Query Flow
//!
//! ```text
//! load(query)
//!     ↓
//! Snapshot shard locations (reload mapping if its mtime changed)
//!     ↓
//! Binary search secondary index → page of index lines
//!     ↓
//! Coalesce adjacent blocks → ZipBlocks
//!     ↓
//! Fetch each ZipBlocks from the first reachable location
//!     ↓
//! Decompress block by block, clip to [key, end_key)
//!     ↓
//! CDX records, in index order
//! ```
//!
//! Every stage is lazy. Up to `fetch_concurrency` fetches run ahead of the
//! consumer; results are still yielded in index order. Dropping the returned
//! stream closes the secondary index and abandons in-flight fetches.
//!
//! ## Usage
//!
//! ```ignore
//! use futures::TryStreamExt;
//! use zipnum_core::Query;
//! use zipnum_storage::{Cluster, ClusterConfig};
//!
//! let cluster = Cluster::open("/data/cdx/cluster.idx", ClusterConfig::default()).await?;
//!
//! let mut records = cluster.load(&Query::prefix("com,example)/")).await?;
//! while let Some(record) = records.try_next().await? {
//!     println!("{}", String::from_utf8_lossy(&record));
//! }
//! ```

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use zipnum_core::{PageInfo, Query, ZipBlocks};

use crate::binsearch::SortedFile;
use crate::coalesce::coalesce_stream;
use crate::config::ClusterConfig;
use crate::error::Result;
use crate::fetcher::BlockFetcher;
use crate::loader::{BlockLoader, ObjectStoreLoader};
use crate::planner::{compute_page_range, count_pages, IndexPage, PageCount};
use crate::resolver::{build_resolver, LocationResolver};

/// A queryable ZipNum cluster
pub struct Cluster {
    summary: PathBuf,
    config: ClusterConfig,
    resolver: Arc<dyn LocationResolver>,
    fetcher: BlockFetcher,
}

impl Cluster {
    /// Open a cluster whose shards are read through `object_store`
    pub async fn open(summary: impl Into<PathBuf>, config: ClusterConfig) -> Result<Self> {
        Self::with_loader(summary, config, Arc::new(ObjectStoreLoader::new())).await
    }

    /// Open a cluster with a custom block loader
    pub async fn with_loader(
        summary: impl Into<PathBuf>,
        config: ClusterConfig,
        loader: Arc<dyn BlockLoader>,
    ) -> Result<Self> {
        let summary = summary.into();
        let resolver = build_resolver(&summary, config.shard_index_loc.as_ref()).await?;

        tracing::debug!(
            summary = %summary.display(),
            resolver = %resolver,
            max_blocks = config.max_blocks,
            "Opened ZipNum cluster"
        );

        Ok(Self {
            summary,
            config,
            resolver,
            fetcher: BlockFetcher::new(loader),
        })
    }

    pub fn summary(&self) -> &Path {
        &self.summary
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Run a query. The output depends on the query mode:
    ///
    /// - `page_count`: a single JSON line with [`PageInfo`]
    /// - `index_only`: the secondary index lines of the page
    /// - otherwise: the CDX records of the page
    pub async fn load(&self, query: &Query) -> Result<BoxStream<'static, Result<Bytes>>> {
        tracing::debug!(
            cluster = %self,
            key = %String::from_utf8_lossy(&query.key),
            end_key = %String::from_utf8_lossy(&query.end_key),
            page = query.page,
            "Querying cluster"
        );

        if query.page_count {
            let info = self.page_info(query).await?;
            let line = Bytes::from(info.to_json());
            return Ok(stream::once(async move { Ok(line) }).boxed());
        }

        if query.index_only {
            return self.index_lines(query).await;
        }

        self.records(query).await
    }

    /// Page metadata for the query range
    pub async fn page_info(&self, query: &Query) -> Result<PageInfo> {
        let file = SortedFile::open(&self.summary).await?;

        match count_pages(file, query, self.config.max_blocks).await? {
            PageCount::Final(info) => Ok(info),
            PageCount::Verify { first, info } => {
                // One block may still decode to no records in range
                let lookup = self.resolver.snapshot().await?;
                let mut lines = self
                    .fetcher
                    .fetch_lines(
                        lookup.as_ref(),
                        ZipBlocks::from_entry(&first),
                        query.key.clone(),
                        query.end_key.clone(),
                    )
                    .await?;

                match lines.next() {
                    Some(Ok(_)) => Ok(info),
                    Some(Err(e)) => Err(e),
                    None => Ok(PageInfo::empty(info.page_size)),
                }
            }
        }
    }

    /// Secondary index lines of the requested page
    pub async fn index_lines(&self, query: &Query) -> Result<BoxStream<'static, Result<Bytes>>> {
        let page = self.index_page(query).await?;
        Ok(page.into_lines().boxed())
    }

    /// CDX records of the requested page
    pub async fn records(&self, query: &Query) -> Result<BoxStream<'static, Result<Bytes>>> {
        let lookup = self.resolver.snapshot().await?;
        let page = self.index_page(query).await?;

        let fetcher = self.fetcher.clone();
        let key = query.key.clone();
        let end_key = query.end_key.clone();

        let records = coalesce_stream(Box::pin(page.into_entries()), self.config.max_blocks)
            .map_ok(move |blocks| {
                let fetcher = fetcher.clone();
                let lookup = lookup.clone();
                let key = key.clone();
                let end_key = end_key.clone();
                async move {
                    fetcher
                        .fetch_lines(lookup.as_ref(), blocks, key, end_key)
                        .await
                }
            })
            .try_buffered(self.config.fetch_concurrency.max(1))
            .map_ok(stream::iter)
            .try_flatten();

        Ok(records.boxed())
    }

    /// Candidate locations for a shard, as the next query would see them
    pub async fn resolve(&self, shard: &str) -> Result<Vec<String>> {
        self.resolver.snapshot().await?.resolve(shard)
    }

    async fn index_page(&self, query: &Query) -> Result<IndexPage> {
        let file = SortedFile::open(&self.summary).await?;
        compute_page_range(file, query, self.config.max_blocks).await
    }
}

impl fmt::Display for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ZipNum Cluster: {}, {}", self.summary.display(), self.resolver)
    }
}
