//! ZipNum CLI (zipnum)
//!
//! Command-line tool for querying ZipNum sharded CDX indexes.
//!
//! ## Quick Start
//!
//! ```bash
//! # All captures of one URL key
//! zipnum query /data/cdx/cluster.idx 'com,example)/'
//!
//! # Everything under a key prefix, second page of 5 blocks
//! zipnum query /data/cdx/cluster.idx 'com,example)/' --prefix --page 1 --page-size 5
//!
//! # How many pages does a range span?
//! zipnum query /data/cdx/cluster.idx 'com,a' 'com,c' --page-count
//!
//! # Where does a shard live?
//! zipnum resolve /data/cdx/cluster.idx part-00001.gz
//! ```
//!
//! ## Configuration
//!
//! Cluster settings come from a TOML file given with `--config` or the
//! `ZIPNUM_CONFIG` environment variable. Without one, shard locations are
//! read from the mapping file next to the secondary index (`cluster.loc`).
//!
//! Records are written to stdout, one per line. Logs go to stderr and are
//! filtered with `RUST_LOG`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::{StreamExt, TryStreamExt};
use std::io::Write;
use std::path::PathBuf;
use zipnum_core::Query;
use zipnum_storage::Cluster;

mod config;

#[derive(Parser)]
#[command(name = "zipnum")]
#[command(about = "Query ZipNum sharded CDX indexes", long_about = None)]
struct Cli {
    /// Cluster config file (TOML)
    #[arg(short, long, env = "ZIPNUM_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Query records in a key range
    Query {
        /// Secondary index (summary) file
        summary: PathBuf,
        /// Start key (inclusive)
        key: String,
        /// End key (exclusive); defaults to an exact match on `key`
        end_key: Option<String>,
        /// Match every key starting with `key`
        #[arg(long, conflicts_with = "end_key")]
        prefix: bool,
        /// Page to return
        #[arg(short, long, default_value = "0")]
        page: u64,
        /// Index lines per page (default: max_blocks)
        #[arg(long)]
        page_size: Option<u64>,
        /// Print page metadata as JSON instead of records
        #[arg(long)]
        page_count: bool,
        /// Print secondary index lines instead of records
        #[arg(long)]
        index_only: bool,
        /// Maximum number of lines to print
        #[arg(short, long)]
        limit: Option<usize>,
        /// Override the configured block coalescing limit
        #[arg(long)]
        max_blocks: Option<u64>,
    },
    /// Print the candidate locations of a shard
    Resolve {
        /// Secondary index (summary) file
        summary: PathBuf,
        /// Shard id
        shard: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Query {
            summary,
            key,
            end_key,
            prefix,
            page,
            page_size,
            page_count,
            index_only,
            limit,
            max_blocks,
        } => {
            if let Some(max_blocks) = max_blocks {
                config.max_blocks = max_blocks;
            }

            let mut query = match (end_key, prefix) {
                (Some(end_key), _) => Query::new(key, end_key),
                (None, true) => Query::prefix(key),
                (None, false) => Query::exact(key),
            }
            .with_page(page);

            if let Some(page_size) = page_size {
                query = query.with_page_size(page_size);
            }
            if page_count {
                query = query.page_count_only();
            }
            if index_only {
                query = query.index_only();
            }

            let cluster = Cluster::open(&summary, config)
                .await
                .with_context(|| format!("Failed to open cluster {}", summary.display()))?;
            handle_query(&cluster, &query, limit).await?;
        }
        Commands::Resolve { summary, shard } => {
            let cluster = Cluster::open(&summary, config)
                .await
                .with_context(|| format!("Failed to open cluster {}", summary.display()))?;
            let locations = cluster
                .resolve(&shard)
                .await
                .with_context(|| format!("Failed to resolve shard {}", shard))?;

            for location in locations {
                println!("{}", location);
            }
        }
    }

    Ok(())
}

/// Streams query output to stdout.
async fn handle_query(cluster: &Cluster, query: &Query, limit: Option<usize>) -> Result<()> {
    let lines = cluster.load(query).await.context("Query failed")?;
    let mut lines = lines.take(limit.unwrap_or(usize::MAX));

    let stdout = std::io::stdout();
    let mut out = std::io::BufWriter::new(stdout.lock());

    while let Some(line) = lines.try_next().await.context("Failed to read records")? {
        out.write_all(&line)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;

    Ok(())
}
