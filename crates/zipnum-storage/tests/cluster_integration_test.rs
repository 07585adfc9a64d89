//! End-to-end queries over a ZipNum cluster written to a temp directory
//!
//! Layout: 25 gzip blocks of 4 records each, blocks 0-12 in `part-00000.gz`
//! and 13-24 in `part-00001.gz`. Block `i` holds `key{i:04} {j} record` for
//! `j` in 0..4 and is indexed under `key{i:04} 0`.

use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use futures::{StreamExt, TryStreamExt};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use zipnum_core::{PageInfo, Query};
use zipnum_storage::config::DEFAULT_LOCATION_MATCH;
use zipnum_storage::{Cluster, ClusterConfig, Error, LocationSource};

const BLOCKS: usize = 25;
const RECORDS_PER_BLOCK: usize = 4;

struct Fixture {
    dir: TempDir,
    summary: PathBuf,
}

impl Fixture {
    fn shard_dir(&self) -> PathBuf {
        self.dir.path().join("shards")
    }

    fn write_map(&self, contents: &str, mtime: SystemTime) {
        let path = self.summary.with_extension("loc");
        std::fs::write(&path, contents).unwrap();
        std::fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(mtime)
            .unwrap();
    }

    fn map_to(&self, dir: &Path) -> String {
        ["part-00000.gz", "part-00001.gz"]
            .iter()
            .map(|shard| format!("{}\t{}\n", shard, dir.join(shard).display()))
            .collect()
    }
}

fn gzip_block(block: usize) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    for j in 0..RECORDS_PER_BLOCK {
        writeln!(encoder, "key{:04} {} record", block, j).unwrap();
    }
    encoder.finish().unwrap()
}

fn build_cluster() -> Fixture {
    let dir = TempDir::new().unwrap();
    let shard_dir = dir.path().join("shards");
    std::fs::create_dir_all(&shard_dir).unwrap();

    let mut shards = [Vec::new(), Vec::new()];
    let mut index = String::new();

    for block in 0..BLOCKS {
        let part = if block < 13 { 0 } else { 1 };
        let data = gzip_block(block);
        index.push_str(&format!(
            "key{:04} 0\tpart-0000{}.gz\t{}\t{}\t{}\n",
            block,
            part,
            shards[part].len(),
            data.len(),
            block
        ));
        shards[part].extend(data);
    }

    for (part, data) in shards.iter().enumerate() {
        std::fs::write(shard_dir.join(format!("part-0000{}.gz", part)), data).unwrap();
    }

    let summary = dir.path().join("cluster.idx");
    std::fs::write(&summary, index).unwrap();

    let fixture = Fixture { dir, summary };
    fixture.write_map(
        &fixture.map_to(&fixture.shard_dir()),
        SystemTime::now() - Duration::from_secs(60),
    );
    fixture
}

async fn open(fixture: &Fixture) -> Cluster {
    Cluster::open(&fixture.summary, ClusterConfig::default())
        .await
        .unwrap()
}

async fn collect(cluster: &Cluster, query: &Query) -> Vec<String> {
    let lines: Vec<Bytes> = cluster
        .load(query)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    lines
        .into_iter()
        .map(|l| String::from_utf8(l.to_vec()).unwrap())
        .collect()
}

/// Range starting inside block 3 and ending inside block 20
fn range_query() -> Query {
    Query::new("key0003 2", "key0020 2").with_page_size(10)
}

#[tokio::test]
async fn test_records_are_ordered_and_clipped() {
    let fixture = build_cluster();
    let cluster = open(&fixture).await;

    let records = collect(&cluster, &range_query().with_page_size(100)).await;

    assert_eq!(records.len(), 2 + 16 * RECORDS_PER_BLOCK + 2);
    assert_eq!(records.first().unwrap(), "key0003 2 record");
    assert_eq!(records.last().unwrap(), "key0020 1 record");
    assert!(records.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn test_pages_concatenate_to_full_result() {
    let fixture = build_cluster();
    let cluster = open(&fixture).await;

    let info = cluster.page_info(&range_query()).await.unwrap();
    assert_eq!(
        info,
        PageInfo {
            pages: 2,
            page_size: 10,
            blocks: 18
        }
    );

    let mut paged = Vec::new();
    for page in 0..info.pages {
        paged.extend(collect(&cluster, &range_query().with_page(page)).await);
    }

    let full = collect(&cluster, &range_query().with_page_size(100)).await;
    assert_eq!(paged, full);
}

#[tokio::test]
async fn test_page_count_response() {
    let fixture = build_cluster();
    let cluster = open(&fixture).await;

    let lines = collect(&cluster, &range_query().page_count_only()).await;
    assert_eq!(lines, vec![r#"{"pages":2,"pageSize":10,"blocks":18}"#]);
}

#[tokio::test]
async fn test_page_count_single_page_without_records() {
    let fixture = build_cluster();
    let cluster = open(&fixture).await;

    // Sorts after every record of block 5 but before block 6
    let info = cluster
        .page_info(&Query::new("key0005 5", "key0005 9"))
        .await
        .unwrap();
    assert_eq!(info, PageInfo::empty(10));
}

#[tokio::test]
async fn test_invalid_page() {
    let fixture = build_cluster();
    let cluster = open(&fixture).await;

    let err = cluster.load(&range_query().with_page(2)).await.err().unwrap();
    assert_eq!(
        err.to_string(),
        "Page 2 invalid: First Page is 0, Last Page is 1"
    );
}

#[tokio::test]
async fn test_key_not_found() {
    let fixture = build_cluster();
    let cluster = open(&fixture).await;

    let err = cluster.load(&Query::prefix("zzz")).await.err().unwrap();
    assert!(matches!(err, Error::KeyNotFound(_)));

    let info = cluster
        .page_info(&Query::prefix("zzz"))
        .await
        .unwrap();
    assert_eq!(info.pages, 0);
}

#[tokio::test]
async fn test_index_only_second_page() {
    let fixture = build_cluster();
    let cluster = open(&fixture).await;

    let lines = collect(&cluster, &range_query().with_page(1).index_only()).await;
    assert_eq!(lines.len(), 8);
    assert!(lines[0].starts_with("key0013 0\tpart-00001.gz\t0\t"));
    assert!(lines[7].starts_with("key0020 0\tpart-00001.gz\t"));
}

#[tokio::test]
async fn test_unreachable_shard_is_named() {
    let fixture = build_cluster();
    let missing = fixture.dir.path().join("missing");
    fixture.write_map(
        &format!(
            "part-00000.gz\t{}\npart-00001.gz\t{}\n",
            fixture.shard_dir().join("part-00000.gz").display(),
            missing.join("part-00001.gz").display()
        ),
        SystemTime::now(),
    );
    let cluster = open(&fixture).await;

    let result: Result<Vec<Bytes>, Error> = cluster
        .load(&range_query().with_page_size(100))
        .await
        .unwrap()
        .try_collect()
        .await;

    match result {
        Err(Error::Unreachable { shard, .. }) => assert_eq!(shard, "part-00001.gz"),
        other => panic!("expected unreachable shard, got {:?}", other.map(|r| r.len())),
    }
}

#[tokio::test]
async fn test_fallback_to_second_location() {
    let fixture = build_cluster();
    let missing = fixture.dir.path().join("missing");
    let shard_dir = fixture.shard_dir();
    fixture.write_map(
        &["part-00000.gz", "part-00001.gz"]
            .iter()
            .map(|s| {
                format!(
                    "{}\t{}\t{}\n",
                    s,
                    missing.join(s).display(),
                    shard_dir.join(s).display()
                )
            })
            .collect::<String>(),
        SystemTime::now(),
    );
    let cluster = open(&fixture).await;

    let records = collect(&cluster, &range_query().with_page_size(100)).await;
    assert_eq!(records.len(), 68);
}

#[tokio::test]
async fn test_mapping_reload_between_queries() {
    let fixture = build_cluster();
    let cluster = open(&fixture).await;
    let before = collect(&cluster, &range_query()).await;

    // Move the shards and publish a new mapping
    let mirror = fixture.dir.path().join("mirror");
    std::fs::rename(fixture.shard_dir(), &mirror).unwrap();
    fixture.write_map(&fixture.map_to(&mirror), SystemTime::now());

    let after = collect(&cluster, &range_query()).await;
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_prefix_location_rule() {
    let fixture = build_cluster();
    let config = ClusterConfig {
        shard_index_loc: Some(LocationSource::Prefix {
            pattern: DEFAULT_LOCATION_MATCH.to_string(),
            replace: format!("{}/", fixture.shard_dir().display()),
        }),
        ..Default::default()
    };
    let cluster = Cluster::open(&fixture.summary, config).await.unwrap();

    let records = collect(&cluster, &range_query().with_page(1)).await;
    assert_eq!(records.first().unwrap(), "key0013 0 record");
    assert_eq!(records.last().unwrap(), "key0020 1 record");
}

#[tokio::test]
async fn test_concurrent_fetches_preserve_order() {
    let fixture = build_cluster();
    let config = ClusterConfig {
        max_blocks: 2,
        fetch_concurrency: 4,
        ..Default::default()
    };
    let cluster = Cluster::open(&fixture.summary, config).await.unwrap();

    let sequential = {
        let cluster = open(&fixture).await;
        collect(&cluster, &range_query().with_page_size(100)).await
    };
    let concurrent = collect(&cluster, &range_query().with_page_size(100)).await;
    assert_eq!(concurrent, sequential);
}

#[tokio::test]
async fn test_early_drop() {
    let fixture = build_cluster();
    let cluster = open(&fixture).await;

    let mut records = cluster.load(&range_query()).await.unwrap();
    let first = records.next().await.unwrap().unwrap();
    assert_eq!(first.as_ref(), b"key0003 2 record");
    drop(records);

    // The cluster stays usable after an abandoned query
    let again = collect(&cluster, &range_query()).await;
    assert_eq!(again[0], "key0003 2 record");
}
