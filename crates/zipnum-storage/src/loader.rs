//! Byte-Range Loading
//!
//! A shard location is a string: a local path (`/data/cdx/part-00001.gz`), a
//! `file://` URL, or a remote URL (`http://archive.example.org/cdx/part-00001.gz`).
//! [`BlockLoader`] turns `(location, offset, length)` into the bytes of that range.
//!
//! ## Implementations
//!
//! - [`ObjectStoreLoader`]: resolves the location with `object_store::parse_url`
//!   and issues a ranged GET. Stores are created once per scheme + authority and
//!   reused, so HTTP connection pools survive across queries.
//! - [`MemoryLoader`]: serves ranges out of in-memory objects. Useful for tests
//!   and for clusters preloaded into memory.
//!
//! A range that comes back shorter than requested is an error: the secondary
//! index and the shard disagree, and decoding a truncated gzip member would only
//! fail later with a less useful message.

use async_trait::async_trait;
use bytes::Bytes;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use tokio::sync::RwLock;
use url::Url;

use crate::error::{Error, Result};

/// Loads byte ranges from shard locations
#[async_trait]
pub trait BlockLoader: Send + Sync {
    /// Read `length` bytes starting at `offset` from `location`.
    async fn load(&self, location: &str, offset: u64, length: u64) -> Result<Bytes>;
}

/// [`BlockLoader`] backed by `object_store`
#[derive(Default)]
pub struct ObjectStoreLoader {
    /// Stores keyed by `scheme://authority`
    stores: RwLock<HashMap<String, Arc<dyn ObjectStore>>>,
}

impl ObjectStoreLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Turn a location string into a URL. Bare paths become `file://` URLs.
    fn location_url(location: &str) -> Result<Url> {
        if let Ok(url) = Url::parse(location) {
            // Single-letter schemes are Windows drive letters, not URLs
            if url.scheme().len() > 1 {
                return Ok(url);
            }
        }

        let path = std::path::Path::new(location);
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };

        Url::from_file_path(&absolute)
            .map_err(|_| Error::MalformedLocation(format!("not a usable file path: {}", location)))
    }

    async fn store_for(&self, url: &Url) -> Result<(Arc<dyn ObjectStore>, ObjectPath)> {
        let base = url[..url::Position::BeforePath].to_string();

        {
            let stores = self.stores.read().await;
            if let Some(store) = stores.get(&base) {
                let path = ObjectPath::from_url_path(url.path())
                    .map_err(|e| Error::MalformedLocation(e.to_string()))?;
                return Ok((store.clone(), path));
            }
        }

        let (store, path) = object_store::parse_url(url)?;
        let store: Arc<dyn ObjectStore> = Arc::from(store);

        tracing::debug!(base = %base, "Created object store for shard locations");
        let mut stores = self.stores.write().await;
        let store = stores.entry(base).or_insert(store).clone();

        Ok((store, path))
    }
}

#[async_trait]
impl BlockLoader for ObjectStoreLoader {
    async fn load(&self, location: &str, offset: u64, length: u64) -> Result<Bytes> {
        let url = Self::location_url(location)?;
        let (store, path) = self.store_for(&url).await?;

        let start = to_usize(offset, location)?;
        let end = to_usize(range_end(offset, length, location)?, location)?;
        let data = store.get_range(&path, start..end).await?;

        check_length(location, length, data)
    }
}

/// [`BlockLoader`] over in-memory objects
#[derive(Default)]
pub struct MemoryLoader {
    objects: std::sync::RwLock<HashMap<String, Bytes>>,
    calls: std::sync::Mutex<Vec<String>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object under `location`
    pub fn insert(&self, location: impl Into<String>, data: impl Into<Bytes>) {
        if let Ok(mut objects) = self.objects.write() {
            objects.insert(location.into(), data.into());
        }
    }

    /// Locations requested so far, in call order (including failed ones)
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl BlockLoader for MemoryLoader {
    async fn load(&self, location: &str, offset: u64, length: u64) -> Result<Bytes> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(location.to_string());
        }

        let data = self
            .objects
            .read()
            .ok()
            .and_then(|objects| objects.get(location).cloned())
            .ok_or_else(|| {
                Error::Io(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no such object: {}", location),
                ))
            })?;

        let start = to_usize(offset, location)?.min(data.len());
        let end = to_usize(range_end(offset, length, location)?, location)?.min(data.len());

        check_length(location, length, data.slice(start..end))
    }
}

fn range_end(offset: u64, length: u64, location: &str) -> Result<u64> {
    offset.checked_add(length).ok_or_else(|| {
        Error::MalformedLocation(format!(
            "range {}+{} overflows for {}",
            offset, length, location
        ))
    })
}

fn to_usize(value: u64, location: &str) -> Result<usize> {
    usize::try_from(value)
        .map_err(|_| Error::MalformedLocation(format!("offset {} out of range for {}", value, location)))
}

fn check_length(location: &str, expected: u64, data: Bytes) -> Result<Bytes> {
    if data.len() as u64 != expected {
        return Err(Error::ShortRead {
            location: location.to_string(),
            expected,
            actual: data.len() as u64,
        });
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_shard(dir: &TempDir) -> String {
        let path = dir.path().join("part-00000.gz");
        std::fs::write(&path, b"0123456789abcdef").unwrap();
        path.to_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_load_local_path() {
        let dir = TempDir::new().unwrap();
        let location = write_shard(&dir);

        let loader = ObjectStoreLoader::new();
        let data = loader.load(&location, 4, 6).await.unwrap();
        assert_eq!(data.as_ref(), b"456789");

        // Second load reuses the cached local store
        let data = loader.load(&location, 10, 6).await.unwrap();
        assert_eq!(data.as_ref(), b"abcdef");
        assert_eq!(loader.stores.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_load_file_url() {
        let dir = TempDir::new().unwrap();
        let location = write_shard(&dir);
        let url = Url::from_file_path(&location).unwrap().to_string();

        let loader = ObjectStoreLoader::new();
        let data = loader.load(&url, 0, 3).await.unwrap();
        assert_eq!(data.as_ref(), b"012");
    }

    #[tokio::test]
    async fn test_load_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        let location = dir.path().join("missing.gz");

        let loader = ObjectStoreLoader::new();
        let result = loader.load(location.to_str().unwrap(), 0, 3).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_memory_loader() {
        let loader = MemoryLoader::new();
        loader.insert("mem/part-a", Bytes::from_static(b"hello world"));

        let data = loader.load("mem/part-a", 6, 5).await.unwrap();
        assert_eq!(data.as_ref(), b"world");

        let err = loader.load("mem/part-a", 6, 50).await.unwrap_err();
        assert!(matches!(err, Error::ShortRead { expected: 50, actual: 5, .. }));

        assert!(loader.load("mem/part-b", 0, 1).await.is_err());
        assert_eq!(loader.calls(), vec!["mem/part-a", "mem/part-a", "mem/part-b"]);
    }

    #[tokio::test]
    async fn test_overflowing_range_is_rejected() {
        let loader = MemoryLoader::new();
        loader.insert("mem/part-a", Bytes::from_static(b"hello world"));

        let err = loader.load("mem/part-a", u64::MAX - 1, 10).await.unwrap_err();
        assert!(matches!(err, Error::MalformedLocation(_)));

        let dir = TempDir::new().unwrap();
        let location = write_shard(&dir);
        let err = ObjectStoreLoader::new()
            .load(&location, u64::MAX, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedLocation(_)));
    }
}
