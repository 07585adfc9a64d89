//! Query Parameters and Page Metadata
//!
//! A `Query` names a half-open sort-key range `[key, end_key)` plus the
//! pagination options applied to the secondary index:
//!
//! - **page / page_size**: which slice of the matching index lines to decode.
//!   `page_size` counts index lines (blocks), not records, and defaults to the
//!   cluster's `max_blocks` when unset.
//! - **page_count**: only report how many pages the range spans (`PageInfo`).
//! - **index_only**: return the matching secondary index lines instead of the
//!   decoded records.
//!
//! ## Example
//! ```ignore
//! let query = Query::new("com,example)/", "com,example*")
//!     .with_page(2)
//!     .with_page_size(5);
//!
//! let count = Query::prefix("com,example)/").page_count_only();
//! let captures = Query::exact("com,example)/");
//! ```

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A range query over a ZipNum cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    /// Inclusive lower bound
    pub key: Bytes,

    /// Exclusive upper bound
    pub end_key: Bytes,

    /// Page to return (0-based)
    pub page: u64,

    /// Index lines per page; `None` uses the cluster's block limit
    pub page_size: Option<u64>,

    /// Report page metadata instead of records
    pub page_count: bool,

    /// Return secondary index lines instead of decoded records
    pub index_only: bool,
}

impl Query {
    pub fn new(key: impl Into<Bytes>, end_key: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            end_key: end_key.into(),
            page: 0,
            page_size: None,
            page_count: false,
            index_only: false,
        }
    }

    /// Query every key that starts with `key`.
    ///
    /// The end bound is `key` with its last byte incremented, which sorts
    /// after every extension of `key`.
    ///
    /// Keys that are empty or made only of `0xff` bytes have no finite upper
    /// bound. They get `key` followed by one `0xff`, which still covers every
    /// extension whose next byte is below `0xff`. UTF-8 text never contains
    /// `0xff`, so text keys are always bounded exactly.
    pub fn prefix(key: impl Into<Bytes>) -> Self {
        let key = key.into();
        let end_key = prefix_end(&key);
        Self::new(key, end_key)
    }

    /// Query the records of exactly `key`: lines of the form `key <fields>`.
    ///
    /// The end bound `key!` sorts right after the space that separates the
    /// sort key from the remaining fields.
    pub fn exact(key: impl Into<Bytes>) -> Self {
        let key = key.into();
        let mut end_key = key.to_vec();
        end_key.push(b'!');
        Self::new(key, end_key)
    }

    pub fn with_page(mut self, page: u64) -> Self {
        self.page = page;
        self
    }

    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn page_count_only(mut self) -> Self {
        self.page_count = true;
        self
    }

    pub fn index_only(mut self) -> Self {
        self.index_only = true;
        self
    }

    /// Check that the query describes a usable range.
    pub fn validate(&self) -> Result<()> {
        if self.key > self.end_key {
            return Err(Error::InvalidQuery(format!(
                "key {:?} sorts after end key {:?}",
                String::from_utf8_lossy(&self.key),
                String::from_utf8_lossy(&self.end_key)
            )));
        }
        if self.page_size == Some(0) {
            return Err(Error::InvalidQuery("page size must be positive".into()));
        }
        Ok(())
    }

    /// Whether a line lies in `[key, end_key)`
    pub fn contains(&self, line: &[u8]) -> bool {
        line >= self.key.as_ref() && line < self.end_key.as_ref()
    }
}

/// Smallest byte string greater than every string prefixed by `key`, or
/// `key + 0xff` when no such string exists.
fn prefix_end(key: &[u8]) -> Bytes {
    let mut end = key.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Bytes::from(end);
        }
    }
    // Empty or all 0xff: unbounded, cap at extensions not starting with 0xff
    Bytes::from(vec![u8::MAX; key.len() + 1])
}

/// Page metadata reported for `page_count` queries
///
/// Serialized as `{"pages": .., "pageSize": .., "blocks": ..}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    /// Number of pages the range spans
    pub pages: u64,

    /// Index lines per page
    pub page_size: u64,

    /// Number of index lines (blocks) in the range
    pub blocks: u64,
}

impl PageInfo {
    pub fn empty(page_size: u64) -> Self {
        Self {
            pages: 0,
            page_size,
            blocks: 0,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_builder() {
        let query = Query::new("a", "b")
            .with_page(3)
            .with_page_size(7)
            .page_count_only()
            .index_only();

        assert_eq!(query.page, 3);
        assert_eq!(query.page_size, Some(7));
        assert!(query.page_count);
        assert!(query.index_only);
        assert!(query.validate().is_ok());
    }

    #[test]
    fn test_prefix_query() {
        let query = Query::prefix("com,example)/");
        assert_eq!(query.end_key, Bytes::from_static(b"com,example)0"));
        assert!(query.contains(b"com,example)/ 20140101000000"));
        assert!(query.contains(b"com,example)/page"));
        assert!(!query.contains(b"com,example,www)/"));
    }

    #[test]
    fn test_exact_query() {
        let query = Query::exact("com,example)/");
        assert!(query.contains(b"com,example)/ 20140101000000 http://example.com/"));
        assert!(!query.contains(b"com,example)/about 20140101000000"));
        assert!(!query.contains(b"com,example)"));
    }

    #[test]
    fn test_prefix_end_carries_over_max_byte() {
        assert_eq!(prefix_end(b"ab\xff"), Bytes::from_static(b"ac"));
        assert_eq!(prefix_end(b"\xff\xff"), Bytes::from_static(b"\xff\xff\xff"));
    }

    #[test]
    fn test_unbounded_prefix_is_capped() {
        let query = Query::prefix(Bytes::from_static(b"\xff"));
        assert!(query.contains(b"\xff"));
        assert!(query.contains(b"\xff\xfe\xff"));
        assert!(!query.contains(b"\xff\xff"));

        let everything = Query::prefix("");
        assert_eq!(everything.end_key, Bytes::from_static(b"\xff"));
        assert!(everything.contains("com,example)/café 20140101000000".as_bytes()));
    }

    #[test]
    fn test_validate_rejects_inverted_range() {
        let err = Query::new("b", "a").validate().unwrap_err();
        assert!(matches!(err, Error::InvalidQuery(_)));
    }

    #[test]
    fn test_validate_rejects_zero_page_size() {
        assert!(Query::new("a", "b").with_page_size(0).validate().is_err());
    }

    #[test]
    fn test_page_info_json() {
        let info = PageInfo {
            pages: 2,
            page_size: 10,
            blocks: 18,
        };
        assert_eq!(info.to_json(), r#"{"pages":2,"pageSize":10,"blocks":18}"#);
        assert_eq!(PageInfo::empty(5).to_json(), r#"{"pages":0,"pageSize":5,"blocks":0}"#);
    }
}
