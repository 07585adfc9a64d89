//! Error Types for the ZipNum data model
//!
//! These errors come from parsing and validating the values that flow through
//! a query: secondary index lines and query parameters.
//!
//! ## Error Categories
//!
//! ### Format Errors
//! - `MalformedEntry`: A secondary index line could not be parsed
//!
//! ### Query Errors
//! - `InvalidQuery`: Query parameters are inconsistent (e.g. `key > end_key`)
//!
//! Storage-level failures (I/O, unreachable shards, corrupt blocks) live in
//! `zipnum_storage::Error`, which wraps this type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Malformed index entry: {reason} (line: {line:?})")]
    MalformedEntry { line: String, reason: String },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn malformed(line: &[u8], reason: impl Into<String>) -> Self {
        Error::MalformedEntry {
            line: String::from_utf8_lossy(line).into_owned(),
            reason: reason.into(),
        }
    }
}
