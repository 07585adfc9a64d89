//! Page Planning over the Secondary Index
//!
//! The secondary index holds one line per compressed block, each carrying the
//! first key of its block and a running line number:
//!
//! ```text
//! com,example)/ 20140101000000\tpart-00000.gz\t0\t2631\t0
//! com,example)/about 20140102\tpart-00000.gz\t2631\t2417\t1
//! ...
//! ```
//!
//! ## Planning a Query
//!
//! ```text
//! end anchor   = line before the first line >= end_key (or the last line)
//! start anchor = line before the first line >= key (truncated at end_key)
//! line_span    = end.line_number - start.line_number
//! total_pages  = line_span / page_size + 1
//! ```
//!
//! Look-back by one line matters: a block whose first key sorts before `key`
//! may still hold records for `key`.
//!
//! Page `p` covers the index lines `start + p * page_size ..= start + min(p *
//! page_size + page_size - 1, line_span)`. Pages are disjoint, so decoding
//! pages `0..total_pages` one after another yields each record once.
//!
//! After the two searches everything is read sequentially from the open file.
//! The returned [`IndexPage`] owns the file handle; dropping it closes the file.

use bytes::Bytes;
use futures::stream::{self, Stream, TryStreamExt};
use zipnum_core::{IndexEntry, PageInfo, Query};

use crate::binsearch::{LineScan, SortedFile};
use crate::error::{Error, Result};

/// Page metadata for a query range
#[derive(Debug)]
pub enum PageCount {
    /// Final page metadata
    Final(PageInfo),

    /// Page metadata for a single-page range, valid only if the block of
    /// `first` decodes to at least one record
    Verify { first: IndexEntry, info: PageInfo },
}

/// Both anchors of a query range, with the scan positioned after the first
struct Anchors {
    scan: LineScan,
    first_line: Bytes,
    first: IndexEntry,
    page_size: u64,
    line_span: u64,
    total_pages: u64,
}

/// Locate the anchors of `query`. `None` when no index line falls in range.
async fn locate(mut file: SortedFile, query: &Query, max_blocks: u64) -> Result<Option<Anchors>> {
    query.validate()?;
    let page_size = query.page_size.unwrap_or(max_blocks).max(1);

    let end_line = match file.search(&query.end_key, 1).await? {
        Some(mut lines) => lines.pop_front(),
        None => file.read_last_line().await?,
    };

    let mut scan = file.iter_range(&query.key, &query.end_key, 1).await?;

    let Some(first_line) = scan.next_line().await? else {
        return Ok(None);
    };

    let first = IndexEntry::parse(&first_line)?;
    let end = match end_line {
        Some(line) => IndexEntry::parse(&line)?,
        None => first.clone(),
    };

    let line_span = end.line_number.saturating_sub(first.line_number);
    let total_pages = line_span / page_size + 1;

    tracing::debug!(
        first_line = first.line_number,
        end_line = end.line_number,
        page_size,
        total_pages,
        "Planned index page range"
    );

    Ok(Some(Anchors {
        scan,
        first_line,
        first,
        page_size,
        line_span,
        total_pages,
    }))
}

/// Count the pages of `query` against an opened secondary index.
///
/// `max_blocks` is the page size used when the query does not set one. The
/// `page` and `page_count` fields of the query are ignored.
pub async fn count_pages(file: SortedFile, query: &Query, max_blocks: u64) -> Result<PageCount> {
    let Some(anchors) = locate(file, query, max_blocks).await? else {
        let page_size = query.page_size.unwrap_or(max_blocks).max(1);
        return Ok(PageCount::Final(PageInfo::empty(page_size)));
    };

    let info = PageInfo {
        pages: anchors.total_pages,
        page_size: anchors.page_size,
        blocks: anchors.line_span + 1,
    };

    if anchors.total_pages == 1 {
        return Ok(PageCount::Verify {
            first: anchors.first,
            info,
        });
    }
    Ok(PageCount::Final(info))
}

/// Select the index lines of page `query.page` from an opened secondary index.
///
/// `max_blocks` is the page size used when the query does not set one. The
/// `page_count` field of the query is ignored.
pub async fn compute_page_range(
    file: SortedFile,
    query: &Query,
    max_blocks: u64,
) -> Result<IndexPage> {
    let Some(anchors) = locate(file, query, max_blocks).await? else {
        return Err(Error::KeyNotFound(
            String::from_utf8_lossy(&query.key).into_owned(),
        ));
    };

    if query.page >= anchors.total_pages {
        return Err(Error::InvalidPage {
            page: query.page,
            last_page: anchors.total_pages - 1,
        });
    }

    let page_size = anchors.page_size;
    let start_line = query.page * page_size;
    let end_line = start_line
        .saturating_add(page_size - 1)
        .min(anchors.line_span);

    let page = if query.page == 0 {
        IndexPage {
            scan: anchors.scan,
            head: Some(anchors.first_line),
            skip: 0,
            remaining: end_line,
        }
    } else {
        IndexPage {
            scan: anchors.scan,
            head: None,
            skip: start_line - 1,
            remaining: end_line - start_line + 1,
        }
    };

    Ok(page)
}

/// The secondary index lines of one page, read lazily
pub struct IndexPage {
    scan: LineScan,

    /// Anchor line, already read (page 0 only)
    head: Option<Bytes>,

    /// Lines after the anchor to pass over before this page starts
    skip: u64,

    /// Lines left to emit after `head`
    remaining: u64,
}

impl IndexPage {
    /// Next raw index line of the page
    pub async fn next_line(&mut self) -> Result<Option<Bytes>> {
        if let Some(head) = self.head.take() {
            return Ok(Some(head));
        }

        while self.skip > 0 {
            self.skip -= 1;
            if self.scan.next_line().await?.is_none() {
                self.remaining = 0;
                return Ok(None);
            }
        }

        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;

        Ok(self.scan.next_line().await?)
    }

    /// Raw index lines as a stream
    pub fn into_lines(self) -> impl Stream<Item = Result<Bytes>> + Send {
        stream::try_unfold(self, |mut page| async move {
            Ok(page.next_line().await?.map(|line| (line, page)))
        })
    }

    /// Parsed index entries as a stream
    pub fn into_entries(self) -> impl Stream<Item = Result<IndexEntry>> + Send {
        self.into_lines()
            .and_then(|line| async move { IndexEntry::parse(&line).map_err(Error::from) })
    }
}
