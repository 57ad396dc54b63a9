//! Source Reader: full scan of the registration collection
//!
//! The store hands results back a page at a time. [`SourceReader`] keeps
//! asking until the store stops returning a continuation cursor, so callers
//! only ever see the complete collection.

use async_trait::async_trait;
use edusync_common::Result;
use tracing::{debug, info, instrument};

use crate::record::RawRecord;

pub mod dynamodb;

pub use dynamodb::DynamoDbSource;

/// "Scan the whole collection" as a single logical operation.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn scan_all(&self) -> Result<Vec<RawRecord>>;
}

/// One page of a scan plus where to resume.
#[derive(Debug)]
pub struct ScanPage<C> {
    pub items: Vec<RawRecord>,
    /// `None` once the collection is exhausted
    pub next: Option<C>,
}

/// A store that can be scanned page by page.
#[async_trait]
pub trait PagedScan: Send + Sync {
    type Cursor: Send + Sync + 'static;

    /// Collection name, for logging.
    fn collection(&self) -> &str;

    /// Fetch the page starting at `cursor` (`None` for the first page).
    async fn scan_page(&self, cursor: Option<Self::Cursor>) -> Result<ScanPage<Self::Cursor>>;
}

/// Drains every page of a [`PagedScan`].
pub struct SourceReader<P> {
    pages: P,
}

impl<P: PagedScan> SourceReader<P> {
    pub fn new(pages: P) -> Self {
        Self { pages }
    }

    pub fn inner(&self) -> &P {
        &self.pages
    }
}

#[async_trait]
impl<P: PagedScan> DocumentSource for SourceReader<P> {
    #[instrument(skip(self), fields(collection = %self.pages.collection()))]
    async fn scan_all(&self) -> Result<Vec<RawRecord>> {
        let mut records = Vec::new();
        let mut cursor = None;
        let mut page_count = 0usize;

        loop {
            let page = self.pages.scan_page(cursor.take()).await?;
            page_count += 1;

            debug!(page = page_count, items = page.items.len(), "Scanned page");
            records.extend(page.items);

            match page.next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        info!(pages = page_count, records = records.len(), "Collection scan complete");

        Ok(records)
    }
}
