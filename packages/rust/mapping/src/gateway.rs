//! Contracts of the external services a rule can call into.
//!
//! The row mapper only sees these traits; concrete parsers and the crawl
//! worker live in their own crates and are passed in by the caller.

use std::path::Path;
use std::time::Duration;

use url::Url;

use fieldmap_shared::{FetchCategory, FieldMapError, IndexDocument, Result};

// ---------------------------------------------------------------------------
// File parsing
// ---------------------------------------------------------------------------

/// A type-specific content extractor for one file.
pub trait Parser: Send {
    /// Read and extract `path`. [`FieldMapError::Io`] is the recoverable fault
    /// class; any other error aborts the row.
    fn extract(&mut self, path: &Path) -> Result<()>;

    /// Append whatever the parser currently holds to `document`.
    fn populate(&self, document: &mut IndexDocument);

    /// Parser name for tracing.
    fn name(&self) -> &str;
}

/// Picks a parser for a file.
pub trait ParserGateway {
    /// Resolve a parser from the file name and an optional mime hint.
    ///
    /// `Ok(None)` means no parser handles the file. An error means a parser
    /// matched but could not be created.
    fn resolve(&self, file_name: &str, mime_hint: Option<&str>) -> Result<Option<Box<dyn Parser>>>;
}

// ---------------------------------------------------------------------------
// Crawl fetching
// ---------------------------------------------------------------------------

/// Final state of a crawl fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlOutcome {
    /// Fetched URL.
    pub url: Url,
    /// Origin of the fetch.
    pub category: FetchCategory,
    /// HTTP status code, if a response arrived.
    pub status_code: Option<u16>,
    /// Extracted document, if the fetch produced one.
    pub document: Option<IndexDocument>,
    /// Why no document was produced.
    pub error: Option<String>,
}

/// A submitted fetch.
///
/// Waits return `Ok(false)` when their budget elapses; that is not a fault and
/// the fetch keeps running. An error means the crawl worker itself failed.
#[allow(async_fn_in_trait)]
pub trait FetchHandle {
    /// Wait up to `budget` for the fetch to start.
    async fn wait_for_start(&self, budget: Duration) -> Result<bool>;

    /// Wait up to `budget` for the fetch to finish.
    async fn wait_for_end(&self, budget: Duration) -> Result<bool>;

    /// The outcome, once the fetch has finished.
    fn current_result(&self) -> Option<CrawlOutcome>;
}

/// Submits fetches to a crawl worker.
pub trait CrawlGateway {
    type Handle: FetchHandle;

    /// Queue `url` for fetching.
    fn submit(&self, url: &Url, category: FetchCategory) -> Result<Self::Handle>;
}

/// Gateway for tables with no crawl rule: every submission fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCrawl;

/// Handle type of [`NoCrawl`]; it has no values.
#[derive(Debug)]
pub enum NoFetch {}

impl FetchHandle for NoFetch {
    async fn wait_for_start(&self, _budget: Duration) -> Result<bool> {
        match *self {}
    }

    async fn wait_for_end(&self, _budget: Duration) -> Result<bool> {
        match *self {}
    }

    fn current_result(&self) -> Option<CrawlOutcome> {
        match *self {}
    }
}

impl CrawlGateway for NoCrawl {
    type Handle = NoFetch;

    fn submit(&self, url: &Url, _category: FetchCategory) -> Result<NoFetch> {
        Err(FieldMapError::config(format!(
            "no crawl worker provisioned for {url}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_crawl_refuses_submission() {
        let url = Url::parse("https://example.com/").unwrap();
        let err = NoCrawl.submit(&url, FetchCategory::Database).unwrap_err();
        assert!(err.to_string().contains("no crawl worker"));
    }
}
