//! Applies a mapping table to one query row.
//!
//! For every link, in table order: skip when the column is absent or null,
//! run the file-parse branch, run the crawl branch, then emit the transformed
//! value. Both branches see the raw column value.

use std::collections::BTreeSet;
use std::path::PathBuf;

use tracing::{debug, instrument, trace, warn};
use url::Url;

use fieldmap_shared::{
    ColumnMatch, FetchCategory, FieldMapError, IndexDocument, MappingOptions, Result,
};

use crate::gateway::{CrawlGateway, CrawlOutcome, FetchHandle, ParserGateway};
use crate::row::Row;
use crate::table::MappingTable;
use crate::target::TargetRule;
use crate::transform;

/// Category attached to every fetch submitted by the row mapper.
pub const ROW_FETCH_CATEGORY: FetchCategory = FetchCategory::Database;

/// What happened while mapping one row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowReport {
    /// Rules that emitted a value.
    pub rules_applied: usize,
    /// Rules skipped because the column was absent or null.
    pub rules_skipped: usize,
    /// Files extracted without fault.
    pub files_parsed: usize,
    /// File extractions that failed with an I/O fault.
    pub extraction_faults: usize,
    /// Fetches submitted to the crawl worker.
    pub crawls_submitted: usize,
    /// Start or end waits that ran out of budget.
    pub crawl_timeouts: usize,
    /// Crawled documents merged into the output.
    pub crawl_documents_merged: usize,
}

/// Maps rows with a fixed parser gateway, crawl gateway and options.
pub struct RowMapper<'a, P, C> {
    parsers: &'a P,
    crawler: &'a C,
    options: MappingOptions,
}

impl<'a, P, C> RowMapper<'a, P, C>
where
    P: ParserGateway,
    C: CrawlGateway,
{
    pub fn new(parsers: &'a P, crawler: &'a C, options: MappingOptions) -> Self {
        Self {
            parsers,
            crawler,
            options,
        }
    }

    /// Map `row` into `document`.
    ///
    /// The first row-fatal error stops the remaining rules. Values added by
    /// earlier rules stay in `document`.
    #[instrument(skip_all, fields(rules = table.len()))]
    pub async fn map_row<R>(
        &self,
        table: &MappingTable,
        row: &R,
        document: &mut IndexDocument,
    ) -> Result<RowReport>
    where
        R: Row + ?Sized,
    {
        let columns = row.column_names()?;
        let mut report = RowReport::default();

        for link in table.rules() {
            let Some(column) = self.resolve_column(&columns, &link.source) else {
                trace!(column = %link.source, "column absent, rule skipped");
                report.rules_skipped += 1;
                continue;
            };

            let Some(content) = row.get_string(column)? else {
                trace!(column, "null value, rule skipped");
                report.rules_skipped += 1;
                continue;
            };

            let rule = &link.target;

            if rule.file_path() {
                self.parse_file(rule, &content, document, &mut report).await?;
            }

            if rule.crawl_url() {
                self.crawl(&content, document, &mut report).await?;
            }

            let value = transform::apply(rule, &content)?;
            document.add(rule.target_name(), value);
            report.rules_applied += 1;
        }

        debug!(
            applied = report.rules_applied,
            skipped = report.rules_skipped,
            fields = document.len(),
            "row mapped"
        );

        Ok(report)
    }

    /// Map `row` into a fresh document, returned only if every rule succeeded.
    pub async fn build_document<R>(
        &self,
        table: &MappingTable,
        row: &R,
    ) -> Result<(IndexDocument, RowReport)>
    where
        R: Row + ?Sized,
    {
        let mut document = IndexDocument::new();
        let report = self.map_row(table, row, &mut document).await?;
        Ok((document, report))
    }

    fn resolve_column<'c>(&self, columns: &'c BTreeSet<String>, source: &str) -> Option<&'c str> {
        if let Some(exact) = columns.get(source) {
            return Some(exact.as_str());
        }
        match self.options.column_match {
            ColumnMatch::Exact => None,
            ColumnMatch::CaseInsensitive => columns
                .iter()
                .find(|name| name.eq_ignore_ascii_case(source))
                .map(String::as_str),
        }
    }

    /// File branch: `prefix + content` names a file handed to a parser.
    ///
    /// Extraction reads and parses the file, so it runs on the blocking pool.
    async fn parse_file(
        &self,
        rule: &TargetRule,
        content: &str,
        document: &mut IndexDocument,
        report: &mut RowReport,
    ) -> Result<()> {
        let path = PathBuf::from(format!("{}{content}", rule.file_path_prefix().unwrap_or("")));
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            debug!(?path, "file not found, parse skipped");
            return Ok(());
        }

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let Some(mut parser) = self.parsers.resolve(&file_name, None)? else {
            debug!(file_name, "no parser for file");
            return Ok(());
        };

        let (parser, extracted, path) = tokio::task::spawn_blocking(move || {
            let extracted = parser.extract(&path);
            (parser, extracted, path)
        })
        .await
        .map_err(|e| FieldMapError::parse(format!("file extraction task failed: {e}")))?;

        match extracted {
            Ok(()) => report.files_parsed += 1,
            Err(e) if e.is_io() => {
                warn!(?path, parser = parser.name(), error = %e, "file extraction failed");
                report.extraction_faults += 1;
                if !self.options.populate_after_extract_fault {
                    return Ok(());
                }
            }
            Err(e) => return Err(e),
        }

        parser.populate(document);
        Ok(())
    }

    /// Crawl branch: fetch `content` as a URL and merge the extracted document.
    async fn crawl(
        &self,
        content: &str,
        document: &mut IndexDocument,
        report: &mut RowReport,
    ) -> Result<()> {
        let url = Url::parse(content).map_err(|source| FieldMapError::InvalidUrl {
            url: content.to_string(),
            source,
        })?;

        let handle = self.crawler.submit(&url, ROW_FETCH_CATEGORY)?;
        report.crawls_submitted += 1;

        // The end wait runs even when the start wait ran out.
        if !handle.wait_for_start(self.options.crawl_start_timeout).await? {
            debug!(%url, budget = ?self.options.crawl_start_timeout, "crawl not started in time");
            report.crawl_timeouts += 1;
        }
        if !handle.wait_for_end(self.options.crawl_end_timeout).await? {
            debug!(%url, budget = ?self.options.crawl_end_timeout, "crawl not finished in time");
            report.crawl_timeouts += 1;
        }

        match handle.current_result() {
            Some(CrawlOutcome {
                document: Some(crawled),
                ..
            }) => {
                document.merge(&crawled);
                report.crawl_documents_merged += 1;
            }
            Some(outcome) => {
                debug!(%url, error = outcome.error.as_deref().unwrap_or("none"), "crawl produced no document");
            }
            None => debug!(%url, "crawl result not available"),
        }

        Ok(())
    }
}
