use std::path::Path;

use adwatch_core::RawAdRecord;
use async_trait::async_trait;

use crate::error::ScraperError;

/// A source of raw ad records for one competitor page.
///
/// Implementations remember enough about the last request to support
/// post-mortem diagnostics after a failed scrape. Both diagnostic methods
/// are best effort and must never panic.
#[async_trait]
pub trait AdScraper: Send + Sync {
    /// Fetches every ad currently listed for `page_id`.
    ///
    /// # Errors
    ///
    /// Returns a [`ScraperError`] for network, HTTP status or decoding failures.
    async fn scrape_competitor(&self, page_id: &str) -> Result<Vec<RawAdRecord>, ScraperError>;

    /// Writes whatever the scraper last saw to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::NothingCaptured`] when no request has been made
    /// yet, or [`ScraperError::Diagnostic`] if the file cannot be written.
    async fn capture_diagnostic(&self, path: &Path) -> Result<(), ScraperError>;

    /// File extension, without the dot, matching what
    /// [`capture_diagnostic`](Self::capture_diagnostic) writes.
    fn diagnostic_extension(&self) -> &'static str;

    /// The URL of the most recent request, if any.
    fn current_url(&self) -> Option<String>;
}
