use adwatch_db::DbError;
use adwatch_scraper::ScraperError;
use thiserror::Error;

/// Errors raised by the run controller and the scoring pass.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A persistence failure. Always fatal to the current run.
    #[error("store error: {0}")]
    Store(#[from] DbError),

    /// A competitor failed on every attempt. Isolated to that competitor.
    #[error("scraping {page_id} failed after {attempts} attempt(s): {source}")]
    ScrapeFailed {
        page_id: String,
        attempts: u32,
        #[source]
        source: ScraperError,
    },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Renders `err` and every `source()` beneath it, outermost first.
pub(crate) fn error_chain(err: &dyn std::error::Error) -> String {
    let mut rendered = err.to_string();
    let mut current = err.source();
    while let Some(cause) = current {
        rendered.push_str("\ncaused by: ");
        rendered.push_str(&cause.to_string());
        current = cause.source();
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_lists_every_cause() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = ScraperError::Deserialize {
            context: "ads for pg_1".to_string(),
            source,
        };
        let chain = error_chain(&err);
        assert!(chain.starts_with("JSON deserialization error for ads for pg_1"));
        assert!(chain.contains("\ncaused by: "));
    }

    #[test]
    fn chain_of_leaf_error_is_its_message() {
        let err = ScraperError::NotFound {
            url: "http://x/pages/1/ads".to_string(),
        };
        assert_eq!(error_chain(&err), "page not found: http://x/pages/1/ads");
    }
}
