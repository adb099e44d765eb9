use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("rate limited by ad source at {url} (retry after {retry_after_secs}s)")]
    RateLimited { url: String, retry_after_secs: u64 },

    #[error("page not found: {url}")]
    NotFound { url: String },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("invalid ad source base URL \"{base_url}\": {reason}")]
    InvalidBaseUrl { base_url: String, reason: String },

    #[error("no response captured yet; nothing to write to {path}")]
    NothingCaptured { path: String },

    #[error("failed to write diagnostic to {path}: {source}")]
    Diagnostic {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ScraperError {
    /// Short, stable category label persisted as the error type of a failed attempt.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ScraperError::Http(e) if e.is_timeout() => "timeout",
            ScraperError::Http(_) => "network",
            ScraperError::Timeout { .. } => "timeout",
            ScraperError::Deserialize { .. } => "parse",
            ScraperError::RateLimited { .. } => "rate_limited",
            ScraperError::NotFound { .. } => "not_found",
            ScraperError::UnexpectedStatus { .. } => "http_status",
            ScraperError::InvalidBaseUrl { .. } => "config",
            ScraperError::NothingCaptured { .. } | ScraperError::Diagnostic { .. } => "diagnostic",
        }
    }
}
