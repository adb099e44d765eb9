use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use adwatch_core::RawAdRecord;
use async_trait::async_trait;
use reqwest::Client;

use crate::error::ScraperError;
use crate::normalize::normalize_record;
use crate::source::AdScraper;
use crate::types::AdsResponse;

/// What the client saw on its most recent request.
#[derive(Debug, Default, Clone)]
struct LastExchange {
    url: Option<String>,
    body: Option<Vec<u8>>,
}

/// HTTP client for the ad-source service.
///
/// One request per competitor: `GET {base_url}/pages/{page_id}/ads`, answered
/// with `{"ads": [...]}`. Non-2xx statuses become typed errors. The client
/// never retries on its own; retry policy belongs to the caller.
pub struct AdSourceClient {
    client: Client,
    base_url: reqwest::Url,
    last: Mutex<LastExchange>,
}

impl AdSourceClient {
    /// Creates a client with the configured timeout and `User-Agent`.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::InvalidBaseUrl`] if `base_url` is not an
    /// absolute http(s) URL, or [`ScraperError::Http`] if the underlying
    /// `reqwest::Client` cannot be constructed.
    pub fn new(base_url: &str, timeout_secs: u64, user_agent: &str) -> Result<Self, ScraperError> {
        let parsed = reqwest::Url::parse(base_url).map_err(|e| ScraperError::InvalidBaseUrl {
            base_url: base_url.to_owned(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ScraperError::InvalidBaseUrl {
                base_url: base_url.to_owned(),
                reason: format!("unsupported scheme \"{}\"", parsed.scheme()),
            });
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()?;

        Ok(Self {
            client,
            base_url: parsed,
            last: Mutex::new(LastExchange::default()),
        })
    }

    /// Builds `{base}/pages/{page_id}/ads`, percent-encoding the page id.
    pub(crate) fn ads_url(&self, page_id: &str) -> Result<String, ScraperError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ScraperError::InvalidBaseUrl {
                base_url: self.base_url.to_string(),
                reason: "URL cannot be a base".to_owned(),
            })?
            .pop_if_empty()
            .extend(["pages", page_id, "ads"]);
        Ok(url.to_string())
    }

    fn remember(&self, url: Option<String>, body: Option<Vec<u8>>) {
        if let Ok(mut last) = self.last.lock() {
            if url.is_some() {
                last.url = url;
            }
            last.body = body;
        }
    }

    fn snapshot(&self) -> LastExchange {
        self.last
            .lock()
            .map(|last| last.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AdScraper for AdSourceClient {
    async fn scrape_competitor(&self, page_id: &str) -> Result<Vec<RawAdRecord>, ScraperError> {
        let url = self.ads_url(page_id)?;
        self.remember(Some(url.clone()), None);

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                ScraperError::Timeout { url: url.clone() }
            } else {
                ScraperError::Http(e)
            }
        })?;
        let status = response.status();
        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(60);

        let body = response.bytes().await?;
        self.remember(None, Some(body.to_vec()));

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ScraperError::RateLimited {
                url,
                retry_after_secs,
            });
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ScraperError::NotFound { url });
        }
        if !status.is_success() {
            return Err(ScraperError::UnexpectedStatus {
                status: status.as_u16(),
                url,
            });
        }

        let parsed =
            serde_json::from_slice::<AdsResponse>(&body).map_err(|e| ScraperError::Deserialize {
                context: format!("ads for page {page_id}"),
                source: e,
            })?;

        let records: Vec<RawAdRecord> = parsed
            .ads
            .into_iter()
            .map(|wire| normalize_record(wire, page_id))
            .collect();

        tracing::debug!(page_id, count = records.len(), "fetched ads from source");
        Ok(records)
    }

    async fn capture_diagnostic(&self, path: &Path) -> Result<(), ScraperError> {
        let display = path.display().to_string();
        let Some(body) = self.snapshot().body else {
            return Err(ScraperError::NothingCaptured { path: display });
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ScraperError::Diagnostic {
                    path: display.clone(),
                    source,
                })?;
        }
        tokio::fs::write(path, body)
            .await
            .map_err(|source| ScraperError::Diagnostic {
                path: display,
                source,
            })
    }

    fn diagnostic_extension(&self) -> &'static str {
        "body"
    }

    fn current_url(&self) -> Option<String> {
        self.snapshot().url
    }
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
