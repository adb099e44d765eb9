//! Deduplicating, bounded-concurrency media downloader.
//!
//! One [`MediaStore`] lives for one run. Its URL → path cache is never
//! persisted, so a later run downloads the same creative again.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use adwatch_core::{Ad, MediaType};
use futures::stream::{self, StreamExt};
use thiserror::Error;
use tokio::sync::OnceCell;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("unsupported URL scheme: {url}")]
    UnsupportedScheme { url: String },

    #[error("HTTP {status} fetching {url}")]
    Status { status: u16, url: String },

    #[error("timed out fetching {url}")]
    Timeout { url: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// What happened to one ad's media.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaOutcome {
    /// Fetched by this ad's own request.
    Downloaded {
        media_path: PathBuf,
        thumbnail_path: Option<PathBuf>,
    },
    /// Served from the cache or from another ad's in-flight fetch.
    Deduplicated { media_path: PathBuf },
    /// The ad has no media URL.
    Skipped,
    Failed { error: String },
}

impl MediaOutcome {
    /// The local media file, for the two successful outcomes.
    #[must_use]
    pub fn media_path(&self) -> Option<&Path> {
        match self {
            MediaOutcome::Downloaded { media_path, .. }
            | MediaOutcome::Deduplicated { media_path } => Some(media_path),
            MediaOutcome::Skipped | MediaOutcome::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdMedia {
    pub ad_id: String,
    pub outcome: MediaOutcome,
}

/// Aggregate result of [`MediaStore::download_batch`].
///
/// `success` includes deduplicated ads; `deduplicated` is a subset of it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResult {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
    pub deduplicated: usize,
    /// One entry per input ad, in input order.
    pub outcomes: Vec<AdMedia>,
}

type PathCell = Arc<OnceCell<PathBuf>>;

pub struct MediaStore {
    client: reqwest::Client,
    base_path: PathBuf,
    cache: Mutex<HashMap<String, PathCell>>,
}

impl std::fmt::Debug for MediaStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaStore")
            .field("base_path", &self.base_path)
            .field("cached_urls", &self.lock_cache().len())
            .finish_non_exhaustive()
    }
}

impl MediaStore {
    /// Creates a store writing under `base_path`.
    ///
    /// # Errors
    ///
    /// Returns [`reqwest::Error`] if the HTTP client cannot be built.
    pub fn new(
        base_path: impl Into<PathBuf>,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            client,
            base_path: base_path.into(),
            cache: Mutex::new(HashMap::new()),
        })
    }

    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Downloads media for every ad with at most `concurrency` ads in flight.
    ///
    /// Never fails as a whole: each ad's error is reported in its outcome.
    pub async fn download_batch(&self, ads: &[Ad], concurrency: usize) -> BatchResult {
        let mut indexed = stream::iter(ads.iter().enumerate().map(|(idx, ad)| async move {
            (idx, self.download_ad(ad).await)
        }))
        .buffer_unordered(concurrency.max(1))
        .collect::<Vec<_>>()
        .await;
        indexed.sort_by_key(|(idx, _)| *idx);

        let mut result = BatchResult {
            total: ads.len(),
            ..BatchResult::default()
        };
        for (idx, outcome) in indexed {
            match &outcome {
                MediaOutcome::Downloaded { .. } => result.success += 1,
                MediaOutcome::Deduplicated { .. } => {
                    result.success += 1;
                    result.deduplicated += 1;
                }
                MediaOutcome::Skipped => result.skipped += 1,
                MediaOutcome::Failed { .. } => result.failed += 1,
            }
            result.outcomes.push(AdMedia {
                ad_id: ads[idx].ad_id.clone(),
                outcome,
            });
        }

        tracing::info!(
            total = result.total,
            success = result.success,
            failed = result.failed,
            skipped = result.skipped,
            deduplicated = result.deduplicated,
            "media batch complete"
        );
        result
    }

    async fn download_ad(&self, ad: &Ad) -> MediaOutcome {
        let Some(media_url) = ad
            .media_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
        else {
            return MediaOutcome::Skipped;
        };

        let dir = self
            .base_path
            .join(sanitize_segment(&ad.page_id))
            .join(sanitize_segment(&ad.ad_id));
        let media_dest = dir.join(format!("media{}", extension_for(media_url, ad.media_type)));

        let (media_path, fetched) = match self.fetch_cached(media_url, media_dest).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(ad_id = %ad.ad_id, url = %media_url, error = %e, "media download failed");
                return MediaOutcome::Failed {
                    error: e.to_string(),
                };
            }
        };

        if !fetched {
            tracing::debug!(ad_id = %ad.ad_id, path = %media_path.display(), "media deduplicated");
            return MediaOutcome::Deduplicated { media_path };
        }

        let thumbnail_path = match ad
            .thumbnail_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty() && *u != media_url)
        {
            Some(thumb_url) => {
                let dest = dir.join(format!(
                    "thumbnail{}",
                    extension_for(thumb_url, Some(MediaType::Image))
                ));
                match self.fetch_cached(thumb_url, dest).await {
                    Ok((path, _)) => Some(path),
                    Err(e) => {
                        tracing::warn!(ad_id = %ad.ad_id, url = %thumb_url, error = %e, "thumbnail download failed");
                        None
                    }
                }
            }
            None => None,
        };

        MediaOutcome::Downloaded {
            media_path,
            thumbnail_path,
        }
    }

    /// Resolves `url` through the cache, fetching it to `dest` on a miss.
    ///
    /// Returns the cached path and whether this call performed the fetch.
    /// Concurrent callers for one URL share a single fetch. Failures are not
    /// cached; the next caller tries again.
    async fn fetch_cached(&self, url: &str, dest: PathBuf) -> Result<(PathBuf, bool), MediaError> {
        let cell: PathCell = {
            let mut cache = self.lock_cache();
            Arc::clone(cache.entry(url.to_string()).or_default())
        };

        let fetched = AtomicBool::new(false);
        let fetched_flag = &fetched;
        let path = cell
            .get_or_try_init(move || async move {
                fetched_flag.store(true, Ordering::SeqCst);
                self.fetch_to_file(url, &dest).await?;
                Ok::<PathBuf, MediaError>(dest)
            })
            .await?;
        Ok((path.clone(), fetched.load(Ordering::SeqCst)))
    }

    async fn fetch_to_file(&self, url: &str, dest: &Path) -> Result<(), MediaError> {
        let lower = url.to_ascii_lowercase();
        if !(lower.starts_with("http://") || lower.starts_with("https://")) {
            return Err(MediaError::UnsupportedScheme {
                url: url.to_string(),
            });
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify(e, url))?;
        let status = response.status();
        if !status.is_success() {
            return Err(MediaError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        let body = response.bytes().await.map_err(|e| classify(e, url))?;

        let io_err = |source: std::io::Error| MediaError::Io {
            path: dest.display().to_string(),
            source,
        };
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(dest, &body).await.map_err(io_err)?;

        tracing::debug!(path = %dest.display(), bytes = body.len(), "media file written");
        Ok(())
    }

    fn lock_cache(&self) -> MutexGuard<'_, HashMap<String, PathCell>> {
        self.cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn classify(err: reqwest::Error, url: &str) -> MediaError {
    if err.is_timeout() {
        MediaError::Timeout {
            url: url.to_string(),
        }
    } else {
        MediaError::Http(err)
    }
}

/// File extension for `url`, judged from its path and falling back to the
/// media type: `.mp4` for video, `.jpg` otherwise.
#[must_use]
pub fn extension_for(url: &str, media_type: Option<MediaType>) -> &'static str {
    let path = reqwest::Url::parse(url).map_or_else(
        |_| {
            url.split(['?', '#'])
                .next()
                .unwrap_or_default()
                .to_ascii_lowercase()
        },
        |parsed| parsed.path().to_ascii_lowercase(),
    );

    if path.contains(".mp4") {
        ".mp4"
    } else if path.contains(".webm") {
        ".webm"
    } else if path.contains(".jpg") || path.contains(".jpeg") {
        ".jpg"
    } else if path.contains(".png") {
        ".png"
    } else if path.contains(".gif") {
        ".gif"
    } else if path.contains(".webp") {
        ".webp"
    } else if media_type == Some(MediaType::Video) {
        ".mp4"
    } else {
        ".jpg"
    }
}

/// Keeps ids usable as a single path component.
pub(crate) fn sanitize_segment(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        cleaned
    }
}
