//! Domain types shared by the persistence layer, the engine and the CLI.
//!
//! The relational schema in `migrations/` mirrors these types column for
//! column. Counters use `i32` because the schema defines them as
//! `INTEGER NOT NULL DEFAULT 0`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::CoreError;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Creative format reported by the ad source.
///
/// Anything other than these three values is treated as unknown and stored
/// as `NULL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MediaType {
    Video,
    Image,
    Carousel,
}

impl MediaType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MediaType::Video => "VIDEO",
            MediaType::Image => "IMAGE",
            MediaType::Carousel => "CAROUSEL",
        }
    }

    /// Case-insensitive parse. Returns `None` for unknown labels.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "VIDEO" => Some(MediaType::Video),
            "IMAGE" => Some(MediaType::Image),
            "CAROUSEL" => Some(MediaType::Carousel),
            _ => None,
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunKind {
    Full,
    Backfill,
    Single,
}

impl RunKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RunKind::Full => "full",
            RunKind::Backfill => "backfill",
            RunKind::Single => "single",
        }
    }
}

impl FromStr for RunKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(RunKind::Full),
            "backfill" => Ok(RunKind::Backfill),
            "single" => Ok(RunKind::Single),
            other => Err(CoreError::InvalidRunKind(other.to_string())),
        }
    }
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run lifecycle: `running` → `completed` | `failed`. Both outcomes are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl FromStr for RunStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            other => Err(CoreError::InvalidRunStatus(other.to_string())),
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// A tracked advertiser page. Managed by the admin CLI; read-only to runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Competitor {
    pub page_id: String,
    pub page_name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Named contributions behind a winner score.
///
/// Derived data: always recomputable from an [`Ad`] and its snapshot count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub days_running: i32,
    pub active: i32,
    pub impressions: i32,
    pub media_type: i32,
    pub landing_page: i32,
    pub consistency: i32,
    pub total: i32,
}

/// The unit of tracking, keyed by the source system's external ad id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ad {
    pub ad_id: String,
    pub page_id: String,
    pub page_name: Option<String>,
    pub ad_text: Option<String>,
    pub started_running_on: Option<NaiveDate>,
    pub is_active: bool,
    pub has_low_impressions: bool,
    pub media_type: Option<MediaType>,
    pub media_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub cta_type: Option<String>,
    pub landing_page_url: Option<String>,
    pub platforms: Vec<String>,
    pub regions: Vec<String>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub days_running: i32,
    pub media_downloaded: bool,
    pub local_media_path: Option<String>,
    pub winner_score: i32,
    pub score_breakdown: Option<ScoreBreakdown>,
    pub scaling_cluster_id: Option<String>,
    pub snapshot_count: i32,
}

/// Whole days between `start` and `today`, never negative. `0` without a start date.
#[must_use]
pub fn days_running(start: Option<NaiveDate>, today: NaiveDate) -> i32 {
    start.map_or(0, |start| {
        let days = (today - start).num_days().max(0);
        i32::try_from(days).unwrap_or(i32::MAX)
    })
}

/// One immutable observation of an ad during one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdSnapshot {
    pub ad_id: String,
    pub snapshot_date: NaiveDate,
    pub scrape_run_id: i64,
    pub is_active: bool,
    pub has_low_impressions: bool,
    pub ad_text: Option<String>,
    pub media_url: Option<String>,
    pub landing_page_url: Option<String>,
    pub platforms: Vec<String>,
    pub regions: Vec<String>,
    /// The full raw record; dates serialize as ISO-8601 strings.
    pub raw_data: serde_json::Value,
}

/// Aggregate counters of one run, committed after every competitor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    pub competitors_total: i32,
    pub competitors_processed: i32,
    pub competitors_failed: i32,
    pub ads_found: i32,
    pub ads_new: i32,
    pub ads_updated: i32,
    pub ads_deleted: i32,
    pub media_downloaded: i32,
    pub errors_count: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeRun {
    pub id: i64,
    pub run_type: RunKind,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub counters: RunCounters,
    pub metadata: serde_json::Value,
}

/// A failed scrape attempt, ready to be appended to `scrape_errors`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewScrapeError {
    pub scrape_run_id: i64,
    pub page_id: String,
    pub error_type: String,
    pub error_message: String,
    pub detail: Option<String>,
    pub screenshot_path: Option<String>,
    pub page_url: Option<String>,
    pub retry_count: i32,
}
