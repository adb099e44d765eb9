//! Typed raw ad record handed over by the scraper collaborator.
//!
//! Records are validated at the reconciler boundary: the only hard
//! requirement is a usable external ad id, everything else is optional.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::model::MediaType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawAdRecord {
    pub ad_id: Option<String>,
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
}

impl RawAdRecord {
    /// A record with only the owning page set and source defaults
    /// (`is_active = true`, `has_low_impressions = false`).
    #[must_use]
    pub fn new(page_id: impl Into<String>) -> Self {
        Self {
            ad_id: None,
            page_id: page_id.into(),
            page_name: None,
            ad_text: None,
            started_running_on: None,
            is_active: true,
            has_low_impressions: false,
            media_type: None,
            media_url: None,
            thumbnail_url: None,
            cta_type: None,
            landing_page_url: None,
            platforms: Vec::new(),
            regions: Vec::new(),
        }
    }

    /// The trimmed external ad id, or `None` when absent or blank.
    #[must_use]
    pub fn usable_ad_id(&self) -> Option<&str> {
        self.ad_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    /// JSON payload stored verbatim on each snapshot.
    #[must_use]
    pub fn to_raw_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
