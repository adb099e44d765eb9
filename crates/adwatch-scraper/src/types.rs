//! Wire types for the ad-source service's `GET /pages/{page_id}/ads` endpoint.
//!
//! ## Observed shape
//!
//! ### Ids
//! `externalAdId` and `pageId` arrive as strings from most exporters but as
//! bare JSON numbers from some. Both are accepted and stringified.
//!
//! ### `startDate`
//! Free text. ISO dates (`"2026-01-01"`) are the norm; older exports carry
//! the rendered label (`"Started running on Dec 15, 2023"`) or US numeric
//! dates (`"12/15/2023"`). Anything unparseable becomes `None` during
//! normalization, never an error.
//!
//! ### `mediaType`
//! `"VIDEO"`, `"IMAGE"`, `"CAROUSEL"` in any case. Unknown labels (e.g.
//! `"DPA"`) are kept as text here and dropped during normalization.
//!
//! ### Flags
//! `isActive` defaults to `true` and `hasLowImpressions` to `false` when the
//! field is absent or `null`.

use serde::{Deserialize, Deserializer};

/// Top-level response body.
#[derive(Debug, Deserialize)]
pub struct AdsResponse {
    #[serde(default)]
    pub ads: Vec<WireAdRecord>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireAdRecord {
    #[serde(default, deserialize_with = "string_or_number")]
    pub external_ad_id: Option<String>,

    #[serde(default, deserialize_with = "string_or_number")]
    pub page_id: Option<String>,

    #[serde(default)]
    pub page_name: Option<String>,

    #[serde(default)]
    pub ad_text: Option<String>,

    #[serde(default)]
    pub start_date: Option<String>,

    #[serde(default)]
    pub is_active: Option<bool>,

    #[serde(default)]
    pub has_low_impressions: Option<bool>,

    #[serde(default)]
    pub media_type: Option<String>,

    #[serde(default)]
    pub media_url: Option<String>,

    #[serde(default)]
    pub thumbnail_url: Option<String>,

    #[serde(default)]
    pub cta_type: Option<String>,

    #[serde(default)]
    pub landing_page_url: Option<String>,

    /// `null` is treated the same as an empty list.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub platforms: Vec<String>,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub regions: Vec<String>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}
