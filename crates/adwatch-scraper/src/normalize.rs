//! Conversion from wire records to [`adwatch_core::RawAdRecord`].
//!
//! Normalization is lenient: a field that cannot be interpreted is dropped,
//! never turned into an error. Validating the ad id is left to the
//! reconciler.

use std::sync::LazyLock;

use adwatch_core::{MediaType, RawAdRecord};
use chrono::NaiveDate;
use regex::Regex;

use crate::types::WireAdRecord;

static MONTH_NAME_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Za-z]+\.?\s+\d{1,2},?\s*\d{4})").expect("valid regex"));

static NUMERIC_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2}/\d{1,2}/\d{2,4})").expect("valid regex"));

/// Normalizes one wire record fetched for `page_id`.
///
/// The record's own page id wins when present; otherwise the requested page
/// id is used.
#[must_use]
pub fn normalize_record(wire: WireAdRecord, page_id: &str) -> RawAdRecord {
    let media_type = wire.media_type.as_deref().and_then(|raw| {
        let parsed = MediaType::parse(raw);
        if parsed.is_none() && !raw.trim().is_empty() {
            tracing::debug!(media_type = raw, "unknown media type; storing as null");
        }
        parsed
    });

    RawAdRecord {
        ad_id: wire.external_ad_id,
        page_id: non_blank(wire.page_id).unwrap_or_else(|| page_id.to_string()),
        page_name: non_blank(wire.page_name),
        ad_text: non_blank(wire.ad_text),
        started_running_on: wire.start_date.as_deref().and_then(parse_start_date),
        is_active: wire.is_active.unwrap_or(true),
        has_low_impressions: wire.has_low_impressions.unwrap_or(false),
        media_type,
        media_url: non_blank(wire.media_url),
        thumbnail_url: non_blank(wire.thumbnail_url),
        cta_type: non_blank(wire.cta_type),
        landing_page_url: non_blank(wire.landing_page_url),
        platforms: wire.platforms,
        regions: wire.regions,
    }
}

/// Parses the start date in any of the formats the ad source emits.
///
/// Accepts ISO dates, month-name dates (optionally inside a longer label
/// such as `"Started running on Dec 15, 2023"`) and US numeric dates.
#[must_use]
pub fn parse_start_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date);
    }
    // ISO timestamps: keep the date part.
    if let Some(date) = text
        .get(..10)
        .and_then(|head| NaiveDate::parse_from_str(head, "%Y-%m-%d").ok())
    {
        return Some(date);
    }

    if let Some(m) = MONTH_NAME_DATE.captures(text).and_then(|c| c.get(1)) {
        let candidate = m.as_str().replace('.', "").replace(',', "");
        let candidate = candidate.split_whitespace().collect::<Vec<_>>().join(" ");
        for format in ["%b %d %Y", "%B %d %Y"] {
            if let Ok(date) = NaiveDate::parse_from_str(&candidate, format) {
                return Some(date);
            }
        }
    }

    if let Some(m) = NUMERIC_DATE.captures(text).and_then(|c| c.get(1)) {
        let numeric = m.as_str();
        let two_digit_year = numeric.rsplit('/').next().is_some_and(|y| y.len() == 2);
        let format = if two_digit_year { "%m/%d/%y" } else { "%m/%d/%Y" };
        if let Ok(date) = NaiveDate::parse_from_str(numeric, format) {
            return Some(date);
        }
    }

    tracing::debug!(start_date = text, "unparseable start date");
    None
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
#[path = "normalize_test.rs"]
mod tests;
