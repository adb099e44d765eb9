//! Turns one competitor's raw records for one run into persisted ad state.
//!
//! Per call: every usable record is upserted and snapshotted, then ads that
//! were active before the call but are missing from the records are
//! soft-deleted. Deletion always runs last, so an ad present in the records
//! can never be deactivated by the same call.

use std::collections::HashSet;

use adwatch_core::{days_running, Ad, AdSnapshot, Competitor, RawAdRecord, ScrapeRun};
use adwatch_db::DbError;
use chrono::{DateTime, Utc};

use crate::store::AdStore;

/// Counters and newly created ads produced by one [`reconcile`] call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileOutcome {
    /// Raw records received, usable or not.
    pub found: usize,
    pub new: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Ads created by this call, in record order. Candidates for media download.
    pub new_ads: Vec<Ad>,
}

/// Applies `records` for `competitor` within `run`.
///
/// Records without a usable ad id are skipped with a warning. A repeated ad
/// id within `records` updates the ad again but produces no second snapshot.
///
/// # Errors
///
/// Returns the first [`DbError`] raised by the store. The call is not
/// transactional; writes made before the failure stay applied.
pub async fn reconcile(
    store: &dyn AdStore,
    competitor: &Competitor,
    run: &ScrapeRun,
    records: &[RawAdRecord],
    now: DateTime<Utc>,
) -> Result<ReconcileOutcome, DbError> {
    let page_id = competitor.page_id.as_str();
    let previously_active: Vec<String> = store.active_ad_ids(page_id).await?;

    let mut outcome = ReconcileOutcome {
        found: records.len(),
        ..ReconcileOutcome::default()
    };
    let mut seen: HashSet<String> = HashSet::with_capacity(records.len());

    for record in records {
        let Some(ad_id) = record.usable_ad_id() else {
            tracing::warn!(
                page_id,
                run_id = run.id,
                "discarding ad record without an ad id"
            );
            continue;
        };
        let ad_id = ad_id.to_string();

        match store.get_ad(&ad_id).await? {
            Some(mut existing) => {
                apply_observation(&mut existing, record, now);
                store.update_ad(&existing).await?;
                outcome.updated += 1;
            }
            None => {
                let ad = new_ad(&ad_id, page_id, record, now);
                store.insert_ad(&ad).await?;
                tracing::debug!(page_id, ad_id = %ad_id, "new ad");
                outcome.new_ads.push(ad);
                outcome.new += 1;
            }
        }

        if seen.insert(ad_id.clone()) {
            store
                .insert_snapshot(&snapshot_for(&ad_id, record, run.id, now))
                .await?;
        }
    }

    let missing: Vec<String> = previously_active
        .into_iter()
        .filter(|id| !seen.contains(id))
        .collect();
    if !missing.is_empty() {
        let changed = store.deactivate_ads(&missing, now).await?;
        tracing::info!(page_id, count = changed, ads = ?missing, "ads marked inactive");
        outcome.deleted = usize::try_from(changed).unwrap_or(usize::MAX);
    }

    Ok(outcome)
}

/// Builds a brand-new ad from every field present on `record`.
fn new_ad(ad_id: &str, page_id: &str, record: &RawAdRecord, now: DateTime<Utc>) -> Ad {
    Ad {
        ad_id: ad_id.to_string(),
        page_id: page_id.to_string(),
        page_name: present(record.page_name.as_deref()),
        ad_text: present(record.ad_text.as_deref()),
        started_running_on: record.started_running_on,
        is_active: record.is_active,
        has_low_impressions: record.has_low_impressions,
        media_type: record.media_type,
        media_url: present(record.media_url.as_deref()),
        thumbnail_url: present(record.thumbnail_url.as_deref()),
        cta_type: present(record.cta_type.as_deref()),
        landing_page_url: present(record.landing_page_url.as_deref()),
        platforms: record.platforms.clone(),
        regions: record.regions.clone(),
        first_seen_at: now,
        last_seen_at: now,
        days_running: days_running(record.started_running_on, now.date_naive()),
        media_downloaded: false,
        local_media_path: None,
        winner_score: 0,
        score_breakdown: None,
        scaling_cluster_id: None,
        snapshot_count: 1,
    }
}

/// Fallback-preserving update.
///
/// Optional fields and lists only change when the record carries a value;
/// blank text counts as absent. The active flag, low-impressions flag,
/// last-seen and days running are always refreshed.
fn apply_observation(ad: &mut Ad, record: &RawAdRecord, now: DateTime<Utc>) {
    fn replace_text(current: &mut Option<String>, incoming: Option<&str>) {
        if let Some(value) = present(incoming) {
            *current = Some(value);
        }
    }

    replace_text(&mut ad.page_name, record.page_name.as_deref());
    replace_text(&mut ad.ad_text, record.ad_text.as_deref());
    replace_text(&mut ad.media_url, record.media_url.as_deref());
    replace_text(&mut ad.thumbnail_url, record.thumbnail_url.as_deref());
    replace_text(&mut ad.cta_type, record.cta_type.as_deref());
    replace_text(&mut ad.landing_page_url, record.landing_page_url.as_deref());
    if record.started_running_on.is_some() {
        ad.started_running_on = record.started_running_on;
    }
    if record.media_type.is_some() {
        ad.media_type = record.media_type;
    }
    if !record.platforms.is_empty() {
        ad.platforms.clone_from(&record.platforms);
    }
    if !record.regions.is_empty() {
        ad.regions.clone_from(&record.regions);
    }

    ad.is_active = record.is_active;
    ad.has_low_impressions = record.has_low_impressions;
    ad.last_seen_at = now;
    ad.days_running = days_running(ad.started_running_on, now.date_naive());
}

fn present(value: Option<&str>) -> Option<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .map(str::to_string)
}

fn snapshot_for(ad_id: &str, record: &RawAdRecord, run_id: i64, now: DateTime<Utc>) -> AdSnapshot {
    AdSnapshot {
        ad_id: ad_id.to_string(),
        snapshot_date: now.date_naive(),
        scrape_run_id: run_id,
        is_active: record.is_active,
        has_low_impressions: record.has_low_impressions,
        ad_text: record.ad_text.clone(),
        media_url: record.media_url.clone(),
        landing_page_url: record.landing_page_url.clone(),
        platforms: record.platforms.clone(),
        regions: record.regions.clone(),
        raw_data: record.to_raw_json(),
    }
}

#[cfg(test)]
#[path = "reconciler_test.rs"]
mod tests;
