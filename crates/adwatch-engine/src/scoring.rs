//! Winner scoring and scaling-cluster detection.
//!
//! Everything here except [`score_all_ads`] is pure. Scores and clusters are
//! derived data and are recomputed wholesale on every pass.

use std::collections::HashMap;

use adwatch_core::{Ad, MediaType, ScoreBreakdown};
use adwatch_db::DbError;
use sha2::{Digest, Sha256};

use crate::store::AdStore;

/// Text similarity at or above which two ads of one competitor cluster.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.7;

/// Score at or above which an ad counts as a winner.
pub const WINNER_SCORE: i32 = 50;

/// Score at or above which an ad counts as a top performer.
pub const TOP_PERFORMER_SCORE: i32 = 75;

/// Scores one ad from its current state and its snapshot history length.
///
/// The total is clamped to `0..=100`.
#[must_use]
pub fn calculate_winner_score(ad: &Ad, snapshot_count: i64) -> (i32, ScoreBreakdown) {
    let mut breakdown = ScoreBreakdown::default();

    if ad.days_running >= 30 {
        breakdown.days_running += 25;
    }
    if ad.days_running >= 60 {
        breakdown.days_running += 15;
    }
    if ad.days_running >= 90 {
        breakdown.days_running += 10;
    }

    if ad.is_active {
        breakdown.active = 10;
    }

    breakdown.impressions = if ad.has_low_impressions { -20 } else { 15 };

    if ad.media_type == Some(MediaType::Video) {
        breakdown.media_type = 5;
    }

    if ad
        .landing_page_url
        .as_deref()
        .is_some_and(|url| !url.trim().is_empty())
    {
        breakdown.landing_page = 5;
    }

    if snapshot_count > 1 {
        breakdown.consistency = 15;
    }

    let sum = breakdown.days_running
        + breakdown.active
        + breakdown.impressions
        + breakdown.media_type
        + breakdown.landing_page
        + breakdown.consistency;
    breakdown.total = sum.clamp(0, 100);
    (breakdown.total, breakdown)
}

/// Case- and whitespace-insensitive similarity ratio in `0.0..=1.0`.
///
/// `2 * matches / total_len` over characters, where matches are the
/// matching blocks found by repeatedly taking the longest common run and
/// recursing on both sides of it. `0.0` if either side is blank.
#[must_use]
pub fn text_similarity(a: &str, b: &str) -> f64 {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let matches = BlockMatcher::new(&a, &b).matched_len();
    // Both counts are far below 2^52, so the conversions are exact.
    #[allow(clippy::cast_precision_loss)]
    let matched = matches as f64;
    #[allow(clippy::cast_precision_loss)]
    let total = (a.len() + b.len()) as f64;
    2.0 * matched / total
}

/// Below this length of `b` no character is treated as too common to anchor
/// a match.
const POPULAR_MIN_LEN: usize = 200;

/// Greedy longest-block matcher over two character sequences.
struct BlockMatcher<'a> {
    a: &'a [char],
    b: &'a [char],
    /// Positions of each character in `b`, ascending, minus popular ones.
    b_index: HashMap<char, Vec<usize>>,
}

impl<'a> BlockMatcher<'a> {
    fn new(a: &'a [char], b: &'a [char]) -> Self {
        let mut b_index: HashMap<char, Vec<usize>> = HashMap::new();
        for (j, &c) in b.iter().enumerate() {
            b_index.entry(c).or_default().push(j);
        }
        if b.len() >= POPULAR_MIN_LEN {
            let limit = b.len() / 100 + 1;
            b_index.retain(|_, positions| positions.len() <= limit);
        }
        Self { a, b, b_index }
    }

    /// Longest run `a[i..i+k] == b[j..j+k]` inside the given window, as
    /// `(i, j, k)`. Ties go to the smallest `i`, then the smallest `j`.
    fn longest_match(
        &self,
        alo: usize,
        ahi: usize,
        blo: usize,
        bhi: usize,
    ) -> (usize, usize, usize) {
        let (mut best_i, mut best_j, mut best_k) = (alo, blo, 0);
        let mut run_ending_at: HashMap<usize, usize> = HashMap::new();

        for i in alo..ahi {
            let mut next: HashMap<usize, usize> = HashMap::new();
            if let Some(positions) = self.b_index.get(&self.a[i]) {
                for &j in positions {
                    if j < blo {
                        continue;
                    }
                    if j >= bhi {
                        break;
                    }
                    let k = j
                        .checked_sub(1)
                        .and_then(|prev| run_ending_at.get(&prev))
                        .copied()
                        .unwrap_or(0)
                        + 1;
                    next.insert(j, k);
                    if k > best_k {
                        best_i = i + 1 - k;
                        best_j = j + 1 - k;
                        best_k = k;
                    }
                }
            }
            run_ending_at = next;
        }

        // Popular characters never anchor a match but may extend one.
        while best_i > alo && best_j > blo && self.a[best_i - 1] == self.b[best_j - 1] {
            best_i -= 1;
            best_j -= 1;
            best_k += 1;
        }
        while best_i + best_k < ahi
            && best_j + best_k < bhi
            && self.a[best_i + best_k] == self.b[best_j + best_k]
        {
            best_k += 1;
        }

        (best_i, best_j, best_k)
    }

    /// Total length of all matching blocks.
    fn matched_len(&self) -> usize {
        let mut total = 0;
        let mut pending = vec![(0, self.a.len(), 0, self.b.len())];
        while let Some((alo, ahi, blo, bhi)) = pending.pop() {
            let (i, j, k) = self.longest_match(alo, ahi, blo, bhi);
            if k == 0 {
                continue;
            }
            total += k;
            if alo < i && blo < j {
                pending.push((alo, i, blo, j));
            }
            if i + k < ahi && j + k < bhi {
                pending.push((i + k, ahi, j + k, bhi));
            }
        }
        total
    }
}

/// Identifies a creative by its URL with the query string removed.
///
/// First 16 hex chars of the SHA-256 of everything before the first `?`.
#[must_use]
pub fn media_fingerprint(url: &str) -> Option<String> {
    if url.is_empty() {
        return None;
    }
    let core = url.split('?').next().unwrap_or(url);
    let digest = Sha256::digest(core.as_bytes());
    Some(digest.iter().take(8).map(|b| format!("{b:02x}")).collect())
}

/// Groups each competitor's ads into scaling clusters.
///
/// Competitors are visited in first-appearance order. Within one competitor
/// the first unassigned ad seeds a cluster, and every later unassigned ad
/// joins when its text is similar enough to the seed's or its media
/// fingerprint equals the seed's. Only clusters of two or more ads are
/// returned, as `(cluster_<page_id>_<n>, ad ids)` with `n` counting across
/// the whole call.
#[must_use]
pub fn find_scaling_clusters(ads: &[Ad], threshold: f64) -> Vec<(String, Vec<String>)> {
    let mut order: Vec<&str> = Vec::new();
    let mut by_competitor: HashMap<&str, Vec<&Ad>> = HashMap::new();
    for ad in ads {
        by_competitor
            .entry(ad.page_id.as_str())
            .or_insert_with(|| {
                order.push(ad.page_id.as_str());
                Vec::new()
            })
            .push(ad);
    }

    let mut clusters = Vec::new();
    let mut counter = 0usize;

    for page_id in order {
        let group = &by_competitor[page_id];
        if group.len() < 2 {
            continue;
        }
        let fingerprints: Vec<Option<String>> = group
            .iter()
            .map(|ad| ad.media_url.as_deref().and_then(media_fingerprint))
            .collect();
        let mut assigned = vec![false; group.len()];

        for seed in 0..group.len() {
            if assigned[seed] {
                continue;
            }
            let seed_text = group[seed].ad_text.as_deref().unwrap_or_default();
            let mut members = vec![seed];

            for candidate in seed + 1..group.len() {
                if assigned[candidate] {
                    continue;
                }
                let text = group[candidate].ad_text.as_deref().unwrap_or_default();
                let same_media = matches!(
                    (&fingerprints[seed], &fingerprints[candidate]),
                    (Some(a), Some(b)) if a == b
                );
                if text_similarity(seed_text, text) >= threshold || same_media {
                    members.push(candidate);
                }
            }

            if members.len() > 1 {
                for &idx in &members {
                    assigned[idx] = true;
                }
                clusters.push((
                    format!("cluster_{page_id}_{counter}"),
                    members
                        .into_iter()
                        .map(|idx| group[idx].ad_id.clone())
                        .collect(),
                ));
                counter += 1;
            }
        }
    }

    clusters
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoringStats {
    pub total: usize,
    pub scored: usize,
    pub winners: usize,
    pub top_performers: usize,
    pub clusters_found: usize,
}

/// Rescores every ad and rebuilds all scaling clusters.
///
/// Ads missing from the snapshot history are treated as seen once. Ads
/// outside every cluster have their cluster id cleared, so repeated passes
/// over unchanged data write identical values.
///
/// # Errors
///
/// Returns [`DbError`] if reading ads or snapshot counts, or writing a
/// score, fails.
pub async fn score_all_ads(store: &dyn AdStore) -> Result<ScoringStats, DbError> {
    let snapshot_counts = store.snapshot_counts().await?;
    let ads = store.list_ads().await?;

    let clusters = find_scaling_clusters(&ads, DEFAULT_SIMILARITY_THRESHOLD);
    let cluster_of: HashMap<&str, &str> = clusters
        .iter()
        .flat_map(|(cluster_id, members)| {
            members
                .iter()
                .map(move |ad_id| (ad_id.as_str(), cluster_id.as_str()))
        })
        .collect();

    let mut stats = ScoringStats {
        total: ads.len(),
        clusters_found: clusters.len(),
        ..ScoringStats::default()
    };

    for ad in &ads {
        let snapshot_count = snapshot_counts.get(&ad.ad_id).copied().unwrap_or(1).max(1);
        let (score, breakdown) = calculate_winner_score(ad, snapshot_count);
        store
            .update_ad_score(
                &ad.ad_id,
                &breakdown,
                i32::try_from(snapshot_count).unwrap_or(i32::MAX),
                cluster_of.get(ad.ad_id.as_str()).copied(),
            )
            .await?;

        stats.scored += 1;
        if score >= WINNER_SCORE {
            stats.winners += 1;
        }
        if score >= TOP_PERFORMER_SCORE {
            stats.top_performers += 1;
        }
        tracing::debug!(ad_id = %ad.ad_id, score, ?breakdown, "scored ad");
    }

    tracing::info!(
        total = stats.total,
        scored = stats.scored,
        winners = stats.winners,
        top_performers = stats.top_performers,
        clusters_found = stats.clusters_found,
        "scoring complete"
    );
    Ok(stats)
}

#[cfg(test)]
#[path = "scoring_test.rs"]
mod tests;
