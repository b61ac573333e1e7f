//! Rollup accountant: multi-window aggregate metrics per active topic from
//! weighted per-item sentiment, with a per-author influence cap and a
//! minimum-audience gate.

use std::collections::HashMap;

use anyhow::Result;
use tracing::{debug, info};

use forumpulse_common::types::{MetricRollup, SentimentLabel, Window};
use forumpulse_nlp::math::round_to;
use forumpulse_store::RollupRow;

use crate::deps::Deps;
use crate::formulas::{compute_consensus, compute_heat, compute_momentum, compute_split};

/// At most this many items per author count toward one (topic, window)
/// bucket, in arrival order.
pub const INFLUENCE_CAP: usize = 5;

/// Compute one rollup per (active topic, window) where the data clears the
/// gates. Returns the number of rollups written.
pub async fn run(deps: &Deps, now: i64) -> Result<usize> {
    let active = deps.store.active_nodes().await?;
    if active.is_empty() {
        debug!("no active topics to roll up");
        return Ok(0);
    }

    let mut written = 0usize;
    for node in &active {
        for window in Window::ALL {
            let rows = deps
                .store
                .rollup_rows(&node.node_id, now - window.secs())
                .await?;
            let prior = deps
                .store
                .latest_rollup(&node.node_id, window)
                .await?
                .map(|r| r.presence)
                .unwrap_or(0.0);

            if let Some(rollup) = compute_rollup(&node.node_id, window, now, &rows, prior) {
                deps.store.upsert_rollup(&rollup).await?;
                written += 1;
            }
        }
    }

    info!(written, "rollups complete");
    Ok(written)
}

/// Pure aggregation over candidate rows. `None` when the bucket should be
/// skipped: no rows, too few distinct authors, or zero total weight.
pub fn compute_rollup(
    node_id: &str,
    window: Window,
    now: i64,
    rows: &[RollupRow],
    prior_presence: f64,
) -> Option<MetricRollup> {
    if rows.is_empty() {
        return None;
    }
    let total_candidates = rows.len();

    // Influence cap in arrival order. Unattributed rows share one capped
    // group, but never count as authors.
    let mut per_author: HashMap<Option<&str>, usize> = HashMap::new();
    let mut counted: Vec<&RollupRow> = Vec::new();
    for row in rows {
        let seen = per_author.entry(row.author_hash.as_deref()).or_insert(0);
        if *seen >= INFLUENCE_CAP {
            continue;
        }
        *seen += 1;
        counted.push(row);
    }

    let unique_authors = per_author.keys().filter(|k| k.is_some()).count() as i64;
    if (unique_authors as usize) < window.min_authors() {
        return None;
    }

    let mut pos_w = 0.0_f64;
    let mut neg_w = 0.0_f64;
    let mut neu_w = 0.0_f64;
    let mut valence_sum = 0.0_f64;
    let mut intensity_sum = 0.0_f64;
    let mut thread_count = 0_i64;

    for row in &counted {
        if row.is_story {
            thread_count += 1;
        }
        let (Some(valence), Some(intensity), Some(confidence), Some(label)) =
            (row.valence, row.intensity, row.confidence, row.label)
        else {
            continue; // not yet scored
        };
        let weight = confidence * row.edge_weight;
        match label {
            SentimentLabel::Positive => pos_w += weight,
            SentimentLabel::Negative => neg_w += weight,
            SentimentLabel::Neutral => neu_w += weight,
        }
        valence_sum += valence * weight;
        intensity_sum += intensity * row.edge_weight;
    }

    let total_weight = pos_w + neg_w + neu_w;
    if total_weight == 0.0 {
        return None;
    }

    let pos_share = pos_w / total_weight;
    let neg_share = neg_w / total_weight;
    let neu_share = neu_w / total_weight;
    let presence = counted.len() as f64 / total_candidates as f64;
    let (consensus_pos, consensus_neg) = compute_consensus(pos_share, neg_share);

    Some(MetricRollup {
        node_id: node_id.to_string(),
        window,
        bucket_start: now - now.rem_euclid(window.secs()),
        presence: round_to(presence, 4),
        sentiment_positive: round_to(pos_share, 4),
        sentiment_negative: round_to(neg_share, 4),
        sentiment_neutral: round_to(neu_share, 4),
        valence_score: round_to(valence_sum / total_weight, 2),
        split_score: compute_split(pos_share, neg_share),
        consensus_pos,
        consensus_neg,
        heat_score: compute_heat(intensity_sum, unique_authors),
        momentum: compute_momentum(presence, prior_presence),
        unique_authors,
        thread_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(
        item_id: i64,
        author: &str,
        label: SentimentLabel,
        confidence: f64,
        intensity: f64,
        edge_weight: f64,
    ) -> RollupRow {
        let direction = match label {
            SentimentLabel::Positive => 1.0,
            SentimentLabel::Negative => -1.0,
            SentimentLabel::Neutral => 0.0,
        };
        RollupRow {
            item_id,
            author_hash: Some(author.to_string()),
            is_story: false,
            valence: Some(direction * confidence * 100.0),
            intensity: Some(intensity),
            confidence: Some(confidence),
            label: Some(label),
            edge_weight,
        }
    }

    #[test]
    fn empty_bucket_is_skipped() {
        assert!(compute_rollup("n", Window::Hour, 3_600, &[], 0.0).is_none());
    }

    #[test]
    fn too_few_authors_is_skipped() {
        // Today requires 5 distinct authors; give it 2.
        let rows: Vec<RollupRow> = (0..6)
            .map(|i| row(i, if i % 2 == 0 { "a" } else { "b" }, SentimentLabel::Positive, 0.9, 0.5, 1.0))
            .collect();
        assert!(compute_rollup("n", Window::Today, 86_400, &rows, 0.0).is_none());
        assert!(compute_rollup("n", Window::Hour, 3_600, &rows, 0.0).is_some());
    }

    #[test]
    fn unscored_rows_alone_yield_no_rollup() {
        let rows = vec![RollupRow {
            item_id: 1,
            author_hash: Some("a".to_string()),
            is_story: true,
            valence: None,
            intensity: None,
            confidence: None,
            label: None,
            edge_weight: 1.0,
        }];
        assert!(compute_rollup("n", Window::Hour, 3_600, &rows, 0.0).is_none());
    }

    #[test]
    fn influence_cap_limits_one_loud_author() {
        // One author with 8 qualifying items, another with 1. Only 5 of the
        // loud author's items may count.
        let mut rows: Vec<RollupRow> = (0..8)
            .map(|i| row(i, "loud", SentimentLabel::Positive, 1.0, 0.5, 1.0))
            .collect();
        rows.push(row(100, "quiet", SentimentLabel::Negative, 1.0, 0.5, 1.0));

        let rollup = compute_rollup("n", Window::Hour, 3_600, &rows, 0.0).unwrap();
        assert_eq!(rollup.unique_authors, 2);
        // 6 counted of 9 candidates.
        assert_eq!(rollup.presence, round_to(6.0 / 9.0, 4));
        // pos weight 5, neg weight 1.
        assert_eq!(rollup.sentiment_positive, round_to(5.0 / 6.0, 4));
        assert_eq!(rollup.sentiment_negative, round_to(1.0 / 6.0, 4));
    }

    #[test]
    fn anonymous_rows_share_one_capped_group() {
        // 10 unattributed rows and 1 attributed. The anonymous flood is
        // capped like any single author, and never counts as an author.
        let mut rows: Vec<RollupRow> = (0..10)
            .map(|i| {
                let mut r = row(i, "x", SentimentLabel::Positive, 1.0, 0.5, 1.0);
                r.author_hash = None;
                r
            })
            .collect();
        rows.push(row(100, "a", SentimentLabel::Negative, 1.0, 0.5, 1.0));

        let rollup = compute_rollup("n", Window::Hour, 3_600, &rows, 0.0).unwrap();
        assert_eq!(rollup.unique_authors, 1);
        // 5 anonymous + 1 attributed counted of 11 candidates.
        assert_eq!(rollup.presence, round_to(6.0 / 11.0, 4));
        assert_eq!(rollup.sentiment_positive, round_to(5.0 / 6.0, 4));
        assert_eq!(rollup.sentiment_negative, round_to(1.0 / 6.0, 4));
    }

    #[test]
    fn shares_valence_and_scores_follow_the_formulas() {
        let rows = vec![
            row(1, "a", SentimentLabel::Positive, 0.8, 0.5, 1.0),
            row(2, "b", SentimentLabel::Negative, 0.8, 0.5, 1.0),
        ];
        let rollup = compute_rollup("n", Window::Hour, 7_200, &rows, 0.0).unwrap();

        assert_eq!(rollup.sentiment_positive, 0.5);
        assert_eq!(rollup.sentiment_negative, 0.5);
        // Weighted valences cancel exactly.
        assert_eq!(rollup.valence_score, 0.0);
        // Perfectly divided opinion.
        assert_eq!(rollup.split_score, 100.0);
        assert_eq!((rollup.consensus_pos, rollup.consensus_neg), (0.0, 0.0));
        // intensity 0.5 × weight 1.0 × 2 rows, scaled by ln(1 + 2 authors).
        assert_eq!(rollup.heat_score, round_to(1.0 * 3.0_f64.ln(), 2));
        // First rollup with presence > 0.
        assert_eq!(rollup.momentum, 100.0);
        assert_eq!(rollup.bucket_start, 7_200);
    }

    #[test]
    fn momentum_tracks_the_prior_rollup() {
        let rows = vec![
            row(1, "a", SentimentLabel::Positive, 1.0, 0.1, 1.0),
        ];
        let rollup = compute_rollup("n", Window::Hour, 3_600, &rows, 0.5).unwrap();
        // presence 1.0 vs prior 0.5.
        assert_eq!(rollup.momentum, 100.0);

        let down = compute_rollup("n", Window::Hour, 3_600, &rows, 2.0).unwrap();
        assert_eq!(down.momentum, -50.0);
    }

    #[test]
    fn story_rows_feed_thread_count() {
        let mut story = row(1, "a", SentimentLabel::Neutral, 1.0, 0.2, 1.0);
        story.is_story = true;
        let comment = row(2, "b", SentimentLabel::Neutral, 1.0, 0.2, 1.0);

        let rollup = compute_rollup("n", Window::Hour, 3_600, &[story, comment], 0.0).unwrap();
        assert_eq!(rollup.thread_count, 1);
    }
}
