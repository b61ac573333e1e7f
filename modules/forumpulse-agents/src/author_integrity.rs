//! Author integrity: absolute re-derivation of per-author aggregates, plus
//! a posting-rate bot heuristic.

use anyhow::Result;
use tracing::{debug, info};

use forumpulse_common::types::AuthorProfile;

use crate::deps::Deps;

pub const BATCH_SIZE: usize = 200;
/// Comment-equivalents per hour above which an author looks automated.
pub const BOT_RATE_PER_HOUR: f64 = 50.0;

/// Recompute profiles for up to 200 authors from their stored items.
/// Counts are totals, never increments, so reruns converge on the same
/// values. Returns the number of profiles written.
pub async fn run(deps: &Deps, _now: i64) -> Result<usize> {
    let aggregates = deps.store.author_aggregates(BATCH_SIZE).await?;
    if aggregates.is_empty() {
        debug!("no authors to profile");
        return Ok(0);
    }

    let mut written = 0usize;
    for agg in &aggregates {
        let profile = AuthorProfile {
            author_hash: agg.author_hash.clone(),
            first_seen: agg.first_seen,
            last_seen: agg.last_seen,
            comment_count: agg.comment_count,
            story_count: agg.story_count,
            bot_likelihood: bot_likelihood(
                agg.comment_count + agg.story_count,
                agg.first_seen,
                agg.last_seen,
            ),
        };
        deps.store.upsert_author_profile(&profile).await?;
        written += 1;
    }

    info!(written, "author profiles recomputed");
    Ok(written)
}

/// `rate = posts / max(hours_span, 1)`; above the threshold, likelihood is
/// `min(rate / threshold, 1.0)`, otherwise 0.
fn bot_likelihood(posts: i64, first_seen: i64, last_seen: i64) -> f64 {
    let hours_span = ((last_seen - first_seen) as f64 / 3_600.0).max(1.0);
    let rate = posts as f64 / hours_span;
    if rate > BOT_RATE_PER_HOUR {
        (rate / BOT_RATE_PER_HOUR).min(1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_deps;
    use forumpulse_common::types::{Item, ItemKind};

    async fn seed(deps: &Deps, id: i64, author: &str, kind: ItemKind, time: i64) {
        deps.store
            .upsert_item(&Item {
                id,
                kind: Some(kind),
                author_hash: Some(author.to_string()),
                time: Some(time),
                ..Default::default()
            })
            .await
            .unwrap();
    }

    #[test]
    fn hundred_posts_in_an_hour_is_certainly_a_bot() {
        assert_eq!(bot_likelihood(100, 0, 3_600), 1.0);
    }

    #[test]
    fn ten_posts_over_ten_hours_is_not() {
        assert_eq!(bot_likelihood(10, 0, 36_000), 0.0);
    }

    #[test]
    fn sub_hour_spans_clamp_to_one_hour() {
        // 60 posts in one minute: rate uses the 1-hour floor, 60/hr, capped.
        assert_eq!(bot_likelihood(60, 0, 60), 1.0);
    }

    #[tokio::test]
    async fn profiles_are_rederived_totals() {
        let deps = test_deps();
        seed(&deps, 1, "h1", ItemKind::Story, 1_000).await;
        seed(&deps, 2, "h1", ItemKind::Comment, 5_000).await;
        seed(&deps, 3, "h1", ItemKind::Comment, 3_000).await;

        assert_eq!(run(&deps, 0).await.unwrap(), 1);
        let profile = deps.store.author_profile("h1").await.unwrap().unwrap();
        assert_eq!(profile.first_seen, 1_000);
        assert_eq!(profile.last_seen, 5_000);
        assert_eq!(profile.comment_count, 2);
        assert_eq!(profile.story_count, 1);
        assert_eq!(profile.bot_likelihood, 0.0);

        // A rerun converges on the same totals.
        assert_eq!(run(&deps, 0).await.unwrap(), 1);
        let again = deps.store.author_profile("h1").await.unwrap().unwrap();
        assert_eq!(again, profile);
    }
}
