//! Historical backfill: walks day-sized chunks from a persisted checkpoint
//! toward the present, feeding older stories into the watchlist.

use anyhow::Result;
use serde_json::json;
use tracing::{debug, info, warn};

use forumpulse_common::types::WatchlistEntry;
use forumpulse_events::CHANNEL_DISCOVERY;

use crate::deps::Deps;
use crate::trend_scout::WATCH_TTL_SECS;

pub const CHECKPOINT_KEY: &str = "backfill_checkpoint";
/// 2024-01-01T00:00:00Z — where backfill starts with no checkpoint.
pub const DEFAULT_START: i64 = 1_704_067_200;
pub const CHUNK_SECS: i64 = 86_400;

/// Process one chunk: fetch stories created in `[checkpoint, checkpoint+1d)`,
/// upsert them into the watchlist with `priority = points`, then advance the
/// checkpoint unconditionally. A crash between fetch and checkpoint write
/// re-runs the chunk; the upserts make that idempotent. Returns the number
/// of stories upserted, 0 once caught up to now.
pub async fn run(deps: &Deps, now: i64) -> Result<usize> {
    let checkpoint = match deps.store.backfill_value(CHECKPOINT_KEY).await? {
        Some(raw) => raw.parse::<i64>().unwrap_or_else(|_| {
            warn!(%raw, "unparseable backfill checkpoint, restarting from default");
            DEFAULT_START
        }),
        None => DEFAULT_START,
    };

    if checkpoint >= now {
        debug!(checkpoint, "backfill caught up");
        return Ok(0);
    }
    let chunk_end = (checkpoint + CHUNK_SECS).min(now);

    let hits = deps.search.stories_between(checkpoint, chunk_end).await?;

    let mut upserted = 0usize;
    for hit in &hits {
        let Some(story_id) = hit.story_id() else {
            continue;
        };
        deps.store
            .upsert_watchlist(&WatchlistEntry {
                story_id,
                priority_score: hit.points.unwrap_or(0) as f64,
                ttl_expires: now + WATCH_TTL_SECS,
                last_fetched: None,
            })
            .await?;
        deps.publish_event(
            CHANNEL_DISCOVERY,
            json!({"story_id": story_id, "action": "backfilled"}),
        )
        .await;
        upserted += 1;
    }

    deps.store
        .set_backfill_value(CHECKPOINT_KEY, &chunk_end.to_string(), now)
        .await?;

    info!(checkpoint, chunk_end, upserted, "backfill chunk complete");
    Ok(upserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{deps_with, search_hit, FixedEmbedder, MockItemClient, MockSearchClient, StaticProposer, StaticSentiment};
    use forumpulse_common::types::SentimentLabel;

    fn backfill_deps(stories: Vec<hn_client::SearchHit>) -> Deps {
        deps_with(
            MockItemClient::new(),
            MockSearchClient::new().with_stories(stories),
            FixedEmbedder::new(),
            StaticSentiment::new(SentimentLabel::Neutral, 0.5, 0.1),
            StaticProposer::new(Vec::new()),
        )
    }

    #[tokio::test]
    async fn first_run_walks_one_chunk_from_the_default_start() {
        let in_chunk = DEFAULT_START + 100;
        let past_chunk = DEFAULT_START + CHUNK_SECS + 100;
        let deps = backfill_deps(vec![
            search_hit(200, 30, 4, in_chunk),
            search_hit(201, 10, 0, past_chunk),
        ]);

        let now = DEFAULT_START + 10 * CHUNK_SECS;
        let upserted = run(&deps, now).await.unwrap();
        assert_eq!(upserted, 1);

        let active = deps.store.active_watchlist(now, 10).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].story_id, 200);
        // priority = points only for backfill
        assert_eq!(active[0].priority_score, 30.0);

        let checkpoint = deps.store.backfill_value(CHECKPOINT_KEY).await.unwrap().unwrap();
        assert_eq!(checkpoint.parse::<i64>().unwrap(), DEFAULT_START + CHUNK_SECS);
    }

    #[tokio::test]
    async fn checkpoint_advances_even_when_chunk_is_empty() {
        let deps = backfill_deps(Vec::new());
        let now = DEFAULT_START + 10 * CHUNK_SECS;

        assert_eq!(run(&deps, now).await.unwrap(), 0);
        let first = deps.store.backfill_value(CHECKPOINT_KEY).await.unwrap().unwrap();

        assert_eq!(run(&deps, now).await.unwrap(), 0);
        let second = deps.store.backfill_value(CHECKPOINT_KEY).await.unwrap().unwrap();

        assert_eq!(first.parse::<i64>().unwrap(), DEFAULT_START + CHUNK_SECS);
        assert_eq!(second.parse::<i64>().unwrap(), DEFAULT_START + 2 * CHUNK_SECS);
    }

    #[tokio::test]
    async fn caught_up_backfill_is_a_no_op() {
        let deps = backfill_deps(Vec::new());
        let now = DEFAULT_START + CHUNK_SECS;
        deps.store
            .set_backfill_value(CHECKPOINT_KEY, &now.to_string(), now)
            .await
            .unwrap();

        assert_eq!(run(&deps, now).await.unwrap(), 0);
        // Checkpoint untouched.
        let checkpoint = deps.store.backfill_value(CHECKPOINT_KEY).await.unwrap().unwrap();
        assert_eq!(checkpoint.parse::<i64>().unwrap(), now);
    }

    #[tokio::test]
    async fn final_chunk_is_clamped_to_now() {
        let deps = backfill_deps(Vec::new());
        let now = DEFAULT_START + CHUNK_SECS / 2;

        run(&deps, now).await.unwrap();
        let checkpoint = deps.store.backfill_value(CHECKPOINT_KEY).await.unwrap().unwrap();
        assert_eq!(checkpoint.parse::<i64>().unwrap(), now);
    }
}
