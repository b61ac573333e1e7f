//! Live discovery: front-page stories become watchlist entries.

use anyhow::Result;
use serde_json::json;
use tracing::{debug, info};

use forumpulse_common::types::WatchlistEntry;
use forumpulse_events::CHANNEL_DISCOVERY;

use crate::deps::Deps;

/// Watchlist entries live this long after (re)discovery.
pub const WATCH_TTL_SECS: i64 = 7_200;

/// Upsert every current front-page story into the watchlist. Priority is
/// `points + 2 × comments`, so actively discussed stories are harvested
/// first. Returns the number of entries upserted.
pub async fn run(deps: &Deps, now: i64) -> Result<usize> {
    let hits = deps.search.front_page().await?;

    let mut upserted = 0usize;
    for hit in &hits {
        let Some(story_id) = hit.story_id() else {
            continue;
        };
        let priority =
            (hit.points.unwrap_or(0) + 2 * hit.num_comments.unwrap_or(0)) as f64;

        deps.store
            .upsert_watchlist(&WatchlistEntry {
                story_id,
                priority_score: priority,
                ttl_expires: now + WATCH_TTL_SECS,
                last_fetched: None,
            })
            .await?;
        deps.publish_event(
            CHANNEL_DISCOVERY,
            json!({"story_id": story_id, "action": "discovered"}),
        )
        .await;
        upserted += 1;
    }

    if upserted == 0 {
        debug!("no front-page stories discovered");
    } else {
        info!(upserted, "front-page discovery complete");
    }
    Ok(upserted)
}
