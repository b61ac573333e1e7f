//! Ingestion: walks each watchlist story's reply tree and persists the
//! items. Raw usernames are hashed before anything touches the store.

use anyhow::Result;
use serde_json::json;
use tracing::{debug, info, warn};

use forumpulse_common::hashing::hash_author;
use forumpulse_common::types::{Item, ItemKind};
use forumpulse_events::CHANNEL_CONTENT;
use hn_client::RawItem;

use crate::deps::Deps;

/// Reply-tree walk bounds. The total cap is the sole backpressure
/// mechanism; fetches run sequentially per branch.
pub const MAX_DEPTH: u32 = 3;
pub const MAX_ITEMS: usize = 200;
pub const MAX_KIDS_PER_NODE: usize = 50;

/// Harvest the top active watchlist candidates by priority. Returns total
/// items stored across all stories this run.
pub async fn run(deps: &Deps, now: i64) -> Result<usize> {
    let candidates = deps
        .store
        .active_watchlist(now, deps.harvest_limit)
        .await?;
    if candidates.is_empty() {
        debug!("watchlist empty, nothing to harvest");
        return Ok(0);
    }

    let mut total = 0usize;
    for entry in &candidates {
        match harvest_story(deps, entry.story_id).await {
            Ok(stored) => {
                deps.store.mark_fetched(entry.story_id, now).await?;
                deps.publish_event(
                    CHANNEL_CONTENT,
                    json!({"story_id": entry.story_id, "items_count": stored}),
                )
                .await;
                total += stored;
            }
            Err(error) => {
                // One bad story must not starve the rest of the batch.
                warn!(story_id = entry.story_id, %error, "story harvest failed");
            }
        }
    }

    info!(stories = candidates.len(), items = total, "harvest complete");
    Ok(total)
}

/// Depth-first walk from the story root: fetch, persist, descend into the
/// first 50 kids per node, down to depth 3 or 200 items total.
async fn harvest_story(deps: &Deps, story_id: i64) -> Result<usize> {
    let mut stack: Vec<(i64, u32)> = vec![(story_id, 0)];
    let mut stored = 0usize;

    while let Some((id, depth)) = stack.pop() {
        if stored >= MAX_ITEMS {
            break;
        }
        let Some(raw) = deps.items.item(id).await? else {
            continue;
        };

        if depth < MAX_DEPTH {
            if let Some(kids) = &raw.kids {
                // Reverse push so the first kid is walked next (DFS order).
                for kid in kids.iter().take(MAX_KIDS_PER_NODE).rev() {
                    stack.push((*kid, depth + 1));
                }
            }
        }

        let item = item_from_raw(raw, &deps.author_salt);
        deps.store.upsert_item(&item).await?;
        stored += 1;
    }

    Ok(stored)
}

/// Convert a wire record to a stored item. The raw `by` username is replaced
/// by its salted hash and dropped.
fn item_from_raw(raw: RawItem, salt: &str) -> Item {
    Item {
        id: raw.id,
        kind: raw.kind.as_deref().map(ItemKind::parse),
        author_hash: raw.by.map(|name| hash_author(&name, salt)),
        time: raw.time,
        title: raw.title,
        url: raw.url,
        text: raw.text,
        text_clean: None,
        parent: raw.parent,
        kids: raw.kids,
        score: raw.score,
        descendants: raw.descendants,
        deleted: raw.deleted,
        dead: raw.dead,
    }
}
