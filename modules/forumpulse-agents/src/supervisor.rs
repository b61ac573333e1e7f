//! Watchlist sweep: expired entries are deleted outright.

use anyhow::Result;
use tracing::{debug, info};

use crate::deps::Deps;

/// Remove every watchlist entry whose ttl has passed. Returns the number
/// of rows removed.
pub async fn run(deps: &Deps, now: i64) -> Result<usize> {
    let removed = deps.store.remove_expired(now).await?;
    if removed == 0 {
        debug!("nothing expired");
    } else {
        info!(removed, "watchlist sweep complete");
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_deps;
    use forumpulse_common::types::WatchlistEntry;

    #[tokio::test]
    async fn expired_entries_are_removed_and_live_ones_kept() {
        let deps = test_deps();
        for (story_id, ttl) in [(1, 500), (2, 1_000), (3, 2_000)] {
            deps.store
                .upsert_watchlist(&WatchlistEntry {
                    story_id,
                    priority_score: 1.0,
                    ttl_expires: ttl,
                    last_fetched: None,
                })
                .await
                .unwrap();
        }

        // ttl ≤ now is expired: entries at 500 and 1000 go.
        assert_eq!(run(&deps, 1_000).await.unwrap(), 2);

        let active = deps.store.active_watchlist(1_000, 10).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].story_id, 3);

        // Sweep is idempotent.
        assert_eq!(run(&deps, 1_000).await.unwrap(), 0);
    }
}
