//! Text normalization: raw forum HTML becomes clean plain text, with
//! intra-batch dedup on the cleaned content hash.

use std::collections::HashSet;

use anyhow::Result;
use tracing::{debug, info};

use forumpulse_common::hashing::content_hash;
use forumpulse_common::text::clean_forum_html;

use crate::deps::Deps;

pub const BATCH_SIZE: usize = 100;

/// Clean one batch of items that have raw text but no cleaned text yet.
/// Items whose text cleans to nothing are skipped — empty strings must not
/// reach moderation or scoring. Duplicates within the batch (same
/// cleaned-content hash) are skipped too, so they stay eligible and surface
/// again if the original disappears. Returns the number of items cleaned.
pub async fn run(deps: &Deps, _now: i64) -> Result<usize> {
    let batch = deps.store.items_needing_clean(BATCH_SIZE).await?;
    if batch.is_empty() {
        debug!("no items awaiting normalization");
        return Ok(0);
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut cleaned = 0usize;
    for (id, raw) in &batch {
        let text = clean_forum_html(raw);
        if text.is_empty() {
            continue;
        }
        if !seen.insert(content_hash(&text)) {
            continue;
        }
        deps.store.set_clean_text(*id, &text).await?;
        cleaned += 1;
    }

    info!(batch = batch.len(), cleaned, "normalization complete");
    Ok(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_deps;
    use forumpulse_common::types::Item;

    async fn seed(deps: &Deps, id: i64, text: &str) {
        deps.store
            .upsert_item(&Item {
                id,
                text: Some(text.to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn markup_is_stripped_and_entities_decoded() {
        let deps = test_deps();
        seed(&deps, 1, "I &quot;love&quot; this<p>Second &amp; last line").await;

        assert_eq!(run(&deps, 0).await.unwrap(), 1);
        let item = deps.store.item(1).await.unwrap().unwrap();
        assert_eq!(
            item.text_clean.as_deref(),
            Some("I \"love\" this\nSecond & last line")
        );
    }

    #[tokio::test]
    async fn code_blocks_survive_as_literal_text() {
        let deps = test_deps();
        seed(&deps, 1, "Look:<pre><code>let x = &gt;5;</code></pre>done").await;

        run(&deps, 0).await.unwrap();
        let item = deps.store.item(1).await.unwrap().unwrap();
        let clean = item.text_clean.unwrap();
        assert!(clean.contains("let x = >5;"), "got: {clean}");
    }

    #[tokio::test]
    async fn duplicates_within_a_batch_are_skipped() {
        let deps = test_deps();
        seed(&deps, 1, "same <b>content</b>").await;
        seed(&deps, 2, "same content").await;
        seed(&deps, 3, "different").await;

        assert_eq!(run(&deps, 0).await.unwrap(), 2);
        assert!(deps.store.item(1).await.unwrap().unwrap().text_clean.is_some());
        assert!(deps.store.item(2).await.unwrap().unwrap().text_clean.is_none());
        assert!(deps.store.item(3).await.unwrap().unwrap().text_clean.is_some());
    }

    #[tokio::test]
    async fn markup_only_text_is_not_persisted_as_empty() {
        let deps = test_deps();
        seed(&deps, 1, "<p></p><i></i>").await;
        seed(&deps, 2, "real words").await;

        assert_eq!(run(&deps, 0).await.unwrap(), 1);
        assert!(deps.store.item(1).await.unwrap().unwrap().text_clean.is_none());
        assert!(deps.store.item(2).await.unwrap().unwrap().text_clean.is_some());
    }

    #[tokio::test]
    async fn already_cleaned_items_are_not_retouched() {
        let deps = test_deps();
        seed(&deps, 1, "raw").await;
        assert_eq!(run(&deps, 0).await.unwrap(), 1);
        assert_eq!(run(&deps, 0).await.unwrap(), 0);
    }
}
