//! In-memory `AnalyticStore`. Same row semantics as the Postgres backend,
//! held behind a single mutex. Backs the test suite and single-process
//! development runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use forumpulse_common::types::{
    AuthorProfile, Item, ItemEmbedding, ItemKind, ItemMetricEdge, MetricNode, MetricRollup,
    ModerationFlag, OpinionSignal, WatchlistEntry, Window,
};

use crate::{AnalyticStore, AuthorAggregate, RankLens, RollupRow};

#[derive(Default)]
struct Inner {
    items: BTreeMap<i64, Item>,
    watchlist: BTreeMap<i64, WatchlistEntry>,
    profiles: HashMap<String, AuthorProfile>,
    flags: HashMap<i64, ModerationFlag>,
    signals: HashMap<i64, OpinionSignal>,
    embeddings: HashMap<i64, ItemEmbedding>,
    nodes: BTreeMap<String, MetricNode>,
    /// Arrival-ordered; the influence cap depends on this ordering.
    edges: Vec<ItemMetricEdge>,
    edge_index: HashMap<(i64, String), usize>,
    rollups: HashMap<(String, Window), BTreeMap<i64, MetricRollup>>,
    backfill: HashMap<String, (String, i64)>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("store mutex poisoned")
    }
}

fn recent_order(items: &BTreeMap<i64, Item>) -> Vec<&Item> {
    let mut all: Vec<&Item> = items.values().collect();
    all.sort_by(|a, b| {
        b.time
            .unwrap_or(0)
            .cmp(&a.time.unwrap_or(0))
            .then(b.id.cmp(&a.id))
    });
    all
}

#[async_trait]
impl AnalyticStore for MemoryStore {
    async fn upsert_item(&self, item: &Item) -> Result<()> {
        let mut inner = self.lock();
        let merged = match inner.items.get(&item.id) {
            Some(existing) => Item::merge(existing, item),
            None => item.clone(),
        };
        inner.items.insert(item.id, merged);
        Ok(())
    }

    async fn item(&self, id: i64) -> Result<Option<Item>> {
        Ok(self.lock().items.get(&id).cloned())
    }

    async fn recent_items(&self, limit: usize) -> Result<Vec<Item>> {
        let inner = self.lock();
        Ok(recent_order(&inner.items)
            .into_iter()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn items_needing_clean(&self, limit: usize) -> Result<Vec<(i64, String)>> {
        let inner = self.lock();
        Ok(inner
            .items
            .values()
            .filter(|i| i.text.is_some() && i.text_clean.is_none())
            .take(limit)
            .map(|i| (i.id, i.text.clone().unwrap_or_default()))
            .collect())
    }

    async fn set_clean_text(&self, id: i64, text: &str) -> Result<()> {
        let mut inner = self.lock();
        if let Some(item) = inner.items.get_mut(&id) {
            item.text_clean = Some(text.to_string());
        }
        Ok(())
    }

    async fn recent_sample_texts(&self, limit: usize) -> Result<Vec<String>> {
        let inner = self.lock();
        Ok(recent_order(&inner.items)
            .into_iter()
            .filter(|i| i.text_clean.is_some() || i.title.is_some())
            .take(limit)
            .map(|i| {
                format!(
                    "{} {}",
                    i.title.as_deref().unwrap_or(""),
                    i.text_clean.as_deref().unwrap_or("")
                )
                .trim()
                .to_string()
            })
            .collect())
    }

    async fn items_without_flag(&self, limit: usize) -> Result<Vec<(i64, String)>> {
        let inner = self.lock();
        Ok(inner
            .items
            .values()
            .filter(|i| i.text_clean.is_some() && !inner.flags.contains_key(&i.id))
            .take(limit)
            .map(|i| (i.id, i.text_clean.clone().unwrap_or_default()))
            .collect())
    }

    async fn items_without_signal(&self, limit: usize) -> Result<Vec<(i64, String)>> {
        let inner = self.lock();
        Ok(inner
            .items
            .values()
            .filter(|i| i.text_clean.is_some() && !inner.signals.contains_key(&i.id))
            .take(limit)
            .map(|i| (i.id, i.text_clean.clone().unwrap_or_default()))
            .collect())
    }

    async fn items_without_embedding(&self, limit: usize) -> Result<Vec<(i64, String)>> {
        let inner = self.lock();
        Ok(inner
            .items
            .values()
            .filter(|i| i.text_clean.is_some() && !inner.embeddings.contains_key(&i.id))
            .take(limit)
            .map(|i| (i.id, i.text_clean.clone().unwrap_or_default()))
            .collect())
    }

    async fn author_aggregates(&self, limit: usize) -> Result<Vec<AuthorAggregate>> {
        let inner = self.lock();
        let mut by_author: BTreeMap<String, AuthorAggregate> = BTreeMap::new();
        for item in inner.items.values() {
            let Some(hash) = &item.author_hash else { continue };
            let agg = by_author
                .entry(hash.clone())
                .or_insert_with(|| AuthorAggregate {
                    author_hash: hash.clone(),
                    first_seen: i64::MAX,
                    last_seen: 0,
                    comment_count: 0,
                    story_count: 0,
                });
            let time = item.time.unwrap_or(0);
            agg.first_seen = agg.first_seen.min(time);
            agg.last_seen = agg.last_seen.max(time);
            match item.kind {
                Some(ItemKind::Comment) => agg.comment_count += 1,
                Some(ItemKind::Story) => agg.story_count += 1,
                _ => {}
            }
        }
        Ok(by_author
            .into_values()
            .map(|mut agg| {
                if agg.first_seen == i64::MAX {
                    agg.first_seen = 0;
                }
                agg
            })
            .take(limit)
            .collect())
    }

    async fn upsert_watchlist(&self, entry: &WatchlistEntry) -> Result<()> {
        let mut inner = self.lock();
        let merged = match inner.watchlist.get(&entry.story_id) {
            Some(existing) => WatchlistEntry {
                story_id: entry.story_id,
                priority_score: entry.priority_score,
                ttl_expires: entry.ttl_expires,
                last_fetched: entry.last_fetched.or(existing.last_fetched),
            },
            None => entry.clone(),
        };
        inner.watchlist.insert(entry.story_id, merged);
        Ok(())
    }

    async fn active_watchlist(&self, now: i64, limit: usize) -> Result<Vec<WatchlistEntry>> {
        let inner = self.lock();
        let mut active: Vec<WatchlistEntry> = inner
            .watchlist
            .values()
            .filter(|e| e.ttl_expires > now)
            .cloned()
            .collect();
        active.sort_by(|a, b| {
            b.priority_score
                .partial_cmp(&a.priority_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.story_id.cmp(&b.story_id))
        });
        active.truncate(limit);
        Ok(active)
    }

    async fn mark_fetched(&self, story_id: i64, now: i64) -> Result<()> {
        let mut inner = self.lock();
        if let Some(entry) = inner.watchlist.get_mut(&story_id) {
            entry.last_fetched = Some(now);
        }
        Ok(())
    }

    async fn remove_expired(&self, now: i64) -> Result<usize> {
        let mut inner = self.lock();
        let before = inner.watchlist.len();
        inner.watchlist.retain(|_, e| e.ttl_expires > now);
        Ok(before - inner.watchlist.len())
    }

    async fn upsert_author_profile(&self, profile: &AuthorProfile) -> Result<()> {
        self.lock()
            .profiles
            .insert(profile.author_hash.clone(), profile.clone());
        Ok(())
    }

    async fn author_profile(&self, author_hash: &str) -> Result<Option<AuthorProfile>> {
        Ok(self.lock().profiles.get(author_hash).cloned())
    }

    async fn upsert_flag(&self, flag: &ModerationFlag) -> Result<()> {
        self.lock().flags.insert(flag.item_id, flag.clone());
        Ok(())
    }

    async fn flag(&self, item_id: i64) -> Result<Option<ModerationFlag>> {
        Ok(self.lock().flags.get(&item_id).cloned())
    }

    async fn upsert_signal(&self, signal: &OpinionSignal) -> Result<()> {
        self.lock().signals.insert(signal.item_id, signal.clone());
        Ok(())
    }

    async fn signal(&self, item_id: i64) -> Result<Option<OpinionSignal>> {
        Ok(self.lock().signals.get(&item_id).cloned())
    }

    async fn upsert_embedding(&self, embedding: &ItemEmbedding) -> Result<()> {
        self.lock()
            .embeddings
            .insert(embedding.item_id, embedding.clone());
        Ok(())
    }

    async fn embedding(&self, item_id: i64) -> Result<Option<ItemEmbedding>> {
        Ok(self.lock().embeddings.get(&item_id).cloned())
    }

    async fn upsert_node(&self, node: &MetricNode) -> Result<()> {
        let mut inner = self.lock();
        let merged = match inner.nodes.get(&node.node_id) {
            Some(existing) => MetricNode {
                parent_id: node.parent_id.clone().or_else(|| existing.parent_id.clone()),
                ..node.clone()
            },
            None => node.clone(),
        };
        inner.nodes.insert(node.node_id.clone(), merged);
        Ok(())
    }

    async fn node(&self, node_id: &str) -> Result<Option<MetricNode>> {
        Ok(self.lock().nodes.get(node_id).cloned())
    }

    async fn active_nodes(&self) -> Result<Vec<MetricNode>> {
        // BTreeMap iteration gives the stable node-id order the contract requires.
        Ok(self
            .lock()
            .nodes
            .values()
            .filter(|n| n.status == forumpulse_common::types::NodeStatus::Active)
            .cloned()
            .collect())
    }

    async fn upsert_edge(&self, edge: &ItemMetricEdge) -> Result<()> {
        let mut inner = self.lock();
        let key = (edge.item_id, edge.node_id.clone());
        match inner.edge_index.get(&key).copied() {
            Some(idx) => inner.edges[idx] = edge.clone(),
            None => {
                inner.edges.push(edge.clone());
                let idx = inner.edges.len() - 1;
                inner.edge_index.insert(key, idx);
            }
        }
        Ok(())
    }

    async fn edges_for_item(&self, item_id: i64) -> Result<Vec<ItemMetricEdge>> {
        Ok(self
            .lock()
            .edges
            .iter()
            .filter(|e| e.item_id == item_id)
            .cloned()
            .collect())
    }

    async fn rollup_rows(&self, node_id: &str, since: i64) -> Result<Vec<RollupRow>> {
        let inner = self.lock();
        let mut rows = Vec::new();
        for edge in inner.edges.iter().filter(|e| e.node_id == node_id) {
            let Some(item) = inner.items.get(&edge.item_id) else { continue };
            if item.time.unwrap_or(0) < since {
                continue;
            }
            let signal = inner.signals.get(&edge.item_id);
            rows.push(RollupRow {
                item_id: item.id,
                author_hash: item.author_hash.clone(),
                is_story: item.is_story(),
                valence: signal.map(|s| s.valence),
                intensity: signal.map(|s| s.intensity),
                confidence: signal.map(|s| s.confidence),
                label: signal.map(|s| s.label),
                edge_weight: edge.weight,
            });
        }
        Ok(rows)
    }

    async fn upsert_rollup(&self, rollup: &MetricRollup) -> Result<()> {
        self.lock()
            .rollups
            .entry((rollup.node_id.clone(), rollup.window))
            .or_default()
            .insert(rollup.bucket_start, rollup.clone());
        Ok(())
    }

    async fn latest_rollup(&self, node_id: &str, window: Window) -> Result<Option<MetricRollup>> {
        Ok(self
            .lock()
            .rollups
            .get(&(node_id.to_string(), window))
            .and_then(|series| series.values().next_back().cloned()))
    }

    async fn rollup_series(
        &self,
        node_id: &str,
        window: Window,
        start: i64,
        end: i64,
    ) -> Result<Vec<MetricRollup>> {
        Ok(self
            .lock()
            .rollups
            .get(&(node_id.to_string(), window))
            .map(|series| series.range(start..=end).map(|(_, r)| r.clone()).collect())
            .unwrap_or_default())
    }

    async fn top_rollups_by(
        &self,
        window: Window,
        lens: RankLens,
        limit: usize,
    ) -> Result<Vec<MetricRollup>> {
        let inner = self.lock();
        let mut latest: Vec<MetricRollup> = inner
            .rollups
            .iter()
            .filter(|((_, w), _)| *w == window)
            .filter_map(|(_, series)| series.values().next_back().cloned())
            .collect();
        latest.sort_by(|a, b| {
            lens_value(b, lens)
                .partial_cmp(&lens_value(a, lens))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        latest.truncate(limit);
        Ok(latest)
    }

    async fn backfill_value(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock().backfill.get(key).map(|(v, _)| v.clone()))
    }

    async fn set_backfill_value(&self, key: &str, value: &str, now: i64) -> Result<()> {
        self.lock()
            .backfill
            .insert(key.to_string(), (value.to_string(), now));
        Ok(())
    }
}

fn lens_value(rollup: &MetricRollup, lens: RankLens) -> f64 {
    match lens {
        RankLens::Presence => rollup.presence,
        RankLens::Split => rollup.split_score,
        RankLens::ConsensusPos => rollup.consensus_pos,
        RankLens::ConsensusNeg => rollup.consensus_neg,
        RankLens::Heat => rollup.heat_score,
        RankLens::Momentum => rollup.momentum,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forumpulse_common::types::NodeStatus;

    fn item(id: i64, time: i64) -> Item {
        Item {
            id,
            kind: Some(ItemKind::Comment),
            time: Some(time),
            text: Some(format!("text {id}")),
            ..Item::default()
        }
    }

    fn entry(story_id: i64, priority: f64, ttl: i64) -> WatchlistEntry {
        WatchlistEntry {
            story_id,
            priority_score: priority,
            ttl_expires: ttl,
            last_fetched: None,
        }
    }

    #[tokio::test]
    async fn upsert_item_merges_rather_than_overwrites() {
        let store = MemoryStore::new();
        store.upsert_item(&item(1, 100)).await.unwrap();
        store.set_clean_text(1, "cleaned").await.unwrap();

        // Re-ingest the same item without text_clean; cleaned text survives.
        store.upsert_item(&item(1, 100)).await.unwrap();
        let stored = store.item(1).await.unwrap().unwrap();
        assert_eq!(stored.text_clean.as_deref(), Some("cleaned"));
    }

    #[tokio::test]
    async fn active_watchlist_orders_and_filters() {
        let store = MemoryStore::new();
        store.upsert_watchlist(&entry(1, 10.0, 200)).await.unwrap();
        store.upsert_watchlist(&entry(2, 50.0, 200)).await.unwrap();
        store.upsert_watchlist(&entry(3, 99.0, 50)).await.unwrap(); // expired at now=100

        let active = store.active_watchlist(100, 10).await.unwrap();
        let ids: Vec<i64> = active.iter().map(|e| e.story_id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[tokio::test]
    async fn sweep_removes_only_expired() {
        let store = MemoryStore::new();
        store.upsert_watchlist(&entry(1, 1.0, 100)).await.unwrap();
        store.upsert_watchlist(&entry(2, 1.0, 101)).await.unwrap();

        let removed = store.remove_expired(100).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.active_watchlist(0, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn watchlist_upsert_preserves_last_fetched() {
        let store = MemoryStore::new();
        store.upsert_watchlist(&entry(1, 10.0, 100)).await.unwrap();
        store.mark_fetched(1, 42).await.unwrap();

        // Rediscovery refreshes priority/ttl but keeps last_fetched.
        store.upsert_watchlist(&entry(1, 20.0, 200)).await.unwrap();
        let active = store.active_watchlist(0, 10).await.unwrap();
        assert_eq!(active[0].priority_score, 20.0);
        assert_eq!(active[0].ttl_expires, 200);
        assert_eq!(active[0].last_fetched, Some(42));
    }

    #[tokio::test]
    async fn left_join_absence_queries_shrink_as_stages_run() {
        let store = MemoryStore::new();
        store.upsert_item(&item(1, 100)).await.unwrap();
        store.upsert_item(&item(2, 100)).await.unwrap();

        assert_eq!(store.items_needing_clean(10).await.unwrap().len(), 2);
        store.set_clean_text(1, "cleaned").await.unwrap();
        assert_eq!(store.items_needing_clean(10).await.unwrap().len(), 1);

        assert_eq!(store.items_without_flag(10).await.unwrap().len(), 1);
        store
            .upsert_flag(&ModerationFlag {
                item_id: 1,
                status: forumpulse_common::types::ModerationStatus::Clean,
                reason: None,
                flagged_at: 100,
            })
            .await
            .unwrap();
        assert!(store.items_without_flag(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn active_nodes_sorted_by_id_and_excludes_retired() {
        let store = MemoryStore::new();
        for (id, status) in [("b", NodeStatus::Active), ("a", NodeStatus::Active), ("c", NodeStatus::Retired)] {
            store
                .upsert_node(&MetricNode {
                    node_id: id.to_string(),
                    label: id.to_string(),
                    definition: String::new(),
                    centroid: vec![1.0],
                    parent_id: None,
                    status,
                    version: 1,
                })
                .await
                .unwrap();
        }
        let active = store.active_nodes().await.unwrap();
        let ids: Vec<&str> = active.iter().map(|n| n.node_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn edge_replacement_keeps_arrival_order() {
        let store = MemoryStore::new();
        for (item_id, weight) in [(1, 0.5), (2, 0.4)] {
            store
                .upsert_edge(&ItemMetricEdge {
                    item_id,
                    node_id: "n".into(),
                    weight,
                    created_at: 100,
                })
                .await
                .unwrap();
        }
        // Reprocessing item 1 replaces its weight in place.
        store
            .upsert_edge(&ItemMetricEdge {
                item_id: 1,
                node_id: "n".into(),
                weight: 0.9,
                created_at: 200,
            })
            .await
            .unwrap();

        store.upsert_item(&item(1, 100)).await.unwrap();
        store.upsert_item(&item(2, 100)).await.unwrap();
        let rows = store.rollup_rows("n", 0).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].item_id, 1);
        assert_eq!(rows[0].edge_weight, 0.9);
    }

    #[tokio::test]
    async fn latest_rollup_by_bucket_start() {
        let store = MemoryStore::new();
        for bucket in [100, 300, 200] {
            store
                .upsert_rollup(&MetricRollup {
                    node_id: "n".into(),
                    window: Window::Hour,
                    bucket_start: bucket,
                    presence: bucket as f64,
                    sentiment_positive: 0.0,
                    sentiment_negative: 0.0,
                    sentiment_neutral: 0.0,
                    valence_score: 0.0,
                    split_score: 0.0,
                    consensus_pos: 0.0,
                    consensus_neg: 0.0,
                    heat_score: 0.0,
                    momentum: 0.0,
                    unique_authors: 1,
                    thread_count: 0,
                })
                .await
                .unwrap();
        }
        let latest = store.latest_rollup("n", Window::Hour).await.unwrap().unwrap();
        assert_eq!(latest.bucket_start, 300);
        assert!(store.latest_rollup("n", Window::Week).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn backfill_checkpoint_round_trip() {
        let store = MemoryStore::new();
        assert!(store.backfill_value("ck").await.unwrap().is_none());
        store.set_backfill_value("ck", "123", 1).await.unwrap();
        assert_eq!(store.backfill_value("ck").await.unwrap().as_deref(), Some("123"));
    }
}
