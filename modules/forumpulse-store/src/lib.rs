//! Analytic store contract plus its two implementations.
//!
//! `PgStore` is the production backend; `MemoryStore` has identical
//! semantics and backs the test suite — no network, no Docker.

pub mod memory;
pub mod migrate;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use anyhow::Result;
use async_trait::async_trait;

use forumpulse_common::types::{
    AuthorProfile, Item, ItemEmbedding, ItemMetricEdge, MetricNode, MetricRollup, ModerationFlag,
    OpinionSignal, SentimentLabel, WatchlistEntry, Window,
};

/// Per-author aggregate derived from stored items.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorAggregate {
    pub author_hash: String,
    pub first_seen: i64,
    pub last_seen: i64,
    pub comment_count: i64,
    pub story_count: i64,
}

/// One candidate row for a rollup: an item-topic edge joined to the item
/// and its (possibly absent) sentiment signal. Rows arrive in edge
/// creation order — the influence cap depends on it.
#[derive(Debug, Clone, PartialEq)]
pub struct RollupRow {
    pub item_id: i64,
    pub author_hash: Option<String>,
    pub is_story: bool,
    pub valence: Option<f64>,
    pub intensity: Option<f64>,
    pub confidence: Option<f64>,
    pub label: Option<SentimentLabel>,
    pub edge_weight: f64,
}

/// Scoring lens for ranked topic queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankLens {
    Presence,
    Split,
    ConsensusPos,
    ConsensusNeg,
    Heat,
    Momentum,
}

impl RankLens {
    pub fn column(&self) -> &'static str {
        match self {
            RankLens::Presence => "presence",
            RankLens::Split => "split_score",
            RankLens::ConsensusPos => "consensus_pos",
            RankLens::ConsensusNeg => "consensus_neg",
            RankLens::Heat => "heat_score",
            RankLens::Momentum => "momentum",
        }
    }
}

/// The single-writer analytic store. All pipeline state lives behind this
/// trait; workers are stateless between runs.
#[async_trait]
pub trait AnalyticStore: Send + Sync {
    // --- Items ---

    /// Insert-or-merge an item. Existing non-null fields are never nulled
    /// out by a sparse incoming record.
    async fn upsert_item(&self, item: &Item) -> Result<()>;

    async fn item(&self, id: i64) -> Result<Option<Item>>;

    /// Most recent items, newest first.
    async fn recent_items(&self, limit: usize) -> Result<Vec<Item>>;

    /// Items with raw text but no cleaned text yet: (id, raw text).
    async fn items_needing_clean(&self, limit: usize) -> Result<Vec<(i64, String)>>;

    /// Set the cleaned text for an item.
    async fn set_clean_text(&self, id: i64, text: &str) -> Result<()>;

    /// Title + cleaned text of the most recent items, newest first. Used
    /// as the topic-discovery sample.
    async fn recent_sample_texts(&self, limit: usize) -> Result<Vec<String>>;

    /// Items with cleaned text but no moderation flag: (id, cleaned text).
    async fn items_without_flag(&self, limit: usize) -> Result<Vec<(i64, String)>>;

    /// Items with cleaned text but no opinion signal: (id, cleaned text).
    async fn items_without_signal(&self, limit: usize) -> Result<Vec<(i64, String)>>;

    /// Items with cleaned text but no embedding: (id, cleaned text).
    async fn items_without_embedding(&self, limit: usize) -> Result<Vec<(i64, String)>>;

    /// Per-author aggregates over all items with an author hash.
    async fn author_aggregates(&self, limit: usize) -> Result<Vec<AuthorAggregate>>;

    // --- Watchlist ---

    async fn upsert_watchlist(&self, entry: &WatchlistEntry) -> Result<()>;

    /// Active entries (`ttl_expires > now`), priority descending.
    async fn active_watchlist(&self, now: i64, limit: usize) -> Result<Vec<WatchlistEntry>>;

    async fn mark_fetched(&self, story_id: i64, now: i64) -> Result<()>;

    /// Delete entries with `ttl_expires <= now`. Returns rows removed.
    async fn remove_expired(&self, now: i64) -> Result<usize>;

    // --- Cleaning outputs ---

    async fn upsert_author_profile(&self, profile: &AuthorProfile) -> Result<()>;
    async fn author_profile(&self, author_hash: &str) -> Result<Option<AuthorProfile>>;

    async fn upsert_flag(&self, flag: &ModerationFlag) -> Result<()>;
    async fn flag(&self, item_id: i64) -> Result<Option<ModerationFlag>>;

    // --- Scoring outputs ---

    async fn upsert_signal(&self, signal: &OpinionSignal) -> Result<()>;
    async fn signal(&self, item_id: i64) -> Result<Option<OpinionSignal>>;

    async fn upsert_embedding(&self, embedding: &ItemEmbedding) -> Result<()>;
    async fn embedding(&self, item_id: i64) -> Result<Option<ItemEmbedding>>;

    // --- Topic nodes and edges ---

    async fn upsert_node(&self, node: &MetricNode) -> Result<()>;
    async fn node(&self, node_id: &str) -> Result<Option<MetricNode>>;

    /// Active nodes in stable node-id order (reconciliation tie-breaking
    /// relies on this ordering being deterministic).
    async fn active_nodes(&self) -> Result<Vec<MetricNode>>;

    /// Insert-or-replace the edge for (item, node).
    async fn upsert_edge(&self, edge: &ItemMetricEdge) -> Result<()>;

    async fn edges_for_item(&self, item_id: i64) -> Result<Vec<ItemMetricEdge>>;

    /// Candidate rows for a (node, window) rollup: edges whose item time is
    /// `>= since`, in edge creation order.
    async fn rollup_rows(&self, node_id: &str, since: i64) -> Result<Vec<RollupRow>>;

    // --- Rollups ---

    async fn upsert_rollup(&self, rollup: &MetricRollup) -> Result<()>;

    /// Most recent rollup for (node, window), by bucket start.
    async fn latest_rollup(&self, node_id: &str, window: Window) -> Result<Option<MetricRollup>>;

    /// Time series of rollups for (node, window) within [start, end].
    async fn rollup_series(
        &self,
        node_id: &str,
        window: Window,
        start: i64,
        end: i64,
    ) -> Result<Vec<MetricRollup>>;

    /// Latest rollup per node in a window, ranked by a scoring lens.
    async fn top_rollups_by(
        &self,
        window: Window,
        lens: RankLens,
        limit: usize,
    ) -> Result<Vec<MetricRollup>>;

    // --- Backfill checkpoint ---

    async fn backfill_value(&self, key: &str) -> Result<Option<String>>;
    async fn set_backfill_value(&self, key: &str, value: &str, now: i64) -> Result<()>;
}
