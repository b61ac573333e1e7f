// Test mocks for the pipeline workers.
//
// One mock per trait boundary:
// - MockItemClient (ItemClient) — HashMap-based id→record
// - MockSearchClient (SearchClient) — canned front page + dated stories
// - FixedEmbedder (TextEmbedder) — registered vectors, deterministic
//   hash-based fallback
// - StaticSentiment (SentimentAnalyst) — one prediction shape for all texts
// - StaticProposer (TopicProposer) — canned proposal list
//
// Everything runs against MemoryStore / MemoryEventLog: no network, no
// database, no Docker.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use forumpulse_common::types::SentimentLabel;
use forumpulse_events::MemoryEventLog;
use forumpulse_nlp::proposer::TopicProposal;
use forumpulse_nlp::sentiment::{SentimentAnalyst, SentimentPrediction};
use forumpulse_nlp::TextEmbedder;
use forumpulse_nlp::TopicProposer;
use forumpulse_store::MemoryStore;
use hn_client::{ItemClient, RawItem, SearchClient, SearchHit};

use crate::deps::Deps;

/// Embedding dimension for test vectors.
pub const TEST_EMBEDDING_DIM: usize = 8;

// ---------------------------------------------------------------------------
// MockItemClient
// ---------------------------------------------------------------------------

/// HashMap-based item client. Unregistered ids resolve to `None`, like the
/// real API's JSON `null`.
#[derive(Default)]
pub struct MockItemClient {
    items: HashMap<i64, RawItem>,
}

impl MockItemClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_item(mut self, item: RawItem) -> Self {
        self.items.insert(item.id, item);
        self
    }
}

#[async_trait]
impl ItemClient for MockItemClient {
    async fn item(&self, id: i64) -> hn_client::Result<Option<RawItem>> {
        Ok(self.items.get(&id).cloned())
    }

    async fn top_story_ids(&self) -> hn_client::Result<Vec<i64>> {
        let mut ids: Vec<i64> = self.items.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }

    async fn new_story_ids(&self) -> hn_client::Result<Vec<i64>> {
        self.top_story_ids().await
    }

    async fn best_story_ids(&self) -> hn_client::Result<Vec<i64>> {
        self.top_story_ids().await
    }
}

// ---------------------------------------------------------------------------
// MockSearchClient
// ---------------------------------------------------------------------------

/// Canned search results. `stories_between` filters the registered story
/// hits by `created_at_i`, so backfill chunk boundaries can be exercised.
#[derive(Default)]
pub struct MockSearchClient {
    front_page: Vec<SearchHit>,
    stories: Vec<SearchHit>,
}

impl MockSearchClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_front_page(mut self, hits: Vec<SearchHit>) -> Self {
        self.front_page = hits;
        self
    }

    pub fn with_stories(mut self, hits: Vec<SearchHit>) -> Self {
        self.stories = hits;
        self
    }
}

#[async_trait]
impl SearchClient for MockSearchClient {
    async fn front_page(&self) -> hn_client::Result<Vec<SearchHit>> {
        Ok(self.front_page.clone())
    }

    async fn stories_between(&self, start: i64, end: i64) -> hn_client::Result<Vec<SearchHit>> {
        Ok(self
            .stories
            .iter()
            .filter(|h| {
                h.created_at_i
                    .map(|t| t >= start && t < end)
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// FixedEmbedder
// ---------------------------------------------------------------------------

/// Deterministic embedder. Exact-match registered texts get their registered
/// vector; everything else gets a stable byte-derived vector.
#[derive(Default)]
pub struct FixedEmbedder {
    known: HashMap<String, Vec<f32>>,
}

impl FixedEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.known.insert(text.to_string(), vector);
        self
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        if let Some(v) = self.known.get(text) {
            return v.clone();
        }
        let mut v = vec![0.0_f32; TEST_EMBEDDING_DIM];
        for (i, byte) in text.bytes().enumerate() {
            v[i % TEST_EMBEDDING_DIM] += byte as f32 / 255.0;
        }
        v
    }
}

#[async_trait]
impl TextEmbedder for FixedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vector_for(text))
    }

    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    fn model_version(&self) -> &str {
        "fixed-test-embedder"
    }
}

// ---------------------------------------------------------------------------
// StaticSentiment
// ---------------------------------------------------------------------------

/// Returns the same prediction shape for every input text.
pub struct StaticSentiment {
    label: SentimentLabel,
    confidence: f64,
    intensity: f64,
}

impl StaticSentiment {
    pub fn new(label: SentimentLabel, confidence: f64, intensity: f64) -> Self {
        Self {
            label,
            confidence,
            intensity,
        }
    }
}

#[async_trait]
impl SentimentAnalyst for StaticSentiment {
    async fn predict_batch(&self, texts: &[String]) -> Result<Vec<SentimentPrediction>> {
        let direction = match self.label {
            SentimentLabel::Positive => 1.0,
            SentimentLabel::Negative => -1.0,
            SentimentLabel::Neutral => 0.0,
        };
        Ok(texts
            .iter()
            .map(|_| SentimentPrediction {
                label: self.label,
                valence: direction * self.confidence * 100.0,
                intensity: self.intensity,
                confidence: self.confidence,
                model_version: "static-test-sentiment".to_string(),
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// StaticProposer
// ---------------------------------------------------------------------------

/// Canned topic proposals; optionally fails to exercise the abort path.
#[derive(Default)]
pub struct StaticProposer {
    proposals: Vec<TopicProposal>,
    fail: bool,
}

impl StaticProposer {
    pub fn new(proposals: Vec<TopicProposal>) -> Self {
        Self {
            proposals,
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            proposals: Vec::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl TopicProposer for StaticProposer {
    async fn propose(&self, _samples: &[String]) -> Result<Vec<TopicProposal>> {
        if self.fail {
            anyhow::bail!("proposal provider returned malformed output");
        }
        Ok(self.proposals.clone())
    }
}

// ---------------------------------------------------------------------------
// Deps builders
// ---------------------------------------------------------------------------

/// A full in-memory dependency set with inert providers. Swap in specific
/// mocks per test via the other builders.
pub fn test_deps() -> Deps {
    deps_with(
        MockItemClient::new(),
        MockSearchClient::new(),
        FixedEmbedder::new(),
        StaticSentiment::new(SentimentLabel::Neutral, 0.5, 0.1),
        StaticProposer::new(Vec::new()),
    )
}

pub fn deps_with(
    items: impl ItemClient + 'static,
    search: impl SearchClient + 'static,
    embedder: impl TextEmbedder + 'static,
    sentiment: impl SentimentAnalyst + 'static,
    proposer: impl TopicProposer + 'static,
) -> Deps {
    Deps {
        store: Arc::new(MemoryStore::new()),
        events: Arc::new(MemoryEventLog::new()),
        items: Arc::new(items),
        search: Arc::new(search),
        embedder: Arc::new(embedder),
        sentiment: Arc::new(sentiment),
        proposer: Arc::new(proposer),
        author_salt: "test-salt".to_string(),
        harvest_limit: 10,
    }
}

/// A story hit with the fields discovery cares about.
pub fn search_hit(id: i64, points: i64, comments: i64, created_at: i64) -> SearchHit {
    SearchHit {
        object_id: Some(id.to_string()),
        title: Some(format!("Story {id}")),
        points: Some(points),
        num_comments: Some(comments),
        created_at_i: Some(created_at),
    }
}

/// A raw story record with kids.
pub fn raw_story(id: i64, by: &str, time: i64, kids: Vec<i64>) -> RawItem {
    RawItem {
        id,
        kind: Some("story".to_string()),
        by: Some(by.to_string()),
        time: Some(time),
        title: Some(format!("Story {id}")),
        kids: Some(kids),
        score: Some(10),
        descendants: Some(2),
        ..Default::default()
    }
}

/// A raw comment record.
pub fn raw_comment(id: i64, by: &str, time: i64, parent: i64, kids: Vec<i64>) -> RawItem {
    RawItem {
        id,
        kind: Some("comment".to_string()),
        by: Some(by.to_string()),
        time: Some(time),
        text: Some(format!("comment {id}")),
        parent: Some(parent),
        kids: if kids.is_empty() { None } else { Some(kids) },
        ..Default::default()
    }
}
