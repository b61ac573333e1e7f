//! Shared dependency container. Every provider handle is constructed once at
//! startup and injected — no lazy global singletons.

use std::sync::Arc;

use tracing::warn;

use forumpulse_events::EventLog;
use forumpulse_nlp::{SentimentAnalyst, TextEmbedder, TopicProposer};
use forumpulse_store::AnalyticStore;
use hn_client::{ItemClient, SearchClient};

pub struct Deps {
    pub store: Arc<dyn AnalyticStore>,
    pub events: Arc<dyn EventLog>,
    pub items: Arc<dyn ItemClient>,
    pub search: Arc<dyn SearchClient>,
    pub embedder: Arc<dyn TextEmbedder>,
    pub sentiment: Arc<dyn SentimentAnalyst>,
    pub proposer: Arc<dyn TopicProposer>,

    pub author_salt: String,
    /// How many watchlist candidates the harvester takes per run.
    pub harvest_limit: usize,
}

impl Deps {
    /// Publish an event, warn-and-continue on failure. The log is a
    /// notification channel, not a correctness dependency.
    pub async fn publish_event(&self, channel: &str, payload: serde_json::Value) {
        if let Err(error) = self.events.publish(channel, payload).await {
            warn!(%error, channel, "event publish failed");
        }
    }
}
