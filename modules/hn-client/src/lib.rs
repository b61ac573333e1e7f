pub mod error;
pub mod types;

pub use error::{HnError, Result};
pub use types::{RawItem, SearchHit};

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use types::SearchResponse;

const FIREBASE_BASE_URL: &str = "https://hacker-news.firebaseio.com/v0";
const ALGOLIA_BASE_URL: &str = "https://hn.algolia.com/api/v1";

/// Fixed per-call network timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

// ---------------------------------------------------------------------------
// Trait contracts — what the pipeline consumes
// ---------------------------------------------------------------------------

/// Item-graph fetch contract: single items and curated story id lists.
#[async_trait]
pub trait ItemClient: Send + Sync {
    /// Fetch a single item. `None` when the id does not exist.
    async fn item(&self, id: i64) -> Result<Option<RawItem>>;

    async fn top_story_ids(&self) -> Result<Vec<i64>>;
    async fn new_story_ids(&self) -> Result<Vec<i64>>;
    async fn best_story_ids(&self) -> Result<Vec<i64>>;
}

/// Search/index fetch contract: front page and time-ranged story search.
#[async_trait]
pub trait SearchClient: Send + Sync {
    /// Current front-page stories.
    async fn front_page(&self) -> Result<Vec<SearchHit>>;

    /// Stories created in `[start, end)` (unix seconds).
    async fn stories_between(&self, start: i64, end: i64) -> Result<Vec<SearchHit>>;
}

// ---------------------------------------------------------------------------
// Firebase implementation (item graph)
// ---------------------------------------------------------------------------

pub struct FirebaseClient {
    client: reqwest::Client,
    base_url: String,
}

impl FirebaseClient {
    pub fn new() -> Self {
        Self {
            client: http_client(),
            base_url: FIREBASE_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    async fn id_list(&self, path: &str) -> Result<Vec<i64>> {
        let url = format!("{}/{path}.json", self.base_url);
        let resp = self.client.get(&url).send().await?;
        check_status(&resp)?;
        Ok(resp.json().await?)
    }
}

impl Default for FirebaseClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ItemClient for FirebaseClient {
    async fn item(&self, id: i64) -> Result<Option<RawItem>> {
        let url = format!("{}/item/{id}.json", self.base_url);
        debug!(id, "fetching item");
        let resp = self.client.get(&url).send().await?;
        check_status(&resp)?;
        // The API returns the JSON literal `null` for unknown ids.
        let value: serde_json::Value = resp.json().await?;
        if value.is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(value)?))
    }

    async fn top_story_ids(&self) -> Result<Vec<i64>> {
        self.id_list("topstories").await
    }

    async fn new_story_ids(&self) -> Result<Vec<i64>> {
        self.id_list("newstories").await
    }

    async fn best_story_ids(&self) -> Result<Vec<i64>> {
        self.id_list("beststories").await
    }
}

// ---------------------------------------------------------------------------
// Algolia implementation (search index)
// ---------------------------------------------------------------------------

pub struct AlgoliaClient {
    client: reqwest::Client,
    base_url: String,
    hits_per_page: u32,
}

impl AlgoliaClient {
    pub fn new() -> Self {
        Self {
            client: http_client(),
            base_url: ALGOLIA_BASE_URL.to_string(),
            hits_per_page: 50,
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    async fn search(&self, path: &str, params: &[(&str, String)]) -> Result<Vec<SearchHit>> {
        let url = format!("{}/{path}", self.base_url);
        let resp = self.client.get(&url).query(params).send().await?;
        check_status(&resp)?;
        let parsed: SearchResponse = resp.json().await?;
        debug!(path, hits = parsed.hits.len(), "search complete");
        Ok(parsed.hits)
    }
}

impl Default for AlgoliaClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchClient for AlgoliaClient {
    async fn front_page(&self) -> Result<Vec<SearchHit>> {
        self.search(
            "search",
            &[
                ("tags", "front_page".to_string()),
                ("hitsPerPage", self.hits_per_page.to_string()),
            ],
        )
        .await
    }

    async fn stories_between(&self, start: i64, end: i64) -> Result<Vec<SearchHit>> {
        self.search(
            "search_by_date",
            &[
                ("tags", "story".to_string()),
                ("hitsPerPage", self.hits_per_page.to_string()),
                (
                    "numericFilters",
                    format!("created_at_i>={start},created_at_i<{end}"),
                ),
            ],
        )
        .await
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .expect("failed to build HTTP client")
}

fn check_status(resp: &reqwest::Response) -> Result<()> {
    let status = resp.status();
    if !status.is_success() {
        return Err(HnError::Api {
            status: status.as_u16(),
            message: format!("request to {} failed", resp.url()),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_hit_story_id_parses_object_id() {
        let hit = SearchHit {
            object_id: Some("41000001".to_string()),
            ..Default::default()
        };
        assert_eq!(hit.story_id(), Some(41000001));

        let bad = SearchHit {
            object_id: Some("not-a-number".to_string()),
            ..Default::default()
        };
        assert_eq!(bad.story_id(), None);
        assert_eq!(SearchHit::default().story_id(), None);
    }

    #[test]
    fn raw_item_deserializes_wire_format() {
        let raw: RawItem = serde_json::from_str(
            r#"{"id": 100, "type": "story", "by": "alice", "time": 1700000000,
                "title": "Show HN", "kids": [101, 102], "score": 55, "descendants": 2}"#,
        )
        .unwrap();
        assert_eq!(raw.id, 100);
        assert_eq!(raw.kind.as_deref(), Some("story"));
        assert_eq!(raw.kids, Some(vec![101, 102]));
        assert!(raw.deleted.is_none());
    }
}
