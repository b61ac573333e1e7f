use serde::Deserialize;

/// A raw item record from the item-graph API. Field names follow the wire
/// format; `by` is the raw username and must be hashed before storage.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawItem {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub by: Option<String>,
    pub time: Option<i64>,
    pub text: Option<String>,
    pub parent: Option<i64>,
    #[serde(default)]
    pub kids: Option<Vec<i64>>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub score: Option<i64>,
    pub descendants: Option<i64>,
    pub deleted: Option<bool>,
    pub dead: Option<bool>,
}

/// One hit from the search API.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchHit {
    #[serde(rename = "objectID")]
    pub object_id: Option<String>,
    pub title: Option<String>,
    pub points: Option<i64>,
    pub num_comments: Option<i64>,
    pub created_at_i: Option<i64>,
}

impl SearchHit {
    /// The numeric story id, when the hit carries one.
    pub fn story_id(&self) -> Option<i64> {
        self.object_id.as_deref().and_then(|s| s.parse().ok())
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchResponse {
    pub hits: Vec<SearchHit>,
}
