use serde::{Deserialize, Serialize};

/// Forum item kind as reported by the upstream item API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Story,
    Comment,
    Job,
    Poll,
    #[serde(rename = "pollopt")]
    PollOpt,
    #[serde(other)]
    Unknown,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Story => "story",
            ItemKind::Comment => "comment",
            ItemKind::Job => "job",
            ItemKind::Poll => "poll",
            ItemKind::PollOpt => "pollopt",
            ItemKind::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "story" => ItemKind::Story,
            "comment" => ItemKind::Comment,
            "job" => ItemKind::Job,
            "poll" => ItemKind::Poll,
            "pollopt" => ItemKind::PollOpt,
            _ => ItemKind::Unknown,
        }
    }
}

/// A harvested forum item (story or comment). Raw usernames are hashed
/// before this struct is built — only `author_hash` is ever persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub kind: Option<ItemKind>,
    pub author_hash: Option<String>,
    /// Unix seconds, as reported by the upstream API.
    pub time: Option<i64>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub text: Option<String>,
    pub text_clean: Option<String>,
    pub parent: Option<i64>,
    pub kids: Option<Vec<i64>>,
    pub score: Option<i64>,
    pub descendants: Option<i64>,
    pub deleted: Option<bool>,
    pub dead: Option<bool>,
}

impl Item {
    /// Non-destructive merge: an incoming field overwrites the stored field
    /// only when the incoming value is present. The id never changes.
    pub fn merge(existing: &Item, incoming: &Item) -> Item {
        Item {
            id: existing.id,
            kind: incoming.kind.or(existing.kind),
            author_hash: incoming.author_hash.clone().or_else(|| existing.author_hash.clone()),
            time: incoming.time.or(existing.time),
            title: incoming.title.clone().or_else(|| existing.title.clone()),
            url: incoming.url.clone().or_else(|| existing.url.clone()),
            text: incoming.text.clone().or_else(|| existing.text.clone()),
            text_clean: incoming.text_clean.clone().or_else(|| existing.text_clean.clone()),
            parent: incoming.parent.or(existing.parent),
            kids: incoming.kids.clone().or_else(|| existing.kids.clone()),
            score: incoming.score.or(existing.score),
            descendants: incoming.descendants.or(existing.descendants),
            deleted: incoming.deleted.or(existing.deleted),
            dead: incoming.dead.or(existing.dead),
        }
    }

    pub fn is_story(&self) -> bool {
        self.kind == Some(ItemKind::Story)
    }
}

/// A story queued for ingestion. One live entry per story id;
/// active ⇔ `ttl_expires > now`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchlistEntry {
    pub story_id: i64,
    pub priority_score: f64,
    /// Unix seconds after which the entry is eligible for the sweep.
    pub ttl_expires: i64,
    pub last_fetched: Option<i64>,
}

/// Per-author aggregates, fully re-derived from stored items each run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorProfile {
    pub author_hash: String,
    pub first_seen: i64,
    pub last_seen: i64,
    pub comment_count: i64,
    pub story_count: i64,
    /// 0.0 unless the posting rate exceeds the bot threshold, then capped at 1.0.
    pub bot_likelihood: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationStatus {
    Clean,
    Sensitive,
    Blocked,
}

impl ModerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationStatus::Clean => "clean",
            ModerationStatus::Sensitive => "sensitive",
            ModerationStatus::Blocked => "blocked",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "blocked" => ModerationStatus::Blocked,
            "sensitive" => ModerationStatus::Sensitive,
            _ => ModerationStatus::Clean,
        }
    }
}

/// One moderation verdict per item; reprocessing overwrites status and reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationFlag {
    pub item_id: i64,
    pub status: ModerationStatus,
    pub reason: Option<String>,
    pub flagged_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl SentimentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Negative => "negative",
            SentimentLabel::Neutral => "neutral",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "positive" => SentimentLabel::Positive,
            "negative" => SentimentLabel::Negative,
            _ => SentimentLabel::Neutral,
        }
    }
}

/// Per-item sentiment classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpinionSignal {
    pub item_id: i64,
    /// Signed strength in [-100, 100]: direction × confidence × 100.
    pub valence: f64,
    /// [0, 1] — how emotionally charged the text is.
    pub intensity: f64,
    /// [0, 1] — classifier confidence in the label.
    pub confidence: f64,
    pub label: SentimentLabel,
    pub model_version: String,
}

/// Per-item embedding vector. Dimension is fixed by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemEmbedding {
    pub item_id: i64,
    pub vector: Vec<f32>,
    pub model_version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Active,
    Retired,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Active => "active",
            NodeStatus::Retired => "retired",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "retired" => NodeStatus::Retired,
            _ => NodeStatus::Active,
        }
    }
}

/// A persistent topic identity: centroid vector plus label and definition.
/// The node id is stable across relabeling as long as the centroid merges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricNode {
    pub node_id: String,
    pub label: String,
    pub definition: String,
    pub centroid: Vec<f32>,
    pub parent_id: Option<String>,
    pub status: NodeStatus,
    pub version: i32,
}

/// Soft membership of an item in a topic. At most one edge per (item, node).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemMetricEdge {
    pub item_id: i64,
    pub node_id: String,
    /// Softmax-normalized similarity in [0, 1].
    pub weight: f64,
    pub created_at: i64,
}

/// Aggregation window for rollups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Window {
    Hour,
    Today,
    Week,
    Month,
}

impl Window {
    pub const ALL: [Window; 4] = [Window::Hour, Window::Today, Window::Week, Window::Month];

    pub fn secs(&self) -> i64 {
        match self {
            Window::Hour => 3_600,
            Window::Today => 86_400,
            Window::Week => 604_800,
            Window::Month => 2_592_000,
        }
    }

    /// Minimum distinct authors required before a rollup is emitted.
    pub fn min_authors(&self) -> usize {
        match self {
            Window::Hour => 1,
            Window::Today => 5,
            Window::Week => 20,
            Window::Month => 50,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Window::Hour => "hour",
            Window::Today => "today",
            Window::Week => "week",
            Window::Month => "month",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "hour" => Window::Hour,
            "week" => Window::Week,
            "month" => Window::Month,
            _ => Window::Today,
        }
    }
}

/// One precomputed metric snapshot for (topic, window, bucket).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRollup {
    pub node_id: String,
    pub window: Window,
    pub bucket_start: i64,
    /// counted_items / total_candidate_items in the window.
    pub presence: f64,
    pub sentiment_positive: f64,
    pub sentiment_negative: f64,
    pub sentiment_neutral: f64,
    pub valence_score: f64,
    pub split_score: f64,
    pub consensus_pos: f64,
    pub consensus_neg: f64,
    pub heat_score: f64,
    pub momentum: f64,
    pub unique_authors: i64,
    pub thread_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_item() -> Item {
        Item {
            id: 1,
            kind: Some(ItemKind::Story),
            author_hash: Some("abc".into()),
            time: Some(1_700_000_000),
            title: Some("A title".into()),
            url: Some("https://example.com".into()),
            text: Some("body".into()),
            text_clean: Some("body".into()),
            parent: None,
            kids: Some(vec![2, 3]),
            score: Some(42),
            descendants: Some(2),
            deleted: None,
            dead: None,
        }
    }

    #[test]
    fn merge_is_idempotent() {
        let a = full_item();
        let once = Item::merge(&a, &a);
        let twice = Item::merge(&once, &a);
        assert_eq!(once, a);
        assert_eq!(twice, a);
    }

    #[test]
    fn merge_sparse_incoming_preserves_existing_fields() {
        let existing = full_item();
        let sparse = Item {
            id: 1,
            score: Some(99),
            ..Item::default()
        };
        let merged = Item::merge(&existing, &sparse);
        assert_eq!(merged.score, Some(99));
        assert_eq!(merged.title, Some("A title".into()));
        assert_eq!(merged.text_clean, Some("body".into()));
        assert_eq!(merged.kids, Some(vec![2, 3]));
    }

    #[test]
    fn merge_never_changes_id() {
        let existing = full_item();
        let incoming = Item {
            id: 999,
            ..Item::default()
        };
        assert_eq!(Item::merge(&existing, &incoming).id, 1);
    }

    #[test]
    fn window_constants() {
        assert_eq!(Window::Hour.secs(), 3600);
        assert_eq!(Window::Month.secs(), 2_592_000);
        assert_eq!(Window::Week.min_authors(), 20);
        assert_eq!(Window::parse("hour"), Window::Hour);
    }
}
