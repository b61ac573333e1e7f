pub mod config;
pub mod error;
pub mod hashing;
pub mod safety;
pub mod text;
pub mod types;

pub use config::Config;
pub use error::PulseError;
pub use types::{
    AuthorProfile, Item, ItemEmbedding, ItemKind, ItemMetricEdge, MetricNode, MetricRollup,
    ModerationFlag, ModerationStatus, NodeStatus, OpinionSignal, SentimentLabel, WatchlistEntry,
    Window,
};
