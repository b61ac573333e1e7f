pub mod embedder;
pub mod math;
pub mod openai;
pub mod proposer;
pub mod sentiment;

pub use embedder::{OpenAiEmbedder, TextEmbedder};
pub use math::{cosine_similarity, softmax_weights};
pub use proposer::{OpenAiProposer, TopicProposal, TopicProposer};
pub use sentiment::{OpenAiSentiment, SentimentAnalyst, SentimentPrediction};
