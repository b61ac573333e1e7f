use anyhow::{anyhow, Result};
use serde::Deserialize;

use forumpulse_common::types::SentimentLabel;
use forumpulse_common::PulseError;

use crate::math::round_to;
use crate::openai::{ChatMessage, OpenAiApi};

/// One sentiment classification, before it is attached to an item.
#[derive(Debug, Clone, PartialEq)]
pub struct SentimentPrediction {
    pub label: SentimentLabel,
    /// Signed strength in [-100, 100]: direction × confidence × 100.
    pub valence: f64,
    pub intensity: f64,
    pub confidence: f64,
    pub model_version: String,
}

#[async_trait::async_trait]
pub trait SentimentAnalyst: Send + Sync {
    async fn predict_batch(&self, texts: &[String]) -> Result<Vec<SentimentPrediction>>;
}

const SENTIMENT_PROMPT: &str = "\
You are a sentiment classifier for discussion-forum comments.

For each numbered text, classify the sentiment. Output a JSON object with \
key \"results\" containing one object per input, in input order:
- \"label\": one of \"positive\", \"negative\", \"neutral\"
- \"confidence\": 0.0-1.0, how sure you are of the label
- \"intensity\": 0.0-1.0, how emotionally charged the text is

Output only the JSON object.";

#[derive(Debug, Deserialize)]
struct SentimentEnvelope {
    results: Vec<RawPrediction>,
}

#[derive(Debug, Deserialize)]
struct RawPrediction {
    label: String,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    intensity: f64,
}

/// Sentiment classification via an OpenAI-compatible chat endpoint.
pub struct OpenAiSentiment {
    api: OpenAiApi,
    model: String,
}

impl OpenAiSentiment {
    pub fn new(api: OpenAiApi, model: &str) -> Self {
        Self {
            api,
            model: model.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl SentimentAnalyst for OpenAiSentiment {
    async fn predict_batch(&self, texts: &[String]) -> Result<Vec<SentimentPrediction>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let numbered: String = texts
            .iter()
            .enumerate()
            .map(|(i, t)| format!("[{i}] {}\n", truncate(t, 500)))
            .collect();

        let messages = [
            ChatMessage::system(SENTIMENT_PROMPT),
            ChatMessage::user(numbered),
        ];
        let raw = self.api.chat_json(&self.model, &messages, 0.0).await?;

        let envelope: SentimentEnvelope = serde_json::from_str(&raw)
            .map_err(|e| anyhow!("malformed sentiment response: {e}"))?;
        if envelope.results.len() != texts.len() {
            return Err(PulseError::Validation(format!(
                "sentiment response count mismatch: got {}, expected {}",
                envelope.results.len(),
                texts.len()
            ))
            .into());
        }

        Ok(envelope
            .results
            .into_iter()
            .map(|raw| prediction_from_raw(raw, &self.model))
            .collect())
    }
}

fn prediction_from_raw(raw: RawPrediction, model: &str) -> SentimentPrediction {
    let label = SentimentLabel::parse(&raw.label);
    let confidence = raw.confidence.clamp(0.0, 1.0);
    let intensity = raw.intensity.clamp(0.0, 1.0);
    let direction = match label {
        SentimentLabel::Positive => 1.0,
        SentimentLabel::Negative => -1.0,
        SentimentLabel::Neutral => 0.0,
    };
    SentimentPrediction {
        label,
        valence: round_to(direction * confidence * 100.0, 2),
        intensity: round_to(intensity, 4),
        confidence: round_to(confidence, 4),
        model_version: model.to_string(),
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
