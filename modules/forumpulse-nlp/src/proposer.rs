use anyhow::{anyhow, Result};
use serde::Deserialize;

use crate::openai::{ChatMessage, OpenAiApi};

/// Maximum number of sample snippets sent to the proposal model.
const MAX_SAMPLES: usize = 50;
/// Snippets are truncated to this many characters.
const SNIPPET_CHARS: usize = 200;

/// A candidate topic proposed from a content sample, before anchoring.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TopicProposal {
    pub label: String,
    #[serde(default)]
    pub definition: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl TopicProposal {
    /// The composite string embedded to produce the topic's centroid.
    pub fn anchor_text(&self) -> String {
        format!(
            "{}. {} Keywords: {}",
            self.label,
            self.definition,
            self.keywords.join(", ")
        )
    }
}

#[async_trait::async_trait]
pub trait TopicProposer: Send + Sync {
    /// Propose concern topics grounded in the given sample texts.
    async fn propose(&self, samples: &[String]) -> Result<Vec<TopicProposal>>;
}

const DISCOVER_PROMPT: &str = "\
You are a topic analyst for a discussion-forum intelligence dashboard.

Read the following sample of recent forum stories and comments carefully. \
Your job is to identify the SPECIFIC broad themes and concerns that people \
are ACTUALLY discussing in this content, not generic tech categories.

Rules:
- Extract 10-25 topics that are GROUNDED in the content you see. Every topic \
must relate to something explicitly discussed in at least 2-3 items.
- Labels should be specific and descriptive (3-6 words). NOT vague categories \
like \"Cybersecurity\" or \"Developer Experience\". GOOD examples: \"LLM Coding \
Assistant Risks\", \"Rust vs C++ Memory Safety\", \"Tech Layoffs & Hiring \
Freezes\", \"Browser Extension Privacy Abuse\".
- Definitions should explain what the concern IS and WHY people care, in 1-2 \
sentences. Include the tension or debate if there is one.
- Keywords should be terms/phrases actually used in the content, not generic \
synonyms.

For each topic, output a JSON object with:
- \"label\": specific descriptive name (3-6 words), title case
- \"definition\": 1-2 sentence description of the concern and why it matters \
to this community
- \"keywords\": list of 5-10 terms/phrases drawn from the actual content

Output a JSON object with key \"topics\" containing the array. No other text.";

/// Topic proposals via an OpenAI-compatible chat endpoint.
pub struct OpenAiProposer {
    api: OpenAiApi,
    model: String,
}

impl OpenAiProposer {
    pub fn new(api: OpenAiApi, model: &str) -> Self {
        Self {
            api,
            model: model.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl TopicProposer for OpenAiProposer {
    async fn propose(&self, samples: &[String]) -> Result<Vec<TopicProposal>> {
        let numbered: String = samples
            .iter()
            .take(MAX_SAMPLES)
            .enumerate()
            .map(|(i, t)| format!("[{i}] {}\n", truncate(t, SNIPPET_CHARS)))
            .collect();

        let messages = [
            ChatMessage::system(DISCOVER_PROMPT),
            ChatMessage::user(numbered),
        ];
        let raw = self.api.chat_json(&self.model, &messages, 0.3).await?;
        parse_proposals(&raw)
    }
}

/// Parse the model response. Accepts the `topics` array keyed as `topics`,
/// `results`, or `data`, or a bare array.
pub fn parse_proposals(raw: &str) -> Result<Vec<TopicProposal>> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| anyhow!("malformed proposal response: {e}"))?;

    let array = match &value {
        serde_json::Value::Array(_) => value.clone(),
        serde_json::Value::Object(map) => ["topics", "results", "data"]
            .iter()
            .find_map(|key| map.get(*key))
            .cloned()
            .ok_or_else(|| anyhow!("proposal response missing 'topics' key"))?,
        _ => return Err(anyhow!("proposal response is not an object or array")),
    };

    let proposals: Vec<TopicProposal> = serde_json::from_value(array)
        .map_err(|e| anyhow!("malformed topic entries: {e}"))?;
    Ok(proposals
        .into_iter()
        .filter(|p| !p.label.trim().is_empty())
        .collect())
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
