use anyhow::Result;

use crate::openai::OpenAiApi;

// --- TextEmbedder trait ---

#[async_trait::async_trait]
pub trait TextEmbedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;

    /// Model identifier recorded alongside each persisted vector.
    fn model_version(&self) -> &str;
}

/// Embeddings via an OpenAI-compatible endpoint.
pub struct OpenAiEmbedder {
    api: OpenAiApi,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(api: OpenAiApi, model: &str) -> Self {
        Self {
            api,
            model: model.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl TextEmbedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.api.embed_batch(&self.model, &[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| anyhow::anyhow!("empty embedding response"))
    }

    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        self.api.embed_batch(&self.model, &texts).await
    }

    fn model_version(&self) -> &str {
        &self.model
    }
}
