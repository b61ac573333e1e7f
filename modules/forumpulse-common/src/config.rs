use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres
    pub database_url: String,

    // Model providers (OpenAI-compatible endpoints)
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub embedding_model: String,
    pub labeling_model: String,
    pub sentiment_model: String,

    // Ingestion
    pub author_salt: String,
    pub harvest_limit: usize,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            openai_api_key: required_env("OPENAI_API_KEY"),
            openai_base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            embedding_model: env::var("FP_EMBEDDING_MODEL")
                .unwrap_or_else(|_| "text-embedding-3-large".to_string()),
            labeling_model: env::var("FP_LABELING_MODEL")
                .unwrap_or_else(|_| "llama-3.3-70b-instruct".to_string()),
            sentiment_model: env::var("FP_SENTIMENT_MODEL")
                .unwrap_or_else(|_| "llama-3.3-70b-instruct".to_string()),
            author_salt: env::var("FP_AUTHOR_SALT").unwrap_or_else(|_| "default-salt".to_string()),
            harvest_limit: env::var("FP_HARVEST_LIMIT")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .expect("FP_HARVEST_LIMIT must be a number"),
        }
    }

    /// Log the loaded config with secrets redacted.
    pub fn log_redacted(&self) {
        tracing::info!(
            database = %redact_url(&self.database_url),
            base_url = %self.openai_base_url,
            embedding_model = %self.embedding_model,
            labeling_model = %self.labeling_model,
            harvest_limit = self.harvest_limit,
            "Configuration loaded"
        );
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn redact_url(url: &str) -> String {
    match url.split_once('@') {
        Some((_, host)) => format!("postgres://***@{host}"),
        None => url.to_string(),
    }
}
