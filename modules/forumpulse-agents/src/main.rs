use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use forumpulse_agents::{Deps, Job, Scheduler};
use forumpulse_common::Config;
use forumpulse_events::PgEventLog;
use forumpulse_nlp::openai::OpenAiApi;
use forumpulse_nlp::{OpenAiEmbedder, OpenAiProposer, OpenAiSentiment};
use forumpulse_store::PgStore;
use hn_client::{AlgoliaClient, FirebaseClient};

#[derive(Parser)]
#[command(name = "forumpulse", about = "Forum pulse agent pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full scheduler until stopped.
    Run,
    /// Run a single job once and exit.
    Job {
        /// Job name, e.g. trend-scout, thread-harvester, rollup-accountant.
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("forumpulse=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    info!("Forum Pulse starting...");
    let config = Config::from_env();
    config.log_redacted();

    let store = PgStore::connect(&config.database_url).await?;
    store.migrate().await?;

    let events = PgEventLog::new(store.pool().clone());
    events.migrate().await?;

    let api = OpenAiApi::new(&config.openai_api_key, &config.openai_base_url);
    let deps = Arc::new(Deps {
        store: Arc::new(store),
        events: Arc::new(events),
        items: Arc::new(FirebaseClient::new()),
        search: Arc::new(AlgoliaClient::new()),
        embedder: Arc::new(OpenAiEmbedder::new(
            OpenAiApi::new(&config.openai_api_key, &config.openai_base_url),
            &config.embedding_model,
        )),
        sentiment: Arc::new(OpenAiSentiment::new(
            OpenAiApi::new(&config.openai_api_key, &config.openai_base_url),
            &config.sentiment_model,
        )),
        proposer: Arc::new(OpenAiProposer::new(api, &config.labeling_model)),
        author_salt: config.author_salt.clone(),
        harvest_limit: config.harvest_limit,
    });

    match cli.command {
        Command::Run => {
            Scheduler::new(deps).run().await;
        }
        Command::Job { name } => {
            let job = Job::parse(&name)
                .ok_or_else(|| anyhow::anyhow!("unknown job '{name}'"))?;
            let now = chrono::Utc::now().timestamp();
            let processed = job.run(&deps, now).await?;
            info!(job = job.name(), processed, "single job run complete");
        }
    }

    Ok(())
}
