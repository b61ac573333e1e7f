//! Sentiment scoring: one opinion signal per cleaned item.

use anyhow::{bail, Result};
use tracing::{debug, info};

use forumpulse_common::types::OpinionSignal;

use crate::deps::Deps;

pub const BATCH_SIZE: usize = 50;

/// Classify one batch of cleaned items with no signal yet. A count mismatch
/// from the provider aborts the batch without persisting anything. Returns
/// the number of signals written.
pub async fn run(deps: &Deps, _now: i64) -> Result<usize> {
    let batch = deps.store.items_without_signal(BATCH_SIZE).await?;
    if batch.is_empty() {
        debug!("no items awaiting sentiment");
        return Ok(0);
    }

    let texts: Vec<String> = batch.iter().map(|(_, text)| text.clone()).collect();
    let predictions = deps.sentiment.predict_batch(&texts).await?;
    if predictions.len() != batch.len() {
        bail!(
            "sentiment provider returned {} predictions for {} items",
            predictions.len(),
            batch.len()
        );
    }

    let mut written = 0usize;
    for ((id, _), prediction) in batch.iter().zip(predictions) {
        deps.store
            .upsert_signal(&OpinionSignal {
                item_id: *id,
                valence: prediction.valence,
                intensity: prediction.intensity,
                confidence: prediction.confidence,
                label: prediction.label,
                model_version: prediction.model_version,
            })
            .await?;
        written += 1;
    }

    info!(written, "sentiment scoring complete");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        deps_with, FixedEmbedder, MockItemClient, MockSearchClient, StaticProposer,
        StaticSentiment,
    };
    use forumpulse_common::types::{Item, SentimentLabel};

    async fn seed_clean(deps: &Deps, id: i64, text: &str) {
        deps.store
            .upsert_item(&Item {
                id,
                text_clean: Some(text.to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn signals_are_written_once_per_item() {
        let deps = deps_with(
            MockItemClient::new(),
            MockSearchClient::new(),
            FixedEmbedder::new(),
            StaticSentiment::new(SentimentLabel::Positive, 0.8, 0.6),
            StaticProposer::new(Vec::new()),
        );
        seed_clean(&deps, 1, "this rocks").await;
        seed_clean(&deps, 2, "also great").await;

        assert_eq!(run(&deps, 0).await.unwrap(), 2);
        let signal = deps.store.signal(1).await.unwrap().unwrap();
        assert_eq!(signal.label, SentimentLabel::Positive);
        assert_eq!(signal.valence, 80.0);
        assert_eq!(signal.intensity, 0.6);

        // Already scored: nothing left to do.
        assert_eq!(run(&deps, 0).await.unwrap(), 0);
    }
}
