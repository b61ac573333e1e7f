//! Mapping: embed new items and attach them to their most relevant topics
//! with soft weights.

use anyhow::{bail, Result};
use tracing::{debug, info};

use forumpulse_common::types::{ItemEmbedding, ItemMetricEdge};
use forumpulse_nlp::math::{cosine_similarity, round_to, softmax_weights};

use crate::deps::Deps;

pub const BATCH_SIZE: usize = 50;
/// How many topics compete for one item.
pub const TOP_K: usize = 5;
/// Softmax weights below this never become edges.
pub const MIN_EDGE_WEIGHT: f64 = 0.12;

/// Embed one batch of cleaned items with no embedding yet, then edge each to
/// its top topics. Items are counted as processed even with no active topics
/// — persisting the embedding alone stops them from being re-embedded every
/// run. Returns the number of items processed.
pub async fn run(deps: &Deps, now: i64) -> Result<usize> {
    let batch = deps.store.items_without_embedding(BATCH_SIZE).await?;
    if batch.is_empty() {
        debug!("no items awaiting mapping");
        return Ok(0);
    }

    let texts: Vec<String> = batch.iter().map(|(_, text)| text.clone()).collect();
    let vectors = deps.embedder.embed_batch(texts).await?;
    if vectors.len() != batch.len() {
        bail!(
            "embedding provider returned {} vectors for {} items",
            vectors.len(),
            batch.len()
        );
    }

    let active = deps.store.active_nodes().await?;

    let mut processed = 0usize;
    let mut edges_created = 0usize;
    for ((item_id, _), vector) in batch.iter().zip(vectors) {
        deps.store
            .upsert_embedding(&ItemEmbedding {
                item_id: *item_id,
                vector: vector.clone(),
                model_version: deps.embedder.model_version().to_string(),
            })
            .await?;

        if !active.is_empty() {
            for (node_id, weight) in top_edges(&active_similarities(&active, &vector)) {
                deps.store
                    .upsert_edge(&ItemMetricEdge {
                        item_id: *item_id,
                        node_id,
                        weight,
                        created_at: now,
                    })
                    .await?;
                edges_created += 1;
            }
        }
        processed += 1;
    }

    info!(processed, edges_created, "mapping complete");
    Ok(processed)
}

fn active_similarities(
    active: &[forumpulse_common::types::MetricNode],
    vector: &[f32],
) -> Vec<(String, f64)> {
    active
        .iter()
        .map(|n| (n.node_id.clone(), cosine_similarity(&n.centroid, vector)))
        .collect()
}

/// Top-K topics by similarity, their scores softmaxed into a distribution,
/// filtered to weights at or above the floor. Similarity ties keep the
/// incoming (node-id) order — the sort is stable.
pub fn top_edges(similarities: &[(String, f64)]) -> Vec<(String, f64)> {
    let mut ranked: Vec<&(String, f64)> = similarities.iter().collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    let top: Vec<&(String, f64)> = ranked.into_iter().take(TOP_K).collect();

    let scores: Vec<f64> = top.iter().map(|(_, s)| *s).collect();
    let weights = softmax_weights(&scores);

    top.iter()
        .zip(weights)
        .filter(|(_, w)| *w >= MIN_EDGE_WEIGHT)
        .map(|((id, _), w)| (id.clone(), round_to(w, 4)))
        .collect()
}
