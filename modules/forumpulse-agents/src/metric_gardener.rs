//! Topic engine: discover candidate topics from a recent content sample,
//! anchor them as centroid vectors, and reconcile against the live topic
//! set. Node identity survives relabeling as long as the centroid stays
//! within the merge threshold, which keeps historical rollups attached to
//! the same node id across runs.

use std::collections::HashSet;

use anyhow::Result;
use tracing::{debug, info, warn};
use uuid::Uuid;

use forumpulse_common::types::{MetricNode, NodeStatus};
use forumpulse_nlp::math::cosine_similarity;
use forumpulse_nlp::proposer::TopicProposal;

use crate::deps::Deps;

pub const SAMPLE_SIZE: usize = 100;
pub const MIN_SAMPLE_TEXTS: usize = 10;
/// Cosine similarity at or above which a proposal merges into an existing
/// node instead of creating a new one.
pub const MERGE_THRESHOLD: f64 = 0.85;

/// One reconciliation verdict per proposed topic.
#[derive(Debug, PartialEq)]
pub enum Verdict {
    /// Proposal merged into an existing node (id kept, content updated).
    Merged(String),
    /// Proposal became a brand-new node.
    Created(String),
}

/// One full garden cycle: sample, propose, anchor, reconcile. Returns the
/// number of proposals processed; aborted runs (provider failure, thin
/// sample) return 0.
pub async fn run(deps: &Deps, _now: i64) -> Result<usize> {
    let samples: Vec<String> = deps
        .store
        .recent_sample_texts(SAMPLE_SIZE)
        .await?
        .into_iter()
        .filter(|t| !t.trim().is_empty())
        .collect();
    if samples.len() < MIN_SAMPLE_TEXTS {
        debug!(samples = samples.len(), "sample too thin, skipping garden run");
        return Ok(0);
    }

    let proposals = match deps.proposer.propose(&samples).await {
        Ok(proposals) if proposals.is_empty() => {
            warn!("proposal provider returned no topics, aborting run");
            return Ok(0);
        }
        Ok(proposals) => proposals,
        Err(error) => {
            warn!(%error, "proposal provider failed, aborting run");
            return Ok(0);
        }
    };

    let anchors = deps
        .embedder
        .embed_batch(proposals.iter().map(|p| p.anchor_text()).collect())
        .await?;
    if anchors.len() != proposals.len() {
        warn!(
            proposals = proposals.len(),
            anchors = anchors.len(),
            "embedding count mismatch, aborting run"
        );
        return Ok(0);
    }

    let active = deps.store.active_nodes().await?;
    let mut matched: HashSet<String> = HashSet::new();
    let mut merged = 0usize;
    let mut created = 0usize;

    for (proposal, centroid) in proposals.iter().zip(&anchors) {
        match reconcile(&active, proposal, centroid) {
            Verdict::Merged(node_id) => {
                let existing = active
                    .iter()
                    .find(|n| n.node_id == node_id)
                    .expect("merge verdict references an active node");
                deps.store
                    .upsert_node(&MetricNode {
                        node_id: node_id.clone(),
                        label: proposal.label.clone(),
                        definition: proposal.definition.clone(),
                        centroid: centroid.clone(),
                        parent_id: existing.parent_id.clone(),
                        status: NodeStatus::Active,
                        version: existing.version + 1,
                    })
                    .await?;
                matched.insert(node_id);
                merged += 1;
            }
            Verdict::Created(node_id) => {
                deps.store
                    .upsert_node(&MetricNode {
                        node_id,
                        label: proposal.label.clone(),
                        definition: proposal.definition.clone(),
                        centroid: centroid.clone(),
                        parent_id: None,
                        status: NodeStatus::Active,
                        version: 1,
                    })
                    .await?;
                created += 1;
            }
        }
    }

    // Active nodes matched by no proposal this cycle are retired. Centroid
    // and history stay in place for audit; retirement is terminal.
    let mut retired = 0usize;
    for node in &active {
        if !matched.contains(&node.node_id) {
            let mut update = node.clone();
            update.status = NodeStatus::Retired;
            deps.store.upsert_node(&update).await?;
            retired += 1;
        }
    }

    info!(merged, created, retired, "garden cycle complete");
    Ok(proposals.len())
}

/// Pick the verdict for one proposal. The best active node is the first in
/// iteration order with the strictly-highest similarity — the store returns
/// active nodes in node-id order, so ties break deterministically toward
/// the lowest node id.
pub fn reconcile(active: &[MetricNode], _proposal: &TopicProposal, centroid: &[f32]) -> Verdict {
    let mut best: Option<(&MetricNode, f64)> = None;
    for node in active {
        let sim = cosine_similarity(&node.centroid, centroid);
        if best.map(|(_, s)| sim > s).unwrap_or(true) {
            best = Some((node, sim));
        }
    }

    match best {
        Some((node, sim)) if sim >= MERGE_THRESHOLD => Verdict::Merged(node.node_id.clone()),
        _ => Verdict::Created(fresh_node_id()),
    }
}

fn fresh_node_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("auto-{}", &hex[..12])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        deps_with, FixedEmbedder, MockItemClient, MockSearchClient, StaticProposer,
        StaticSentiment,
    };
    use forumpulse_common::types::{Item, SentimentLabel};

    fn node(id: &str, centroid: Vec<f32>) -> MetricNode {
        MetricNode {
            node_id: id.to_string(),
            label: format!("Topic {id}"),
            definition: "d".to_string(),
            centroid,
            parent_id: None,
            status: NodeStatus::Active,
            version: 1,
        }
    }

    fn proposal(label: &str) -> TopicProposal {
        TopicProposal {
            label: label.to_string(),
            definition: format!("{label} definition"),
            keywords: vec!["kw".to_string()],
        }
    }

    #[test]
    fn identical_centroid_always_merges() {
        let existing = vec![node("auto-a", vec![0.2, 0.4, 0.6])];
        let verdict = reconcile(&existing, &proposal("Same"), &[0.2, 0.4, 0.6]);
        assert_eq!(verdict, Verdict::Merged("auto-a".to_string()));
    }

    #[test]
    fn dissimilar_centroid_creates() {
        let existing = vec![node("auto-a", vec![1.0, 0.0, 0.0])];
        let verdict = reconcile(&existing, &proposal("Other"), &[0.0, 1.0, 0.0]);
        assert!(matches!(verdict, Verdict::Created(id) if id.starts_with("auto-")));
    }

    #[test]
    fn equal_similarity_ties_break_to_the_first_node() {
        // Two nodes with identical centroids: both have similarity 1.0 to
        // the proposal. The first in (node-id) order must win.
        let existing = vec![
            node("auto-aaa", vec![0.5, 0.5]),
            node("auto-bbb", vec![0.5, 0.5]),
        ];
        let verdict = reconcile(&existing, &proposal("Tied"), &[0.5, 0.5]);
        assert_eq!(verdict, Verdict::Merged("auto-aaa".to_string()));
    }

    async fn seed_sample(deps: &Deps, count: usize) {
        for i in 0..count {
            deps.store
                .upsert_item(&Item {
                    id: i as i64 + 1,
                    time: Some(1_000 + i as i64),
                    text_clean: Some(format!("sample text number {i}")),
                    ..Default::default()
                })
                .await
                .unwrap();
        }
    }

    fn garden_deps(proposer: StaticProposer, embedder: FixedEmbedder) -> Deps {
        deps_with(
            MockItemClient::new(),
            MockSearchClient::new(),
            embedder,
            StaticSentiment::new(SentimentLabel::Neutral, 0.5, 0.1),
            proposer,
        )
    }

    #[tokio::test]
    async fn thin_sample_short_circuits() {
        let deps = garden_deps(
            StaticProposer::new(vec![proposal("Anything")]),
            FixedEmbedder::new(),
        );
        seed_sample(&deps, MIN_SAMPLE_TEXTS - 1).await;
        assert_eq!(run(&deps, 0).await.unwrap(), 0);
        assert!(deps.store.active_nodes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn provider_failure_aborts_without_touching_nodes() {
        let deps = garden_deps(StaticProposer::failing(), FixedEmbedder::new());
        seed_sample(&deps, MIN_SAMPLE_TEXTS).await;
        deps.store
            .upsert_node(&node("auto-keep", vec![1.0, 0.0]))
            .await
            .unwrap();

        assert_eq!(run(&deps, 0).await.unwrap(), 0);
        // The pre-existing node is untouched, not retired.
        let active = deps.store.active_nodes().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].status, NodeStatus::Active);
    }

    #[tokio::test]
    async fn merge_keeps_id_and_retires_the_unmatched() {
        let kept = proposal("Rust Borrow Checker Pain");
        let embedder = FixedEmbedder::new().with(&kept.anchor_text(), vec![1.0, 0.0, 0.0, 0.0]);
        let deps = garden_deps(StaticProposer::new(vec![kept.clone()]), embedder);
        seed_sample(&deps, MIN_SAMPLE_TEXTS).await;

        // One node near the proposal, one far from it.
        deps.store
            .upsert_node(&node("auto-near", vec![0.99, 0.1, 0.0, 0.0]))
            .await
            .unwrap();
        deps.store
            .upsert_node(&node("auto-off", vec![0.0, 0.0, 1.0, 0.0]))
            .await
            .unwrap();

        assert_eq!(run(&deps, 0).await.unwrap(), 1);

        let near = deps.store.node("auto-near").await.unwrap().unwrap();
        assert_eq!(near.status, NodeStatus::Active);
        assert_eq!(near.label, "Rust Borrow Checker Pain");
        assert_eq!(near.centroid, vec![1.0, 0.0, 0.0, 0.0]);
        assert_eq!(near.version, 2);

        // The unmatched node is retired exactly once, data intact.
        let off = deps.store.node("auto-off").await.unwrap().unwrap();
        assert_eq!(off.status, NodeStatus::Retired);
        assert_eq!(off.centroid, vec![0.0, 0.0, 1.0, 0.0]);

        let active = deps.store.active_nodes().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].node_id, "auto-near");
    }

    #[tokio::test]
    async fn unmatched_proposal_creates_a_fresh_node() {
        let novel = proposal("Quantum Error Correction Progress");
        let embedder = FixedEmbedder::new().with(&novel.anchor_text(), vec![0.0, 1.0, 0.0, 0.0]);
        let deps = garden_deps(StaticProposer::new(vec![novel]), embedder);
        seed_sample(&deps, MIN_SAMPLE_TEXTS).await;
        deps.store
            .upsert_node(&node("auto-old", vec![1.0, 0.0, 0.0, 0.0]))
            .await
            .unwrap();

        run(&deps, 0).await.unwrap();

        let active = deps.store.active_nodes().await.unwrap();
        assert_eq!(active.len(), 1);
        assert!(active[0].node_id.starts_with("auto-"));
        assert_ne!(active[0].node_id, "auto-old");
        assert_eq!(active[0].version, 1);
    }
}
