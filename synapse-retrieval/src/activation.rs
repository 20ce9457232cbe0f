//! Attention-weighted spreading activation.
//!
//! Activation starts at a set of seed nodes and propagates outward for up to
//! `max_hops` rounds. Each active node distributes `activation * decay`
//! across its neighbors according to a softmax over per-neighbor attention
//! scores, so the total a single source passes on in one hop never exceeds
//! its own activation times the decay factor.

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use synapse_core::config::ActivationSettings;
use synapse_core::error::Result;
use synapse_core::id::SynapseId;
use synapse_core::similarity::SimilarityProvider;
use synapse_core::types::{Direction, GraphNode};
use synapse_core::weights::WeightProvider;
use synapse_storage::GraphStore;
use tracing::debug;

/// A seed node with its query similarity from the upstream selection step.
#[derive(Debug, Clone, Copy)]
pub struct ActivationSeed {
    pub id: SynapseId,
    pub similarity: f32,
}

/// A node with its accumulated activation.
#[derive(Debug, Clone)]
pub struct ActivatedNode {
    pub node: GraphNode,
    pub activation: f32,
}

/// Spreading-activation retrieval over the graph store.
pub struct SpreadingActivation {
    store: Arc<GraphStore>,
    similarity: Arc<dyn SimilarityProvider>,
    weights: Arc<dyn WeightProvider>,
    settings: ActivationSettings,
}

impl SpreadingActivation {
    pub fn new(
        store: Arc<GraphStore>,
        similarity: Arc<dyn SimilarityProvider>,
        weights: Arc<dyn WeightProvider>,
        settings: ActivationSettings,
    ) -> Self {
        Self {
            store,
            similarity,
            weights,
            settings,
        }
    }

    /// Propagate activation from `seeds` and return the top-K activated
    /// nodes, highest first. `query_embedding` feeds the embedding-similarity
    /// attention signal; pass `None` to drop that signal. With
    /// `exclude_seeds` the original seeds are omitted from the result.
    pub async fn spread(
        &self,
        query_embedding: Option<&[f32]>,
        seeds: &[ActivationSeed],
        exclude_seeds: bool,
    ) -> Result<Vec<ActivatedNode>> {
        if seeds.is_empty() {
            return Ok(Vec::new());
        }

        let attention = self.weights.attention_weights();
        let now = Utc::now();

        let mut activation: HashMap<SynapseId, f32> = HashMap::new();
        for seed in seeds {
            activation.insert(seed.id, seed.similarity.max(0.1));
        }
        let seed_ids: HashSet<SynapseId> = seeds.iter().map(|s| s.id).collect();

        // Node payloads collected along the way, so the final ranking does
        // not need a second fetch for anything reached by propagation.
        let mut known: HashMap<SynapseId, GraphNode> = HashMap::new();
        let mut visited: HashSet<SynapseId> = HashSet::new();
        let mut frontier: Vec<SynapseId> = seeds.iter().map(|s| s.id).collect();

        for hop in 0..self.settings.max_hops {
            let mut touched: HashSet<SynapseId> = HashSet::new();

            for &source in &frontier {
                if !visited.insert(source) {
                    continue;
                }
                let source_activation = activation.get(&source).copied().unwrap_or(0.0);
                if source_activation < self.settings.threshold {
                    continue;
                }

                let neighbors = self
                    .store
                    .neighbors(source, Direction::Both, &[])
                    .await?;
                if neighbors.is_empty() {
                    continue;
                }

                let raw_scores: Vec<f32> = neighbors
                    .iter()
                    .map(|(edge, node)| {
                        let embedding_sim = match (query_embedding, node.embedding.as_deref()) {
                            (Some(query), Some(emb)) => self
                                .similarity
                                .similarity(query, emb)
                                .unwrap_or(0.0)
                                .max(0.0),
                            _ => 0.0,
                        };
                        let reference = node.last_accessed_at.unwrap_or(node.created_at);
                        let age_days =
                            (now - reference).num_seconds().max(0) as f64 / 86_400.0;
                        let recency = (-(std::f64::consts::LN_2) * age_days
                            / self.settings.half_life_days.max(f64::EPSILON))
                        .exp() as f32;
                        let access = ((1.0 + node.access_count as f64).ln()
                            / (1.0 + self.settings.access_norm as f64).ln())
                        .min(1.0) as f32;

                        attention.edge_weight * edge.weight
                            + attention.embedding_sim * embedding_sim
                            + attention.recency * recency
                            + attention.access * access
                    })
                    .collect();

                let shares = softmax(&raw_scores, self.settings.temperature);

                for ((_, node), share) in neighbors.into_iter().zip(shares) {
                    let contribution = source_activation * share * self.settings.decay;
                    let id = node.id;
                    known.entry(id).or_insert(node);
                    *activation.entry(id).or_insert(0.0) += contribution;
                    touched.insert(id);
                }
            }

            frontier = touched
                .into_iter()
                .filter(|id| !visited.contains(id))
                .filter(|id| activation.get(id).copied().unwrap_or(0.0) >= self.settings.threshold)
                .collect();

            debug!(
                hop,
                frontier = frontier.len(),
                activated = activation.len(),
                "activation round complete"
            );

            if frontier.is_empty() {
                break;
            }
        }

        // Seed payloads were never fetched if nothing propagated back to
        // them; fill in whatever the ranking still needs.
        let missing: Vec<SynapseId> = activation
            .keys()
            .filter(|id| !known.contains_key(*id))
            .copied()
            .collect();
        for node in self.store.fetch_nodes(&missing).await? {
            known.insert(node.id, node);
        }

        let mut results: Vec<ActivatedNode> = activation
            .into_iter()
            .filter(|(id, _)| !(exclude_seeds && seed_ids.contains(id)))
            .filter_map(|(id, activation)| {
                known.get(&id).cloned().map(|node| ActivatedNode { node, activation })
            })
            .collect();

        results.sort_by(|a, b| {
            b.activation
                .partial_cmp(&a.activation)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.node.name.cmp(&b.node.name))
        });
        results.truncate(self.settings.top_k);
        Ok(results)
    }
}

/// Temperature-scaled, numerically-stable softmax. An empty input yields an
/// empty distribution.
fn softmax(scores: &[f32], temperature: f32) -> Vec<f32> {
    if scores.is_empty() {
        return Vec::new();
    }
    let t = temperature.max(f32::EPSILON);
    let max = scores.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| ((s - max) / t).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}
