//! Embedding-similarity edge prediction with a reinforcement loop.
//!
//! Candidates come from a bounded sample of embedded nodes; cosine scoring
//! runs through the injected similarity provider. Pairs that the retrieval
//! caller reports as used-successfully-together accumulate a validated count
//! that boosts their future prediction scores.

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use synapse_core::config::PredictorSettings;
use synapse_core::error::Result;
use synapse_core::id::SynapseId;
use synapse_core::similarity::SimilarityProvider;
use synapse_core::types::{EdgeType, GraphNode, NewEdge};
use synapse_storage::GraphStore;
use tracing::{debug, info};

/// Provenance tag for edges created by the predictor.
const PREDICTOR_PROVENANCE: &str = "edge_predictor";

/// One predicted link from a source node.
#[derive(Debug, Clone)]
pub struct Prediction {
    pub node: GraphNode,
    pub similarity: f32,
}

/// What happened to one candidate pair during materialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterializeStatus {
    /// A new edge was created.
    Created,
    /// An edge between the pair already existed; nothing was written.
    Exists,
    /// Dry run: the edge would have been created.
    Planned,
}

/// Per-pair materialization record.
#[derive(Debug, Clone)]
pub struct MaterializedPair {
    pub source_id: SynapseId,
    pub target_id: SynapseId,
    pub similarity: f32,
    pub status: MaterializeStatus,
}

/// Outcome of a materialization run.
#[derive(Debug, Clone, Default)]
pub struct MaterializeReport {
    pub pairs: Vec<MaterializedPair>,
}

impl MaterializeReport {
    pub fn created(&self) -> usize {
        self.count(MaterializeStatus::Created)
    }

    pub fn existing(&self) -> usize {
        self.count(MaterializeStatus::Exists)
    }

    pub fn planned(&self) -> usize {
        self.count(MaterializeStatus::Planned)
    }

    fn count(&self, status: MaterializeStatus) -> usize {
        self.pairs.iter().filter(|p| p.status == status).count()
    }
}

/// k-NN edge prediction over node embeddings.
pub struct EdgePredictor {
    store: Arc<GraphStore>,
    similarity: Arc<dyn SimilarityProvider>,
    settings: PredictorSettings,
    /// Validated-pair counters keyed by the unordered id pair.
    validated: DashMap<(SynapseId, SynapseId), u32>,
}

impl EdgePredictor {
    pub fn new(
        store: Arc<GraphStore>,
        similarity: Arc<dyn SimilarityProvider>,
        settings: PredictorSettings,
    ) -> Self {
        Self {
            store,
            similarity,
            settings,
            validated: DashMap::new(),
        }
    }

    /// Predict up to `limit` likely edges from `node`. A node without an
    /// embedding yields no predictions; the node itself and anything already
    /// connected to it are never candidates.
    pub async fn predict_for(&self, node: &GraphNode, limit: usize) -> Result<Vec<Prediction>> {
        let candidates = self
            .store
            .nodes_with_embeddings(self.settings.candidate_sample)
            .await?;
        self.predict_against(node, &candidates, limit).await
    }

    /// Score `node` against an already-fetched candidate sample.
    async fn predict_against(
        &self,
        node: &GraphNode,
        candidates: &[GraphNode],
        limit: usize,
    ) -> Result<Vec<Prediction>> {
        let Some(embedding) = node.embedding.as_deref() else {
            debug!(node_id = %node.id, "node has no embedding, skipping prediction");
            return Ok(Vec::new());
        };

        let connected = self.store.adjacent_ids(node.id).await?;

        let eligible: Vec<&GraphNode> = candidates
            .iter()
            .filter(|c| c.id != node.id && !connected.contains(&c.id))
            .filter(|c| c.embedding.is_some())
            .collect();
        if eligible.is_empty() {
            return Ok(Vec::new());
        }

        let corpus: Vec<Vec<f32>> = eligible
            .iter()
            .filter_map(|c| c.embedding.clone())
            .collect();
        let similarities = self.similarity.batch_similarity(embedding, &corpus)?;

        let mut predictions: Vec<Prediction> = eligible
            .into_iter()
            .zip(similarities)
            .filter(|(_, sim)| *sim >= self.settings.min_similarity)
            .map(|(candidate, sim)| Prediction {
                similarity: self.boosted_similarity(node.id, candidate.id, sim),
                node: candidate.clone(),
            })
            .collect();

        predictions.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        predictions.truncate(limit);
        Ok(predictions)
    }

    /// Run prediction over every embedded node in the candidate sample,
    /// dropping nodes with no predictions.
    pub async fn predict_all(
        &self,
        limit_per_node: usize,
    ) -> Result<HashMap<SynapseId, Vec<Prediction>>> {
        let nodes = self
            .store
            .nodes_with_embeddings(self.settings.candidate_sample)
            .await?;

        let mut all = HashMap::new();
        for node in &nodes {
            let predictions = self.predict_against(node, &nodes, limit_per_node).await?;
            if !predictions.is_empty() {
                all.insert(node.id, predictions);
            }
        }
        Ok(all)
    }

    /// Materialize the strongest predictions as `relates_to` edges. The
    /// global candidate list is sorted by similarity descending and cut at
    /// `max_edges`; pairs already linked report `Exists` instead of creating
    /// a duplicate. With `dry_run` nothing is written.
    pub async fn materialize_predictions(&self, dry_run: bool) -> Result<MaterializeReport> {
        let all = self.predict_all(self.settings.max_edges).await?;

        let mut flattened: Vec<(SynapseId, SynapseId, f32)> = Vec::new();
        for (source, predictions) in all {
            for p in predictions {
                if p.similarity >= self.settings.materialize_threshold {
                    flattened.push((source, p.node.id, p.similarity));
                }
            }
        }
        flattened.sort_by(|a, b| {
            b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal)
        });

        // One candidate per unordered pair: the A->B and B->A predictions
        // describe the same link.
        let mut seen: std::collections::HashSet<(SynapseId, SynapseId)> =
            std::collections::HashSet::new();
        let mut report = MaterializeReport::default();

        for (source, target, similarity) in flattened {
            if report.pairs.len() >= self.settings.max_edges {
                break;
            }
            if !seen.insert(pair_key(source, target)) {
                continue;
            }

            let status = if self.store.are_connected(source, target).await? {
                MaterializeStatus::Exists
            } else if dry_run {
                MaterializeStatus::Planned
            } else {
                let weight = (self.settings.base_weight
                    + similarity * self.settings.weight_slope)
                    .clamp(0.0, 1.0);
                let draft = NewEdge::new(source, target, EdgeType::RelatesTo)
                    .with_weight(weight)
                    .with_confidence(similarity.clamp(0.0, 1.0))
                    .with_source(PREDICTOR_PROVENANCE);
                match self.store.create_edge(draft).await {
                    Ok(_) => MaterializeStatus::Created,
                    // A racing writer linked the pair first; that is success.
                    Err(e) if e.is_conflict() => MaterializeStatus::Exists,
                    Err(e) => return Err(e),
                }
            };

            report.pairs.push(MaterializedPair {
                source_id: source,
                target_id: target,
                similarity,
                status,
            });
        }

        info!(
            created = report.created(),
            existing = report.existing(),
            planned = report.planned(),
            dry_run,
            "materialization complete"
        );
        Ok(report)
    }

    /// Learning-outcome feed: nodes that were used successfully together
    /// reinforce each other pairwise. Failures are accepted but do not
    /// change the counters.
    pub fn record_outcome(&self, success: bool, node_ids: &[SynapseId]) {
        if !success {
            debug!(nodes = node_ids.len(), "ignoring unsuccessful outcome");
            return;
        }
        for (i, &a) in node_ids.iter().enumerate() {
            for &b in &node_ids[i + 1..] {
                if a == b {
                    continue;
                }
                *self.validated.entry(pair_key(a, b)).or_insert(0) += 1;
            }
        }
    }

    /// Current validated count for a pair, in either order.
    pub fn validated_count(&self, a: SynapseId, b: SynapseId) -> u32 {
        self.validated.get(&pair_key(a, b)).map(|c| *c).unwrap_or(0)
    }

    /// Similarity with the validated-pair boost applied:
    /// `boost_unit * log2(count + 1)`, capped so the result never exceeds
    /// the configured ceiling.
    fn boosted_similarity(&self, a: SynapseId, b: SynapseId, similarity: f32) -> f32 {
        let count = self.validated_count(a, b);
        if count == 0 {
            return similarity;
        }
        let boost = self.settings.boost_unit * ((count + 1) as f32).log2();
        (similarity + boost).min(self.settings.boost_cap)
    }
}

/// Order-insensitive pair key.
fn pair_key(a: SynapseId, b: SynapseId) -> (SynapseId, SynapseId) {
    if a <= b { (a, b) } else { (b, a) }
}
