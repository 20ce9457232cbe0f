//! Attention weight strategy for spreading activation.
//!
//! Weights are pulled from a provider so a learned strategy can replace the
//! static default without touching the activation math.

use serde::{Deserialize, Serialize};

/// Relative weights of the four attention signals. Expected to sum to 1.0;
/// the activation pass normalizes with softmax afterwards, so small drift is
/// harmless.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AttentionWeights {
    pub edge_weight: f32,
    pub embedding_sim: f32,
    pub recency: f32,
    pub access: f32,
}

impl Default for AttentionWeights {
    fn default() -> Self {
        Self {
            edge_weight: 0.4,
            embedding_sim: 0.3,
            recency: 0.2,
            access: 0.1,
        }
    }
}

/// Source of the current attention weights.
pub trait WeightProvider: Send + Sync {
    fn attention_weights(&self) -> AttentionWeights;
}

/// Fixed weights, the default strategy.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticWeights(pub AttentionWeights);

impl StaticWeights {
    pub fn new(weights: AttentionWeights) -> Self {
        Self(weights)
    }
}

impl WeightProvider for StaticWeights {
    fn attention_weights(&self) -> AttentionWeights {
        self.0
    }
}
