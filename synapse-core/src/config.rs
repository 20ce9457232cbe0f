//! Configuration for the Synapse graph engine.
//!
//! Every tunable in the engine has a serde default, so an empty TOML file (or
//! no file at all) yields a working configuration. Sections map one-to-one to
//! components: database, cache, activation, predictor, query.

use crate::error::{Result, SynapseError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SynapseConfig {
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub activation: ActivationSettings,
    #[serde(default)]
    pub predictor: PredictorSettings,
    #[serde(default)]
    pub query: QuerySettings,
}

impl SynapseConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&raw)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| SynapseError::config(format!("invalid config: {e}")))
    }
}

/// Durable store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// "memory" for the embedded engine, or a ws:// / http:// endpoint.
    pub endpoint: String,
    pub namespace: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Maximum pooled connections.
    pub max_connections: usize,
    /// Timeout for acquiring a pooled connection, in milliseconds.
    pub acquire_timeout_ms: u64,
    /// Retry attempts for retryable store failures.
    pub retry_attempts: u32,
    /// Initial retry backoff, in milliseconds.
    pub retry_backoff_ms: u64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            endpoint: "memory".to_string(),
            namespace: "synapse".to_string(),
            database: "graph".to_string(),
            username: None,
            password: None,
            max_connections: 8,
            acquire_timeout_ms: 5000,
            retry_attempts: 2,
            retry_backoff_ms: 50,
        }
    }
}

/// Write-through batching cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Combined pending node+edge count that triggers an automatic flush.
    pub batch_threshold: usize,
    /// Periodic flush interval, in milliseconds.
    pub flush_interval_ms: u64,
    /// Command channel capacity for the cache actor.
    pub channel_capacity: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            batch_threshold: 500,
            flush_interval_ms: 5000,
            channel_capacity: 1024,
        }
    }
}

/// Spreading-activation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationSettings {
    /// Maximum propagation rounds.
    pub max_hops: usize,
    /// Per-hop damping applied to propagated activation.
    pub decay: f32,
    /// Nodes below this activation drop out of the frontier.
    pub threshold: f32,
    /// Softmax temperature for attention distribution.
    pub temperature: f32,
    /// Recency half-life, in days.
    pub half_life_days: f64,
    /// Access count at which the frequency signal saturates at 1.0.
    pub access_norm: u64,
    /// Result set size.
    pub top_k: usize,
}

impl Default for ActivationSettings {
    fn default() -> Self {
        Self {
            max_hops: 3,
            decay: 0.7,
            threshold: 0.01,
            temperature: 1.0,
            half_life_days: 7.0,
            access_norm: 100,
            top_k: 20,
        }
    }
}

/// Edge-prediction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictorSettings {
    /// Minimum cosine similarity for a candidate prediction.
    pub min_similarity: f32,
    /// Minimum similarity for materializing a predicted edge.
    pub materialize_threshold: f32,
    /// Global cap on edges created per materialization run.
    pub max_edges: usize,
    /// Bounded candidate sample size for k-NN scoring.
    pub candidate_sample: usize,
    /// Base weight for materialized edges.
    pub base_weight: f32,
    /// Similarity multiplier added on top of the base weight.
    pub weight_slope: f32,
    /// Per-log2-count boost for validated pairs.
    pub boost_unit: f32,
    /// Boosted similarity never exceeds this cap.
    pub boost_cap: f32,
}

impl Default for PredictorSettings {
    fn default() -> Self {
        Self {
            min_similarity: 0.7,
            materialize_threshold: 0.8,
            max_edges: 50,
            candidate_sample: 500,
            base_weight: 0.2,
            weight_slope: 0.3,
            boost_unit: 0.02,
            boost_cap: 0.99,
        }
    }
}

/// Query-engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuerySettings {
    /// BFS expansion depth from seed nodes.
    pub max_hops: usize,
    /// Exponential depth decay applied to expansion scores.
    pub depth_decay: f32,
    /// Result set size.
    pub top_k: usize,
    /// Maximum seed nodes taken from the selector.
    pub seed_limit: usize,
    /// Blend weight for the expansion/activation component.
    pub expansion_weight: f32,
    /// Blend weight for the lexical component.
    pub lexical_weight: f32,
    /// Blend weight for the static type-importance component.
    pub type_weight: f32,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            max_hops: 2,
            depth_decay: 0.7,
            top_k: 10,
            seed_limit: 8,
            expansion_weight: 0.4,
            lexical_weight: 0.4,
            type_weight: 0.2,
        }
    }
}
