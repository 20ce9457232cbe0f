//! Core types for the Synapse graph engine.
//!
//! This crate defines the typed data model (nodes, edges, closed type
//! enums), identifiers, the error taxonomy, configuration, and the provider
//! traits injected into the retrieval components. It has no storage
//! dependency; everything here is plain data and pure computation.

pub mod config;
pub mod error;
pub mod id;
pub mod similarity;
pub mod types;
pub mod weights;

pub use config::SynapseConfig;
pub use error::{Result, SynapseError};
pub use id::SynapseId;
pub use similarity::{CosineSimilarity, SimilarityProvider};
pub use types::{
    Direction, EdgeType, GraphEdge, GraphNode, GraphStats, NewEdge, NewNode, NodeType, NodeUpdate,
    PropertyMap,
};
pub use weights::{AttentionWeights, StaticWeights, WeightProvider};

/// Re-export of commonly used items.
pub mod prelude {
    pub use crate::config::SynapseConfig;
    pub use crate::error::{Result, SynapseError};
    pub use crate::id::SynapseId;
    pub use crate::similarity::{CosineSimilarity, SimilarityProvider};
    pub use crate::types::*;
    pub use crate::weights::{AttentionWeights, StaticWeights, WeightProvider};
}
