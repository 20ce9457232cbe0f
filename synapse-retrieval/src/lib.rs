//! Retrieval layer of the Synapse graph engine.
//!
//! Three consumers of the graph store live here: spreading-activation
//! retrieval from seed nodes, embedding-similarity edge prediction with a
//! validated-pair reinforcement loop, and the hybrid query engine that
//! assembles ranked context for an LLM.

pub mod activation;
pub mod predictor;
pub mod query;

pub use activation::{ActivatedNode, ActivationSeed, SpreadingActivation};
pub use predictor::{
    EdgePredictor, MaterializeReport, MaterializeStatus, MaterializedPair, Prediction,
};
pub use query::{LexicalSeeds, QueryEngine, QueryResult, ScoredNode, SeedSelector};
