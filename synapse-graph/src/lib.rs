//! Graph traversal and write batching for the Synapse engine.
//!
//! [`TraversalEngine`] provides cycle-safe BFS/DFS, path finding, ego graphs,
//! and the centrality heuristic. [`WriteCache`] is the single-writer batching
//! actor that turns per-item ingestion writes into bulk store writes.

pub mod cache;
pub mod traversal;

pub use cache::{CacheStats, FlushReport, WriteCache};
pub use traversal::{
    CentralityScore, EgoGraph, TraversalEngine, TraversalHit, TraversalOptions,
};
