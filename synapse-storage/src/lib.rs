//! Durable storage for the Synapse graph engine.
//!
//! Wraps SurrealDB behind a bounded connection pool and exposes the typed
//! [`GraphStore`] CRUD surface. Uniqueness of `(node_type, name)` and
//! `(source_id, target_id, edge_type)` is enforced by store-level unique
//! indexes; races resolve by conflict classification and re-read.

pub mod connection;
pub mod schema;
pub mod store;

pub use connection::{PoolOptions, RetryOptions, StoreConfig, StoreConnection, StorePool};
pub use store::{BatchReport, GraphStore};

use std::sync::Arc;
use synapse_core::error::Result;

/// Connect and build a store in one step.
pub async fn open_store(config: StoreConfig) -> Result<GraphStore> {
    let pool = Arc::new(StorePool::connect(config).await?);
    Ok(GraphStore::new(pool))
}
