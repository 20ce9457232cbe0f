//! Graph schema definition.
//!
//! Tables are schemaless; the Rust boundary validates shapes and closed
//! enums, and the store enforces only what it must: key uniqueness. The
//! `(node_type, name)` and `(source_id, target_id, edge_type)` unique
//! indexes back the find-or-create and ensure-edge race resolution.

/// SurrealQL schema for the graph store
pub const SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS nodes SCHEMALESS;
DEFINE TABLE IF NOT EXISTS edges SCHEMALESS;

DEFINE INDEX IF NOT EXISTS nodes_node_id ON nodes FIELDS node_id UNIQUE;
DEFINE INDEX IF NOT EXISTS nodes_type_name ON nodes FIELDS node_type, name UNIQUE;
DEFINE INDEX IF NOT EXISTS nodes_type ON nodes FIELDS node_type;

DEFINE INDEX IF NOT EXISTS edges_edge_id ON edges FIELDS edge_id UNIQUE;
DEFINE INDEX IF NOT EXISTS edges_endpoints_type ON edges FIELDS source_id, target_id, edge_type UNIQUE;
DEFINE INDEX IF NOT EXISTS edges_source ON edges FIELDS source_id;
DEFINE INDEX IF NOT EXISTS edges_target ON edges FIELDS target_id;
"#;

/// Initialize the graph schema
pub async fn init_schema(db: &surrealdb::Surreal<impl surrealdb::Connection>) -> synapse_core::error::Result<()> {
    tracing::debug!("initializing graph schema");

    db.query(SCHEMA)
        .await
        .map_err(|e| synapse_core::error::SynapseError::database(format!("schema initialization failed: {e}")))?
        .check()
        .map_err(|e| synapse_core::error::SynapseError::database(format!("schema initialization failed: {e}")))?;

    Ok(())
}
