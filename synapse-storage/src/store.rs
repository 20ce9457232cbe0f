//! Typed node/edge CRUD against the durable store.
//!
//! Every query is parametrized with `.bind()`; user-supplied patterns and
//! identifiers never reach the query text. Uniqueness races on
//! `(node_type, name)` and `(source_id, target_id, edge_type)` are resolved
//! by classifying the store's unique-index violation as a retryable conflict
//! and re-reading the winner.

use crate::connection::StorePool;
use chrono::Utc;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::future::{Future, IntoFuture};
use std::sync::Arc;
use std::time::Duration;
use synapse_core::error::{Result, SynapseError};
use synapse_core::id::SynapseId;
use synapse_core::types::{
    Direction, EdgeType, GraphEdge, GraphNode, GraphStats, NewEdge, NewNode, NodeType, NodeUpdate,
};
use tracing::{debug, info, warn};

/// Chunk size for batch inserts.
const BATCH_CHUNK: usize = 100;

/// Attempt cap for conflict-resolution loops.
const CONFLICT_RETRIES: u32 = 4;

/// Outcome of a batch insert: duplicates are skipped, never errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub inserted: usize,
    pub skipped: usize,
}

#[derive(Debug, Deserialize)]
struct NodeKeyRow {
    node_type: NodeType,
    name: String,
}

#[derive(Debug, Deserialize)]
struct EdgeKeyRow {
    source_id: SynapseId,
    target_id: SynapseId,
    edge_type: EdgeType,
}

#[derive(Debug, Deserialize)]
struct EndpointRow {
    source_id: SynapseId,
    target_id: SynapseId,
}

#[derive(Debug, Deserialize)]
struct WeightSumRow {
    target_id: SynapseId,
    total: f64,
}

#[derive(Debug, Deserialize)]
struct NodeTypeCountRow {
    node_type: String,
    total: u64,
}

#[derive(Debug, Deserialize)]
struct EdgeTypeCountRow {
    edge_type: String,
    total: u64,
}

/// Graph store over a pooled SurrealDB connection.
pub struct GraphStore {
    pool: Arc<StorePool>,
    query_timeout: Duration,
}

impl GraphStore {
    pub fn new(pool: Arc<StorePool>) -> Self {
        Self {
            pool,
            query_timeout: Duration::from_secs(10),
        }
    }

    /// Override the per-round-trip timeout.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub fn pool(&self) -> &Arc<StorePool> {
        &self.pool
    }

    /// Run one store round trip, bounded by the query timeout.
    async fn execute<F>(&self, query: F) -> Result<surrealdb::Response>
    where
        F: IntoFuture<Output = surrealdb::Result<surrealdb::Response>>,
    {
        tokio::time::timeout(self.query_timeout, query.into_future())
            .await
            .map_err(|_| SynapseError::timeout("store round trip"))?
            .map_err(|e| SynapseError::from_db_message(e.to_string()))
    }

    /// Run a write round trip and surface per-statement errors.
    async fn execute_checked<F>(&self, query: F) -> Result<surrealdb::Response>
    where
        F: IntoFuture<Output = surrealdb::Result<surrealdb::Response>>,
    {
        self.execute(query)
            .await?
            .check()
            .map_err(|e| SynapseError::from_db_message(e.to_string()))
    }

    /// Retry a write that can lose a storage-level commit race.
    async fn retry_conflict<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Err(e) if e.is_conflict() && attempt < CONFLICT_RETRIES => {
                    attempt += 1;
                    tokio::time::sleep(Duration::from_millis(5 * attempt as u64)).await;
                }
                other => return other,
            }
        }
    }

    fn take_rows<T: serde::de::DeserializeOwned>(
        res: &mut surrealdb::Response,
        idx: usize,
    ) -> Result<Vec<T>> {
        res.take(idx)
            .map_err(|e| SynapseError::database(e.to_string()))
    }

    // ========================================================================
    // Node operations
    // ========================================================================

    /// Insert a new node. Fails with `Conflict` when `(node_type, name)`
    /// already exists.
    pub async fn create_node(&self, draft: NewNode) -> Result<GraphNode> {
        draft.validate()?;
        let node = Self::node_from_draft(draft);
        debug!(node_id = %node.id, node_type = %node.node_type, name = %node.name, "creating node");

        self.create_node_row(&node).await?;
        Ok(node)
    }

    async fn create_node_row(&self, node: &GraphNode) -> Result<()> {
        let conn = self.pool.acquire().await?;
        self.execute_checked(
            conn.connection()
                .query("CREATE nodes CONTENT $node")
                .bind(("node", node.clone())),
        )
        .await?;
        Ok(())
    }

    /// Return the node with this `(node_type, name)`, creating it when
    /// absent. Concurrent callers racing on the same key converge on one
    /// stored row; the losers re-read the winner.
    pub async fn find_or_create_node(&self, draft: NewNode) -> Result<GraphNode> {
        draft.validate()?;

        let mut attempt = 0;
        loop {
            if let Some(existing) = self.get_node(draft.node_type, &draft.name).await? {
                return Ok(existing);
            }

            match self.create_node(draft.clone()).await {
                Ok(node) => return Ok(node),
                Err(e) if e.is_conflict() && attempt < CONFLICT_RETRIES => {
                    // Another caller won the insert; loop re-reads it.
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Look up a node by its unique `(node_type, name)` key.
    pub async fn get_node(&self, node_type: NodeType, name: &str) -> Result<Option<GraphNode>> {
        let conn = self.pool.acquire().await?;
        let mut res = self
            .execute(
                conn.connection()
                    .query("SELECT * FROM nodes WHERE node_type = $node_type AND name = $name LIMIT 1")
                    .bind(("node_type", node_type))
                    .bind(("name", name.to_string())),
            )
            .await?;

        let rows: Vec<GraphNode> = Self::take_rows(&mut res, 0)?;
        Ok(rows.into_iter().next())
    }

    pub async fn get_node_by_id(&self, id: SynapseId) -> Result<Option<GraphNode>> {
        let conn = self.pool.acquire().await?;
        let mut res = self
            .execute(
                conn.connection()
                    .query("SELECT * FROM nodes WHERE node_id = $id LIMIT 1")
                    .bind(("id", id)),
            )
            .await?;

        let rows: Vec<GraphNode> = Self::take_rows(&mut res, 0)?;
        Ok(rows.into_iter().next())
    }

    /// Fetch a set of nodes by id. Unknown ids are silently absent.
    pub async fn fetch_nodes(&self, ids: &[SynapseId]) -> Result<Vec<GraphNode>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.pool.acquire().await?;
        let mut res = self
            .execute(
                conn.connection()
                    .query("SELECT * FROM nodes WHERE node_id INSIDE $ids")
                    .bind(("ids", ids.to_vec())),
            )
            .await?;

        Self::take_rows(&mut res, 0)
    }

    /// Case-insensitive substring search over node names and descriptions,
    /// optionally restricted to a type set. The pattern is always a bound
    /// parameter.
    pub async fn search_nodes(
        &self,
        pattern: &str,
        types: &[NodeType],
        limit: usize,
    ) -> Result<Vec<GraphNode>> {
        let pattern = pattern.to_lowercase();
        if pattern.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.pool.acquire().await?;
        let mut res = if types.is_empty() {
            self.execute(
                conn.connection()
                    .query(
                        "SELECT * FROM nodes WHERE \
                         (string::contains(string::lowercase(name), $pattern) \
                          OR string::contains(string::lowercase(description ?? ''), $pattern)) \
                         ORDER BY name ASC LIMIT $limit",
                    )
                    .bind(("pattern", pattern))
                    .bind(("limit", limit)),
            )
            .await?
        } else {
            self.execute(
                conn.connection()
                    .query(
                        "SELECT * FROM nodes WHERE \
                         (string::contains(string::lowercase(name), $pattern) \
                          OR string::contains(string::lowercase(description ?? ''), $pattern)) \
                         AND node_type INSIDE $types \
                         ORDER BY name ASC LIMIT $limit",
                    )
                    .bind(("pattern", pattern))
                    .bind(("types", types.to_vec()))
                    .bind(("limit", limit)),
            )
            .await?
        };

        Self::take_rows(&mut res, 0)
    }

    /// List nodes, optionally restricted to a type set.
    pub async fn list_nodes(&self, types: &[NodeType], limit: usize) -> Result<Vec<GraphNode>> {
        let conn = self.pool.acquire().await?;
        let mut res = if types.is_empty() {
            self.execute(
                conn.connection()
                    .query("SELECT * FROM nodes ORDER BY name ASC LIMIT $limit")
                    .bind(("limit", limit)),
            )
            .await?
        } else {
            self.execute(
                conn.connection()
                    .query(
                        "SELECT * FROM nodes WHERE node_type INSIDE $types \
                         ORDER BY name ASC LIMIT $limit",
                    )
                    .bind(("types", types.to_vec()))
                    .bind(("limit", limit)),
            )
            .await?
        };

        Self::take_rows(&mut res, 0)
    }

    /// Nodes carrying an embedding vector, up to `limit`. Candidate sample
    /// for the edge predictor.
    pub async fn nodes_with_embeddings(&self, limit: usize) -> Result<Vec<GraphNode>> {
        let conn = self.pool.acquire().await?;
        let mut res = self
            .execute(
                conn.connection()
                    .query("SELECT * FROM nodes WHERE !!embedding LIMIT $limit")
                    .bind(("limit", limit)),
            )
            .await?;

        Self::take_rows(&mut res, 0)
    }

    /// Apply a partial update. Properties merge key-by-key; description and
    /// embedding replace the stored value when present.
    pub async fn update_node(&self, id: SynapseId, update: NodeUpdate) -> Result<GraphNode> {
        let current = self
            .get_node_by_id(id)
            .await?
            .ok_or_else(|| SynapseError::not_found("node", id.to_string()))?;

        let mut properties = current.properties;
        if let Some(patch) = update.properties {
            properties.extend(patch);
        }
        let description = update.description.or(current.description);
        let embedding = update.embedding.or(current.embedding);

        let conn = self.pool.acquire().await?;
        let mut res = self
            .retry_conflict(|| {
                self.execute_checked(
                    conn.connection()
                        .query(
                            "UPDATE nodes SET properties = $properties, \
                             description = $description, embedding = $embedding \
                             WHERE node_id = $id",
                        )
                        .bind(("properties", properties.clone()))
                        .bind(("description", description.clone()))
                        .bind(("embedding", embedding.clone()))
                        .bind(("id", id)),
                )
            })
            .await?;

        let rows: Vec<GraphNode> = Self::take_rows(&mut res, 0)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| SynapseError::not_found("node", id.to_string()))
    }

    /// Delete a node and every edge touching it.
    pub async fn delete_node(&self, id: SynapseId) -> Result<()> {
        self.get_node_by_id(id)
            .await?
            .ok_or_else(|| SynapseError::not_found("node", id.to_string()))?;

        info!(node_id = %id, "deleting node and incident edges");

        let conn = self.pool.acquire().await?;
        self.retry_conflict(|| {
            self.execute_checked(
                conn.connection()
                    .query(
                        "DELETE edges WHERE source_id = $id OR target_id = $id; \
                         DELETE nodes WHERE node_id = $id",
                    )
                    .bind(("id", id)),
            )
        })
        .await?;

        Ok(())
    }

    /// Atomically bump the access counter and stamp the access time. Safe
    /// under concurrent callers: the increment is a single store statement,
    /// retried when the storage engine reports a commit race.
    pub async fn track_access(&self, id: SynapseId) -> Result<()> {
        let conn = self.pool.acquire().await?;
        let now = Utc::now();

        let mut res = self
            .retry_conflict(|| {
                self.execute_checked(
                    conn.connection()
                        .query(
                            "UPDATE nodes SET access_count += 1, last_accessed_at = $now \
                             WHERE node_id = $id",
                        )
                        .bind(("now", now))
                        .bind(("id", id)),
                )
            })
            .await?;

        let rows: Vec<GraphNode> = Self::take_rows(&mut res, 0)?;
        if rows.is_empty() {
            return Err(SynapseError::not_found("node", id.to_string()));
        }
        Ok(())
    }

    // ========================================================================
    // Edge operations
    // ========================================================================

    /// Insert a new edge. Fails with `Conflict` when
    /// `(source_id, target_id, edge_type)` already exists.
    pub async fn create_edge(&self, draft: NewEdge) -> Result<GraphEdge> {
        draft.validate()?;
        let edge = Self::edge_from_draft(draft);
        debug!(
            edge_id = %edge.id,
            source = %edge.source_id,
            target = %edge.target_id,
            edge_type = %edge.edge_type,
            "creating edge"
        );

        self.create_edge_row(&edge).await?;
        Ok(edge)
    }

    async fn create_edge_row(&self, edge: &GraphEdge) -> Result<()> {
        let conn = self.pool.acquire().await?;
        self.execute_checked(
            conn.connection()
                .query("CREATE edges CONTENT $edge")
                .bind(("edge", edge.clone())),
        )
        .await?;
        Ok(())
    }

    /// Idempotent edge creation: an existing `(source, target, type)` edge is
    /// returned unchanged (first write wins), otherwise the draft is stored.
    pub async fn ensure_edge(&self, draft: NewEdge) -> Result<GraphEdge> {
        draft.validate()?;

        let mut attempt = 0;
        loop {
            if let Some(existing) = self
                .get_edge_between(draft.source_id, draft.target_id, draft.edge_type)
                .await?
            {
                return Ok(existing);
            }

            match self.create_edge(draft.clone()).await {
                Ok(edge) => return Ok(edge),
                Err(e) if e.is_conflict() && attempt < CONFLICT_RETRIES => {
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn get_edge(&self, id: SynapseId) -> Result<Option<GraphEdge>> {
        let conn = self.pool.acquire().await?;
        let mut res = self
            .execute(
                conn.connection()
                    .query("SELECT * FROM edges WHERE edge_id = $id LIMIT 1")
                    .bind(("id", id)),
            )
            .await?;

        let rows: Vec<GraphEdge> = Self::take_rows(&mut res, 0)?;
        Ok(rows.into_iter().next())
    }

    pub async fn get_edge_between(
        &self,
        source_id: SynapseId,
        target_id: SynapseId,
        edge_type: EdgeType,
    ) -> Result<Option<GraphEdge>> {
        let conn = self.pool.acquire().await?;
        let mut res = self
            .execute(
                conn.connection()
                    .query(
                        "SELECT * FROM edges WHERE source_id = $source AND \
                         target_id = $target AND edge_type = $edge_type LIMIT 1",
                    )
                    .bind(("source", source_id))
                    .bind(("target", target_id))
                    .bind(("edge_type", edge_type)),
            )
            .await?;

        let rows: Vec<GraphEdge> = Self::take_rows(&mut res, 0)?;
        Ok(rows.into_iter().next())
    }

    /// Edges leaving `id`, optionally type-filtered, heaviest first.
    pub async fn outgoing_edges(
        &self,
        id: SynapseId,
        types: &[EdgeType],
    ) -> Result<Vec<GraphEdge>> {
        self.edges_for(id, Direction::Outgoing, types).await
    }

    /// Edges arriving at `id`, optionally type-filtered, heaviest first.
    pub async fn incoming_edges(
        &self,
        id: SynapseId,
        types: &[EdgeType],
    ) -> Result<Vec<GraphEdge>> {
        self.edges_for(id, Direction::Incoming, types).await
    }

    /// Edges incident to `id` in the given direction, heaviest first.
    pub async fn edges_for(
        &self,
        id: SynapseId,
        direction: Direction,
        types: &[EdgeType],
    ) -> Result<Vec<GraphEdge>> {
        let clause = match direction {
            Direction::Outgoing => "source_id = $id",
            Direction::Incoming => "target_id = $id",
            Direction::Both => "(source_id = $id OR target_id = $id)",
        };

        let conn = self.pool.acquire().await?;
        let mut res = if types.is_empty() {
            self.execute(
                conn.connection()
                    .query(format!(
                        "SELECT * FROM edges WHERE {clause} ORDER BY weight DESC"
                    ))
                    .bind(("id", id)),
            )
            .await?
        } else {
            self.execute(
                conn.connection()
                    .query(format!(
                        "SELECT * FROM edges WHERE {clause} AND edge_type INSIDE $types \
                         ORDER BY weight DESC"
                    ))
                    .bind(("id", id))
                    .bind(("types", types.to_vec())),
            )
            .await?
        };

        Self::take_rows(&mut res, 0)
    }

    /// Incident edges paired with the node at the far endpoint, preserving
    /// the weight-descending edge order. Edges whose far endpoint is missing
    /// are skipped.
    pub async fn neighbors(
        &self,
        id: SynapseId,
        direction: Direction,
        types: &[EdgeType],
    ) -> Result<Vec<(GraphEdge, GraphNode)>> {
        let edges = self.edges_for(id, direction, types).await?;
        if edges.is_empty() {
            return Ok(Vec::new());
        }

        let other_ids: Vec<SynapseId> = edges
            .iter()
            .map(|e| if e.source_id == id { e.target_id } else { e.source_id })
            .collect();
        let nodes = self.fetch_nodes(&other_ids).await?;
        let by_id: HashMap<SynapseId, GraphNode> =
            nodes.into_iter().map(|n| (n.id, n)).collect();

        Ok(edges
            .into_iter()
            .filter_map(|e| {
                let other = if e.source_id == id { e.target_id } else { e.source_id };
                by_id.get(&other).cloned().map(|n| (e, n))
            })
            .collect())
    }

    /// Ids of every node sharing an edge with `id`, in either direction.
    pub async fn adjacent_ids(&self, id: SynapseId) -> Result<HashSet<SynapseId>> {
        let conn = self.pool.acquire().await?;
        let mut res = self
            .execute(
                conn.connection()
                    .query(
                        "SELECT source_id, target_id FROM edges \
                         WHERE source_id = $id OR target_id = $id",
                    )
                    .bind(("id", id)),
            )
            .await?;

        let rows: Vec<EndpointRow> = Self::take_rows(&mut res, 0)?;
        Ok(rows
            .into_iter()
            .map(|row| {
                if row.source_id == id {
                    row.target_id
                } else {
                    row.source_id
                }
            })
            .collect())
    }

    /// Whether any edge of any type links `a` and `b`, in either direction.
    pub async fn are_connected(&self, a: SynapseId, b: SynapseId) -> Result<bool> {
        let conn = self.pool.acquire().await?;
        let mut res = self
            .execute(
                conn.connection()
                    .query(
                        "SELECT edge_id FROM edges WHERE \
                         (source_id = $a AND target_id = $b) OR \
                         (source_id = $b AND target_id = $a) LIMIT 1",
                    )
                    .bind(("a", a))
                    .bind(("b", b)),
            )
            .await?;

        #[derive(Deserialize)]
        struct IdRow {
            #[allow(dead_code)]
            edge_id: SynapseId,
        }
        let rows: Vec<IdRow> = Self::take_rows(&mut res, 0)?;
        Ok(!rows.is_empty())
    }

    pub async fn update_edge_weight(&self, id: SynapseId, weight: f32) -> Result<GraphEdge> {
        if !(0.0..=1.0).contains(&weight) {
            return Err(SynapseError::validation(format!(
                "edge weight out of range [0, 1]: {weight}"
            )));
        }

        let conn = self.pool.acquire().await?;
        let mut res = self
            .retry_conflict(|| {
                self.execute_checked(
                    conn.connection()
                        .query("UPDATE edges SET weight = $weight WHERE edge_id = $id")
                        .bind(("weight", weight))
                        .bind(("id", id)),
                )
            })
            .await?;

        let rows: Vec<GraphEdge> = Self::take_rows(&mut res, 0)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| SynapseError::not_found("edge", id.to_string()))
    }

    /// Atomic access bump for an edge; see [`GraphStore::track_access`].
    pub async fn track_edge_access(&self, id: SynapseId) -> Result<()> {
        let conn = self.pool.acquire().await?;
        let now = Utc::now();

        let mut res = self
            .retry_conflict(|| {
                self.execute_checked(
                    conn.connection()
                        .query(
                            "UPDATE edges SET access_count += 1, last_accessed_at = $now \
                             WHERE edge_id = $id",
                        )
                        .bind(("now", now))
                        .bind(("id", id)),
                )
            })
            .await?;

        let rows: Vec<GraphEdge> = Self::take_rows(&mut res, 0)?;
        if rows.is_empty() {
            return Err(SynapseError::not_found("edge", id.to_string()));
        }
        Ok(())
    }

    pub async fn delete_edge(&self, id: SynapseId) -> Result<()> {
        self.get_edge(id)
            .await?
            .ok_or_else(|| SynapseError::not_found("edge", id.to_string()))?;

        let conn = self.pool.acquire().await?;
        self.retry_conflict(|| {
            self.execute_checked(
                conn.connection()
                    .query("DELETE edges WHERE edge_id = $id")
                    .bind(("id", id)),
            )
        })
        .await?;

        Ok(())
    }

    /// Every edge whose endpoints are both in `ids`.
    pub async fn edges_among(&self, ids: &[SynapseId]) -> Result<Vec<GraphEdge>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.pool.acquire().await?;
        let mut res = self
            .execute(
                conn.connection()
                    .query(
                        "SELECT * FROM edges WHERE source_id INSIDE $ids \
                         AND target_id INSIDE $ids ORDER BY weight DESC",
                    )
                    .bind(("ids", ids.to_vec())),
            )
            .await?;

        Self::take_rows(&mut res, 0)
    }

    /// Sum of incoming edge weights per target node, for centrality scoring.
    pub async fn incoming_weight_sums(&self) -> Result<HashMap<SynapseId, f64>> {
        let conn = self.pool.acquire().await?;
        let mut res = self
            .execute(
                conn.connection().query(
                    "SELECT target_id, math::sum(weight) AS total FROM edges GROUP BY target_id",
                ),
            )
            .await?;

        let rows: Vec<WeightSumRow> = Self::take_rows(&mut res, 0)?;
        Ok(rows.into_iter().map(|r| (r.target_id, r.total)).collect())
    }

    // ========================================================================
    // Batch operations
    // ========================================================================

    /// Bulk node insert. Keys already present (in the store or repeated in
    /// the batch) are skipped, not errors.
    pub async fn batch_create_nodes(&self, drafts: Vec<NewNode>) -> Result<BatchReport> {
        for draft in &drafts {
            draft.validate()?;
        }
        let rows = drafts.into_iter().map(Self::node_from_draft).collect();
        self.insert_node_rows(rows).await
    }

    /// Bulk edge insert; same duplicate semantics as
    /// [`GraphStore::batch_create_nodes`].
    pub async fn batch_create_edges(&self, drafts: Vec<NewEdge>) -> Result<BatchReport> {
        for draft in &drafts {
            draft.validate()?;
        }
        let rows = drafts.into_iter().map(Self::edge_from_draft).collect();
        self.insert_edge_rows(rows).await
    }

    /// Insert fully-materialized node rows, preserving their ids. Rows whose
    /// `(node_type, name)` key already exists are skipped. The write cache
    /// flushes through this path so staged ids survive into the store.
    pub async fn insert_node_rows(&self, rows: Vec<GraphNode>) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        let mut seen: HashSet<(NodeType, String)> = HashSet::new();
        let mut unique = Vec::with_capacity(rows.len());
        for row in rows {
            if seen.insert((row.node_type, row.name.clone())) {
                unique.push(row);
            } else {
                report.skipped += 1;
            }
        }

        for chunk in unique.chunks(BATCH_CHUNK) {
            let types: Vec<NodeType> = chunk.iter().map(|r| r.node_type).collect();
            let names: Vec<String> = chunk.iter().map(|r| r.name.clone()).collect();

            let conn = self.pool.acquire().await?;
            let mut res = self
                .execute(
                    conn.connection()
                        .query(
                            "SELECT node_type, name FROM nodes \
                             WHERE node_type INSIDE $types AND name INSIDE $names",
                        )
                        .bind(("types", types))
                        .bind(("names", names)),
                )
                .await?;
            let existing: HashSet<(NodeType, String)> =
                Self::take_rows::<NodeKeyRow>(&mut res, 0)?
                    .into_iter()
                    .map(|row| (row.node_type, row.name))
                    .collect();
            drop(conn);

            let fresh: Vec<GraphNode> = chunk
                .iter()
                .filter(|r| !existing.contains(&(r.node_type, r.name.clone())))
                .cloned()
                .collect();
            report.skipped += chunk.len() - fresh.len();

            if fresh.is_empty() {
                continue;
            }

            let conn = self.pool.acquire().await?;
            match self
                .execute_checked(
                    conn.connection()
                        .query("INSERT INTO nodes $batch")
                        .bind(("batch", fresh.clone())),
                )
                .await
            {
                Ok(_) => report.inserted += fresh.len(),
                Err(e) if e.is_conflict() => {
                    // A racer inserted one of our keys between the pre-read
                    // and the insert; fall back to per-item writes.
                    warn!("batch node insert hit a racing duplicate, downgrading to per-item");
                    drop(conn);
                    for row in fresh {
                        if self.get_node(row.node_type, &row.name).await?.is_some() {
                            report.skipped += 1;
                            continue;
                        }
                        match self.create_node_row(&row).await {
                            Ok(()) => report.inserted += 1,
                            Err(e) if e.is_conflict() => report.skipped += 1,
                            Err(e) => return Err(e),
                        }
                    }
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            inserted = report.inserted,
            skipped = report.skipped,
            "batch node insert complete"
        );
        Ok(report)
    }

    /// Insert fully-materialized edge rows, preserving their ids. Rows whose
    /// `(source_id, target_id, edge_type)` key already exists are skipped.
    pub async fn insert_edge_rows(&self, rows: Vec<GraphEdge>) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        let mut seen: HashSet<(SynapseId, SynapseId, EdgeType)> = HashSet::new();
        let mut unique = Vec::with_capacity(rows.len());
        for row in rows {
            if seen.insert((row.source_id, row.target_id, row.edge_type)) {
                unique.push(row);
            } else {
                report.skipped += 1;
            }
        }

        for chunk in unique.chunks(BATCH_CHUNK) {
            let sources: Vec<SynapseId> = chunk.iter().map(|r| r.source_id).collect();
            let targets: Vec<SynapseId> = chunk.iter().map(|r| r.target_id).collect();

            let conn = self.pool.acquire().await?;
            let mut res = self
                .execute(
                    conn.connection()
                        .query(
                            "SELECT source_id, target_id, edge_type FROM edges \
                             WHERE source_id INSIDE $sources AND target_id INSIDE $targets",
                        )
                        .bind(("sources", sources))
                        .bind(("targets", targets)),
                )
                .await?;
            let existing: HashSet<(SynapseId, SynapseId, EdgeType)> =
                Self::take_rows::<EdgeKeyRow>(&mut res, 0)?
                    .into_iter()
                    .map(|row| (row.source_id, row.target_id, row.edge_type))
                    .collect();
            drop(conn);

            let fresh: Vec<GraphEdge> = chunk
                .iter()
                .filter(|r| !existing.contains(&(r.source_id, r.target_id, r.edge_type)))
                .cloned()
                .collect();
            report.skipped += chunk.len() - fresh.len();

            if fresh.is_empty() {
                continue;
            }

            let conn = self.pool.acquire().await?;
            match self
                .execute_checked(
                    conn.connection()
                        .query("INSERT INTO edges $batch")
                        .bind(("batch", fresh.clone())),
                )
                .await
            {
                Ok(_) => report.inserted += fresh.len(),
                Err(e) if e.is_conflict() => {
                    warn!("batch edge insert hit a racing duplicate, downgrading to per-item");
                    drop(conn);
                    for row in fresh {
                        if self
                            .get_edge_between(row.source_id, row.target_id, row.edge_type)
                            .await?
                            .is_some()
                        {
                            report.skipped += 1;
                            continue;
                        }
                        match self.create_edge_row(&row).await {
                            Ok(()) => report.inserted += 1,
                            Err(e) if e.is_conflict() => report.skipped += 1,
                            Err(e) => return Err(e),
                        }
                    }
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            inserted = report.inserted,
            skipped = report.skipped,
            "batch edge insert complete"
        );
        Ok(report)
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    pub async fn count_nodes(&self) -> Result<u64> {
        let conn = self.pool.acquire().await?;
        let mut res = self
            .execute(
                conn.connection()
                    .query("SELECT count() AS total FROM nodes GROUP ALL"),
            )
            .await?;

        #[derive(Deserialize)]
        struct CountRow {
            total: u64,
        }
        let rows: Vec<CountRow> = Self::take_rows(&mut res, 0)?;
        Ok(rows.first().map(|r| r.total).unwrap_or(0))
    }

    pub async fn count_edges(&self) -> Result<u64> {
        let conn = self.pool.acquire().await?;
        let mut res = self
            .execute(
                conn.connection()
                    .query("SELECT count() AS total FROM edges GROUP ALL"),
            )
            .await?;

        #[derive(Deserialize)]
        struct CountRow {
            total: u64,
        }
        let rows: Vec<CountRow> = Self::take_rows(&mut res, 0)?;
        Ok(rows.first().map(|r| r.total).unwrap_or(0))
    }

    /// Aggregate counts by type plus average edges per node.
    pub async fn stats(&self) -> Result<GraphStats> {
        let conn = self.pool.acquire().await?;
        let mut res = self
            .execute(
                conn.connection().query(
                    "SELECT node_type, count() AS total FROM nodes GROUP BY node_type; \
                     SELECT edge_type, count() AS total FROM edges GROUP BY edge_type",
                ),
            )
            .await?;

        let node_rows: Vec<NodeTypeCountRow> = Self::take_rows(&mut res, 0)?;
        let edge_rows: Vec<EdgeTypeCountRow> = Self::take_rows(&mut res, 1)?;

        let nodes_by_type: HashMap<String, u64> = node_rows
            .into_iter()
            .map(|r| (r.node_type, r.total))
            .collect();
        let edges_by_type: HashMap<String, u64> = edge_rows
            .into_iter()
            .map(|r| (r.edge_type, r.total))
            .collect();

        let node_count: u64 = nodes_by_type.values().sum();
        let edge_count: u64 = edges_by_type.values().sum();
        let avg_edges_per_node = if node_count == 0 {
            0.0
        } else {
            edge_count as f64 / node_count as f64
        };

        Ok(GraphStats {
            node_count,
            edge_count,
            nodes_by_type,
            edges_by_type,
            avg_edges_per_node,
        })
    }

    // ========================================================================
    // Draft materialization
    // ========================================================================

    fn node_from_draft(draft: NewNode) -> GraphNode {
        GraphNode {
            id: SynapseId::new(),
            node_type: draft.node_type,
            name: draft.name,
            properties: draft.properties,
            embedding: draft.embedding,
            description: draft.description,
            access_count: 0,
            last_accessed_at: None,
            created_at: Utc::now(),
        }
    }

    fn edge_from_draft(draft: NewEdge) -> GraphEdge {
        GraphEdge {
            id: SynapseId::new(),
            source_id: draft.source_id,
            target_id: draft.target_id,
            edge_type: draft.edge_type,
            weight: draft.weight,
            confidence: draft.confidence,
            properties: draft.properties,
            source: draft.source,
            access_count: 0,
            last_accessed_at: None,
            created_at: Utc::now(),
        }
    }
}
