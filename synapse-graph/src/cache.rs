//! Write-through batching cache for bulk ingestion.
//!
//! A single-writer actor owns the dedup maps and pending buffers; callers
//! reach it only through the message channel, so concurrent staging
//! serializes safely and each key is deduplicated exactly once. Flushing is
//! one batch node insert followed by one batch edge insert through the
//! store's id-preserving bulk path.
//!
//! Liveness beats dedup efficiency: when the actor is gone, staging hands
//! out a fresh uncached id instead of blocking or failing.

use chrono::Utc;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use synapse_core::config::CacheSettings;
use synapse_core::error::Result;
use synapse_core::id::SynapseId;
use synapse_core::types::{EdgeType, GraphEdge, GraphNode, NodeType, PropertyMap};
use synapse_storage::GraphStore;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Provenance tag stamped on edges staged through the cache. Bulk ingestion
/// feeds the cache from the code-symbol extractor.
const STAGED_PROVENANCE: &str = "static_analysis";

/// Default weight for staged edges.
const STAGED_WEIGHT: f32 = 0.5;

/// Cache counters. Pending counts reflect the buffers; the flushed counters
/// and flush count are cumulative for the cache's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub pending_nodes: usize,
    pub pending_edges: usize,
    pub staged_nodes: u64,
    pub staged_edges: u64,
    pub nodes_flushed: u64,
    pub edges_flushed: u64,
    pub flush_count: u64,
    pub hits: u64,
    pub misses: u64,
}

/// Rows handed to the store by one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub nodes_flushed: usize,
    pub edges_flushed: usize,
}

enum Command {
    StageNode {
        node_type: NodeType,
        name: String,
        properties: PropertyMap,
        reply: oneshot::Sender<SynapseId>,
    },
    StageEdge {
        source_id: SynapseId,
        target_id: SynapseId,
        edge_type: EdgeType,
        properties: PropertyMap,
        reply: oneshot::Sender<()>,
    },
    Flush {
        reply: oneshot::Sender<Result<FlushReport>>,
    },
    Clear {
        reply: oneshot::Sender<()>,
    },
    Stats {
        reply: oneshot::Sender<CacheStats>,
    },
    Shutdown {
        reply: oneshot::Sender<Result<FlushReport>>,
    },
}

/// Handle to the cache actor. Cheap to clone; all clones talk to the same
/// single-writer task.
#[derive(Clone)]
pub struct WriteCache {
    tx: mpsc::Sender<Command>,
}

impl WriteCache {
    /// Spawn the cache actor over a graph store.
    pub fn spawn(store: Arc<GraphStore>, settings: CacheSettings) -> Self {
        let (tx, rx) = mpsc::channel(settings.channel_capacity.max(1));
        let actor = CacheActor::new(store, settings);
        tokio::spawn(actor.run(rx));
        Self { tx }
    }

    /// Return the cached id for `(node_type, name)`, consulting the store on
    /// a memory miss; otherwise buffer a new node and return its fresh id.
    /// Falls back to an uncached fresh id when the actor is unavailable.
    pub async fn stage_node(
        &self,
        node_type: NodeType,
        name: impl Into<String>,
        properties: PropertyMap,
    ) -> SynapseId {
        let (reply, rx) = oneshot::channel();
        let command = Command::StageNode {
            node_type,
            name: name.into(),
            properties,
            reply,
        };
        if self.tx.send(command).await.is_err() {
            warn!("write cache unavailable, issuing uncached node id");
            return SynapseId::new();
        }
        match rx.await {
            Ok(id) => id,
            Err(_) => {
                warn!("write cache dropped a staging reply, issuing uncached node id");
                SynapseId::new()
            }
        }
    }

    /// Buffer an edge keyed by `(source, target, type)`; duplicate keys are
    /// staged once. A missing actor drops the edge rather than blocking.
    pub async fn stage_edge(
        &self,
        source_id: SynapseId,
        target_id: SynapseId,
        edge_type: EdgeType,
        properties: PropertyMap,
    ) {
        let (reply, rx) = oneshot::channel();
        let command = Command::StageEdge {
            source_id,
            target_id,
            edge_type,
            properties,
            reply,
        };
        if self.tx.send(command).await.is_err() {
            warn!("write cache unavailable, dropping staged edge");
            return;
        }
        if rx.await.is_err() {
            warn!("write cache dropped a staging reply for an edge");
        }
    }

    /// Flush pending buffers to the store now. On failure the buffers are
    /// kept for a retry.
    pub async fn flush(&self) -> Result<FlushReport> {
        self.request(|reply| Command::Flush { reply }).await?
    }

    /// Drop all in-memory state. Used after a bulk-ingestion run completes.
    pub async fn clear(&self) -> Result<()> {
        self.request(|reply| Command::Clear { reply }).await
    }

    pub async fn stats(&self) -> Result<CacheStats> {
        self.request(|reply| Command::Stats { reply }).await
    }

    /// Final flush, then stop the actor. Later staging calls on any clone of
    /// this handle take the uncached-fresh-id fallback.
    pub async fn shutdown(&self) -> Result<FlushReport> {
        self.request(|reply| Command::Shutdown { reply }).await?
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| synapse_core::SynapseError::storage("write cache actor is gone"))?;
        rx.await
            .map_err(|_| synapse_core::SynapseError::storage("write cache actor is gone"))
    }
}

struct CacheActor {
    store: Arc<GraphStore>,
    settings: CacheSettings,
    node_ids: HashMap<(NodeType, String), SynapseId>,
    edge_keys: HashSet<(SynapseId, SynapseId, EdgeType)>,
    pending_nodes: Vec<GraphNode>,
    pending_edges: Vec<GraphEdge>,
    stats: CacheStats,
}

impl CacheActor {
    fn new(store: Arc<GraphStore>, settings: CacheSettings) -> Self {
        Self {
            store,
            settings,
            node_ids: HashMap::new(),
            edge_keys: HashSet::new(),
            pending_nodes: Vec::new(),
            pending_edges: Vec::new(),
            stats: CacheStats::default(),
        }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        let mut ticker =
            tokio::time::interval(Duration::from_millis(self.settings.flush_interval_ms.max(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = rx.recv() => match command {
                    Some(command) => {
                        if self.handle(command).await.is_break() {
                            break;
                        }
                    }
                    None => {
                        // Every handle dropped: flush what is left and stop.
                        if let Err(e) = self.flush().await {
                            warn!(error = %e, "final write cache flush failed");
                        }
                        break;
                    }
                },
                _ = ticker.tick() => {
                    if self.pending_total() > 0 {
                        if let Err(e) = self.flush().await {
                            warn!(error = %e, "periodic write cache flush failed");
                        }
                    }
                }
            }
        }
    }

    fn pending_total(&self) -> usize {
        self.pending_nodes.len() + self.pending_edges.len()
    }

    async fn handle(&mut self, command: Command) -> std::ops::ControlFlow<()> {
        match command {
            Command::StageNode {
                node_type,
                name,
                properties,
                reply,
            } => {
                let id = self.stage_node(node_type, name, properties).await;
                let _ = reply.send(id);
                self.maybe_flush().await;
            }
            Command::StageEdge {
                source_id,
                target_id,
                edge_type,
                properties,
                reply,
            } => {
                self.stage_edge(source_id, target_id, edge_type, properties);
                let _ = reply.send(());
                self.maybe_flush().await;
            }
            Command::Flush { reply } => {
                let _ = reply.send(self.flush().await);
            }
            Command::Clear { reply } => {
                self.clear();
                let _ = reply.send(());
            }
            Command::Stats { reply } => {
                let mut stats = self.stats;
                stats.pending_nodes = self.pending_nodes.len();
                stats.pending_edges = self.pending_edges.len();
                let _ = reply.send(stats);
            }
            Command::Shutdown { reply } => {
                let report = self.flush().await;
                let _ = reply.send(report);
                return std::ops::ControlFlow::Break(());
            }
        }
        std::ops::ControlFlow::Continue(())
    }

    async fn stage_node(
        &mut self,
        node_type: NodeType,
        name: String,
        properties: PropertyMap,
    ) -> SynapseId {
        self.stats.staged_nodes += 1;
        let key = (node_type, name.clone());

        if let Some(&id) = self.node_ids.get(&key) {
            self.stats.hits += 1;
            return id;
        }
        self.stats.misses += 1;

        // Memory miss: the store may already hold the node from an earlier
        // run. A store failure here degrades to a buffered write; the flush
        // path skips duplicates anyway.
        match self.store.get_node(node_type, &name).await {
            Ok(Some(node)) => {
                self.node_ids.insert(key, node.id);
                return node.id;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "store lookup failed while staging, buffering blind");
            }
        }

        let node = GraphNode {
            id: SynapseId::new(),
            node_type,
            name,
            properties,
            embedding: None,
            description: None,
            access_count: 0,
            last_accessed_at: None,
            created_at: Utc::now(),
        };
        let id = node.id;
        self.node_ids.insert(key, id);
        debug!(node_id = %id, node_type = %node.node_type, "buffered staged node");
        self.pending_nodes.push(node);
        id
    }

    fn stage_edge(
        &mut self,
        source_id: SynapseId,
        target_id: SynapseId,
        edge_type: EdgeType,
        properties: PropertyMap,
    ) {
        self.stats.staged_edges += 1;
        if !self.edge_keys.insert((source_id, target_id, edge_type)) {
            self.stats.hits += 1;
            return;
        }
        self.stats.misses += 1;

        self.pending_edges.push(GraphEdge {
            id: SynapseId::new(),
            source_id,
            target_id,
            edge_type,
            weight: STAGED_WEIGHT,
            confidence: 1.0,
            properties,
            source: STAGED_PROVENANCE.to_string(),
            access_count: 0,
            last_accessed_at: None,
            created_at: Utc::now(),
        });
    }

    async fn maybe_flush(&mut self) {
        if self.pending_total() >= self.settings.batch_threshold.max(1) {
            if let Err(e) = self.flush().await {
                warn!(error = %e, "threshold write cache flush failed");
            }
        }
    }

    /// One batch node insert then one batch edge insert. On failure the
    /// unflushed buffers are restored for a later retry.
    async fn flush(&mut self) -> Result<FlushReport> {
        let nodes = std::mem::take(&mut self.pending_nodes);
        let edges = std::mem::take(&mut self.pending_edges);
        if nodes.is_empty() && edges.is_empty() {
            return Ok(FlushReport::default());
        }

        let mut report = FlushReport::default();

        if !nodes.is_empty() {
            if let Err(e) = self.store.insert_node_rows(nodes.clone()).await {
                self.pending_nodes = nodes;
                self.pending_edges = edges;
                return Err(e);
            }
            report.nodes_flushed = nodes.len();
            self.stats.nodes_flushed += nodes.len() as u64;
        }

        if !edges.is_empty() {
            if let Err(e) = self.store.insert_edge_rows(edges.clone()).await {
                self.pending_edges = edges;
                return Err(e);
            }
            report.edges_flushed = edges.len();
            self.stats.edges_flushed += edges.len() as u64;
        }

        self.stats.flush_count += 1;
        info!(
            nodes = report.nodes_flushed,
            edges = report.edges_flushed,
            "write cache flushed"
        );
        Ok(report)
    }

    fn clear(&mut self) {
        info!(
            pending_nodes = self.pending_nodes.len(),
            pending_edges = self.pending_edges.len(),
            "clearing write cache"
        );
        self.node_ids.clear();
        self.edge_keys.clear();
        self.pending_nodes.clear();
        self.pending_edges.clear();
        self.stats.staged_nodes = 0;
        self.stats.staged_edges = 0;
        self.stats.hits = 0;
        self.stats.misses = 0;
    }
}
