//! Cycle-safe graph traversal.
//!
//! Traversal runs a worklist BFS over an arena of fetched nodes addressed by
//! integer index. `bfs`, `shortest_path`, and `ego_graph` use a single
//! global visited set; `all_paths` only forbids repeats within one path so
//! genuinely different routes through a shared node are all enumerated.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use synapse_core::error::{Result, SynapseError};
use synapse_core::id::SynapseId;
use synapse_core::types::{Direction, EdgeType, GraphEdge, GraphNode, NodeType};
use synapse_storage::GraphStore;
use tracing::debug;

/// Upper bound on visited nodes per traversal.
const MAX_VISITED: usize = 100_000;

/// Upper bound on worklist expansions for path enumeration.
const MAX_EXPANSIONS: usize = 50_000;

/// Node scan cap for centrality scoring.
const CENTRALITY_SCAN_LIMIT: usize = 10_000;

/// Access-count bonus factor in the centrality heuristic.
const ACCESS_BONUS: f64 = 0.1;

/// Traversal parameters.
#[derive(Debug, Clone)]
pub struct TraversalOptions {
    pub max_depth: usize,
    /// Empty means every edge type.
    pub edge_types: Vec<EdgeType>,
    pub direction: Direction,
    pub min_weight: f32,
}

impl Default for TraversalOptions {
    fn default() -> Self {
        Self {
            max_depth: 3,
            edge_types: Vec::new(),
            direction: Direction::Outgoing,
            min_weight: 0.0,
        }
    }
}

/// A node reached by traversal, with its depth and the path that reached it.
#[derive(Debug, Clone)]
pub struct TraversalHit {
    pub node: GraphNode,
    pub depth: usize,
    /// Node ids from the start node to this node, inclusive.
    pub path: Vec<SynapseId>,
}

/// Induced subgraph around a center node.
#[derive(Debug, Clone, Default)]
pub struct EgoGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// Centrality score for one node.
#[derive(Debug, Clone)]
pub struct CentralityScore {
    pub node: GraphNode,
    pub score: f64,
}

/// Arena of fetched nodes addressed by index; paths are index vectors until
/// they are materialized for callers.
#[derive(Default)]
struct Arena {
    nodes: Vec<GraphNode>,
    index: HashMap<SynapseId, usize>,
}

impl Arena {
    fn intern(&mut self, node: GraphNode) -> usize {
        if let Some(&idx) = self.index.get(&node.id) {
            return idx;
        }
        let idx = self.nodes.len();
        self.index.insert(node.id, idx);
        self.nodes.push(node);
        idx
    }

    fn id(&self, idx: usize) -> SynapseId {
        self.nodes[idx].id
    }

    fn node(&self, idx: usize) -> &GraphNode {
        &self.nodes[idx]
    }
}

/// BFS/DFS, path finding, ego graphs, and centrality over the graph store.
pub struct TraversalEngine {
    store: Arc<GraphStore>,
}

impl TraversalEngine {
    pub fn new(store: Arc<GraphStore>) -> Self {
        Self { store }
    }

    /// Fetch (once) and cache the admissible neighbor indices of a node.
    async fn expand(
        &self,
        id: SynapseId,
        options: &TraversalOptions,
        arena: &mut Arena,
        adjacency: &mut HashMap<SynapseId, Vec<usize>>,
    ) -> Result<Vec<usize>> {
        if let Some(cached) = adjacency.get(&id) {
            return Ok(cached.clone());
        }

        let neighbors = self
            .store
            .neighbors(id, options.direction, &options.edge_types)
            .await?;

        let indices: Vec<usize> = neighbors
            .into_iter()
            .filter(|(edge, _)| edge.weight >= options.min_weight)
            .map(|(_, node)| arena.intern(node))
            .collect();

        adjacency.insert(id, indices.clone());
        Ok(indices)
    }

    /// Level-by-level exploration from `start`. Returns only nodes at depth
    /// 1..=max_depth, ordered by depth then name; each hit carries the path
    /// that first reached it. An unknown start yields an empty result.
    pub async fn bfs(
        &self,
        start: SynapseId,
        options: &TraversalOptions,
    ) -> Result<Vec<TraversalHit>> {
        let Some(start_node) = self.store.get_node_by_id(start).await? else {
            debug!(start = %start, "bfs start node missing, returning empty");
            return Ok(Vec::new());
        };

        let mut arena = Arena::default();
        let mut adjacency = HashMap::new();
        let root = arena.intern(start_node);

        let mut visited: HashSet<SynapseId> = HashSet::from([start]);
        let mut queue: VecDeque<(usize, usize, Vec<usize>)> =
            VecDeque::from([(root, 0, vec![root])]);
        let mut hits = Vec::new();

        while let Some((idx, depth, path)) = queue.pop_front() {
            if depth >= options.max_depth || visited.len() >= MAX_VISITED {
                continue;
            }

            for nidx in self.expand(arena.id(idx), options, &mut arena, &mut adjacency).await? {
                let nid = arena.id(nidx);
                if !visited.insert(nid) {
                    continue;
                }
                let mut npath = path.clone();
                npath.push(nidx);
                hits.push((nidx, depth + 1, npath.clone()));
                queue.push_back((nidx, depth + 1, npath));
            }
        }

        let mut results: Vec<TraversalHit> = hits
            .into_iter()
            .map(|(idx, depth, path)| TraversalHit {
                node: arena.node(idx).clone(),
                depth,
                path: path.into_iter().map(|i| arena.id(i)).collect(),
            })
            .collect();
        results.sort_by(|a, b| {
            a.depth
                .cmp(&b.depth)
                .then_with(|| a.node.name.cmp(&b.node.name))
        });

        Ok(results)
    }

    /// The BFS result set reordered depth-first: longest paths first.
    pub async fn dfs(
        &self,
        start: SynapseId,
        options: &TraversalOptions,
    ) -> Result<Vec<TraversalHit>> {
        let mut results = self.bfs(start, options).await?;
        results.sort_by(|a, b| {
            b.path
                .len()
                .cmp(&a.path.len())
                .then_with(|| a.node.name.cmp(&b.node.name))
        });
        Ok(results)
    }

    /// First path found in BFS order, which is minimal in edge count for the
    /// unweighted graph. When no forward path exists the reverse direction is
    /// tried before giving up, so callers need not know which way the edges
    /// point. Returns `None` when the nodes are not connected within
    /// `max_depth`.
    pub async fn shortest_path(
        &self,
        from: SynapseId,
        to: SynapseId,
        max_depth: usize,
        edge_types: &[EdgeType],
    ) -> Result<Option<Vec<GraphNode>>> {
        for direction in [Direction::Outgoing, Direction::Incoming] {
            let options = TraversalOptions {
                max_depth,
                edge_types: edge_types.to_vec(),
                direction,
                min_weight: 0.0,
            };
            if let Some(path) = self.directed_search(from, to, &options).await? {
                return Ok(Some(path));
            }
        }
        Ok(None)
    }

    /// BFS from `from` that stops at the first sighting of `to`.
    async fn directed_search(
        &self,
        from: SynapseId,
        to: SynapseId,
        options: &TraversalOptions,
    ) -> Result<Option<Vec<GraphNode>>> {
        let Some(start_node) = self.store.get_node_by_id(from).await? else {
            return Ok(None);
        };
        if from == to {
            return Ok(Some(vec![start_node]));
        }

        let mut arena = Arena::default();
        let mut adjacency = HashMap::new();
        let root = arena.intern(start_node);

        let mut visited: HashSet<SynapseId> = HashSet::from([from]);
        let mut queue: VecDeque<(usize, usize, Vec<usize>)> =
            VecDeque::from([(root, 0, vec![root])]);

        while let Some((idx, depth, path)) = queue.pop_front() {
            if depth >= options.max_depth || visited.len() >= MAX_VISITED {
                continue;
            }

            for nidx in self.expand(arena.id(idx), options, &mut arena, &mut adjacency).await? {
                let nid = arena.id(nidx);
                if !visited.insert(nid) {
                    continue;
                }
                let mut npath = path.clone();
                npath.push(nidx);
                if nid == to {
                    return Ok(Some(
                        npath.into_iter().map(|i| arena.node(i).clone()).collect(),
                    ));
                }
                queue.push_back((nidx, depth + 1, npath));
            }
        }

        Ok(None)
    }

    /// Enumerate distinct simple paths from `from` to `to`, following edge
    /// direction, up to `max_length` edges per path and `limit` paths. A node
    /// may appear in many paths but never twice within one.
    pub async fn all_paths(
        &self,
        from: SynapseId,
        to: SynapseId,
        max_length: usize,
        limit: usize,
    ) -> Result<Vec<Vec<GraphNode>>> {
        if max_length == 0 {
            return Err(SynapseError::logic("all_paths requires max_length >= 1"));
        }
        let Some(start_node) = self.store.get_node_by_id(from).await? else {
            return Ok(Vec::new());
        };
        if self.store.get_node_by_id(to).await?.is_none() || limit == 0 {
            return Ok(Vec::new());
        }

        let options = TraversalOptions {
            max_depth: max_length,
            edge_types: Vec::new(),
            direction: Direction::Outgoing,
            min_weight: 0.0,
        };

        let mut arena = Arena::default();
        let mut adjacency = HashMap::new();
        let root = arena.intern(start_node);

        let mut stack: Vec<Vec<usize>> = vec![vec![root]];
        let mut found: Vec<Vec<usize>> = Vec::new();
        let mut expansions = 0;

        while let Some(path) = stack.pop() {
            if found.len() >= limit || expansions >= MAX_EXPANSIONS {
                break;
            }
            expansions += 1;

            let Some(&last) = path.last() else {
                continue;
            };
            if arena.id(last) == to {
                found.push(path);
                continue;
            }
            if path.len() > max_length {
                continue;
            }

            for nidx in self.expand(arena.id(last), &options, &mut arena, &mut adjacency).await? {
                // Per-path visited check: no repeats within a single path.
                if path.contains(&nidx) {
                    continue;
                }
                let mut npath = path.clone();
                npath.push(nidx);
                stack.push(npath);
            }
        }

        let mut paths: Vec<Vec<GraphNode>> = found
            .into_iter()
            .map(|path| path.into_iter().map(|i| arena.node(i).clone()).collect())
            .collect();
        paths.sort_by_key(|p: &Vec<GraphNode>| p.len());
        Ok(paths)
    }

    /// All nodes within `hops` of `center` in either direction, plus every
    /// edge whose endpoints both fall in that set.
    pub async fn ego_graph(&self, center: SynapseId, hops: usize) -> Result<EgoGraph> {
        let Some(center_node) = self.store.get_node_by_id(center).await? else {
            return Ok(EgoGraph::default());
        };

        let options = TraversalOptions {
            max_depth: hops,
            edge_types: Vec::new(),
            direction: Direction::Both,
            min_weight: 0.0,
        };

        let mut nodes = vec![center_node];
        for hit in self.bfs(center, &options).await? {
            nodes.push(hit.node);
        }

        let ids: Vec<SynapseId> = nodes.iter().map(|n| n.id).collect();
        let edges = self.store.edges_among(&ids).await?;

        Ok(EgoGraph { nodes, edges })
    }

    /// Centrality heuristic: sum of incoming edge weights plus an access
    /// bonus of `access_count * 0.1`. Deliberately not PageRank.
    pub async fn compute_centrality(
        &self,
        node_types: &[NodeType],
        limit: usize,
    ) -> Result<Vec<CentralityScore>> {
        let candidates = self
            .store
            .list_nodes(node_types, CENTRALITY_SCAN_LIMIT)
            .await?;
        let weight_sums = self.store.incoming_weight_sums().await?;

        let mut scores: Vec<CentralityScore> = candidates
            .into_iter()
            .map(|node| {
                let incoming = weight_sums.get(&node.id).copied().unwrap_or(0.0);
                let score = incoming + node.access_count as f64 * ACCESS_BONUS;
                CentralityScore { node, score }
            })
            .collect();

        scores.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.node.name.cmp(&b.node.name))
        });
        scores.truncate(limit);
        Ok(scores)
    }
}
