//! Hybrid query orchestration.
//!
//! A free-text query is answered in four stages: seed selection (pluggable,
//! lexical substring matching as the floor), BFS expansion with exponential
//! depth decay, a weighted blend of expansion, lexical, and type-importance
//! scores, and finally context assembly: the induced edge set plus a
//! type-specific summary block per selected node.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use synapse_core::config::QuerySettings;
use synapse_core::error::Result;
use synapse_core::id::SynapseId;
use synapse_core::types::{GraphEdge, GraphNode, NodeType};
use synapse_graph::{TraversalEngine, TraversalOptions};
use synapse_core::types::Direction;
use synapse_storage::GraphStore;
use tracing::debug;

/// Produces seed nodes for a query, each with a match score in [0, 1].
#[async_trait]
pub trait SeedSelector: Send + Sync {
    async fn select(&self, query: &str, limit: usize) -> Result<Vec<(GraphNode, f32)>>;
}

/// Floor seed selector: case-insensitive substring search over the store.
pub struct LexicalSeeds {
    store: Arc<GraphStore>,
}

impl LexicalSeeds {
    pub fn new(store: Arc<GraphStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SeedSelector for LexicalSeeds {
    async fn select(&self, query: &str, limit: usize) -> Result<Vec<(GraphNode, f32)>> {
        let terms = query_terms(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut merged: HashMap<SynapseId, GraphNode> = HashMap::new();
        for term in &terms {
            for node in self.store.search_nodes(term, &[], limit * 2).await? {
                merged.entry(node.id).or_insert(node);
            }
        }

        let mut seeds: Vec<(GraphNode, f32)> = merged
            .into_values()
            .map(|node| {
                let score = lexical_score(&node, &terms);
                (node, score)
            })
            .filter(|(_, score)| *score > 0.0)
            .collect();
        seeds.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.name.cmp(&b.0.name))
        });
        seeds.truncate(limit);
        Ok(seeds)
    }
}

/// One ranked node with its score components.
#[derive(Debug, Clone)]
pub struct ScoredNode {
    pub node: GraphNode,
    pub score: f32,
    pub lexical: f32,
    pub expansion: f32,
    pub is_seed: bool,
}

/// Full query result: ranked nodes, the edges among them, and a rendered
/// context block for LLM consumption.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub nodes: Vec<ScoredNode>,
    pub edges: Vec<GraphEdge>,
    pub context: String,
}

/// Hybrid ranking and retrieval over the graph.
pub struct QueryEngine {
    store: Arc<GraphStore>,
    traversal: TraversalEngine,
    seeds: Arc<dyn SeedSelector>,
    settings: QuerySettings,
}

impl QueryEngine {
    /// Engine with the lexical floor selector.
    pub fn new(store: Arc<GraphStore>, settings: QuerySettings) -> Self {
        let seeds = Arc::new(LexicalSeeds::new(store.clone()));
        Self::with_selector(store, seeds, settings)
    }

    /// Engine with a custom seed selector (e.g. vector search).
    pub fn with_selector(
        store: Arc<GraphStore>,
        seeds: Arc<dyn SeedSelector>,
        settings: QuerySettings,
    ) -> Self {
        let traversal = TraversalEngine::new(store.clone());
        Self {
            store,
            traversal,
            seeds,
            settings,
        }
    }

    /// Answer a free-text query over the code graph. Returns ranked nodes
    /// with raw score components, the edges among the selection, and the
    /// rendered context.
    pub async fn query_code(&self, query: &str) -> Result<QueryResult> {
        let terms = query_terms(query);
        let seeds = self.seeds.select(query, self.settings.seed_limit).await?;
        if seeds.is_empty() {
            debug!(query, "no seeds matched, returning empty result");
            return Ok(QueryResult::default());
        }

        // Expansion scores: seeds count in full, expanded nodes decay with
        // the depth at which any seed first reaches them.
        let mut expansion: HashMap<SynapseId, f32> = HashMap::new();
        let mut nodes: HashMap<SynapseId, GraphNode> = HashMap::new();
        let mut seed_ids: Vec<SynapseId> = Vec::new();

        for (node, _) in &seeds {
            expansion.insert(node.id, 1.0);
            nodes.insert(node.id, node.clone());
            seed_ids.push(node.id);
        }

        let options = TraversalOptions {
            max_depth: self.settings.max_hops,
            edge_types: Vec::new(),
            direction: Direction::Both,
            min_weight: 0.0,
        };
        for &seed in &seed_ids {
            for hit in self.traversal.bfs(seed, &options).await? {
                let score = self.settings.depth_decay.powi(hit.depth as i32);
                let entry = expansion.entry(hit.node.id).or_insert(0.0);
                if score > *entry {
                    *entry = score;
                }
                nodes.entry(hit.node.id).or_insert(hit.node);
            }
        }

        // Blend the components and keep the top K.
        let mut scored: Vec<ScoredNode> = expansion
            .iter()
            .filter_map(|(id, &exp)| {
                let node = nodes.get(id)?.clone();
                let lexical = lexical_score(&node, &terms);
                let importance = type_importance(node.node_type);
                let score = self.settings.expansion_weight * exp
                    + self.settings.lexical_weight * lexical
                    + self.settings.type_weight * importance;
                Some(ScoredNode {
                    is_seed: seed_ids.contains(id),
                    node,
                    score,
                    lexical,
                    expansion: exp,
                })
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.node.name.cmp(&b.node.name))
        });
        scored.truncate(self.settings.top_k);

        let selected: Vec<SynapseId> = scored.iter().map(|s| s.node.id).collect();
        let edges = self.store.edges_among(&selected).await?;
        let context = render_context(&scored, &edges);

        Ok(QueryResult {
            nodes: scored,
            edges,
            context,
        })
    }
}

/// Lowercased whitespace terms of a query.
fn query_terms(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(|t| t.to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Lexical match score: per term, exact name 1.0, name substring 0.7,
/// description substring 0.4; averaged over the terms that hit at all.
fn lexical_score(node: &GraphNode, terms: &[String]) -> f32 {
    let name = node.name.to_lowercase();
    let description = node
        .description
        .as_deref()
        .map(str::to_lowercase)
        .unwrap_or_default();

    let mut hits = 0usize;
    let mut total = 0.0f32;
    for term in terms {
        let score = if name == *term {
            1.0
        } else if name.contains(term.as_str()) {
            0.7
        } else if !description.is_empty() && description.contains(term.as_str()) {
            0.4
        } else {
            continue;
        };
        hits += 1;
        total += score;
    }

    if hits == 0 { 0.0 } else { total / hits as f32 }
}

/// Static per-type importance for the ranking blend. Strictly descending:
/// function > module > concept > memory > file > external_lib.
fn type_importance(node_type: NodeType) -> f32 {
    match node_type {
        NodeType::Function => 1.0,
        NodeType::Module => 0.85,
        NodeType::Concept => 0.7,
        NodeType::Memory => 0.55,
        NodeType::File => 0.4,
        NodeType::ExternalLib => 0.25,
    }
}

/// Render the type-specific summary blocks plus the relations among the
/// selection.
fn render_context(scored: &[ScoredNode], edges: &[GraphEdge]) -> String {
    let mut out = String::new();

    for entry in scored {
        out.push_str(&render_node(&entry.node));
        out.push('\n');
    }

    if !edges.is_empty() {
        let names: HashMap<SynapseId, &str> = scored
            .iter()
            .map(|s| (s.node.id, s.node.name.as_str()))
            .collect();
        out.push_str("## Relations\n");
        for edge in edges {
            let source = names.get(&edge.source_id).copied().unwrap_or("?");
            let target = names.get(&edge.target_id).copied().unwrap_or("?");
            out.push_str(&format!(
                "{source} -[{}]-> {target}\n",
                edge.edge_type
            ));
        }
    }

    out
}

fn render_node(node: &GraphNode) -> String {
    let mut block = format!("## {} {}\n", node.node_type, node.name);

    match node.node_type {
        NodeType::Function => {
            let file = property_str(node, "file");
            let line = property_str(node, "line");
            match (file, line) {
                (Some(file), Some(line)) => block.push_str(&format!("{file}:{line}\n")),
                (Some(file), None) => block.push_str(&format!("{file}\n")),
                _ => {}
            }
            if let Some(signature) = property_str(node, "signature") {
                block.push_str(&format!("{signature}\n"));
            }
            if let Some(description) = &node.description {
                block.push_str(&format!("{description}\n"));
            }
        }
        NodeType::ExternalLib => {
            let ecosystem = property_str(node, "ecosystem").unwrap_or_else(|| "unknown".into());
            let version = property_str(node, "version").unwrap_or_else(|| "*".into());
            block.push_str(&format!("{ecosystem}@{version}\n"));
            if let Some(description) = &node.description {
                block.push_str(&format!("{description}\n"));
            }
        }
        NodeType::File => {
            if let Some(language) = property_str(node, "language") {
                block.push_str(&format!("language: {language}\n"));
            }
            if let Some(description) = &node.description {
                block.push_str(&format!("{description}\n"));
            }
        }
        NodeType::Module | NodeType::Concept | NodeType::Memory => {
            if let Some(description) = &node.description {
                block.push_str(&format!("{description}\n"));
            }
        }
    }

    block
}

/// String-valued property, accepting numbers for things like line numbers.
fn property_str(node: &GraphNode, key: &str) -> Option<String> {
    match node.properties.get(key)? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use synapse_core::types::PropertyMap;

    fn make_node(node_type: NodeType, name: &str, description: Option<&str>) -> GraphNode {
        GraphNode {
            id: SynapseId::new(),
            node_type,
            name: name.to_string(),
            properties: PropertyMap::new(),
            embedding: None,
            description: description.map(str::to_string),
            access_count: 0,
            last_accessed_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_lexical_score_tiers() {
        let terms = vec!["foo".to_string()];
        let exact = make_node(NodeType::Function, "foo", None);
        let substring = make_node(NodeType::Function, "a.foo/1", None);
        let described = make_node(NodeType::Concept, "bar", Some("all about foo"));
        let miss = make_node(NodeType::Concept, "bar", None);

        assert!((lexical_score(&exact, &terms) - 1.0).abs() < 1e-6);
        assert!((lexical_score(&substring, &terms) - 0.7).abs() < 1e-6);
        assert!((lexical_score(&described, &terms) - 0.4).abs() < 1e-6);
        assert_eq!(lexical_score(&miss, &terms), 0.0);
    }

    #[test]
    fn test_type_importance_is_strictly_descending() {
        let ladder = [
            NodeType::Function,
            NodeType::Module,
            NodeType::Concept,
            NodeType::Memory,
            NodeType::File,
            NodeType::ExternalLib,
        ];
        for pair in ladder.windows(2) {
            assert!(type_importance(pair[0]) > type_importance(pair[1]));
        }
    }

    #[test]
    fn test_render_function_block() {
        let mut node = make_node(NodeType::Function, "a.foo/1", Some("Returns foo."));
        node.properties
            .insert("file".into(), serde_json::json!("lib/a.ex"));
        node.properties.insert("line".into(), serde_json::json!(12));
        node.properties
            .insert("signature".into(), serde_json::json!("def foo(x)"));

        let block = render_node(&node);
        assert!(block.contains("## function a.foo/1"));
        assert!(block.contains("lib/a.ex:12"));
        assert!(block.contains("def foo(x)"));
        assert!(block.contains("Returns foo."));
    }

    #[test]
    fn test_render_external_lib_block() {
        let mut node = make_node(NodeType::ExternalLib, "jason", None);
        node.properties
            .insert("ecosystem".into(), serde_json::json!("hex"));
        node.properties
            .insert("version".into(), serde_json::json!("1.4.0"));

        let block = render_node(&node);
        assert!(block.contains("hex@1.4.0"));
    }
}
