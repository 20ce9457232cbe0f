//! Typed data model for the Synapse property graph.
//!
//! Node and edge categories are closed enums validated at the boundary:
//! unknown strings are rejected with a `Validation` error instead of being
//! coerced into the type system.

use crate::error::{Result, SynapseError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::id::SynapseId;

/// String-keyed property bag attached to nodes and edges.
pub type PropertyMap = HashMap<String, serde_json::Value>;

// ============================================================================
// Closed enumerations
// ============================================================================

/// Semantic category of a graph node.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Concept,
    File,
    Function,
    Module,
    ExternalLib,
    Memory,
}

impl NodeType {
    /// All variants, in declaration order.
    pub fn all() -> &'static [NodeType] {
        &[
            NodeType::Concept,
            NodeType::File,
            NodeType::Function,
            NodeType::Module,
            NodeType::ExternalLib,
            NodeType::Memory,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Concept => "concept",
            NodeType::File => "file",
            NodeType::Function => "function",
            NodeType::Module => "module",
            NodeType::ExternalLib => "external_lib",
            NodeType::Memory => "memory",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NodeType {
    type Err = SynapseError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "concept" => Ok(NodeType::Concept),
            "file" => Ok(NodeType::File),
            "function" => Ok(NodeType::Function),
            "module" => Ok(NodeType::Module),
            "external_lib" => Ok(NodeType::ExternalLib),
            "memory" => Ok(NodeType::Memory),
            other => Err(SynapseError::validation(format!(
                "unknown node type: {other}"
            ))),
        }
    }
}

/// Semantic category of a graph edge.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    Defines,
    Calls,
    Imports,
    Uses,
    Mentions,
    RelatesTo,
    Implements,
    DocumentedBy,
}

impl EdgeType {
    /// All variants, in declaration order.
    pub fn all() -> &'static [EdgeType] {
        &[
            EdgeType::Defines,
            EdgeType::Calls,
            EdgeType::Imports,
            EdgeType::Uses,
            EdgeType::Mentions,
            EdgeType::RelatesTo,
            EdgeType::Implements,
            EdgeType::DocumentedBy,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::Defines => "defines",
            EdgeType::Calls => "calls",
            EdgeType::Imports => "imports",
            EdgeType::Uses => "uses",
            EdgeType::Mentions => "mentions",
            EdgeType::RelatesTo => "relates_to",
            EdgeType::Implements => "implements",
            EdgeType::DocumentedBy => "documented_by",
        }
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EdgeType {
    type Err = SynapseError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "defines" => Ok(EdgeType::Defines),
            "calls" => Ok(EdgeType::Calls),
            "imports" => Ok(EdgeType::Imports),
            "uses" => Ok(EdgeType::Uses),
            "mentions" => Ok(EdgeType::Mentions),
            "relates_to" => Ok(EdgeType::RelatesTo),
            "implements" => Ok(EdgeType::Implements),
            "documented_by" => Ok(EdgeType::DocumentedBy),
            other => Err(SynapseError::validation(format!(
                "unknown edge type: {other}"
            ))),
        }
    }
}

/// Edge direction selector for neighbor queries and traversal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Outgoing,
    Incoming,
    Both,
}

// ============================================================================
// Graph entities
// ============================================================================

/// A stored graph node. `(node_type, name)` uniquely identifies a node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphNode {
    #[serde(rename = "node_id")]
    pub id: SynapseId,
    pub node_type: NodeType,
    pub name: String,
    #[serde(default)]
    pub properties: PropertyMap,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub access_count: u64,
    #[serde(default)]
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A stored directed edge. `(source_id, target_id, edge_type)` is unique for
/// edges created through the idempotent path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphEdge {
    #[serde(rename = "edge_id")]
    pub id: SynapseId,
    pub source_id: SynapseId,
    pub target_id: SynapseId,
    pub edge_type: EdgeType,
    pub weight: f32,
    pub confidence: f32,
    #[serde(default)]
    pub properties: PropertyMap,
    /// Provenance tag: "static_analysis", "semantic_inference",
    /// "edge_predictor", "manual", ...
    pub source: String,
    #[serde(default)]
    pub access_count: u64,
    #[serde(default)]
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Draft payload for node creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewNode {
    pub node_type: NodeType,
    pub name: String,
    #[serde(default)]
    pub properties: PropertyMap,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub description: Option<String>,
}

impl NewNode {
    pub fn new(node_type: NodeType, name: impl Into<String>) -> Self {
        Self {
            node_type,
            name: name.into(),
            properties: PropertyMap::new(),
            embedding: None,
            description: None,
        }
    }

    pub fn with_properties(mut self, properties: PropertyMap) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Boundary validation: nodes must carry a non-empty name.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(SynapseError::validation("node name must not be empty"));
        }
        Ok(())
    }
}

/// Draft payload for edge creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewEdge {
    pub source_id: SynapseId,
    pub target_id: SynapseId,
    pub edge_type: EdgeType,
    pub weight: f32,
    pub confidence: f32,
    #[serde(default)]
    pub properties: PropertyMap,
    pub source: String,
}

impl NewEdge {
    pub fn new(source_id: SynapseId, target_id: SynapseId, edge_type: EdgeType) -> Self {
        Self {
            source_id,
            target_id,
            edge_type,
            weight: 0.5,
            confidence: 1.0,
            properties: PropertyMap::new(),
            source: "manual".to_string(),
        }
    }

    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_properties(mut self, properties: PropertyMap) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Boundary validation: weight and confidence live in [0, 1].
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.weight) {
            return Err(SynapseError::validation(format!(
                "edge weight out of range [0, 1]: {}",
                self.weight
            )));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(SynapseError::validation(format!(
                "edge confidence out of range [0, 1]: {}",
                self.confidence
            )));
        }
        Ok(())
    }
}

/// Partial update for a stored node. Properties are merged key-by-key,
/// other fields replace the stored value when present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeUpdate {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub properties: Option<PropertyMap>,
}

impl NodeUpdate {
    pub fn is_empty(&self) -> bool {
        self.description.is_none() && self.embedding.is_none() && self.properties.is_none()
    }
}

/// Aggregate graph statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphStats {
    pub node_count: u64,
    pub edge_count: u64,
    pub nodes_by_type: HashMap<String, u64>,
    pub edges_by_type: HashMap<String, u64>,
    pub avg_edges_per_node: f64,
}
