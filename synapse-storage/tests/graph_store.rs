//! Integration tests for the graph store against the embedded engine.

use std::collections::HashSet;
use std::sync::Arc;
use synapse_core::error::SynapseError;
use synapse_core::types::{Direction, EdgeType, NewEdge, NewNode, NodeType, NodeUpdate};
use synapse_storage::{GraphStore, StoreConfig, open_store};

async fn test_store() -> Arc<GraphStore> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    Arc::new(
        open_store(StoreConfig::memory())
            .await
            .expect("failed to open in-memory store"),
    )
}

#[tokio::test]
async fn test_create_and_get_node() {
    let store = test_store().await;

    let node = store
        .create_node(
            NewNode::new(NodeType::Function, "parse/2")
                .with_description("Parses a token stream")
                .with_property("arity", serde_json::json!(2)),
        )
        .await
        .expect("create failed");

    let fetched = store
        .get_node(NodeType::Function, "parse/2")
        .await
        .expect("get failed")
        .expect("node missing");

    assert_eq!(fetched.id, node.id);
    assert_eq!(fetched.name, "parse/2");
    assert_eq!(fetched.properties["arity"], serde_json::json!(2));
    assert_eq!(fetched.access_count, 0);

    let by_id = store
        .get_node_by_id(node.id)
        .await
        .expect("get_node_by_id failed");
    assert_eq!(by_id.map(|n| n.name), Some("parse/2".to_string()));
}

#[tokio::test]
async fn test_duplicate_create_conflicts() {
    let store = test_store().await;

    store
        .create_node(NewNode::new(NodeType::Module, "Parser"))
        .await
        .unwrap();
    let err = store
        .create_node(NewNode::new(NodeType::Module, "Parser"))
        .await
        .unwrap_err();
    assert!(err.is_conflict());

    // The same name under a different type is a different node.
    store
        .create_node(NewNode::new(NodeType::Concept, "Parser"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_find_or_create_concurrent_converges() {
    let store = test_store().await;

    let mut handles = Vec::new();
    for _ in 0..10 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .find_or_create_node(NewNode::new(NodeType::Concept, "ownership"))
                .await
                .expect("find_or_create failed")
                .id
        }));
    }

    let mut ids = HashSet::new();
    for handle in handles {
        ids.insert(handle.await.unwrap());
    }

    assert_eq!(ids.len(), 1, "all callers must observe the same node");
    assert_eq!(store.count_nodes().await.unwrap(), 1);
}

#[tokio::test]
async fn test_ensure_edge_is_idempotent_first_wins() {
    let store = test_store().await;

    let a = store
        .create_node(NewNode::new(NodeType::File, "lib/a.ex"))
        .await
        .unwrap();
    let b = store
        .create_node(NewNode::new(NodeType::Function, "a.foo/1"))
        .await
        .unwrap();

    let first = store
        .ensure_edge(
            NewEdge::new(a.id, b.id, EdgeType::Defines)
                .with_weight(0.9)
                .with_source("static_analysis"),
        )
        .await
        .unwrap();

    let second = store
        .ensure_edge(
            NewEdge::new(a.id, b.id, EdgeType::Defines)
                .with_weight(0.1)
                .with_source("semantic_inference"),
        )
        .await
        .unwrap();

    assert_eq!(second.id, first.id);
    assert!((second.weight - 0.9).abs() < 1e-6, "first write wins");
    assert_eq!(second.source, "static_analysis");
    assert_eq!(store.count_edges().await.unwrap(), 1);
}

#[tokio::test]
async fn test_multiple_edge_types_between_same_pair() {
    let store = test_store().await;

    let a = store
        .create_node(NewNode::new(NodeType::Function, "caller/0"))
        .await
        .unwrap();
    let b = store
        .create_node(NewNode::new(NodeType::Function, "callee/0"))
        .await
        .unwrap();

    store
        .create_edge(NewEdge::new(a.id, b.id, EdgeType::Calls))
        .await
        .unwrap();
    store
        .create_edge(NewEdge::new(a.id, b.id, EdgeType::Mentions))
        .await
        .unwrap();

    assert_eq!(store.count_edges().await.unwrap(), 2);
}

#[tokio::test]
async fn test_delete_node_cascades_edges() {
    let store = test_store().await;

    let a = store
        .create_node(NewNode::new(NodeType::Module, "A"))
        .await
        .unwrap();
    let b = store
        .create_node(NewNode::new(NodeType::Module, "B"))
        .await
        .unwrap();
    let c = store
        .create_node(NewNode::new(NodeType::Module, "C"))
        .await
        .unwrap();

    store
        .create_edge(NewEdge::new(a.id, b.id, EdgeType::Imports))
        .await
        .unwrap();
    store
        .create_edge(NewEdge::new(c.id, a.id, EdgeType::Imports))
        .await
        .unwrap();
    store
        .create_edge(NewEdge::new(b.id, c.id, EdgeType::Imports))
        .await
        .unwrap();

    store.delete_node(a.id).await.unwrap();

    assert!(store.get_node_by_id(a.id).await.unwrap().is_none());
    // Only the b -> c edge survives.
    assert_eq!(store.count_edges().await.unwrap(), 1);

    let err = store.delete_node(a.id).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_search_nodes_case_insensitive() {
    let store = test_store().await;

    store
        .create_node(NewNode::new(NodeType::Function, "HandleRequest/2"))
        .await
        .unwrap();
    store
        .create_node(
            NewNode::new(NodeType::Concept, "routing").with_description("Request dispatch rules"),
        )
        .await
        .unwrap();
    store
        .create_node(NewNode::new(NodeType::File, "lib/router.ex"))
        .await
        .unwrap();

    let hits = store.search_nodes("request", &[], 10).await.unwrap();
    let names: Vec<&str> = hits.iter().map(|n| n.name.as_str()).collect();
    assert!(names.contains(&"HandleRequest/2"));
    assert!(names.contains(&"routing"), "description matches count");

    let typed = store
        .search_nodes("request", &[NodeType::Function], 10)
        .await
        .unwrap();
    assert_eq!(typed.len(), 1);
    assert_eq!(typed[0].name, "HandleRequest/2");

    assert!(store.search_nodes("", &[], 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_track_access_concurrent_increments() {
    let store = test_store().await;

    let node = store
        .create_node(NewNode::new(NodeType::Memory, "fact-1"))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..20 {
        let store = store.clone();
        let id = node.id;
        handles.push(tokio::spawn(async move {
            store.track_access(id).await.expect("track_access failed");
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let tracked = store.get_node_by_id(node.id).await.unwrap().unwrap();
    assert_eq!(tracked.access_count, 20, "no lost increments");
    assert!(tracked.last_accessed_at.is_some());

    let missing = synapse_core::SynapseId::new();
    assert!(store.track_access(missing).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_update_node_merges_properties() {
    let store = test_store().await;

    let node = store
        .create_node(
            NewNode::new(NodeType::Function, "merge/2")
                .with_property("arity", serde_json::json!(2))
                .with_property("visibility", serde_json::json!("public")),
        )
        .await
        .unwrap();

    let updated = store
        .update_node(
            node.id,
            NodeUpdate {
                description: Some("Deep-merges two maps".to_string()),
                embedding: Some(vec![0.1, 0.2, 0.3]),
                properties: Some(
                    [("arity".to_string(), serde_json::json!(3))]
                        .into_iter()
                        .collect(),
                ),
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.properties["arity"], serde_json::json!(3));
    assert_eq!(updated.properties["visibility"], serde_json::json!("public"));
    assert_eq!(updated.description.as_deref(), Some("Deep-merges two maps"));
    assert_eq!(updated.embedding.as_deref(), Some(&[0.1, 0.2, 0.3][..]));
}

#[tokio::test]
async fn test_neighbors_ordered_by_weight() {
    let store = test_store().await;

    let hub = store
        .create_node(NewNode::new(NodeType::Module, "hub"))
        .await
        .unwrap();
    let light = store
        .create_node(NewNode::new(NodeType::Module, "light"))
        .await
        .unwrap();
    let heavy = store
        .create_node(NewNode::new(NodeType::Module, "heavy"))
        .await
        .unwrap();

    store
        .create_edge(NewEdge::new(hub.id, light.id, EdgeType::Uses).with_weight(0.2))
        .await
        .unwrap();
    store
        .create_edge(NewEdge::new(hub.id, heavy.id, EdgeType::Uses).with_weight(0.8))
        .await
        .unwrap();
    store
        .create_edge(NewEdge::new(light.id, hub.id, EdgeType::Mentions).with_weight(0.5))
        .await
        .unwrap();

    let outgoing = store
        .neighbors(hub.id, Direction::Outgoing, &[])
        .await
        .unwrap();
    assert_eq!(outgoing.len(), 2);
    assert_eq!(outgoing[0].1.name, "heavy");
    assert_eq!(outgoing[1].1.name, "light");

    let both = store.neighbors(hub.id, Direction::Both, &[]).await.unwrap();
    assert_eq!(both.len(), 3);

    let filtered = store
        .neighbors(hub.id, Direction::Both, &[EdgeType::Mentions])
        .await
        .unwrap();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].1.name, "light");
}

#[tokio::test]
async fn test_update_edge_weight_validates_range() {
    let store = test_store().await;

    let a = store
        .create_node(NewNode::new(NodeType::Concept, "a"))
        .await
        .unwrap();
    let b = store
        .create_node(NewNode::new(NodeType::Concept, "b"))
        .await
        .unwrap();
    let edge = store
        .create_edge(NewEdge::new(a.id, b.id, EdgeType::RelatesTo).with_weight(0.3))
        .await
        .unwrap();

    let err = store.update_edge_weight(edge.id, 1.5).await.unwrap_err();
    assert!(matches!(err, SynapseError::Validation(_)));

    let updated = store.update_edge_weight(edge.id, 0.9).await.unwrap();
    assert!((updated.weight - 0.9).abs() < 1e-6);

    store.delete_edge(edge.id).await.unwrap();
    assert!(store.get_edge(edge.id).await.unwrap().is_none());
    assert!(
        store
            .update_edge_weight(edge.id, 0.5)
            .await
            .unwrap_err()
            .is_not_found()
    );
}

#[tokio::test]
async fn test_batch_create_nodes_skips_duplicates() {
    let store = test_store().await;

    store
        .create_node(NewNode::new(NodeType::File, "lib/seen.ex"))
        .await
        .unwrap();

    let report = store
        .batch_create_nodes(vec![
            NewNode::new(NodeType::File, "lib/seen.ex"),
            NewNode::new(NodeType::File, "lib/fresh.ex"),
            NewNode::new(NodeType::File, "lib/fresh.ex"),
            NewNode::new(NodeType::Function, "fresh/0"),
        ])
        .await
        .unwrap();

    assert_eq!(report.inserted, 2);
    assert_eq!(report.skipped, 2);
    assert_eq!(store.count_nodes().await.unwrap(), 3);
}

#[tokio::test]
async fn test_batch_create_edges_skips_duplicates() {
    let store = test_store().await;

    let a = store
        .create_node(NewNode::new(NodeType::Module, "a"))
        .await
        .unwrap();
    let b = store
        .create_node(NewNode::new(NodeType::Module, "b"))
        .await
        .unwrap();
    let c = store
        .create_node(NewNode::new(NodeType::Module, "c"))
        .await
        .unwrap();

    store
        .create_edge(NewEdge::new(a.id, b.id, EdgeType::Imports))
        .await
        .unwrap();

    let report = store
        .batch_create_edges(vec![
            NewEdge::new(a.id, b.id, EdgeType::Imports),
            NewEdge::new(a.id, c.id, EdgeType::Imports),
            NewEdge::new(a.id, c.id, EdgeType::Imports),
            NewEdge::new(b.id, c.id, EdgeType::Calls),
        ])
        .await
        .unwrap();

    assert_eq!(report.inserted, 2);
    assert_eq!(report.skipped, 2);
    assert_eq!(store.count_edges().await.unwrap(), 3);
}

#[tokio::test]
async fn test_stats_counts_by_type() {
    let store = test_store().await;

    let f1 = store
        .create_node(NewNode::new(NodeType::Function, "f1"))
        .await
        .unwrap();
    let f2 = store
        .create_node(NewNode::new(NodeType::Function, "f2"))
        .await
        .unwrap();
    let m = store
        .create_node(NewNode::new(NodeType::Module, "m"))
        .await
        .unwrap();

    store
        .create_edge(NewEdge::new(m.id, f1.id, EdgeType::Defines))
        .await
        .unwrap();
    store
        .create_edge(NewEdge::new(f1.id, f2.id, EdgeType::Calls))
        .await
        .unwrap();

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.node_count, 3);
    assert_eq!(stats.edge_count, 2);
    assert_eq!(stats.nodes_by_type.get("function"), Some(&2));
    assert_eq!(stats.nodes_by_type.get("module"), Some(&1));
    assert_eq!(stats.edges_by_type.get("defines"), Some(&1));
    assert!((stats.avg_edges_per_node - 2.0 / 3.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_adjacent_ids_both_directions() {
    let store = test_store().await;

    let center = store
        .create_node(NewNode::new(NodeType::Concept, "center"))
        .await
        .unwrap();
    let out = store
        .create_node(NewNode::new(NodeType::Concept, "out"))
        .await
        .unwrap();
    let inn = store
        .create_node(NewNode::new(NodeType::Concept, "in"))
        .await
        .unwrap();

    store
        .create_edge(NewEdge::new(center.id, out.id, EdgeType::RelatesTo))
        .await
        .unwrap();
    store
        .create_edge(NewEdge::new(inn.id, center.id, EdgeType::RelatesTo))
        .await
        .unwrap();

    let adjacent = store.adjacent_ids(center.id).await.unwrap();
    assert_eq!(adjacent.len(), 2);
    assert!(adjacent.contains(&out.id));
    assert!(adjacent.contains(&inn.id));
}

#[tokio::test]
async fn test_nodes_with_embeddings_filter() {
    let store = test_store().await;

    store
        .create_node(NewNode::new(NodeType::Concept, "plain"))
        .await
        .unwrap();
    store
        .create_node(NewNode::new(NodeType::Concept, "embedded").with_embedding(vec![1.0, 0.0]))
        .await
        .unwrap();

    let embedded = store.nodes_with_embeddings(10).await.unwrap();
    assert_eq!(embedded.len(), 1);
    assert_eq!(embedded[0].name, "embedded");
}
