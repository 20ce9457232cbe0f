//! Query engine tests over the embedded store.

use std::sync::Arc;
use synapse_core::config::QuerySettings;
use synapse_core::types::{EdgeType, NewEdge, NewNode, NodeType};
use synapse_retrieval::QueryEngine;
use synapse_storage::{GraphStore, StoreConfig, open_store};

async fn test_store() -> Arc<GraphStore> {
    Arc::new(
        open_store(StoreConfig::memory())
            .await
            .expect("failed to open in-memory store"),
    )
}

#[tokio::test]
async fn test_query_ranks_direct_match_above_expansion() {
    let store = test_store().await;

    // file:"a.ex" --defines--> function:"a.foo/1" --calls--> function:"b.bar/1"
    let file = store
        .create_node(NewNode::new(NodeType::File, "a.ex"))
        .await
        .unwrap();
    let foo = store
        .create_node(
            NewNode::new(NodeType::Function, "a.foo/1")
                .with_property("file", serde_json::json!("a.ex"))
                .with_property("line", serde_json::json!(3))
                .with_property("signature", serde_json::json!("def foo(x)")),
        )
        .await
        .unwrap();
    let bar = store
        .create_node(NewNode::new(NodeType::Function, "b.bar/1"))
        .await
        .unwrap();
    store
        .create_edge(NewEdge::new(file.id, foo.id, EdgeType::Defines))
        .await
        .unwrap();
    store
        .create_edge(NewEdge::new(foo.id, bar.id, EdgeType::Calls))
        .await
        .unwrap();

    let engine = QueryEngine::new(store.clone(), QuerySettings::default());
    let result = engine.query_code("foo").await.unwrap();

    let position = |name: &str| {
        result
            .nodes
            .iter()
            .position(|s| s.node.name == name)
            .unwrap_or(usize::MAX)
    };
    assert!(
        position("a.foo/1") <= position("b.bar/1"),
        "the lexical match outranks its expansion"
    );

    // Both endpoints selected, so the defines edge comes back.
    assert!(
        result
            .edges
            .iter()
            .any(|e| e.edge_type == EdgeType::Defines
                && e.source_id == file.id
                && e.target_id == foo.id)
    );
    assert!(result.context.contains("## function a.foo/1"));
    assert!(result.context.contains("a.ex:3"));
    assert!(result.context.contains("-[defines]->"));
}

#[tokio::test]
async fn test_query_without_matches_is_empty() {
    let store = test_store().await;
    store
        .create_node(NewNode::new(NodeType::Concept, "unrelated"))
        .await
        .unwrap();

    let engine = QueryEngine::new(store.clone(), QuerySettings::default());
    let result = engine.query_code("zzz-no-such-thing").await.unwrap();
    assert!(result.nodes.is_empty());
    assert!(result.edges.is_empty());
    assert!(result.context.is_empty());

    let blank = engine.query_code("   ").await.unwrap();
    assert!(blank.nodes.is_empty());
}

#[tokio::test]
async fn test_type_importance_breaks_lexical_ties() {
    let store = test_store().await;

    store
        .create_node(NewNode::new(NodeType::File, "report.ex"))
        .await
        .unwrap();
    store
        .create_node(NewNode::new(NodeType::Function, "report/0"))
        .await
        .unwrap();

    let engine = QueryEngine::new(store.clone(), QuerySettings::default());
    let result = engine.query_code("report").await.unwrap();

    assert_eq!(result.nodes[0].node.name, "report/0");
    assert!(result.nodes[0].score > result.nodes[1].score);
}

#[tokio::test]
async fn test_top_k_bounds_selection() {
    let store = test_store().await;

    for i in 0..6 {
        store
            .create_node(NewNode::new(NodeType::Concept, format!("topic-{i}")))
            .await
            .unwrap();
    }

    let engine = QueryEngine::new(
        store.clone(),
        QuerySettings {
            top_k: 4,
            ..Default::default()
        },
    );
    let result = engine.query_code("topic").await.unwrap();
    assert_eq!(result.nodes.len(), 4);
}

#[tokio::test]
async fn test_expansion_reaches_unmatched_neighbors() {
    let store = test_store().await;

    let seed = store
        .create_node(NewNode::new(NodeType::Function, "router/2"))
        .await
        .unwrap();
    let neighbor = store
        .create_node(NewNode::new(NodeType::Module, "Dispatch"))
        .await
        .unwrap();
    store
        .create_edge(NewEdge::new(neighbor.id, seed.id, EdgeType::Defines))
        .await
        .unwrap();

    let engine = QueryEngine::new(store.clone(), QuerySettings::default());
    let result = engine.query_code("router").await.unwrap();

    let dispatch = result
        .nodes
        .iter()
        .find(|s| s.node.name == "Dispatch")
        .expect("expanded node selected");
    assert!(!dispatch.is_seed);
    assert!((dispatch.expansion - 0.7).abs() < 1e-6, "depth-1 decay");
    assert_eq!(dispatch.lexical, 0.0);

    let scores: Vec<f32> = result.nodes.iter().map(|s| s.score).collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]), "sorted descending");
}
