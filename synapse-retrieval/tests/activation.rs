//! Spreading-activation tests over the embedded store.

use std::sync::Arc;
use synapse_core::config::ActivationSettings;
use synapse_core::id::SynapseId;
use synapse_core::similarity::CosineSimilarity;
use synapse_core::types::{EdgeType, NewEdge, NewNode, NodeType};
use synapse_core::weights::StaticWeights;
use synapse_retrieval::{ActivationSeed, SpreadingActivation};
use synapse_storage::{GraphStore, StoreConfig, open_store};

async fn test_store() -> Arc<GraphStore> {
    Arc::new(
        open_store(StoreConfig::memory())
            .await
            .expect("failed to open in-memory store"),
    )
}

fn engine(store: Arc<GraphStore>, settings: ActivationSettings) -> SpreadingActivation {
    SpreadingActivation::new(
        store,
        Arc::new(CosineSimilarity),
        Arc::new(StaticWeights::default()),
        settings,
    )
}

async fn add_node(store: &GraphStore, name: &str) -> SynapseId {
    store
        .create_node(NewNode::new(NodeType::Concept, name))
        .await
        .expect("node create failed")
        .id
}

async fn link(store: &GraphStore, from: SynapseId, to: SynapseId, weight: f32) {
    store
        .create_edge(NewEdge::new(from, to, EdgeType::RelatesTo).with_weight(weight))
        .await
        .expect("edge create failed");
}

#[tokio::test]
async fn test_one_hop_contribution_bounded_by_decay() {
    let store = test_store().await;

    let source = add_node(&store, "source").await;
    let n1 = add_node(&store, "n1").await;
    let n2 = add_node(&store, "n2").await;
    let n3 = add_node(&store, "n3").await;
    link(&store, source, n1, 0.9).await;
    link(&store, source, n2, 0.5).await;
    link(&store, source, n3, 0.2).await;

    let activation = engine(
        store.clone(),
        ActivationSettings {
            max_hops: 1,
            ..Default::default()
        },
    );
    let results = activation
        .spread(None, &[ActivationSeed { id: source, similarity: 1.0 }], true)
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    let total: f32 = results.iter().map(|r| r.activation).sum();
    // Attention shares sum to 1, so one hop hands out exactly decay * source.
    assert!((total - 0.7).abs() < 1e-4);
    assert!(results.iter().all(|r| r.activation <= 0.7 + 1e-6));
    // Heavier edges attract more activation.
    assert_eq!(results[0].node.name, "n1");
}

#[tokio::test]
async fn test_seed_activation_floor() {
    let store = test_store().await;
    let lonely = add_node(&store, "lonely").await;

    let activation = engine(store.clone(), ActivationSettings::default());
    let results = activation
        .spread(
            None,
            &[ActivationSeed { id: lonely, similarity: 0.02 }],
            false,
        )
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert!((results[0].activation - 0.1).abs() < 1e-6, "floor is 0.1");
}

#[tokio::test]
async fn test_exclude_seeds_option() {
    let store = test_store().await;
    let a = add_node(&store, "a").await;
    let b = add_node(&store, "b").await;
    link(&store, a, b, 0.8).await;

    let activation = engine(store.clone(), ActivationSettings::default());
    let seeds = [ActivationSeed { id: a, similarity: 0.9 }];

    let with_seeds = activation.spread(None, &seeds, false).await.unwrap();
    assert!(with_seeds.iter().any(|r| r.node.id == a));

    let without = activation.spread(None, &seeds, true).await.unwrap();
    assert!(without.iter().all(|r| r.node.id != a));
    assert!(without.iter().any(|r| r.node.id == b));
}

#[tokio::test]
async fn test_empty_seeds_yield_empty_result() {
    let store = test_store().await;
    let activation = engine(store.clone(), ActivationSettings::default());
    assert!(activation.spread(None, &[], false).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_top_k_truncation() {
    let store = test_store().await;
    let hub = add_node(&store, "hub").await;
    for i in 0..5 {
        let spoke = add_node(&store, &format!("spoke-{i}")).await;
        link(&store, hub, spoke, 0.5).await;
    }

    let activation = engine(
        store.clone(),
        ActivationSettings {
            top_k: 3,
            ..Default::default()
        },
    );
    let results = activation
        .spread(None, &[ActivationSeed { id: hub, similarity: 1.0 }], true)
        .await
        .unwrap();
    assert_eq!(results.len(), 3);
}

#[tokio::test]
async fn test_activation_decays_across_hops() {
    let store = test_store().await;
    // Line: seed -> mid -> far.
    let seed = add_node(&store, "seed").await;
    let mid = add_node(&store, "mid").await;
    let far = add_node(&store, "far").await;
    link(&store, seed, mid, 0.8).await;
    link(&store, mid, far, 0.8).await;

    let activation = engine(
        store.clone(),
        ActivationSettings {
            max_hops: 3,
            ..Default::default()
        },
    );
    let results = activation
        .spread(None, &[ActivationSeed { id: seed, similarity: 1.0 }], true)
        .await
        .unwrap();

    let get = |name: &str| {
        results
            .iter()
            .find(|r| r.node.name == name)
            .map(|r| r.activation)
    };
    let mid_act = get("mid").expect("mid activated");
    let far_act = get("far").expect("far activated");
    assert!(mid_act > far_act, "activation falls with distance");
    assert!(far_act > 0.0);
}

#[tokio::test]
async fn test_query_embedding_steers_attention() {
    let store = test_store().await;

    let source = add_node(&store, "source").await;
    let matching = store
        .create_node(
            NewNode::new(NodeType::Concept, "matching").with_embedding(vec![1.0, 0.0]),
        )
        .await
        .unwrap()
        .id;
    let orthogonal = store
        .create_node(
            NewNode::new(NodeType::Concept, "orthogonal").with_embedding(vec![0.0, 1.0]),
        )
        .await
        .unwrap()
        .id;
    link(&store, source, matching, 0.5).await;
    link(&store, source, orthogonal, 0.5).await;

    let activation = engine(
        store.clone(),
        ActivationSettings {
            max_hops: 1,
            ..Default::default()
        },
    );
    let query = vec![1.0, 0.0];
    let results = activation
        .spread(
            Some(&query),
            &[ActivationSeed { id: source, similarity: 1.0 }],
            true,
        )
        .await
        .unwrap();

    let get = |id: SynapseId| results.iter().find(|r| r.node.id == id).map(|r| r.activation);
    assert!(
        get(matching).unwrap() > get(orthogonal).unwrap(),
        "embedding similarity shifts the attention distribution"
    );
}
