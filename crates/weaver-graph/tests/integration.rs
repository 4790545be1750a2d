//! Integration tests for weaver-graph against a live Neo4j instance.
//!
//! Run with: cargo test --package weaver-graph --test integration -- --ignored
//!
//! Skipped automatically if Neo4j is not available. Every test works under
//! its own throwaway labels so runs never collide.

use weaver_core::{Label, NoteworthyCondition, Properties, PropertyValue, RelType};
use weaver_graph::{GraphClient, GraphConfig, GraphStore, NoteworthyPredicate, UpsertOutcome};

async fn connect_or_skip() -> Option<GraphClient> {
    let config = GraphConfig::default();
    match GraphClient::connect(&config).await {
        Ok(client) => Some(client),
        Err(e) => {
            eprintln!("Skipping integration test (Neo4j not available): {e}");
            None
        }
    }
}

/// A label unique to one test run.
fn unique_label(base: &str) -> Label {
    Label::parse(&format!("{base}_{}", uuid::Uuid::new_v4().simple())).unwrap()
}

async fn cleanup(client: &GraphClient, labels: &[&Label]) {
    for label in labels {
        let q = neo4rs::query(&format!("MATCH (n:`{label}`) DETACH DELETE n"));
        let _ = client.run(q).await;
    }
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn test_upsert_and_find_node() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    let project = unique_label("Project");
    let store = GraphStore::neo4j(client.clone());

    let mut props = Properties::new();
    props.insert("status".into(), "active".into());
    props.insert("budget".into(), 10.into());
    let first = store.upsert_node("Apollo", &project, &props).await.unwrap();

    props.insert("status".into(), "paused".into());
    let second = store.upsert_node("Apollo", &project, &props).await.unwrap();
    assert_eq!(first, second);

    let node = store.get_node("Apollo", &project).await.unwrap();
    assert_eq!(node.name, "Apollo");
    assert_eq!(node.property("status"), Some(&PropertyValue::from("paused")));
    assert_eq!(node.property("budget"), Some(&PropertyValue::Int(10)));

    cleanup(&client, &[&project]).await;
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn test_edge_merge_and_missing_endpoint() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    let company = unique_label("Company");
    let person = unique_label("Person");
    let has_ceo = RelType::parse("HAS_CEO").unwrap();
    let store = GraphStore::neo4j(client.clone());

    store.upsert_node("Apple", &company, &Properties::new()).await.unwrap();
    store.upsert_node("Tim Cook", &person, &Properties::new()).await.unwrap();

    for _ in 0..2 {
        let outcome = store
            .upsert_edge("Apple", &company, "Tim Cook", &person, &has_ceo, &Properties::new())
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Applied);
    }
    let targets = store.outgoing("Apple", &company, &has_ceo).await.unwrap();
    assert_eq!(targets.len(), 1);

    let outcome = store
        .upsert_edge("Apple", &company, "Nobody", &person, &has_ceo, &Properties::new())
        .await
        .unwrap();
    assert_eq!(outcome, UpsertOutcome::MissingEndpoint);
    assert!(store.find_node("Nobody", &person).await.unwrap().is_none());

    let neighbors = store.neighbors("Tim Cook", &person).await.unwrap();
    assert_eq!(neighbors.len(), 1);
    assert_eq!(neighbors[0].name, "Apple");

    cleanup(&client, &[&company, &person]).await;
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn test_shortest_paths_to_noteworthy_node() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    let project = unique_label("Project");
    let api = unique_label("Api");
    let store = GraphStore::neo4j(client.clone());
    let start = format!("Project X {project}");

    let mut status = Properties::new();
    status.insert("status".into(), "deprecated".into());
    store.upsert_node(&start, &project, &Properties::new()).await.unwrap();
    store.upsert_node("API Y", &api, &status).await.unwrap();
    store
        .upsert_edge(
            &start,
            &project,
            "API Y",
            &api,
            &RelType::parse("DEPENDS_ON").unwrap(),
            &Properties::new(),
        )
        .await
        .unwrap();

    let predicate =
        NoteworthyPredicate::from_config(&[NoteworthyCondition::new("status", "deprecated")])
            .unwrap();
    let paths = store.shortest_paths(&start, &predicate, 3).await.unwrap();

    let ours: Vec<_> = paths
        .iter()
        .filter(|p| p.end().has_label(&api))
        .collect();
    assert_eq!(ours.len(), 1);
    assert_eq!(ours[0].steps[0].rel_type, "DEPENDS_ON");
    assert!(ours[0].steps[0].forward);

    cleanup(&client, &[&project, &api]).await;
}
