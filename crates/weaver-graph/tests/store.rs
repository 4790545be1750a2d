//! GraphStore behavior over the in-memory engine.

use weaver_core::{Label, Properties, PropertyValue, RelType, Vocabulary};
use weaver_graph::{GraphError, GraphStore, UpsertOutcome};

fn label(s: &str) -> Label {
    Label::parse(s).unwrap()
}

fn rel(s: &str) -> RelType {
    RelType::parse(s).unwrap()
}

fn props(entries: &[(&str, PropertyValue)]) -> Properties {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[tokio::test]
async fn test_upsert_node_merges_properties() {
    let store = GraphStore::in_memory();
    let project = label("Project");

    let first = store
        .upsert_node(
            "Apollo",
            &project,
            &props(&[("status", "active".into()), ("budget", 10.into())]),
        )
        .await
        .unwrap();
    let second = store
        .upsert_node(
            "Apollo",
            &project,
            &props(&[("status", "paused".into()), ("owner", "Anna".into())]),
        )
        .await
        .unwrap();
    assert_eq!(first, second);

    let node = store.get_node("Apollo", &project).await.unwrap();
    assert_eq!(node.property("status"), Some(&PropertyValue::from("paused")));
    assert_eq!(node.property("budget"), Some(&PropertyValue::Int(10)));
    assert_eq!(node.property("owner"), Some(&PropertyValue::from("Anna")));
    assert_eq!(node.property("name"), Some(&PropertyValue::from("Apollo")));
}

#[tokio::test]
async fn test_name_property_cannot_rename_node() {
    let store = GraphStore::in_memory();
    let person = label("Person");

    store
        .upsert_node("Anna", &person, &props(&[("name", "Hanna".into())]))
        .await
        .unwrap();

    assert!(store.find_node("Hanna", &person).await.unwrap().is_none());
    let node = store.get_node("Anna", &person).await.unwrap();
    assert_eq!(node.name, "Anna");
}

#[tokio::test]
async fn test_get_node_not_found() {
    let store = GraphStore::in_memory();
    let err = store.get_node("Ghost", &label("Person")).await.unwrap_err();
    assert!(matches!(err, GraphError::NotFound { .. }));
}

#[tokio::test]
async fn test_upsert_edge_is_merge_not_duplicate() {
    let store = GraphStore::in_memory();
    let (company, person) = (label("Company"), label("Person"));
    store.upsert_node("Apple", &company, &Properties::new()).await.unwrap();
    store.upsert_node("Tim Cook", &person, &Properties::new()).await.unwrap();

    for since in [2011, 2012] {
        let outcome = store
            .upsert_edge(
                "Apple",
                &company,
                "Tim Cook",
                &person,
                &rel("HAS_CEO"),
                &props(&[("since", since.into())]),
            )
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Applied);
    }

    let targets = store
        .outgoing("Apple", &company, &rel("HAS_CEO"))
        .await
        .unwrap();
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].name, "Tim Cook");

    let neighbors = store.neighbors("Apple", &company).await.unwrap();
    assert_eq!(neighbors.len(), 1);
    assert_eq!(neighbors[0].properties["since"], PropertyValue::Int(2012));
}

#[tokio::test]
async fn test_upsert_edge_never_creates_phantom_nodes() {
    let store = GraphStore::in_memory();
    let (company, person) = (label("Company"), label("Person"));
    store.upsert_node("Apple", &company, &Properties::new()).await.unwrap();

    let outcome = store
        .upsert_edge(
            "Apple",
            &company,
            "Nobody",
            &person,
            &rel("HAS_CEO"),
            &Properties::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome, UpsertOutcome::MissingEndpoint);
    assert!(store.find_node("Nobody", &person).await.unwrap().is_none());
    assert!(store.neighbors("Apple", &company).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_upsert_edge_between_uses_identity() {
    let store = GraphStore::in_memory();
    let a = store
        .upsert_node("Anna", &label("Person"), &Properties::new())
        .await
        .unwrap();
    let b = store
        .upsert_node("Python", &label("Technology"), &Properties::new())
        .await
        .unwrap();

    let outcome = store
        .upsert_edge_between(&a, &b, &rel("HAS_SKILL"), &props(&[("inferred", true.into())]))
        .await
        .unwrap();
    assert_eq!(outcome, UpsertOutcome::Applied);

    let skills = store
        .outgoing("Anna", &label("Person"), &rel("HAS_SKILL"))
        .await
        .unwrap();
    assert_eq!(skills.len(), 1);
    assert_eq!(skills[0].id, b);
}

#[tokio::test]
async fn test_vocabulary_rejects_unknown_names() {
    let store = GraphStore::in_memory().with_vocabulary(Vocabulary {
        labels: vec!["Person".to_string()],
        relationship_types: vec!["KNOWS".to_string()],
    });

    let err = store
        .upsert_node("R2-D2", &label("Robot"), &Properties::new())
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::UnknownLabel(ref l) if l == "Robot"));

    let err = store
        .upsert_edge(
            "A",
            &label("Person"),
            "B",
            &label("Person"),
            &rel("HATES"),
            &Properties::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::UnknownRelType(_)));
}

#[tokio::test]
async fn test_invalid_property_key_rejected() {
    let store = GraphStore::in_memory();
    let err = store
        .upsert_node(
            "Anna",
            &label("Person"),
            &props(&[("bad key", 1.into())]),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::Identifier(_)));
}

#[tokio::test]
async fn test_clones_share_backend() {
    let store = GraphStore::in_memory();
    let other = store.clone();
    other
        .upsert_node("Anna", &label("Person"), &Properties::new())
        .await
        .unwrap();
    assert!(store
        .find_node("Anna", &label("Person"))
        .await
        .unwrap()
        .is_some());
}
