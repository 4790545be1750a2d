//! The single read/write point for the knowledge graph.

use std::sync::Arc;

use weaver_core::{
    Direction, Label, NodeId, NodeSnapshot, Properties, PropertyKey, RelType, Var, Vocabulary,
};

use crate::backend::{GraphBackend, NodeRef, UpsertOutcome};
use crate::client::{GraphClient, GraphError};
use crate::memory::MemoryGraph;
use crate::pattern::{
    Binding, EdgePattern, GraphPath, MatchPattern, Neighbor, NodePattern, NoteworthyPredicate,
    PathPattern,
};

/// Graph access handle shared by the guard, the rule engine, the hypothesis
/// generator and the ingestor.
///
/// Holds no state beyond the backend handle and the vocabulary. Clone is
/// cheap; every clone talks to the same backend.
#[derive(Clone)]
pub struct GraphStore {
    backend: Arc<dyn GraphBackend>,
    vocabulary: Vocabulary,
}

impl GraphStore {
    pub fn new(backend: Arc<dyn GraphBackend>) -> Self {
        Self {
            backend,
            vocabulary: Vocabulary::default(),
        }
    }

    /// Restrict labels and relationship types to a closed set.
    pub fn with_vocabulary(mut self, vocabulary: Vocabulary) -> Self {
        self.vocabulary = vocabulary;
        self
    }

    /// A store over a fresh in-process graph.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryGraph::new()))
    }

    pub fn neo4j(client: GraphClient) -> Self {
        Self::new(Arc::new(client))
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    // ── Vocabulary ───────────────────────────────────────────────

    pub fn check_label(&self, label: &Label) -> Result<(), GraphError> {
        if self.vocabulary.permits_label(label) {
            Ok(())
        } else {
            Err(GraphError::UnknownLabel(label.to_string()))
        }
    }

    pub fn check_rel_type(&self, rel_type: &RelType) -> Result<(), GraphError> {
        if self.vocabulary.permits_rel_type(rel_type) {
            Ok(())
        } else {
            Err(GraphError::UnknownRelType(rel_type.to_string()))
        }
    }

    /// Check every label and relationship type a pattern mentions.
    pub fn check_pattern(&self, pattern: &MatchPattern) -> Result<(), GraphError> {
        for path in &pattern.paths {
            for node in path.nodes() {
                if let Some(label) = &node.label {
                    self.check_label(label)?;
                }
            }
            for (edge, _) in &path.hops {
                if let Some(rel_type) = &edge.rel_type {
                    self.check_rel_type(rel_type)?;
                }
            }
        }
        Ok(())
    }

    // ── Writes ───────────────────────────────────────────────────

    /// Create the node if absent, otherwise merge `properties` into it.
    ///
    /// `name` is the merge key; a `name` entry in `properties` is ignored.
    pub async fn upsert_node(
        &self,
        name: &str,
        label: &Label,
        properties: &Properties,
    ) -> Result<NodeId, GraphError> {
        self.check_label(label)?;
        let properties = sanitize(properties, Some(name))?;

        let id = self.backend.merge_node(label, name, &properties).await?;
        tracing::debug!(%label, name, node_id = %id, "Upserted node");
        Ok(id)
    }

    /// Create or update an edge between two (label, name) keyed nodes.
    ///
    /// Never creates endpoints: a missing endpoint is reported as
    /// [`UpsertOutcome::MissingEndpoint`] and nothing is written.
    pub async fn upsert_edge(
        &self,
        source_name: &str,
        source_label: &Label,
        target_name: &str,
        target_label: &Label,
        rel_type: &RelType,
        properties: &Properties,
    ) -> Result<UpsertOutcome, GraphError> {
        self.check_label(source_label)?;
        self.check_label(target_label)?;
        self.check_rel_type(rel_type)?;
        let properties = sanitize(properties, None)?;

        let outcome = self
            .backend
            .merge_edge(
                &NodeRef::key(source_label.clone(), source_name),
                &NodeRef::key(target_label.clone(), target_name),
                rel_type,
                &properties,
            )
            .await?;

        if outcome == UpsertOutcome::MissingEndpoint {
            tracing::warn!(
                source = %format!("{source_label}:{source_name}"),
                target = %format!("{target_label}:{target_name}"),
                %rel_type,
                "Edge not written: endpoint missing"
            );
        }
        Ok(outcome)
    }

    /// Create or update an edge between two nodes identified by handle.
    pub async fn upsert_edge_between(
        &self,
        source: &NodeId,
        target: &NodeId,
        rel_type: &RelType,
        properties: &Properties,
    ) -> Result<UpsertOutcome, GraphError> {
        self.check_rel_type(rel_type)?;
        let properties = sanitize(properties, None)?;

        let outcome = self
            .backend
            .merge_edge(
                &NodeRef::Id(source.clone()),
                &NodeRef::Id(target.clone()),
                rel_type,
                &properties,
            )
            .await?;

        if outcome == UpsertOutcome::MissingEndpoint {
            tracing::warn!(%source, %target, %rel_type, "Edge not written: endpoint missing");
        }
        Ok(outcome)
    }

    // ── Reads ────────────────────────────────────────────────────

    pub async fn find_node(
        &self,
        name: &str,
        label: &Label,
    ) -> Result<Option<NodeSnapshot>, GraphError> {
        self.check_label(label)?;
        self.backend.find_node(label, name).await
    }

    /// Like [`find_node`](Self::find_node) but a miss is an error.
    pub async fn get_node(&self, name: &str, label: &Label) -> Result<NodeSnapshot, GraphError> {
        self.find_node(name, label)
            .await?
            .ok_or_else(|| GraphError::NotFound {
                label: label.to_string(),
                name: name.to_string(),
            })
    }

    /// Every edge incident to the node, in either direction.
    pub async fn neighbors(&self, name: &str, label: &Label) -> Result<Vec<Neighbor>, GraphError> {
        self.check_label(label)?;
        self.backend.neighbors(label, name).await
    }

    /// Targets of the node's outgoing edges of one type, in store order.
    pub async fn outgoing(
        &self,
        name: &str,
        label: &Label,
        rel_type: &RelType,
    ) -> Result<Vec<NodeSnapshot>, GraphError> {
        let subject = Var::parse("subject")?;
        let target = Var::parse("target")?;
        let name_key = PropertyKey::parse("name")?;

        let pattern = MatchPattern::new(vec![PathPattern::node(
            NodePattern::new(subject)
                .with_label(label.clone())
                .with_property(name_key, name.into()),
        )
        .hop(
            EdgePattern::new(Some(rel_type.clone()), Direction::Outgoing),
            NodePattern::new(target.clone()),
        )]);

        let bindings = self.match_pattern(&pattern).await?;
        Ok(bindings
            .into_iter()
            .filter_map(|mut b| b.nodes.remove(&target))
            .collect())
    }

    /// All distinct bindings of a validated pattern.
    pub async fn match_pattern(&self, pattern: &MatchPattern) -> Result<Vec<Binding>, GraphError> {
        pattern.validate()?;
        self.check_pattern(pattern)?;
        self.backend.match_pattern(pattern).await
    }

    /// All shortest undirected paths from nodes named `start_name` to nodes
    /// satisfying `predicate`, bounded by `max_hops`.
    pub async fn shortest_paths(
        &self,
        start_name: &str,
        predicate: &NoteworthyPredicate,
        max_hops: usize,
    ) -> Result<Vec<GraphPath>, GraphError> {
        self.backend
            .shortest_paths(start_name, predicate, max_hops)
            .await
    }
}

impl std::fmt::Debug for GraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphStore")
            .field("vocabulary", &self.vocabulary)
            .finish_non_exhaustive()
    }
}

/// Validate property keys and drop the reserved `name` key.
fn sanitize(properties: &Properties, node_name: Option<&str>) -> Result<Properties, GraphError> {
    let mut clean = Properties::new();
    for (key, value) in properties {
        PropertyKey::parse(key)?;
        if key == "name" && node_name.is_some() {
            if node_name != value.as_str() {
                tracing::warn!(
                    name = ?node_name,
                    ignored = %value,
                    "Ignoring `name` property that differs from the node key"
                );
            }
            continue;
        }
        clean.insert(key.clone(), value.clone());
    }
    Ok(clean)
}
