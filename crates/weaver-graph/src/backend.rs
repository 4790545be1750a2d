//! The capability surface every graph engine provides to [`GraphStore`].
//!
//! [`GraphStore`]: crate::store::GraphStore

use async_trait::async_trait;
use serde::Serialize;

use weaver_core::{Label, NodeId, NodeSnapshot, Properties, RelType};

use crate::client::{GraphClient, GraphError};
use crate::pattern::{Binding, GraphPath, MatchPattern, Neighbor, NoteworthyPredicate};

/// How an edge endpoint is located.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeRef {
    /// By stable identity, as returned in a binding.
    Id(NodeId),
    /// By the (label, name) merge key.
    Key { label: Label, name: String },
}

impl NodeRef {
    pub fn key(label: Label, name: &str) -> Self {
        NodeRef::Key {
            label,
            name: name.to_string(),
        }
    }
}

/// Result of an edge merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    /// The edge was created or its properties merged.
    Applied,
    /// An endpoint does not exist; nothing was written.
    MissingEndpoint,
}

/// A labeled property graph engine.
///
/// Implementations must give every operation merge semantics keyed on
/// (label, name) for nodes and (source, target, type) for edges, and must
/// never create a node as a side effect of an edge merge.
#[async_trait]
pub trait GraphBackend: Send + Sync {
    /// Create the node if absent, then merge `properties` into it.
    async fn merge_node(
        &self,
        label: &Label,
        name: &str,
        properties: &Properties,
    ) -> Result<NodeId, GraphError>;

    /// Create the edge if absent, then merge `properties` into it.
    async fn merge_edge(
        &self,
        source: &NodeRef,
        target: &NodeRef,
        rel_type: &RelType,
        properties: &Properties,
    ) -> Result<UpsertOutcome, GraphError>;

    /// Point lookup by merge key.
    async fn find_node(&self, label: &Label, name: &str)
        -> Result<Option<NodeSnapshot>, GraphError>;

    /// Every edge incident to the node, in either direction.
    async fn neighbors(&self, label: &Label, name: &str) -> Result<Vec<Neighbor>, GraphError>;

    /// All distinct bindings satisfying the pattern.
    async fn match_pattern(&self, pattern: &MatchPattern) -> Result<Vec<Binding>, GraphError>;

    /// All shortest undirected paths of at most `max_hops` edges from every
    /// node named `start_name` (any label) to every other node satisfying
    /// `target`.
    async fn shortest_paths(
        &self,
        start_name: &str,
        target: &NoteworthyPredicate,
        max_hops: usize,
    ) -> Result<Vec<GraphPath>, GraphError>;
}

#[async_trait]
impl GraphBackend for GraphClient {
    async fn merge_node(
        &self,
        label: &Label,
        name: &str,
        properties: &Properties,
    ) -> Result<NodeId, GraphError> {
        self.merge_named_node(label, name, properties).await
    }

    async fn merge_edge(
        &self,
        source: &NodeRef,
        target: &NodeRef,
        rel_type: &RelType,
        properties: &Properties,
    ) -> Result<UpsertOutcome, GraphError> {
        self.merge_relationship(source, target, rel_type, properties)
            .await
    }

    async fn find_node(
        &self,
        label: &Label,
        name: &str,
    ) -> Result<Option<NodeSnapshot>, GraphError> {
        self.find_named_node(label, name).await
    }

    async fn neighbors(&self, label: &Label, name: &str) -> Result<Vec<Neighbor>, GraphError> {
        self.get_neighbors(label, name).await
    }

    async fn match_pattern(&self, pattern: &MatchPattern) -> Result<Vec<Binding>, GraphError> {
        self.match_bindings(pattern).await
    }

    async fn shortest_paths(
        &self,
        start_name: &str,
        target: &NoteworthyPredicate,
        max_hops: usize,
    ) -> Result<Vec<GraphPath>, GraphError> {
        self.all_shortest_paths(start_name, target, max_hops).await
    }
}
