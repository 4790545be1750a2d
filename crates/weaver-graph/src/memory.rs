//! In-process graph engine.
//!
//! Mirrors the Neo4j backend's semantics closely enough that rules, the
//! contradiction guard and hypothesis search behave identically on both:
//! merge keys, relationship uniqueness within a match, null-false filters
//! and undirected all-shortest-paths.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use weaver_core::{Direction, Label, NodeId, NodeSnapshot, Properties, PropertyValue, RelType, Var};

use crate::backend::{GraphBackend, NodeRef, UpsertOutcome};
use crate::client::GraphError;
use crate::pattern::{
    Binding, EdgePattern, GraphPath, MatchPattern, Neighbor, NodePattern, NoteworthyPredicate,
    Operand, PathStep, PropertyRef,
};

struct MemNode {
    id: NodeId,
    label: Label,
    /// Includes `name`.
    properties: Properties,
}

impl MemNode {
    fn name(&self) -> &str {
        self.properties
            .get("name")
            .and_then(PropertyValue::as_str)
            .unwrap_or_default()
    }

    fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            id: self.id.clone(),
            labels: vec![self.label.to_string()],
            name: self.name().to_string(),
            properties: self.properties.clone(),
        }
    }
}

struct MemEdge {
    source: usize,
    target: usize,
    rel_type: RelType,
    properties: Properties,
}

#[derive(Default)]
struct State {
    nodes: Vec<MemNode>,
    edges: Vec<MemEdge>,
    node_keys: HashMap<(Label, String), usize>,
    node_ids: HashMap<NodeId, usize>,
    edge_keys: HashMap<(usize, usize, RelType), usize>,
    outgoing: Vec<Vec<usize>>,
    incoming: Vec<Vec<usize>>,
}

/// A partially matched binding.
#[derive(Clone, Default)]
struct Partial {
    nodes: HashMap<Var, usize>,
    edges: HashMap<Var, usize>,
    used: HashSet<usize>,
}

/// Thread-safe in-memory labeled property graph.
///
/// Clone is cheap and every clone shares the same graph.
#[derive(Clone, Default)]
pub struct MemoryGraph {
    state: Arc<RwLock<State>>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.state.read().nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.state.read().edges.len()
    }
}

impl State {
    fn resolve(&self, node: &NodeRef) -> Option<usize> {
        match node {
            NodeRef::Id(id) => self.node_ids.get(id).copied(),
            NodeRef::Key { label, name } => {
                self.node_keys.get(&(label.clone(), name.clone())).copied()
            }
        }
    }

    fn upsert_node(&mut self, label: &Label, name: &str, properties: &Properties) -> NodeId {
        let key = (label.clone(), name.to_string());
        let idx = match self.node_keys.get(&key) {
            Some(&idx) => idx,
            None => {
                let idx = self.nodes.len();
                let id = NodeId(Uuid::new_v4().to_string());
                let mut props = Properties::new();
                props.insert("name".to_string(), PropertyValue::from(name));
                self.nodes.push(MemNode {
                    id: id.clone(),
                    label: label.clone(),
                    properties: props,
                });
                self.outgoing.push(Vec::new());
                self.incoming.push(Vec::new());
                self.node_keys.insert(key, idx);
                self.node_ids.insert(id, idx);
                idx
            }
        };

        let node = &mut self.nodes[idx];
        for (k, v) in properties {
            // The name is the merge key and never changes.
            if k != "name" {
                node.properties.insert(k.clone(), v.clone());
            }
        }
        node.id.clone()
    }

    fn upsert_edge(
        &mut self,
        source: usize,
        target: usize,
        rel_type: &RelType,
        properties: &Properties,
    ) {
        let key = (source, target, rel_type.clone());
        let idx = match self.edge_keys.get(&key) {
            Some(&idx) => idx,
            None => {
                let idx = self.edges.len();
                self.edges.push(MemEdge {
                    source,
                    target,
                    rel_type: rel_type.clone(),
                    properties: Properties::new(),
                });
                self.outgoing[source].push(idx);
                self.incoming[target].push(idx);
                self.edge_keys.insert(key, idx);
                idx
            }
        };
        self.edges[idx]
            .properties
            .extend(properties.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    /// Incident edges as (edge, other endpoint, stored direction seen from `node`).
    fn incident(&self, node: usize, direction: Direction) -> Vec<(usize, usize, Direction)> {
        let mut out = Vec::new();
        if matches!(direction, Direction::Outgoing | Direction::Either) {
            out.extend(
                self.outgoing[node]
                    .iter()
                    .map(|&e| (e, self.edges[e].target, Direction::Outgoing)),
            );
        }
        if matches!(direction, Direction::Incoming | Direction::Either) {
            out.extend(
                self.incoming[node]
                    .iter()
                    .filter(|&&e| direction == Direction::Incoming || self.edges[e].source != node)
                    .map(|&e| (e, self.edges[e].source, Direction::Incoming)),
            );
        }
        out
    }

    // ── Matching ─────────────────────────────────────────────────

    fn node_fits(&self, pattern: &NodePattern, idx: usize) -> bool {
        let node = &self.nodes[idx];
        pattern.label.as_ref().map_or(true, |l| &node.label == l)
            && pattern
                .properties
                .iter()
                .all(|(k, v)| node.properties.get(k.as_str()).is_some_and(|p| p.matches(v)))
    }

    fn edge_fits(&self, pattern: &EdgePattern, idx: usize) -> bool {
        let edge = &self.edges[idx];
        pattern.accepts(&edge.rel_type, &edge.properties)
    }

    /// Bind `pattern` to node `idx`, or confirm an existing binding.
    fn bind_node(&self, pattern: &NodePattern, idx: usize, partial: &mut Partial) -> bool {
        if !self.node_fits(pattern, idx) {
            return false;
        }
        match partial.nodes.get(&pattern.var) {
            Some(&bound) => bound == idx,
            None => {
                partial.nodes.insert(pattern.var.clone(), idx);
                true
            }
        }
    }

    fn extend_hops(
        &self,
        hops: &[(EdgePattern, NodePattern)],
        current: usize,
        partial: Partial,
        out: &mut Vec<Partial>,
    ) {
        let Some(((edge_pattern, node_pattern), rest)) = hops.split_first() else {
            out.push(partial);
            return;
        };

        for (edge, other, _) in self.incident(current, edge_pattern.direction) {
            if partial.used.contains(&edge) || !self.edge_fits(edge_pattern, edge) {
                continue;
            }

            let mut next = partial.clone();
            if !self.bind_node(node_pattern, other, &mut next) {
                continue;
            }
            next.used.insert(edge);
            if let Some(var) = &edge_pattern.var {
                next.edges.insert(var.clone(), edge);
            }
            self.extend_hops(rest, other, next, out);
        }
    }

    fn lookup(&self, partial: &Partial, r: &PropertyRef) -> Option<&PropertyValue> {
        if let Some(&n) = partial.nodes.get(&r.var) {
            return self.nodes[n].properties.get(r.key.as_str());
        }
        partial
            .edges
            .get(&r.var)
            .and_then(|&e| self.edges[e].properties.get(r.key.as_str()))
    }

    fn match_pattern(&self, pattern: &MatchPattern) -> Vec<Binding> {
        let mut partials = vec![Partial::default()];

        for path in &pattern.paths {
            let mut extended = Vec::new();
            for partial in partials {
                let starts: Vec<usize> = match partial.nodes.get(&path.start.var) {
                    Some(&bound) => vec![bound],
                    None => (0..self.nodes.len()).collect(),
                };
                for start in starts {
                    let mut seeded = partial.clone();
                    if self.bind_node(&path.start, start, &mut seeded) {
                        self.extend_hops(&path.hops, start, seeded, &mut extended);
                    }
                }
            }
            partials = extended;
            if partials.is_empty() {
                return Vec::new();
            }
        }

        let mut seen = HashSet::new();
        let mut bindings = Vec::new();
        for partial in partials {
            let passes = pattern.filters.iter().all(|f| {
                let lhs = self.lookup(&partial, &f.lhs);
                let rhs = match &f.rhs {
                    Operand::Literal(value) => Some(value),
                    Operand::Property(r) => self.lookup(&partial, r),
                };
                f.op.eval(lhs, rhs)
            });
            if !passes {
                continue;
            }

            let identity: BTreeMap<Var, usize> = partial.nodes.into_iter().collect();
            if !seen.insert(identity.clone()) {
                continue;
            }
            bindings.push(Binding {
                nodes: identity
                    .into_iter()
                    .map(|(var, idx)| (var, self.nodes[idx].snapshot()))
                    .collect(),
            });
        }
        bindings
    }

    // ── Shortest Paths ───────────────────────────────────────────

    fn shortest_paths(
        &self,
        start_name: &str,
        target: &NoteworthyPredicate,
        max_hops: usize,
    ) -> Vec<GraphPath> {
        let mut paths = Vec::new();
        if target.conditions.is_empty() || max_hops == 0 {
            return paths;
        }

        let starts = (0..self.nodes.len()).filter(|&i| self.nodes[i].name() == start_name);
        for start in starts {
            let (dist, preds) = self.layered_bfs(start, max_hops);
            for goal in 0..self.nodes.len() {
                if goal == start
                    || dist[goal].is_none()
                    || !target.matches(&self.nodes[goal].properties)
                {
                    continue;
                }
                let mut routes = Vec::new();
                collect_routes(&preds, start, goal, &mut Vec::new(), &mut routes);
                for edges in routes {
                    paths.push(self.to_graph_path(start, &edges));
                }
            }
        }
        paths
    }

    /// Undirected BFS recording every predecessor on a shortest route.
    fn layered_bfs(
        &self,
        start: usize,
        max_hops: usize,
    ) -> (Vec<Option<usize>>, Vec<Vec<(usize, usize)>>) {
        let mut dist = vec![None; self.nodes.len()];
        let mut preds: Vec<Vec<(usize, usize)>> = vec![Vec::new(); self.nodes.len()];
        dist[start] = Some(0);

        let mut frontier = vec![start];
        for depth in 1..=max_hops {
            let mut next = Vec::new();
            for &u in &frontier {
                for (edge, v, _) in self.incident(u, Direction::Either) {
                    match dist[v] {
                        None => {
                            dist[v] = Some(depth);
                            preds[v].push((u, edge));
                            next.push(v);
                        }
                        Some(d) if d == depth => preds[v].push((u, edge)),
                        Some(_) => {}
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        (dist, preds)
    }

    fn to_graph_path(&self, start: usize, edges: &[usize]) -> GraphPath {
        let mut steps = Vec::with_capacity(edges.len());
        let mut previous = start;
        for &e in edges {
            let edge = &self.edges[e];
            let forward = edge.source == previous;
            let next = if forward { edge.target } else { edge.source };
            steps.push(PathStep {
                rel_type: edge.rel_type.to_string(),
                forward,
                node: self.nodes[next].snapshot(),
            });
            previous = next;
        }
        GraphPath {
            start: self.nodes[start].snapshot(),
            steps,
        }
    }
}

/// Walk predecessor lists back from `node` to `start`, emitting edge
/// sequences in traversal order.
fn collect_routes(
    preds: &[Vec<(usize, usize)>],
    start: usize,
    node: usize,
    suffix: &mut Vec<usize>,
    out: &mut Vec<Vec<usize>>,
) {
    if node == start {
        out.push(suffix.iter().rev().copied().collect());
        return;
    }
    for &(prev, edge) in &preds[node] {
        suffix.push(edge);
        collect_routes(preds, start, prev, suffix, out);
        suffix.pop();
    }
}

#[async_trait]
impl GraphBackend for MemoryGraph {
    async fn merge_node(
        &self,
        label: &Label,
        name: &str,
        properties: &Properties,
    ) -> Result<NodeId, GraphError> {
        Ok(self.state.write().upsert_node(label, name, properties))
    }

    async fn merge_edge(
        &self,
        source: &NodeRef,
        target: &NodeRef,
        rel_type: &RelType,
        properties: &Properties,
    ) -> Result<UpsertOutcome, GraphError> {
        let mut state = self.state.write();
        let (Some(s), Some(t)) = (state.resolve(source), state.resolve(target)) else {
            return Ok(UpsertOutcome::MissingEndpoint);
        };
        state.upsert_edge(s, t, rel_type, properties);
        Ok(UpsertOutcome::Applied)
    }

    async fn find_node(
        &self,
        label: &Label,
        name: &str,
    ) -> Result<Option<NodeSnapshot>, GraphError> {
        let state = self.state.read();
        Ok(state
            .resolve(&NodeRef::key(label.clone(), name))
            .map(|idx| state.nodes[idx].snapshot()))
    }

    async fn neighbors(&self, label: &Label, name: &str) -> Result<Vec<Neighbor>, GraphError> {
        let state = self.state.read();
        let Some(idx) = state.resolve(&NodeRef::key(label.clone(), name)) else {
            return Ok(Vec::new());
        };

        Ok(state
            .incident(idx, Direction::Either)
            .into_iter()
            .map(|(e, other, direction)| {
                let edge = &state.edges[e];
                let node = &state.nodes[other];
                Neighbor {
                    node_id: node.id.clone(),
                    name: node.name().to_string(),
                    labels: vec![node.label.to_string()],
                    relationship_type: edge.rel_type.to_string(),
                    properties: edge.properties.clone(),
                    direction,
                }
            })
            .collect())
    }

    async fn match_pattern(&self, pattern: &MatchPattern) -> Result<Vec<Binding>, GraphError> {
        pattern.validate()?;
        Ok(self.state.read().match_pattern(pattern))
    }

    async fn shortest_paths(
        &self,
        start_name: &str,
        target: &NoteworthyPredicate,
        max_hops: usize,
    ) -> Result<Vec<GraphPath>, GraphError> {
        Ok(self.state.read().shortest_paths(start_name, target, max_hops))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{CmpOp, Filter, PathPattern};
    use weaver_core::PropertyKey;

    fn label(s: &str) -> Label {
        Label::parse(s).unwrap()
    }

    fn rel(s: &str) -> RelType {
        RelType::parse(s).unwrap()
    }

    fn var(s: &str) -> Var {
        Var::parse(s).unwrap()
    }

    async fn link(g: &MemoryGraph, s: (&str, &str), t: (&str, &str), r: &str) {
        let none = Properties::new();
        g.merge_node(&label(s.0), s.1, &none).await.unwrap();
        g.merge_node(&label(t.0), t.1, &none).await.unwrap();
        let outcome = g
            .merge_edge(
                &NodeRef::key(label(s.0), s.1),
                &NodeRef::key(label(t.0), t.1),
                &rel(r),
                &none,
            )
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Applied);
    }

    #[tokio::test]
    async fn test_merge_node_is_idempotent() {
        let g = MemoryGraph::new();
        let mut props = Properties::new();
        props.insert("status".into(), "active".into());

        let a = g.merge_node(&label("Project"), "Apollo", &props).await.unwrap();
        props.insert("status".into(), "paused".into());
        let b = g.merge_node(&label("Project"), "Apollo", &props).await.unwrap();

        assert_eq!(a, b);
        assert_eq!(g.node_count(), 1);
        let node = g.find_node(&label("Project"), "Apollo").await.unwrap().unwrap();
        assert_eq!(node.property("status"), Some(&PropertyValue::from("paused")));
        assert_eq!(node.name, "Apollo");
    }

    #[tokio::test]
    async fn test_same_name_different_label_are_distinct() {
        let g = MemoryGraph::new();
        let none = Properties::new();
        let a = g.merge_node(&label("Person"), "Jordan", &none).await.unwrap();
        let b = g.merge_node(&label("Country"), "Jordan", &none).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(g.node_count(), 2);
    }

    #[tokio::test]
    async fn test_merge_edge_requires_endpoints() {
        let g = MemoryGraph::new();
        let none = Properties::new();
        g.merge_node(&label("Company"), "Apple", &none).await.unwrap();

        let outcome = g
            .merge_edge(
                &NodeRef::key(label("Company"), "Apple"),
                &NodeRef::key(label("Person"), "Nobody"),
                &rel("HAS_CEO"),
                &none,
            )
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::MissingEndpoint);
        assert_eq!(g.node_count(), 1);
        assert_eq!(g.edge_count(), 0);
    }

    #[tokio::test]
    async fn test_merge_edge_merges_properties() {
        let g = MemoryGraph::new();
        link(&g, ("Company", "Apple"), ("Person", "Tim Cook"), "HAS_CEO").await;

        let mut props = Properties::new();
        props.insert("since".into(), 2011.into());
        g.merge_edge(
            &NodeRef::key(label("Company"), "Apple"),
            &NodeRef::key(label("Person"), "Tim Cook"),
            &rel("HAS_CEO"),
            &props,
        )
        .await
        .unwrap();

        assert_eq!(g.edge_count(), 1);
        let neighbors = g.neighbors(&label("Company"), "Apple").await.unwrap();
        assert_eq!(neighbors.len(), 1);
        assert_eq!(neighbors[0].properties["since"], PropertyValue::Int(2011));
        assert_eq!(neighbors[0].direction, Direction::Outgoing);

        let back = g.neighbors(&label("Person"), "Tim Cook").await.unwrap();
        assert_eq!(back[0].direction, Direction::Incoming);
        assert_eq!(back[0].name, "Apple");
    }

    #[tokio::test]
    async fn test_match_joins_fragments_on_shared_variable() {
        let g = MemoryGraph::new();
        link(&g, ("Person", "Anna"), ("Project", "Apollo"), "WORKS_ON").await;
        link(&g, ("Project", "Apollo"), ("Technology", "Python"), "USES_TECH").await;
        link(&g, ("Project", "Zeus"), ("Technology", "Rust"), "USES_TECH").await;

        let pattern = MatchPattern::new(vec![
            PathPattern::node(NodePattern::new(var("p")).with_label(label("Person"))).hop(
                EdgePattern::new(Some(rel("WORKS_ON")), Direction::Outgoing),
                NodePattern::new(var("proj")).with_label(label("Project")),
            ),
            PathPattern::node(NodePattern::new(var("proj"))).hop(
                EdgePattern::new(Some(rel("USES_TECH")), Direction::Outgoing),
                NodePattern::new(var("t")).with_label(label("Technology")),
            ),
        ]);

        let bindings = g.match_pattern(&pattern).await.unwrap();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].node(&var("t")).unwrap().name, "Python");
    }

    #[tokio::test]
    async fn test_match_does_not_reuse_an_edge() {
        let g = MemoryGraph::new();
        link(&g, ("Person", "A"), ("Person", "B"), "KNOWS").await;

        // (x)-[:KNOWS]-(y)-[:KNOWS]-(z) needs two distinct edges.
        let pattern = MatchPattern::new(vec![PathPattern::node(NodePattern::new(var("x")))
            .hop(
                EdgePattern::new(Some(rel("KNOWS")), Direction::Either),
                NodePattern::new(var("y")),
            )
            .hop(
                EdgePattern::new(Some(rel("KNOWS")), Direction::Either),
                NodePattern::new(var("z")),
            )]);
        assert!(g.match_pattern(&pattern).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_match_filter_missing_property_is_false() {
        let g = MemoryGraph::new();
        let mut props = Properties::new();
        props.insert("age".into(), 40.into());
        g.merge_node(&label("Person"), "Old", &props).await.unwrap();
        g.merge_node(&label("Person"), "Unknown", &Properties::new())
            .await
            .unwrap();

        let pattern = MatchPattern::new(vec![PathPattern::node(
            NodePattern::new(var("p")).with_label(label("Person")),
        )])
        .with_filters(vec![Filter {
            lhs: PropertyRef {
                var: var("p"),
                key: PropertyKey::parse("age").unwrap(),
            },
            op: CmpOp::Ne,
            rhs: Operand::Literal(PropertyValue::Int(30)),
        }]);

        let bindings = g.match_pattern(&pattern).await.unwrap();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].node(&var("p")).unwrap().name, "Old");
    }

    #[tokio::test]
    async fn test_shortest_paths_undirected() {
        let g = MemoryGraph::new();
        link(&g, ("Project", "Project X"), ("API", "API Y"), "DEPENDS_ON").await;
        link(&g, ("Project", "Project X"), ("Person", "Person A"), "HAS_LEAD").await;
        link(&g, ("Person", "Person B"), ("Project", "Project X"), "MANAGES").await;

        let mut status = Properties::new();
        status.insert("status".into(), "deprecated".into());
        g.merge_node(&label("API"), "API Y", &status).await.unwrap();
        let mut stress = Properties::new();
        stress.insert("stress_level".into(), "high".into());
        g.merge_node(&label("Person"), "Person B", &stress).await.unwrap();

        let predicate = NoteworthyPredicate::new(vec![
            (PropertyKey::parse("status").unwrap(), "deprecated".into()),
            (PropertyKey::parse("stress_level").unwrap(), "high".into()),
        ]);

        let paths = g.shortest_paths("Project X", &predicate, 3).await.unwrap();
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0].end().name, "API Y");
        assert!(paths[0].steps[0].forward);
        assert_eq!(paths[1].end().name, "Person B");
        assert!(!paths[1].steps[0].forward);

        assert!(g.shortest_paths("Nobody", &predicate, 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_shortest_paths_respect_hop_limit() {
        let g = MemoryGraph::new();
        link(&g, ("N", "a"), ("N", "b"), "NEXT").await;
        link(&g, ("N", "b"), ("N", "c"), "NEXT").await;
        let mut flagged = Properties::new();
        flagged.insert("status".into(), "deprecated".into());
        g.merge_node(&label("N"), "c", &flagged).await.unwrap();

        let predicate =
            NoteworthyPredicate::new(vec![(PropertyKey::parse("status").unwrap(), "deprecated".into())]);
        assert!(g.shortest_paths("a", &predicate, 1).await.unwrap().is_empty());
        let paths = g.shortest_paths("a", &predicate, 2).await.unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].len(), 2);
    }

    #[tokio::test]
    async fn test_shortest_paths_enumerates_parallel_routes() {
        let g = MemoryGraph::new();
        link(&g, ("N", "s"), ("N", "m1"), "TO").await;
        link(&g, ("N", "s"), ("N", "m2"), "TO").await;
        link(&g, ("N", "m1"), ("N", "t"), "TO").await;
        link(&g, ("N", "m2"), ("N", "t"), "TO").await;
        let mut flagged = Properties::new();
        flagged.insert("sentiment".into(), "negative".into());
        g.merge_node(&label("N"), "t", &flagged).await.unwrap();

        let predicate = NoteworthyPredicate::new(vec![(
            PropertyKey::parse("sentiment").unwrap(),
            "negative".into(),
        )]);
        let paths = g.shortest_paths("s", &predicate, 3).await.unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths.iter().all(|p| p.len() == 2));
    }
}
